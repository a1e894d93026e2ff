//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Users with a current session.
    pub sessions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        sessions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_server() {
        let resp = health_check(Instant::now(), 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
        assert_eq!(resp.sessions, 0);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        assert!(health_check(start, 3).uptime_secs >= 59);
    }

    #[test]
    fn serializes_flat() {
        let json = serde_json::to_value(health_check(Instant::now(), 2)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 2);
        assert!(json["uptime_secs"].is_number());
    }
}
