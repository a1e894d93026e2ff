//! Canonical cache keys for feed requests.
//!
//! Defaults are materialized before the key is built, so a request that
//! omits a parameter and one that sends its default value explicitly share
//! one entry. Parameters the upstream ignores for a given feed kind (window
//! for discover; genre, year and sort for trending) are left out of the key.

use std::fmt;
use std::str::FromStr;

use crate::errors::QueryError;

/// Default trending window.
pub const DEFAULT_WINDOW: &str = "week";

/// Default discover ordering.
pub const DEFAULT_SORT: &str = "popularity.desc";

/// Which upstream listing a feed request reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Trending movies over a time window.
    Trending,
    /// Filtered discovery listing.
    #[default]
    Discover,
}

impl FeedKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Discover => "discover",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trending" => Ok(Self::Trending),
            "" | "discover" => Ok(Self::Discover),
            other => Err(QueryError::UnknownKind(other.to_string())),
        }
    }
}

/// Feed request parameters as received; `None` means "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedQuery {
    /// Listing kind.
    pub kind: FeedKind,
    /// Trending window (`day`, `week`, `month`, or the `7d`/`30d` aliases).
    pub window: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Genre filter.
    pub genre: Option<String>,
    /// Release year filter.
    pub year: Option<String>,
    /// ISO 3166-1 region code.
    pub region: Option<String>,
    /// Discover ordering, e.g. `release_date.desc`.
    pub sort: Option<String>,
}

impl FeedQuery {
    /// A trending request with every parameter defaulted.
    pub fn trending() -> Self {
        Self {
            kind: FeedKind::Trending,
            ..Self::default()
        }
    }

    /// A discover request with every parameter defaulted.
    pub fn discover() -> Self {
        Self {
            kind: FeedKind::Discover,
            ..Self::default()
        }
    }

    /// Set the trending window.
    #[must_use]
    pub fn window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    /// Set the page.
    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the genre filter.
    #[must_use]
    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    /// Set the year filter.
    #[must_use]
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Set the region.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the discover ordering.
    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Build from query-string pairs in any order.
    ///
    /// Recognized keys: `type`, `window`, `page`, `genre`, `year`, `region`,
    /// `sort` (or `sort_by`). Other keys do not affect the upstream response
    /// and are ignored. Empty values count as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "type" => query.kind = value.parse()?,
                "window" => query.window = Some(value.to_string()),
                "page" => {
                    let page = value
                        .parse::<u32>()
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| QueryError::InvalidPage(value.to_string()))?;
                    query.page = Some(page);
                }
                "genre" => query.genre = Some(value.to_string()),
                "year" => query.year = Some(value.to_string()),
                "region" => query.region = Some(value.to_string()),
                "sort" | "sort_by" => query.sort = Some(value.to_string()),
                _ => {}
            }
        }
        Ok(query)
    }

    /// Trending window after alias mapping and defaulting.
    pub fn effective_window(&self) -> Option<String> {
        match self.kind {
            FeedKind::Discover => None,
            FeedKind::Trending => {
                let window = non_empty(self.window.as_deref())
                    .map_or_else(|| DEFAULT_WINDOW.to_string(), str::to_ascii_lowercase);
                Some(match window.as_str() {
                    "7d" => "week".to_string(),
                    "30d" => "month".to_string(),
                    _ => window,
                })
            }
        }
    }

    /// Page after defaulting; page `0` is treated as the first page.
    pub fn effective_page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Discover ordering after defaulting.
    pub fn effective_sort(&self) -> Option<String> {
        match self.kind {
            FeedKind::Trending => None,
            FeedKind::Discover => Some(
                non_empty(self.sort.as_deref())
                    .map_or_else(|| DEFAULT_SORT.to_string(), str::to_ascii_lowercase),
            ),
        }
    }

    /// The query with every effective value filled in.
    ///
    /// Window, page and sort are defaulted and alias-mapped, fields the kind
    /// ignores are cleared, filters are trimmed and region is uppercased.
    /// This is the value handed to the upstream, so every request sharing a
    /// cache key also sends the same parameters.
    pub fn normalized(&self) -> Self {
        let (genre, year) = match self.kind {
            FeedKind::Trending => (None, None),
            FeedKind::Discover => (
                non_empty(self.genre.as_deref()).map(str::to_string),
                non_empty(self.year.as_deref()).map(str::to_string),
            ),
        };
        Self {
            kind: self.kind,
            window: self.effective_window(),
            page: Some(self.effective_page()),
            genre,
            year,
            region: non_empty(self.region.as_deref()).map(str::to_ascii_uppercase),
            sort: self.effective_sort(),
        }
    }

    /// Canonical cache key.
    ///
    /// Fields appear in a fixed order with defaults filled in; absent filters
    /// render as empty values. Two queries with the same effective parameters
    /// always produce the same key.
    pub fn fingerprint(&self) -> String {
        let q = self.normalized();
        let page = q.effective_page();
        format!(
            "kind={}|window={}|page={}|genre={}|year={}|region={}|sort={}",
            q.kind,
            q.window.unwrap_or_default(),
            page,
            q.genre.unwrap_or_default(),
            q.year.unwrap_or_default(),
            q.region.unwrap_or_default(),
            q.sort.unwrap_or_default(),
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
