//! # scenee-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SceneeSettings::default()`]
//! 2. **User file**: `~/.scenee/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SCENEE_*` overrides (highest priority)
//!
//! The loaded value is passed explicitly to the components that need it;
//! there is no process-wide settings global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
