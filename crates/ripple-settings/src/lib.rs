//! # ripple-settings
//!
//! Configuration management with layered sources for the Ripple broker.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RippleSettings::default()`]
//! 2. **User file**: `~/.ripple/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RIPPLE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
