//! # mnemo-settings
//!
//! Configuration management with layered sources for the mnemo service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`Settings::default()`]
//! 2. **User file** — `~/.mnemo/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `MNEMO_*` overrides (highest priority)
//!
//! The loaded [`Settings`] value is immutable for the lifetime of the
//! process; handlers read it through shared state rather than a global.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::{
    AuthSettings, GatewaySettings, RateLimitSettings, ServerSettings, Settings, StreamingSettings,
};
