//! Layered configuration for the courier service.
//!
//! Defaults, then `~/.courier/settings.json`, then `COURIER_*` environment
//! variables.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{courier_home, load_settings, load_settings_from_path, settings_path, validate};
pub use types::{
    CourierSettings, LoggingSettings, LoopbackSettings, ServerSettings, SessionSettings,
    StoreSettings,
};
