//! Per-plugin settings resolution.
//!
//! A plugin may expose settings components: system-wide, per user, or per
//! measurable. [`SettingsProvider`](provider::SettingsProvider) resolves them
//! through a [`PluginManager`](provider::PluginManager) and only hands out
//! components of plugins that are loaded and activated. Collections over all
//! plugins are kept in a request-scoped cache keyed by display language.
//!
//! [`SettingsApi`](api::SettingsApi) saves values in bulk. Save failures
//! reach callers as a single [`SettingsError::SaveFailed`]; the cause only
//! goes to the log.

pub mod api;
pub mod cache;
pub mod error;
pub mod provider;

pub use error::{Result, SettingsError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::api::{PluginSettingsView, SettingValues, SettingView, SettingsApi};
    pub use crate::cache::{CacheId, TransientCache};
    pub use crate::error::{Result, SettingsError, SAVE_FAILED_MESSAGE};
    pub use crate::provider::{
        PluginManager, PluginSettings, SettingsKind, SettingsMap, SettingsProvider,
    };
}
