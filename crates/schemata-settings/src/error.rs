//! Error types for settings resolution and saving.

use thiserror::Error;

/// Message shown to users when saving settings fails.
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save plugin settings.";

/// Settings errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Saving failed; the cause is logged, not shown.
    #[error("{}", SAVE_FAILED_MESSAGE)]
    SaveFailed,

    /// The plugin manager could not answer for a plugin.
    #[error("plugin {plugin}: {message}")]
    Plugin {
        /// Plugin name.
        plugin: String,
        /// What went wrong.
        message: String,
    },

    /// A settings component rejected a value or failed to persist.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
