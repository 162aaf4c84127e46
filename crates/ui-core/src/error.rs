//! Error types for the call UI state layer

use thiserror::Error;

/// Result type for UI-core operations
pub type UiCoreResult<T> = Result<T, UiCoreError>;

/// Errors that can occur in the UI state layer.
///
/// The narrow mutation API (`pin`, `set_fullscreen`,
/// `try_stop_screen_share`) reports failures as boolean returns instead;
/// these variants cover registry, configuration and channel faults.
#[derive(Debug, Error)]
pub enum UiCoreError {
    /// No store registered under the given key
    #[error("store not found: {key}")]
    StoreNotFound { key: String },

    /// A store exists under the key but with a different value type
    #[error("store type mismatch for key: {key}")]
    StoreTypeMismatch { key: String },

    /// An engine signal channel closed while the aggregator was running
    #[error("engine signal channel closed: {channel}")]
    ChannelClosed { channel: &'static str },

    /// Configuration error
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl UiCoreError {
    pub fn store_not_found(key: impl Into<String>) -> Self {
        Self::StoreNotFound { key: key.into() }
    }

    pub fn store_type_mismatch(key: impl Into<String>) -> Self {
        Self::StoreTypeMismatch { key: key.into() }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}
