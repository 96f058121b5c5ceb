//! Error types for plugauth.

use thiserror::Error;

use crate::auth::SessionError;
use crate::realm::AuthError;

/// Common error type for plugauth.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Authentication against the realms failed.
    #[error("authentication error: {0}")]
    Authentication(#[from] AuthError),

    /// A plugin requested privileges that differ from its manifest.
    #[error("plugin {plugin} requested privileges not declared in its manifest")]
    PrivilegeMismatch {
        /// Display name of the offending plugin.
        plugin: String,
    },

    /// Session lookup failed or the session has expired.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The ambient subject lacks the permission required by a gated operation.
    #[error("permission denied: {permission}")]
    AuthorizationDenied {
        /// The permission that was required.
        permission: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Build an `AuthorizationDenied` error for the given permission.
    pub fn denied(permission: impl Into<String>) -> Self {
        BrokerError::AuthorizationDenied {
            permission: permission.into(),
        }
    }
}

/// Result type alias for plugauth operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
