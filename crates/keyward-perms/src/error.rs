//! Error types for the permissions module.

use keyward_core::{GuardError, NotificationStatus};
use thiserror::Error;

use crate::notification::Action;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The notification's current status does not allow the action.
    #[error("cannot {action} a {from} request")]
    InvalidTransition {
        from: NotificationStatus,
        action: Action,
    },

    /// A share key could not be decoded or has the wrong shape.
    #[error("invalid share key: {0}")]
    InvalidShareKey(String),

    /// Wrapping or unwrapping failed.
    #[error("guard error: {0}")]
    Guard(#[from] GuardError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
