//! Error types for the Vault.
//!
//! Lower-level errors are folded into one taxonomy so callers can decide
//! what to do without knowing which layer failed.

use std::fmt;

use keyward_core::{FileId, GuardError};
use keyward_perms::PermsError;
use keyward_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Authentication tag or checksum failure on decrypt.
    #[error("integrity check failed")]
    Integrity,

    /// Malformed PEM, key reference or key encoding.
    #[error("key format error: {0}")]
    KeyFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong actor for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Duplicate request, already-resolved notification, already-signed file.
    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// A collaborator (repository, key store, blob store, mailer) failed.
    #[error("collaborator failure: {0}")]
    Io(#[source] anyhow::Error),

    /// An accepted grant failed after some of its effects became durable.
    ///
    /// `permission_persisted` tells whether the pair's permission row (and
    /// with it the share key) exists, so a retry will reuse rather than
    /// re-mint the key.
    #[error("grant incomplete at {stage} (permission persisted: {permission_persisted}): {source}")]
    Incomplete {
        stage: IncompleteStage,
        permission_persisted: bool,
        source: Box<VaultError>,
    },

    /// The signature trailer reached the blob but the file is not marked
    /// signed. Calling `sign_file` again records it without re-signing.
    #[error("signature on file {file} written but not recorded: {source}")]
    SignatureUnrecorded {
        file: FileId,
        source: Box<VaultError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Where a multi-step response stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteStage {
    /// Writing the re-encrypted copy to the blob store.
    SharedCopy,
    /// Committing status, permission and file grant rows.
    Commit,
    /// Sending the outcome to the requester.
    Delivery,
}

impl fmt::Display for IncompleteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IncompleteStage::SharedCopy => "shared copy",
            IncompleteStage::Commit => "commit",
            IncompleteStage::Delivery => "delivery",
        };
        f.write_str(name)
    }
}

impl VaultError {
    pub(crate) fn incomplete(
        stage: IncompleteStage,
        permission_persisted: bool,
        source: impl Into<VaultError>,
    ) -> Self {
        VaultError::Incomplete {
            stage,
            permission_persisted,
            source: Box::new(source.into()),
        }
    }
}

impl From<GuardError> for VaultError {
    fn from(e: GuardError) -> Self {
        match e {
            GuardError::Integrity => VaultError::Integrity,
            GuardError::MalformedCiphertext(_) => VaultError::Integrity,
            GuardError::KeyFormat(msg) => VaultError::KeyFormat(msg),
            e @ GuardError::InvalidKeyLength { .. } => VaultError::KeyFormat(e.to_string()),
            e @ (GuardError::UnsupportedMode(_) | GuardError::UnknownMode(_)) => {
                VaultError::Config(e.to_string())
            }
            GuardError::Rsa(msg) => VaultError::KeyFormat(msg),
            GuardError::SignatureInvalid(msg) => VaultError::SignatureInvalid(msg),
            GuardError::Serialization(msg) => VaultError::InvalidInput(msg),
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => VaultError::NotFound(what),
            StoreError::Conflict(what) => VaultError::StateConflict(what),
            StoreError::AlreadyExists(what) => {
                VaultError::StateConflict(format!("already exists: {}", what))
            }
            StoreError::InvalidData(msg) => VaultError::InvalidInput(msg),
            StoreError::Guard(e) => e.into(),
            other => VaultError::Io(other.into()),
        }
    }
}

impl From<PermsError> for VaultError {
    fn from(e: PermsError) -> Self {
        match e {
            e @ PermsError::InvalidTransition { .. } => VaultError::StateConflict(e.to_string()),
            PermsError::InvalidShareKey(msg) => VaultError::KeyFormat(msg),
            PermsError::Guard(e) => e.into(),
        }
    }
}

/// Result type for Vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::NotificationStatus;
    use keyward_perms::Action;

    #[test]
    fn test_guard_mapping() {
        assert!(matches!(VaultError::from(GuardError::Integrity), VaultError::Integrity));
        assert!(matches!(
            VaultError::from(GuardError::SignatureInvalid("x".into())),
            VaultError::SignatureInvalid(_)
        ));
        assert!(matches!(
            VaultError::from(GuardError::KeyFormat("pem".into())),
            VaultError::KeyFormat(_)
        ));
    }

    #[test]
    fn test_store_mapping() {
        assert!(matches!(
            VaultError::from(StoreError::NotFound("file 1".into())),
            VaultError::NotFound(_)
        ));
        assert!(matches!(
            VaultError::from(StoreError::Conflict("pair".into())),
            VaultError::StateConflict(_)
        ));
        assert!(matches!(
            VaultError::from(StoreError::Guard(GuardError::Integrity)),
            VaultError::Integrity
        ));
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert!(matches!(VaultError::from(StoreError::Io(io)), VaultError::Io(_)));
    }

    #[test]
    fn test_perms_mapping() {
        let err = VaultError::from(PermsError::InvalidTransition {
            from: NotificationStatus::Pending,
            action: Action::Request,
        });
        assert!(matches!(err, VaultError::StateConflict(ref m) if m == "cannot request a pending request"));
    }

    #[test]
    fn test_incomplete_display() {
        let err = VaultError::incomplete(
            IncompleteStage::Delivery,
            true,
            VaultError::Io(anyhow::anyhow!("smtp down")),
        );
        assert_eq!(
            err.to_string(),
            "grant incomplete at delivery (permission persisted: true): collaborator failure: smtp down"
        );
    }
}
