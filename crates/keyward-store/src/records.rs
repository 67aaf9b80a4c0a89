//! Rows of the resource repository.
//!
//! None of these rows carries raw key material. Anything encrypted is
//! paired with a [`KeyReference`] that only the guard can resolve.
//!
//! Ids are assigned by the repository on insert; the `id` of a record
//! passed to an insert method is ignored.

use keyward_core::{
    FileId, FilePermissionId, KeyReference, NotificationId, NotificationStatus, PermissionId,
    SealedProfile, UserId,
};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    /// Opaque credential supplied by the caller.
    pub password_hash: String,
    /// PKCS#1 PEM.
    pub public_key_pem: String,
    /// PKCS#1 PEM encrypted under the user key.
    pub sealed_private_key: Vec<u8>,
    pub profile: SealedProfile,
    /// Reference to the user key in the `user_keys` table.
    pub key_reference: KeyReference,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_id: UserId,
    pub filename: String,
    pub file_type: String,
    /// Blob path of the ciphertext.
    pub storage_path: String,
    /// Reference to the file key in the `keys` table.
    pub key_reference: KeyReference,
    pub is_signed: bool,
}

/// The one permission row for a (source, target) pair.
///
/// `source` is the requester, `target` the owner who accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub source_user_id: UserId,
    pub target_user_id: UserId,
    /// Share key encrypted under a `permission_keys` key.
    pub wrapped_key: Vec<u8>,
    pub key_reference: KeyReference,
}

/// A permission request. `file_id` is `None` for profile requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub source_user_id: UserId,
    pub target_user_id: UserId,
    pub file_id: Option<FileId>,
    pub status: NotificationStatus,
}

/// Links a permission to the re-encrypted copy of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermissionRecord {
    pub id: FilePermissionId,
    pub filepath: String,
    pub permission_id: PermissionId,
    pub file_id: FileId,
}

/// Which side of a notification a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Requests the user sent.
    Outgoing,
    /// Requests addressed to the user.
    Incoming,
}

/// The permission a grant is committed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantPermission {
    /// Reuse the pair's existing row.
    Existing(PermissionId),
    /// Insert a freshly minted row. Its `id` is ignored.
    New(PermissionRecord),
}

/// The shared copy produced by a file grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGrant {
    pub file_id: FileId,
    pub filepath: String,
}

/// Repository-visible effects of an accepted request, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantCommit {
    pub notification_id: NotificationId,
    pub permission: GrantPermission,
    pub file_grant: Option<FileGrant>,
}

/// What [`GrantCommit`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantOutcome {
    pub permission: PermissionRecord,
    pub file_permission: Option<FilePermissionRecord>,
}
