//! Collaborator traits: key store, resource repository and blob store.
//!
//! The service layer is generic over these traits so the same flows run
//! against SQLite and the filesystem in production and against the
//! in-memory implementations in tests.

use async_trait::async_trait;
use keyward_core::{
    FileId, Guard, Key, KeyId, KeyReference, KeyTable, NotificationId, NotificationStatus,
    PermissionId, SymmetricKey, UserId,
};

use crate::error::{Result, StoreError};
use crate::records::{
    Direction, FilePermissionRecord, FileRecord, GrantCommit, GrantOutcome, Notification,
    PermissionRecord, UserRecord,
};

/// Persistence of raw key bytes, one id space per [`KeyTable`].
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch a key. Missing ids are [`StoreError::NotFound`].
    async fn get(&self, table: KeyTable, id: KeyId) -> Result<Key>;

    /// Store new key material and assign it an id.
    async fn put(&self, table: KeyTable, material: SymmetricKey) -> Result<Key>;

    /// Fetch several keys. Missing ids are skipped.
    async fn get_many(&self, table: KeyTable, ids: &[KeyId]) -> Result<Vec<Key>>;
}

/// CRUD over users, files, permissions, notifications and file grants.
#[async_trait]
pub trait Repository: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a user. Duplicate usernames are [`StoreError::Conflict`].
    async fn insert_user(&self, user: UserRecord) -> Result<UserRecord>;

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn update_user(&self, user: &UserRecord) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_file(&self, file: FileRecord) -> Result<FileRecord>;

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>>;

    /// Files owned by `owner`, optionally filtered by type, ordered by id.
    async fn list_files(&self, owner: UserId, file_type: Option<&str>) -> Result<Vec<FileRecord>>;

    /// Set `is_signed`.
    async fn mark_signed(&self, id: FileId) -> Result<()>;

    async fn delete_file(&self, id: FileId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a permission. A second row for the same pair is [`StoreError::Conflict`].
    async fn insert_permission(&self, permission: PermissionRecord) -> Result<PermissionRecord>;

    async fn get_permission(&self, id: PermissionId) -> Result<Option<PermissionRecord>>;

    async fn find_permission(
        &self,
        source: UserId,
        target: UserId,
    ) -> Result<Option<PermissionRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_notification(&self, notification: Notification) -> Result<Notification>;

    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>>;

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()>;

    /// Most recent notification for the pair. `file` = `None` selects
    /// profile requests only.
    async fn latest_notification(
        &self,
        source: UserId,
        target: UserId,
        file: Option<FileId>,
    ) -> Result<Option<Notification>>;

    async fn list_notifications(
        &self,
        user: UserId,
        direction: Direction,
        status: Option<NotificationStatus>,
    ) -> Result<Vec<Notification>>;

    // ─────────────────────────────────────────────────────────────────────────
    // File permissions
    // ─────────────────────────────────────────────────────────────────────────

    async fn find_file_permission(
        &self,
        permission: PermissionId,
        file: FileId,
    ) -> Result<Option<FilePermissionRecord>>;

    async fn list_file_permissions(
        &self,
        permission: PermissionId,
    ) -> Result<Vec<FilePermissionRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Mark the notification accepted and insert the permission and file
    /// grant rows, all or nothing.
    async fn commit_grant(&self, commit: GrantCommit) -> Result<GrantOutcome>;
}

/// Byte storage addressed by relative paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or overwrite.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Create a directory. Fails with [`StoreError::AlreadyExists`] if present.
    async fn make_dir(&self, path: &str) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;
}

/// Key-reference resolution on top of any [`KeyStore`].
pub trait KeyStoreExt: KeyStore {
    /// Persist `material` in `table` and return its reference.
    fn store_key(
        &self,
        guard: &Guard,
        table: KeyTable,
        material: SymmetricKey,
    ) -> impl std::future::Future<Output = Result<KeyReference>> + Send;

    /// Resolve a reference back to its key row.
    fn resolve_key(
        &self,
        guard: &Guard,
        table: KeyTable,
        reference: &KeyReference,
    ) -> impl std::future::Future<Output = Result<Key>> + Send;
}

impl<S: KeyStore + ?Sized> KeyStoreExt for S {
    async fn store_key(
        &self,
        guard: &Guard,
        table: KeyTable,
        material: SymmetricKey,
    ) -> Result<KeyReference> {
        let key = self.put(table, material).await?;
        let reference = guard.reference_for(key.id)?;
        tracing::debug!(%table, id = %key.id, fingerprint = %key.material.fingerprint(), "stored key");
        Ok(reference)
    }

    async fn resolve_key(
        &self,
        guard: &Guard,
        table: KeyTable,
        reference: &KeyReference,
    ) -> Result<Key> {
        let id = guard.resolve_reference(reference)?;
        self.get(table, id).await.map_err(|e| match e {
            StoreError::NotFound(_) => StoreError::NotFound(format!("{} key {}", table, id)),
            other => other,
        })
    }
}
