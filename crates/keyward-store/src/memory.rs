//! In-memory implementations of the store traits.
//!
//! These are primarily for testing. They have the same semantics as the
//! SQLite and filesystem backends but keep everything in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use keyward_core::{
    FileId, FilePermissionId, Key, KeyId, KeyTable, NotificationId, NotificationStatus,
    PermissionId, SymmetricKey, UserId,
};

use crate::error::{Result, StoreError};
use crate::records::{
    Direction, FilePermissionRecord, FileRecord, GrantCommit, GrantOutcome, GrantPermission,
    Notification, PermissionRecord, UserRecord,
};
use crate::traits::{BlobStore, KeyStore, Repository};

// ─────────────────────────────────────────────────────────────────────────────
// Key store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory key store. Ids start at 1 in every table.
#[derive(Default)]
pub struct MemoryKeyStore {
    tables: RwLock<HashMap<KeyTable, BTreeMap<KeyId, SymmetricKey>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held in `table`.
    pub fn len(&self, table: KeyTable) -> usize {
        let tables = self.tables.read().unwrap();
        tables.get(&table).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get(&self, table: KeyTable, id: KeyId) -> Result<Key> {
        let tables = self.tables.read().unwrap();
        tables
            .get(&table)
            .and_then(|keys| keys.get(&id))
            .map(|material| Key::new(id, material.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("{} key {}", table, id)))
    }

    async fn put(&self, table: KeyTable, material: SymmetricKey) -> Result<Key> {
        let mut tables = self.tables.write().unwrap();
        let keys = tables.entry(table).or_default();
        let next = keys.keys().next_back().map_or(1, |id| id.get() + 1);
        let id = KeyId(next);
        keys.insert(id, material.clone());
        Ok(Key::new(id, material))
    }

    async fn get_many(&self, table: KeyTable, ids: &[KeyId]) -> Result<Vec<Key>> {
        let tables = self.tables.read().unwrap();
        let Some(keys) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| keys.get(id).map(|m| Key::new(*id, m.clone())))
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory repository.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    next_id: u64,
    users: BTreeMap<UserId, UserRecord>,
    files: BTreeMap<FileId, FileRecord>,
    permissions: BTreeMap<PermissionId, PermissionRecord>,
    /// (source, target) -> permission, mirrors the SQLite unique index.
    permission_pairs: HashMap<(UserId, UserId), PermissionId>,
    notifications: BTreeMap<NotificationId, Notification>,
    file_permissions: BTreeMap<FilePermissionId, FilePermissionRecord>,
}

impl MemoryStoreInner {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_permission(&mut self, mut permission: PermissionRecord) -> Result<PermissionRecord> {
        let pair = (permission.source_user_id, permission.target_user_id);
        if self.permission_pairs.contains_key(&pair) {
            return Err(StoreError::Conflict(format!(
                "permission already exists for ({}, {})",
                pair.0, pair.1
            )));
        }
        permission.id = PermissionId(self.allocate());
        self.permission_pairs.insert(pair, permission.id);
        self.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Total number of permission rows.
    pub fn permission_count(&self) -> usize {
        self.inner.read().unwrap().permissions.len()
    }

    /// Total number of notification rows.
    pub fn notification_count(&self) -> usize {
        self.inner.read().unwrap().notifications.len()
    }

    /// Total number of file permission rows.
    pub fn file_permission_count(&self) -> usize {
        self.inner.read().unwrap().file_permissions.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn insert_user(&self, mut user: UserRecord) -> Result<UserRecord> {
        let mut inner = self.inner.write().unwrap();
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }
        user.id = UserId(inner.allocate());
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, user: &UserRecord) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner
            .users
            .values()
            .any(|u| u.username == user.username && u.id != user.id)
        {
            return Err(StoreError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }
        match inner.users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn insert_file(&self, mut file: FileRecord) -> Result<FileRecord> {
        let mut inner = self.inner.write().unwrap();
        file.id = FileId(inner.allocate());
        inner.files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.files.get(&id).cloned())
    }

    async fn list_files(&self, owner: UserId, file_type: Option<&str>) -> Result<Vec<FileRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .files
            .values()
            .filter(|f| f.owner_id == owner)
            .filter(|f| file_type.map_or(true, |t| f.file_type == t))
            .cloned()
            .collect())
    }

    async fn mark_signed(&self, id: FileId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.files.get_mut(&id) {
            Some(file) => {
                file.is_signed = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("file {}", id))),
        }
    }

    async fn delete_file(&self, id: FileId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.files.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("file {}", id)));
        }
        inner.file_permissions.retain(|_, fp| fp.file_id != id);
        Ok(())
    }

    async fn insert_permission(&self, permission: PermissionRecord) -> Result<PermissionRecord> {
        let mut inner = self.inner.write().unwrap();
        inner.insert_permission(permission)
    }

    async fn get_permission(&self, id: PermissionId) -> Result<Option<PermissionRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.permissions.get(&id).cloned())
    }

    async fn find_permission(
        &self,
        source: UserId,
        target: UserId,
    ) -> Result<Option<PermissionRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .permission_pairs
            .get(&(source, target))
            .and_then(|id| inner.permissions.get(id))
            .cloned())
    }

    async fn insert_notification(&self, mut notification: Notification) -> Result<Notification> {
        let mut inner = self.inner.write().unwrap();
        notification.id = NotificationId(inner.allocate());
        inner.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.notifications.get(&id).cloned())
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.notifications.get_mut(&id) {
            Some(n) => {
                n.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("notification {}", id))),
        }
    }

    async fn latest_notification(
        &self,
        source: UserId,
        target: UserId,
        file: Option<FileId>,
    ) -> Result<Option<Notification>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .notifications
            .values()
            .rev()
            .find(|n| n.source_user_id == source && n.target_user_id == target && n.file_id == file)
            .cloned())
    }

    async fn list_notifications(
        &self,
        user: UserId,
        direction: Direction,
        status: Option<NotificationStatus>,
    ) -> Result<Vec<Notification>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .notifications
            .values()
            .filter(|n| match direction {
                Direction::Outgoing => n.source_user_id == user,
                Direction::Incoming => n.target_user_id == user,
            })
            .filter(|n| status.map_or(true, |s| n.status == s))
            .cloned()
            .collect())
    }

    async fn find_file_permission(
        &self,
        permission: PermissionId,
        file: FileId,
    ) -> Result<Option<FilePermissionRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .file_permissions
            .values()
            .find(|fp| fp.permission_id == permission && fp.file_id == file)
            .cloned())
    }

    async fn list_file_permissions(
        &self,
        permission: PermissionId,
    ) -> Result<Vec<FilePermissionRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .file_permissions
            .values()
            .filter(|fp| fp.permission_id == permission)
            .cloned()
            .collect())
    }

    async fn commit_grant(&self, commit: GrantCommit) -> Result<GrantOutcome> {
        let mut inner = self.inner.write().unwrap();

        match inner.notifications.get(&commit.notification_id) {
            None => {
                return Err(StoreError::NotFound(format!(
                    "notification {}",
                    commit.notification_id
                )))
            }
            Some(n) if n.status != NotificationStatus::Pending => {
                return Err(StoreError::Conflict(format!(
                    "notification {} is {}",
                    n.id, n.status
                )))
            }
            Some(_) => {}
        }

        let permission = match commit.permission {
            GrantPermission::Existing(id) => {
                let permission = inner
                    .permissions
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("permission {}", id)))?;
                if let Some(grant) = &commit.file_grant {
                    let duplicate = inner
                        .file_permissions
                        .values()
                        .any(|fp| fp.permission_id == id && fp.file_id == grant.file_id);
                    if duplicate {
                        return Err(StoreError::Conflict(format!(
                            "file {} already granted under permission {}",
                            grant.file_id, id
                        )));
                    }
                }
                permission
            }
            // Nothing after this insert can fail.
            GrantPermission::New(record) => inner.insert_permission(record)?,
        };

        let file_permission = commit.file_grant.map(|grant| {
            let record = FilePermissionRecord {
                id: FilePermissionId(inner.allocate()),
                filepath: grant.filepath,
                permission_id: permission.id,
                file_id: grant.file_id,
            };
            inner.file_permissions.insert(record.id, record.clone());
            record
        });

        if let Some(n) = inner.notifications.get_mut(&commit.notification_id) {
            n.status = NotificationStatus::Accepted;
        }

        Ok(GrantOutcome {
            permission,
            file_permission,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blob store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory blob store keyed by path.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: RwLock<MemoryBlobInner>,
}

#[derive(Default)]
struct MemoryBlobInner {
    blobs: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.inner.read().unwrap().blobs.keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let inner = self.inner.read().unwrap();
        inner
            .blobs
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", path)))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.blobs.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.dirs.insert(path.to_string()) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", path)))
    }
}
