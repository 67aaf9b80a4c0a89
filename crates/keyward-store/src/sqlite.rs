//! SQLite implementations of the key store and the repository.
//!
//! Both use rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. Keys and resources live in separate
//! databases so a copy of the resource tables never carries key bytes.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use keyward_core::{
    FileId, FilePermissionId, Key, KeyId, KeyReference, KeyTable, NotificationId,
    NotificationStatus, PermissionId, SealedProfile, SymmetricKey, UserId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::records::{
    Direction, FilePermissionRecord, FileRecord, GrantCommit, GrantOutcome, GrantPermission,
    Notification, PermissionRecord, UserRecord,
};
use crate::traits::{KeyStore, Repository};

/// Run `f` against the connection on the blocking pool.
async fn blocking<F, T>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = conn.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("spawn_blocking failed: {}", e)),
        ))
    })?
}

/// Map unique-constraint violations to [`StoreError::Conflict`].
fn conflict_on_unique(err: rusqlite::Error, what: impl FnOnce() -> String) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(what())
        }
        other => StoreError::Database(other),
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Blob, msg.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Key store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite key store.
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Open a key database at the given path, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate_keys(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory key database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate_keys(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn get(&self, table: KeyTable, id: KeyId) -> Result<Key> {
        blocking(&self.conn, move |conn| {
            let material: Option<Vec<u8>> = conn
                .query_row(
                    &format!("SELECT plain_key FROM {} WHERE id = ?1", table.as_str()),
                    params![id.get()],
                    |row| row.get(0),
                )
                .optional()?;

            material
                .map(|m| Key::new(id, SymmetricKey::from_bytes(m)))
                .ok_or_else(|| StoreError::NotFound(format!("{} key {}", table, id)))
        })
        .await
    }

    async fn put(&self, table: KeyTable, material: SymmetricKey) -> Result<Key> {
        blocking(&self.conn, move |conn| {
            conn.execute(
                &format!("INSERT INTO {} (plain_key) VALUES (?1)", table.as_str()),
                params![material.as_bytes()],
            )?;
            let id = KeyId(conn.last_insert_rowid() as u64);
            Ok(Key::new(id, material))
        })
        .await
    }

    async fn get_many(&self, table: KeyTable, ids: &[KeyId]) -> Result<Vec<Key>> {
        let ids = ids.to_vec();
        blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT plain_key FROM {} WHERE id = ?1",
                table.as_str()
            ))?;

            let mut keys = Vec::with_capacity(ids.len());
            for id in ids {
                let material: Option<Vec<u8>> =
                    stmt.query_row(params![id.get()], |row| row.get(0)).optional()?;
                if let Some(m) = material {
                    keys.push(Key::new(id, SymmetricKey::from_bytes(m)));
                }
            }
            Ok(keys)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, public_key_pem, sealed_private_key, profile, key_reference";
const FILE_COLUMNS: &str =
    "id, owner_id, filename, file_type, storage_path, key_reference, is_signed";
const PERMISSION_COLUMNS: &str =
    "id, source_user_id, target_user_id, wrapped_key, key_reference";
const NOTIFICATION_COLUMNS: &str = "id, source_user_id, target_user_id, file_id, status";
const FILE_PERMISSION_COLUMNS: &str = "id, filepath, permission_id, file_id";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let profile: Vec<u8> = row.get(5)?;
    let profile = SealedProfile::from_bytes(&profile)
        .map_err(|e| conversion_error(5, format!("profile: {}", e)))?;

    Ok(UserRecord {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        password_hash: row.get(2)?,
        public_key_pem: row.get(3)?,
        sealed_private_key: row.get(4)?,
        profile,
        key_reference: KeyReference::from_bytes(row.get::<_, Vec<u8>>(6)?),
    })
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: FileId(row.get(0)?),
        owner_id: UserId(row.get(1)?),
        filename: row.get(2)?,
        file_type: row.get(3)?,
        storage_path: row.get(4)?,
        key_reference: KeyReference::from_bytes(row.get::<_, Vec<u8>>(5)?),
        is_signed: row.get(6)?,
    })
}

fn row_to_permission(row: &Row<'_>) -> rusqlite::Result<PermissionRecord> {
    Ok(PermissionRecord {
        id: PermissionId(row.get(0)?),
        source_user_id: UserId(row.get(1)?),
        target_user_id: UserId(row.get(2)?),
        wrapped_key: row.get(3)?,
        key_reference: KeyReference::from_bytes(row.get::<_, Vec<u8>>(4)?),
    })
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let raw: u8 = row.get(4)?;
    let status = NotificationStatus::from_u8(raw)
        .ok_or_else(|| conversion_error(4, format!("unknown notification status {}", raw)))?;

    Ok(Notification {
        id: NotificationId(row.get(0)?),
        source_user_id: UserId(row.get(1)?),
        target_user_id: UserId(row.get(2)?),
        file_id: row.get::<_, Option<u64>>(3)?.map(FileId),
        status,
    })
}

fn row_to_file_permission(row: &Row<'_>) -> rusqlite::Result<FilePermissionRecord> {
    Ok(FilePermissionRecord {
        id: FilePermissionId(row.get(0)?),
        filepath: row.get(1)?,
        permission_id: PermissionId(row.get(2)?),
        file_id: FileId(row.get(3)?),
    })
}

fn insert_permission_row(conn: &Connection, permission: &mut PermissionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO permissions (source_user_id, target_user_id, wrapped_key, key_reference)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            permission.source_user_id.get(),
            permission.target_user_id.get(),
            permission.wrapped_key,
            permission.key_reference.as_bytes(),
        ],
    )
    .map_err(|e| {
        conflict_on_unique(e, || {
            format!(
                "permission already exists for ({}, {})",
                permission.source_user_id, permission.target_user_id
            )
        })
    })?;
    permission.id = PermissionId(conn.last_insert_rowid() as u64);
    Ok(())
}

#[async_trait]
impl Repository for SqliteStore {
    async fn insert_user(&self, mut user: UserRecord) -> Result<UserRecord> {
        blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, public_key_pem, sealed_private_key, profile, key_reference)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.username,
                    user.password_hash,
                    user.public_key_pem,
                    user.sealed_private_key,
                    user.profile.to_bytes(),
                    user.key_reference.as_bytes(),
                ],
            )
            .map_err(|e| conflict_on_unique(e, || format!("username {} is taken", user.username)))?;
            user.id = UserId(conn.last_insert_rowid() as u64);
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id.get()],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let username = username.to_string();
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_user(&self, user: &UserRecord) -> Result<()> {
        let user = user.clone();
        blocking(&self.conn, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET username = ?2, password_hash = ?3, public_key_pem = ?4,
                            sealed_private_key = ?5, profile = ?6, key_reference = ?7
                     WHERE id = ?1",
                    params![
                        user.id.get(),
                        user.username,
                        user.password_hash,
                        user.public_key_pem,
                        user.sealed_private_key,
                        user.profile.to_bytes(),
                        user.key_reference.as_bytes(),
                    ],
                )
                .map_err(|e| {
                    conflict_on_unique(e, || format!("username {} is taken", user.username))
                })?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {}", user.id)));
            }
            Ok(())
        })
        .await
    }

    async fn insert_file(&self, mut file: FileRecord) -> Result<FileRecord> {
        blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO files (owner_id, filename, file_type, storage_path, key_reference, is_signed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    file.owner_id.get(),
                    file.filename,
                    file.file_type,
                    file.storage_path,
                    file.key_reference.as_bytes(),
                    file.is_signed,
                ],
            )?;
            file.id = FileId(conn.last_insert_rowid() as u64);
            Ok(file)
        })
        .await
    }

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS),
                params![id.get()],
                row_to_file,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_files(&self, owner: UserId, file_type: Option<&str>) -> Result<Vec<FileRecord>> {
        let file_type = file_type.map(str::to_string);
        blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM files
                 WHERE owner_id = ?1 AND (?2 IS NULL OR file_type = ?2)
                 ORDER BY id",
                FILE_COLUMNS
            ))?;
            let files = stmt
                .query_map(params![owner.get(), file_type], row_to_file)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
        .await
    }

    async fn mark_signed(&self, id: FileId) -> Result<()> {
        blocking(&self.conn, move |conn| {
            let changed =
                conn.execute("UPDATE files SET is_signed = 1 WHERE id = ?1", params![id.get()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("file {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_file(&self, id: FileId) -> Result<()> {
        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute("DELETE FROM files WHERE id = ?1", params![id.get()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("file {}", id)));
            }
            tx.execute(
                "DELETE FROM file_permissions WHERE file_id = ?1",
                params![id.get()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert_permission(&self, mut permission: PermissionRecord) -> Result<PermissionRecord> {
        blocking(&self.conn, move |conn| {
            insert_permission_row(conn, &mut permission)?;
            Ok(permission)
        })
        .await
    }

    async fn get_permission(&self, id: PermissionId) -> Result<Option<PermissionRecord>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM permissions WHERE id = ?1", PERMISSION_COLUMNS),
                params![id.get()],
                row_to_permission,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_permission(
        &self,
        source: UserId,
        target: UserId,
    ) -> Result<Option<PermissionRecord>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM permissions WHERE source_user_id = ?1 AND target_user_id = ?2",
                    PERMISSION_COLUMNS
                ),
                params![source.get(), target.get()],
                row_to_permission,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn insert_notification(&self, mut notification: Notification) -> Result<Notification> {
        blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO notifications (source_user_id, target_user_id, file_id, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    notification.source_user_id.get(),
                    notification.target_user_id.get(),
                    notification.file_id.map(FileId::get),
                    notification.status.as_u8(),
                ],
            )?;
            notification.id = NotificationId(conn.last_insert_rowid() as u64);
            Ok(notification)
        })
        .await
    }

    async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
                params![id.get()],
                row_to_notification,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> Result<()> {
        blocking(&self.conn, move |conn| {
            let changed = conn.execute(
                "UPDATE notifications SET status = ?2 WHERE id = ?1",
                params![id.get(), status.as_u8()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("notification {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn latest_notification(
        &self,
        source: UserId,
        target: UserId,
        file: Option<FileId>,
    ) -> Result<Option<Notification>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM notifications
                     WHERE source_user_id = ?1 AND target_user_id = ?2 AND file_id IS ?3
                     ORDER BY id DESC LIMIT 1",
                    NOTIFICATION_COLUMNS
                ),
                params![source.get(), target.get(), file.map(FileId::get)],
                row_to_notification,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_notifications(
        &self,
        user: UserId,
        direction: Direction,
        status: Option<NotificationStatus>,
    ) -> Result<Vec<Notification>> {
        let column = match direction {
            Direction::Outgoing => "source_user_id",
            Direction::Incoming => "target_user_id",
        };
        blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM notifications
                 WHERE {} = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY id",
                NOTIFICATION_COLUMNS, column
            ))?;
            let rows = stmt
                .query_map(
                    params![user.get(), status.map(|s| s.as_u8())],
                    row_to_notification,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn find_file_permission(
        &self,
        permission: PermissionId,
        file: FileId,
    ) -> Result<Option<FilePermissionRecord>> {
        blocking(&self.conn, move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM file_permissions WHERE permission_id = ?1 AND file_id = ?2",
                    FILE_PERMISSION_COLUMNS
                ),
                params![permission.get(), file.get()],
                row_to_file_permission,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_file_permissions(
        &self,
        permission: PermissionId,
    ) -> Result<Vec<FilePermissionRecord>> {
        blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM file_permissions WHERE permission_id = ?1 ORDER BY id",
                FILE_PERMISSION_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![permission.get()], row_to_file_permission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn commit_grant(&self, commit: GrantCommit) -> Result<GrantOutcome> {
        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE notifications SET status = ?2 WHERE id = ?1 AND status = ?3",
                params![
                    commit.notification_id.get(),
                    NotificationStatus::Accepted.as_u8(),
                    NotificationStatus::Pending.as_u8()
                ],
            )?;
            if changed == 0 {
                let status: Option<u8> = tx
                    .query_row(
                        "SELECT status FROM notifications WHERE id = ?1",
                        params![commit.notification_id.get()],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(match status {
                    Some(status) => StoreError::Conflict(format!(
                        "notification {} is not pending (status {})",
                        commit.notification_id, status
                    )),
                    None => StoreError::NotFound(format!(
                        "notification {}",
                        commit.notification_id
                    )),
                });
            }

            let permission = match commit.permission {
                GrantPermission::Existing(id) => tx
                    .query_row(
                        &format!("SELECT {} FROM permissions WHERE id = ?1", PERMISSION_COLUMNS),
                        params![id.get()],
                        row_to_permission,
                    )
                    .optional()?
                    .ok_or_else(|| StoreError::NotFound(format!("permission {}", id)))?,
                GrantPermission::New(mut record) => {
                    insert_permission_row(&tx, &mut record)?;
                    record
                }
            };

            let file_permission = match commit.file_grant {
                Some(grant) => {
                    tx.execute(
                        "INSERT INTO file_permissions (filepath, permission_id, file_id)
                         VALUES (?1, ?2, ?3)",
                        params![grant.filepath, permission.id.get(), grant.file_id.get()],
                    )
                    .map_err(|e| {
                        conflict_on_unique(e, || {
                            format!(
                                "file {} already granted under permission {}",
                                grant.file_id, permission.id
                            )
                        })
                    })?;
                    Some(FilePermissionRecord {
                        id: FilePermissionId(tx.last_insert_rowid() as u64),
                        filepath: grant.filepath,
                        permission_id: permission.id,
                        file_id: grant.file_id,
                    })
                }
                None => None,
            };

            // Dropping the transaction on any early return above rolls back.
            tx.commit()?;

            Ok(GrantOutcome {
                permission,
                file_permission,
            })
        })
        .await
    }
}
