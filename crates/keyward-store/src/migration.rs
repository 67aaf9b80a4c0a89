//! Database schema migrations for SQLite.
//!
//! The resource repository and the key store are separate databases with
//! separate version tables. Each migration transforms a schema from
//! version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current repository schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Current key store schema version.
pub const CURRENT_KEYS_VERSION: u32 = 1;

/// Initialize or migrate the repository schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    run(conn, "schema_migrations", CURRENT_VERSION, apply_migration)
}

/// Initialize or migrate the key store schema.
pub fn migrate_keys(conn: &mut Connection) -> Result<()> {
    run(conn, "key_schema_migrations", CURRENT_KEYS_VERSION, apply_keys_migration)
}

fn run(
    conn: &mut Connection,
    version_table: &str,
    target: u32,
    apply: fn(&Connection, u32) -> Result<()>,
) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            version_table
        ),
        [],
    )?;

    let current: u32 = conn
        .query_row(
            &format!("SELECT COALESCE(MAX(version), 0) FROM {}", version_table),
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < target {
        let tx = conn.transaction()?;

        for version in (current + 1)..=target {
            apply(&tx, version)?;

            tx.execute(
                &format!(
                    "INSERT INTO {} (version, applied_at) VALUES (?1, ?2)",
                    version_table
                ),
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(table = version_table, version, "applied migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

fn apply_keys_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_keys_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown key store migration version: {}",
            version
        ))),
    }
}

/// Migration v1: users, files, permissions, notifications, file grants.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            public_key_pem TEXT NOT NULL,
            sealed_private_key BLOB NOT NULL,   -- PEM encrypted under the user key
            profile BLOB NOT NULL,              -- CBOR SealedProfile
            key_reference BLOB NOT NULL
        );

        CREATE TABLE files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            file_type TEXT NOT NULL,
            storage_path TEXT NOT NULL,
            key_reference BLOB NOT NULL,
            is_signed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE permissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_user_id INTEGER NOT NULL,    -- requester
            target_user_id INTEGER NOT NULL,    -- owner
            wrapped_key BLOB NOT NULL,
            key_reference BLOB NOT NULL
        );

        CREATE TABLE notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_user_id INTEGER NOT NULL,
            target_user_id INTEGER NOT NULL,
            file_id INTEGER,                    -- NULL for profile requests
            status INTEGER NOT NULL             -- 0=pending, 1=rejected, 2=accepted
        );

        CREATE TABLE file_permissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filepath TEXT NOT NULL,
            permission_id INTEGER NOT NULL,
            file_id INTEGER NOT NULL,
            UNIQUE(permission_id, file_id)
        );

        CREATE INDEX idx_files_owner ON files(owner_id, file_type);
        CREATE INDEX idx_notifications_pair ON notifications(source_user_id, target_user_id, file_id);
        CREATE INDEX idx_notifications_target ON notifications(target_user_id, status);
        "#,
    )?;

    Ok(())
}

/// Migration v2: at most one permission row per (source, target).
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE UNIQUE INDEX idx_permissions_pair
            ON permissions(source_user_id, target_user_id);
        "#,
    )?;

    Ok(())
}

/// Key store v1: one table per key namespace.
fn apply_keys_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plain_key BLOB NOT NULL
        );

        CREATE TABLE user_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plain_key BLOB NOT NULL
        );

        CREATE TABLE permission_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            plain_key BLOB NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables = tables(&conn);
        for name in [
            "users",
            "files",
            "permissions",
            "notifications",
            "file_permissions",
            "schema_migrations",
        ] {
            assert!(tables.contains(&name.to_string()), "missing {}", name);
        }
    }

    #[test]
    fn test_key_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_keys(&mut conn).unwrap();

        let tables = tables(&conn);
        for name in ["keys", "user_keys", "permission_keys", "key_schema_migrations"] {
            assert!(tables.contains(&name.to_string()), "missing {}", name);
        }
        assert!(!tables.contains(&"users".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_permission_pair_index() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let insert = "INSERT INTO permissions (source_user_id, target_user_id, wrapped_key, key_reference)
                      VALUES (1, 2, x'00', x'00')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
