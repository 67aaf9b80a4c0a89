//! # Keyward Store
//!
//! Persistence collaborators for Keyward: the key store, the resource
//! repository and the blob store, each behind an async trait with
//! in-memory and durable implementations.
//!
//! ## Key Types
//!
//! - [`KeyStore`] - Raw key bytes by (table, id); SQLite via [`SqliteKeyStore`]
//! - [`KeyStoreExt`] - Key-reference resolution: store a key, get a reference back
//! - [`Repository`] - Users, files, permissions, notifications, file grants
//! - [`BlobStore`] - Ciphertext bytes by relative path; disk via [`FsBlobStore`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_core::{CipherMode, Guard, KeyTable, SymmetricKey};
//! use keyward_store::{KeyStoreExt, SqliteKeyStore};
//!
//! async fn example() {
//!     let keys = SqliteKeyStore::open("keys.db").unwrap();
//!     let guard = Guard::new(CipherMode::Aes256Gcm, SymmetricKey::from_bytes(vec![0u8; 32])).unwrap();
//!
//!     let reference = keys.store_key(&guard, KeyTable::File, guard.generate_key()).await.unwrap();
//!     let key = keys.resolve_key(&guard, KeyTable::File, &reference).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Separate key database**: resource rows only ever hold key references
//! - **One permission per pair**: enforced by a unique index, surfaced as `Conflict`
//! - **Atomic grants**: [`Repository::commit_grant`] applies all row changes of an
//!   accepted request in one transaction

pub mod blob;
pub mod error;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use blob::{blob_name, FsBlobStore};
pub use error::{Result, StoreError};
pub use memory::{MemoryBlobStore, MemoryKeyStore, MemoryStore};
pub use records::{
    Direction, FileGrant, FilePermissionRecord, FileRecord, GrantCommit, GrantOutcome,
    GrantPermission, Notification, PermissionRecord, UserRecord,
};
pub use sqlite::{SqliteKeyStore, SqliteStore};
pub use traits::{BlobStore, KeyStore, KeyStoreExt, Repository};
