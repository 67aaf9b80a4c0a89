//! # Keyward
//!
//! Encrypted storage for user files and profiles, with capability-based
//! sharing between users.
//!
//! ## Overview
//!
//! - **Guard**: symmetric encryption under per-resource keys, with key ids
//!   kept out of resource rows behind encrypted references
//! - **Resources**: files and profile fields, each encrypted at rest
//! - **Permissions**: a request/response protocol that re-encrypts a
//!   resource under a per-pair share key and delivers that key to the
//!   requester, RSA-wrapped, out of band
//! - **Signatures**: a trailer appended to a file carrying signer metadata,
//!   an RSA signature and the signer's public key
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward::{Decision, Profile, TracingMailer, Vault, VaultConfig};
//! use keyward::store::{FsBlobStore, SqliteKeyStore, SqliteStore};
//!
//! async fn example() -> keyward::Result<()> {
//!     let config = VaultConfig::from_env()?;
//!     let mailer = TracingMailer::from_config(&config);
//!     let vault = Vault::new(
//!         config,
//!         SqliteKeyStore::open("keys.db").unwrap(),
//!         SqliteStore::open("vault.db").unwrap(),
//!         FsBlobStore::new("./blobs").await.unwrap(),
//!         mailer,
//!     )?;
//!
//!     let alice = vault.register_user(Profile::new("alice"), "hash").await?;
//!     let bob = vault.register_user(Profile::new("bob"), "hash").await?;
//!
//!     let file = vault.upload_file(bob.id, "notes.txt", "text", b"hello").await?;
//!     let request = vault.request_permission(alice.id, "bob", Some(file.id)).await?;
//!     vault.respond_permission_request(bob.id, request.id, Decision::Accept).await?;
//!
//!     let opened = vault.get_file(alice.id, file.id).await?;
//!     assert_eq!(opened.content, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keyward::core` - Guard, keys, RSA, signing trailer, profiles
//! - `keyward::store` - collaborator traits and their implementations
//! - `keyward::perms` - request state machine and share keys

pub mod config;
pub mod error;
pub mod files;
pub mod mail;
pub mod permissions;
pub mod profiles;
pub mod vault;

pub use keyward_core as core;
pub use keyward_perms as perms;
pub use keyward_store as store;

pub use config::{GuardConfig, VaultConfig};
pub use error::{IncompleteStage, Result, VaultError};
pub use files::{FileContent, FileListing};
pub use mail::{Mailer, TracingMailer};
pub use permissions::ResponseOutcome;
pub use vault::Vault;

pub use keyward_core::{
    verify_signed, CipherMode, FileId, NotificationId, NotificationStatus, Profile,
    SignatureMetadata, UserId,
};
pub use keyward_perms::{Decision, TransportKey};
pub use keyward_store::Direction;
