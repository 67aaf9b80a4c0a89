//! # Keyward Core
//!
//! Cryptographic primitives for Keyward: the Guard cipher engine, RSA
//! keypairs, key references, the signing trailer and the profile
//! sensitive-field transform.
//!
//! This crate performs no I/O. Persistence of keys and resources lives in
//! `keyward-store`; the permission protocol lives in `keyward-perms`.
//!
//! ## Key Types
//!
//! - [`Guard`] - Symmetric encrypt/decrypt under a [`CipherMode`], plus key references
//! - [`SymmetricKey`] - Raw key material, never logged
//! - [`KeyReference`] - A key id encrypted under the metadata key
//! - [`RsaKeyPair`] - PKCS#1 PEM keypair used for signing and key transport
//! - [`SignatureMetadata`] - Payload of the signing trailer

pub mod error;
pub mod guard;
pub mod key;
pub mod keypair;
pub mod profile;
pub mod signature;
pub mod types;

pub use error::{GuardError, Result};
pub use guard::{CipherMode, Guard};
pub use key::{Key, KeyReference, KeyTable, SymmetricKey};
pub use keypair::{PrivateKey, PublicKey, RsaKeyPair, DEFAULT_RSA_BITS};
pub use profile::{Profile, SealedProfile, SensitiveField};
pub use signature::{sign_document, verify_signed, SignatureMetadata, Trailer};
pub use types::{
    FileId, FilePermissionId, KeyId, NotificationId, NotificationStatus, PermissionId, UserId,
};
