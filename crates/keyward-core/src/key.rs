//! Key material and key references.
//!
//! Raw key bytes live only inside the key store. Resource rows carry a
//! [`KeyReference`] instead: the key id encrypted under the guard's
//! metadata key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::KeyId;

/// Raw symmetric key material.
///
/// 32 bytes for the AES and RC4 modes, 8 bytes for the DES mode.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey(Vec<u8>);

impl SymmetricKey {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short Blake3 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        hex::encode(&hash.as_bytes()[..8])
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey({})", self.fingerprint())
    }
}

/// A key row: an id assigned by the key store plus the raw material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub id: KeyId,
    pub material: SymmetricKey,
}

impl Key {
    pub fn new(id: KeyId, material: SymmetricKey) -> Self {
        Self { id, material }
    }
}

/// Opaque encrypted pointer to a key id.
///
/// Only meaningful under the same (cipher mode, metadata key) that
/// produced it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyReference(pub Vec<u8>);

impl KeyReference {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyReference({} bytes)", self.0.len())
    }
}

/// Key store namespace.
///
/// File keys, user profile keys and permission wrapping keys are kept in
/// separate tables so the id spaces never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTable {
    File,
    User,
    Permission,
}

impl KeyTable {
    pub const ALL: [KeyTable; 3] = [KeyTable::File, KeyTable::User, KeyTable::Permission];

    /// Table name in the key database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            KeyTable::File => "keys",
            KeyTable::User => "user_keys",
            KeyTable::Permission => "permission_keys",
        }
    }
}

impl fmt::Display for KeyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
