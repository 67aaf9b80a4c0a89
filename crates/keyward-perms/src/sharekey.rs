//! Share keys.
//!
//! A share key is minted when the first request between a (source, target)
//! pair is accepted and reused for every later grant between them. It
//! exists in two wrapped forms:
//!
//! - for storage, encrypted by the guard under a `permission_keys` key and
//!   kept on the permission row;
//! - for transport, RSA-encrypted under the requester's public key and
//!   delivered out of band as base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyward_core::{Guard, PrivateKey, PublicKey, SymmetricKey};
use std::fmt;

use crate::error::{PermsError, Result};

/// The symmetric key protecting every shared copy between one pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ShareKey(SymmetricKey);

impl ShareKey {
    /// Mint a fresh share key for the guard's mode.
    pub fn mint(guard: &Guard) -> Self {
        Self(guard.generate_key())
    }

    pub fn from_key(key: SymmetricKey) -> Self {
        Self(key)
    }

    pub fn as_key(&self) -> &SymmetricKey {
        &self.0
    }

    pub fn fingerprint(&self) -> String {
        self.0.fingerprint()
    }

    /// Encrypt under a guard-managed storage key.
    pub fn wrap_for_storage(&self, guard: &Guard, storage_key: &SymmetricKey) -> Result<Vec<u8>> {
        Ok(guard.encrypt(storage_key, self.0.as_bytes())?)
    }

    /// Inverse of [`ShareKey::wrap_for_storage`].
    pub fn unwrap_stored(guard: &Guard, storage_key: &SymmetricKey, wrapped: &[u8]) -> Result<Self> {
        let bytes = guard.decrypt(storage_key, wrapped)?;
        let expected = guard.mode().key_len();
        if bytes.len() != expected {
            return Err(PermsError::InvalidShareKey(format!(
                "stored key is {} bytes, expected {}",
                bytes.len(),
                expected
            )));
        }
        Ok(Self(SymmetricKey::from_bytes(bytes)))
    }

    /// Encrypt for the grantee.
    pub fn wrap_transport(&self, recipient: &PublicKey) -> Result<TransportKey> {
        Ok(TransportKey(recipient.encrypt(self.0.as_bytes())?))
    }

    /// Recover a share key delivered by [`ShareKey::wrap_transport`].
    pub fn unwrap_transport(wrapped: &TransportKey, private_key: &PrivateKey) -> Result<Self> {
        let bytes = private_key.decrypt(&wrapped.0)?;
        if bytes.is_empty() {
            return Err(PermsError::InvalidShareKey("empty key".into()));
        }
        Ok(Self(SymmetricKey::from_bytes(bytes)))
    }

    /// Encrypt a shared copy.
    pub fn seal(&self, guard: &Guard, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(guard.encrypt(&self.0, plaintext)?)
    }

    /// Decrypt a shared copy.
    pub fn open(&self, guard: &Guard, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(guard.decrypt(&self.0, ciphertext)?)
    }
}

impl fmt::Debug for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShareKey({})", self.fingerprint())
    }
}

/// A share key encrypted under an RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportKey(Vec<u8>);

impl TransportKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoding used in delivered messages.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| PermsError::InvalidShareKey(format!("bad base64: {}", e)))
    }
}

impl fmt::Debug for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportKey({} bytes)", self.0.len())
    }
}
