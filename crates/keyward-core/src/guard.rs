//! The Guard: a pluggable symmetric cipher engine.
//!
//! A [`Guard`] is configured once with a [`CipherMode`] and a fixed
//! metadata key and holds no other state. Every call is independent, so a
//! single guard can be shared across tasks without synchronization.
//!
//! ## Modes
//!
//! | selector | mode | key | output |
//! |---|---|---|---|
//! | 1 | AES-256-GCM | 32 bytes | `nonce (12) ‖ ciphertext ‖ tag (16)` |
//! | 2 | RC4 | 32 bytes | `keystream ⊕ plaintext` |
//! | 3 | DES, no chaining | 8 bytes | PKCS#7 padded blocks |
//!
//! Modes 2 and 3 exist for compatibility with data written by earlier
//! deployments. Mode 3 encrypts every block independently with no IV, so
//! equal plaintext blocks produce equal ciphertext blocks, and its padding
//! is stripped without validation. Neither should be selected for new
//! deployments.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use des::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt};
use des::Des;
use rand::RngCore;
use rc4::{consts::U32, KeyInit as _, Rc4, StreamCipher};
use std::fmt;
use std::str::FromStr;

use crate::error::{GuardError, Result};
use crate::key::{KeyReference, SymmetricKey};
use crate::keypair::{PrivateKey, PublicKey};
use crate::types::KeyId;

/// Size of the AES-GCM nonce.
pub const NONCE_SIZE: usize = 12;

/// DES block size.
pub const DES_BLOCK_SIZE: usize = 8;

/// Cipher mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherMode {
    /// Authenticated AES-256-GCM.
    Aes256Gcm = 1,
    /// RC4 stream cipher (legacy).
    Rc4 = 2,
    /// Single DES, block by block without chaining (legacy).
    DesEcb = 3,
}

impl CipherMode {
    /// Parse the numeric selector.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(CipherMode::Aes256Gcm),
            2 => Ok(CipherMode::Rc4),
            3 => Ok(CipherMode::DesEcb),
            other => Err(GuardError::UnsupportedMode(other)),
        }
    }

    /// Numeric selector.
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Length of keys produced by [`Guard::generate_key`] for this mode.
    pub const fn key_len(&self) -> usize {
        match self {
            CipherMode::Aes256Gcm | CipherMode::Rc4 => 32,
            CipherMode::DesEcb => 8,
        }
    }

    /// Whether this mode is kept only for reading existing data.
    pub const fn is_legacy(&self) -> bool {
        !matches!(self, CipherMode::Aes256Gcm)
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CipherMode::Aes256Gcm => "aes",
            CipherMode::Rc4 => "rc4",
            CipherMode::DesEcb => "des",
        };
        f.write_str(name)
    }
}

impl FromStr for CipherMode {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "aes" | "aes-gcm" | "aes256gcm" => Ok(CipherMode::Aes256Gcm),
            "2" | "rc4" => Ok(CipherMode::Rc4),
            "3" | "des" | "des-ecb" => Ok(CipherMode::DesEcb),
            other => match other.parse::<u8>() {
                Ok(n) => Err(GuardError::UnsupportedMode(n)),
                Err(_) => Err(GuardError::UnknownMode(s.trim().to_string())),
            },
        }
    }
}

/// The cipher engine.
#[derive(Clone)]
pub struct Guard {
    mode: CipherMode,
    metadata_key: SymmetricKey,
}

impl Guard {
    /// Create a guard for `mode` with the metadata key used to wrap key ids.
    ///
    /// The metadata key must be a valid key for the mode.
    pub fn new(mode: CipherMode, metadata_key: SymmetricKey) -> Result<Self> {
        check_key(mode, &metadata_key)?;
        Ok(Self { mode, metadata_key })
    }

    /// The active cipher mode.
    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Symmetric operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate fresh random key material for the active mode.
    pub fn generate_key(&self) -> SymmetricKey {
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.truncate(self.mode.key_len());
        SymmetricKey::from_bytes(bytes)
    }

    /// Encrypt `plaintext` under `key` with the active mode.
    pub fn encrypt(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        check_key(self.mode, key)?;

        match self.mode {
            CipherMode::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
                    GuardError::InvalidKeyLength {
                        expected: 32,
                        actual: key.len(),
                    }
                })?;

                let mut nonce_bytes = [0u8; NONCE_SIZE];
                rand::thread_rng().fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from_slice(&nonce_bytes);

                let sealed = cipher
                    .encrypt(nonce, plaintext)
                    .map_err(|_| GuardError::Integrity)?;

                let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
                out.extend_from_slice(&nonce_bytes);
                out.extend_from_slice(&sealed);
                Ok(out)
            }
            CipherMode::Rc4 => {
                let mut out = plaintext.to_vec();
                rc4_apply(key, &mut out)?;
                Ok(out)
            }
            CipherMode::DesEcb => {
                let cipher = des_cipher(key)?;
                let mut out = pad(plaintext, DES_BLOCK_SIZE);
                for chunk in out.chunks_exact_mut(DES_BLOCK_SIZE) {
                    let block = GenericArray::from_mut_slice(chunk);
                    cipher.encrypt_block(block);
                }
                Ok(out)
            }
        }
    }

    /// Decrypt `ciphertext` produced by [`Guard::encrypt`] under `key`.
    pub fn decrypt(&self, key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_key(self.mode, key)?;

        match self.mode {
            CipherMode::Aes256Gcm => {
                if ciphertext.len() < NONCE_SIZE {
                    return Err(GuardError::Integrity);
                }

                let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
                    GuardError::InvalidKeyLength {
                        expected: 32,
                        actual: key.len(),
                    }
                })?;

                let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
                cipher
                    .decrypt(Nonce::from_slice(nonce), sealed)
                    .map_err(|_| GuardError::Integrity)
            }
            CipherMode::Rc4 => {
                let mut out = ciphertext.to_vec();
                rc4_apply(key, &mut out)?;
                Ok(out)
            }
            CipherMode::DesEcb => {
                if ciphertext.len() % DES_BLOCK_SIZE != 0 {
                    return Err(GuardError::MalformedCiphertext(format!(
                        "length {} is not a multiple of {}",
                        ciphertext.len(),
                        DES_BLOCK_SIZE
                    )));
                }

                let cipher = des_cipher(key)?;
                let mut out = ciphertext.to_vec();
                for chunk in out.chunks_exact_mut(DES_BLOCK_SIZE) {
                    let block = GenericArray::from_mut_slice(chunk);
                    cipher.decrypt_block(block);
                }
                unpad(&mut out);
                Ok(out)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key references
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt a key id (8 bytes, big-endian) under the metadata key.
    pub fn reference_for(&self, id: KeyId) -> Result<KeyReference> {
        let encoded = id.get().to_be_bytes();
        let sealed = self.encrypt(&self.metadata_key, &encoded)?;
        Ok(KeyReference(sealed))
    }

    /// Recover the key id wrapped by [`Guard::reference_for`].
    pub fn resolve_reference(&self, reference: &KeyReference) -> Result<KeyId> {
        let decoded = self.decrypt(&self.metadata_key, reference.as_bytes())?;
        let bytes: [u8; 8] = decoded.as_slice().try_into().map_err(|_| {
            GuardError::KeyFormat(format!(
                "key reference decodes to {} bytes, expected 8",
                decoded.len()
            ))
        })?;
        Ok(KeyId(u64::from_be_bytes(bytes)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Asymmetric operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse a PKCS#1 PEM public key.
    pub fn parse_public_key(&self, pem: &str) -> Result<PublicKey> {
        PublicKey::from_pem(pem)
    }

    /// Parse a PKCS#1 PEM private key.
    pub fn parse_private_key(&self, pem: &str) -> Result<PrivateKey> {
        PrivateKey::from_pem(pem)
    }

    /// SHA-256 + PKCS#1 v1.5 signature.
    pub fn sign_rsa(&self, private_key: &PrivateKey, data: &[u8]) -> Result<Vec<u8>> {
        private_key.sign(data)
    }

    /// Verify a signature produced by [`Guard::sign_rsa`].
    pub fn verify_rsa(&self, public_key: &PublicKey, signature: &[u8], data: &[u8]) -> Result<()> {
        public_key.verify(signature, data)
    }

    /// PKCS#1 v1.5 encryption of short key material.
    pub fn encrypt_rsa(&self, public_key: &PublicKey, data: &[u8]) -> Result<Vec<u8>> {
        public_key.encrypt(data)
    }

    /// Inverse of [`Guard::encrypt_rsa`].
    pub fn decrypt_rsa(&self, private_key: &PrivateKey, data: &[u8]) -> Result<Vec<u8>> {
        private_key.decrypt(data)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("mode", &self.mode)
            .field("metadata_key", &self.metadata_key)
            .finish()
    }
}

fn check_key(mode: CipherMode, key: &SymmetricKey) -> Result<()> {
    let ok = match mode {
        CipherMode::Aes256Gcm | CipherMode::Rc4 => key.len() == 32,
        CipherMode::DesEcb => key.len() == DES_BLOCK_SIZE,
    };

    if ok {
        Ok(())
    } else {
        Err(GuardError::InvalidKeyLength {
            expected: mode.key_len(),
            actual: key.len(),
        })
    }
}

fn des_cipher(key: &SymmetricKey) -> Result<Des> {
    Des::new_from_slice(key.as_bytes()).map_err(|_| GuardError::InvalidKeyLength {
        expected: DES_BLOCK_SIZE,
        actual: key.len(),
    })
}

/// PKCS#7 padding. A full block is appended when the input is aligned.
fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let padding = block_size - data.len() % block_size;
    let mut out = Vec::with_capacity(data.len() + padding);
    out.extend_from_slice(data);
    out.resize(data.len() + padding, padding as u8);
    out
}

/// Strip PKCS#7 padding without checking it.
///
/// The last byte is trusted as the pad length. Out-of-range values are
/// clamped to the buffer length rather than rejected.
fn unpad(data: &mut Vec<u8>) {
    if let Some(&last) = data.last() {
        let strip = (last as usize).min(data.len());
        data.truncate(data.len() - strip);
    }
}

/// Apply the RC4 keystream. Encryption and decryption are the same call.
fn rc4_apply(key: &SymmetricKey, data: &mut [u8]) -> Result<()> {
    let mut cipher =
        Rc4::<U32>::new_from_slice(key.as_bytes()).map_err(|_| GuardError::InvalidKeyLength {
            expected: 32,
            actual: key.len(),
        })?;
    cipher.apply_keystream(data);
    Ok(())
}
