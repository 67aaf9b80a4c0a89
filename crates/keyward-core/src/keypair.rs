//! RSA keypairs.
//!
//! Users hold an RSA keypair stored as PKCS#1 PEM. The private half signs
//! documents and unwraps share keys; the public half verifies signatures
//! and wraps share keys for transport. Signatures are SHA-256 +
//! PKCS#1 v1.5 and key transport is PKCS#1 v1.5 encryption.

use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{GuardError, Result};

/// Default modulus size for newly registered users.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Overhead of PKCS#1 v1.5 encryption padding.
const PKCS1_PADDING_OVERHEAD: usize = 11;

/// RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a PKCS#1 PEM (`RSA PUBLIC KEY`) block.
    pub fn from_pem(pem: &str) -> Result<Self> {
        RsaPublicKey::from_pkcs1_pem(pem.trim())
            .map(Self)
            .map_err(|e| GuardError::KeyFormat(format!("public key: {}", e)))
    }

    /// Encode as PKCS#1 PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.0
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| GuardError::KeyFormat(format!("public key: {}", e)))
    }

    /// Modulus size in bytes.
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Verify a SHA-256 + PKCS#1 v1.5 signature over `data`.
    pub fn verify(&self, signature: &[u8], data: &[u8]) -> Result<()> {
        let digest = Sha256::digest(data);
        self.0
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .map_err(|_| GuardError::SignatureInvalid("signature does not match".into()))
    }

    /// PKCS#1 v1.5 encryption. `data` must fit the modulus minus padding.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let max = self.size().saturating_sub(PKCS1_PADDING_OVERHEAD);
        if data.len() > max {
            return Err(GuardError::Rsa(format!(
                "message of {} bytes exceeds {} byte limit",
                data.len(),
                max
            )));
        }

        self.0
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
            .map_err(|e| GuardError::Rsa(e.to_string()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.size() * 8)
    }
}

/// RSA private key.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Parse a PKCS#1 PEM (`RSA PRIVATE KEY`) block.
    pub fn from_pem(pem: &str) -> Result<Self> {
        RsaPrivateKey::from_pkcs1_pem(pem.trim())
            .map(Self)
            .map_err(|e| GuardError::KeyFormat(format!("private key: {}", e)))
    }

    /// Encode as PKCS#1 PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.0
            .to_pkcs1_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| GuardError::KeyFormat(format!("private key: {}", e)))
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// SHA-256 + PKCS#1 v1.5 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(data);
        self.0
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| GuardError::Rsa(e.to_string()))
    }

    /// Inverse of [`PublicKey::encrypt`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.0
            .decrypt(Pkcs1v15Encrypt, data)
            .map_err(|e| GuardError::Rsa(e.to_string()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({} bits)", self.0.size() * 8)
    }
}

/// A freshly generated keypair.
#[derive(Clone, Debug)]
pub struct RsaKeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl RsaKeyPair {
    /// Generate a new keypair with a modulus of `bits`.
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| GuardError::Rsa(format!("key generation: {}", e)))?;
        let private = PrivateKey(private);
        let public = private.public_key();
        Ok(Self { private, public })
    }

    /// Build a keypair from an existing private key.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Both halves as PKCS#1 PEM: `(private, public)`.
    pub fn to_pem(&self) -> Result<(String, String)> {
        Ok((self.private.to_pem()?, self.public.to_pem()?))
    }
}
