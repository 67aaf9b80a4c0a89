//! Error types for the Keyward core.

use thiserror::Error;

/// Errors produced by the cipher engine and the formats built on it.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Authentication tag mismatch, or ciphertext too short to carry a nonce.
    #[error("integrity check failed")]
    Integrity,

    /// Ciphertext that cannot be processed by the active mode.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Malformed PEM, malformed key reference, or unusable key encoding.
    #[error("key format error: {0}")]
    KeyFormat(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("unsupported cipher mode: {0}")]
    UnsupportedMode(u8),

    /// A mode name that is neither a known name nor a selector byte.
    #[error("unknown cipher mode: {0}")]
    UnknownMode(String),

    /// RSA operation failed (sign, encrypt, decrypt, key generation).
    #[error("rsa error: {0}")]
    Rsa(String),

    /// A signed document failed to parse or verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, GuardError>;
