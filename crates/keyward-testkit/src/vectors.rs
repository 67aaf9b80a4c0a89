//! Golden test vectors for the deterministic cipher modes.
//!
//! RC4 and DES-ECB have no nonce, so the same key and plaintext always give
//! the same ciphertext. These vectors pin that output; they were checked
//! against independent RC4 and OpenSSL DES-ECB implementations.

use keyward_core::{CipherMode, Guard, KeyId, SymmetricKey};

/// RC4 vector key: bytes 0x01..=0x20.
pub const RC4_KEY: [u8; 32] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20,
];

/// DES vector key.
pub const DES_KEY: &[u8; 8] = b"12345678";

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct CipherVector {
    pub name: &'static str,
    pub mode: CipherMode,
    pub key: &'static [u8],
    pub plaintext: &'static [u8],
    /// Expected ciphertext (hex).
    pub expected_hex: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<CipherVector> {
    vec![
        CipherVector {
            name: "rc4 empty",
            mode: CipherMode::Rc4,
            key: &RC4_KEY,
            plaintext: b"",
            expected_hex: "",
        },
        CipherVector {
            name: "rc4 text",
            mode: CipherMode::Rc4,
            key: &RC4_KEY,
            plaintext: b"keyward rc4 vector",
            expected_hex: "81c3c452e9799d1d4d3e2a6cd4047ee5a0d6",
        },
        CipherVector {
            name: "rc4 key id 1",
            mode: CipherMode::Rc4,
            key: &RC4_KEY,
            plaintext: &[0, 0, 0, 0, 0, 0, 0, 1],
            expected_hex: "eaa6bd25880bf93c",
        },
        CipherVector {
            name: "des empty is one padding block",
            mode: CipherMode::DesEcb,
            key: DES_KEY,
            plaintext: b"",
            expected_hex: "feb959b7d4642fcb",
        },
        CipherVector {
            name: "des short",
            mode: CipherMode::DesEcb,
            key: DES_KEY,
            plaintext: b"hello",
            expected_hex: "ba16c6a0257125af",
        },
        CipherVector {
            name: "des exact block gets a full padding block",
            mode: CipherMode::DesEcb,
            key: DES_KEY,
            plaintext: b"abcdefgh",
            expected_hex: "94d4436bc3b5b693feb959b7d4642fcb",
        },
        CipherVector {
            name: "des key id 1",
            mode: CipherMode::DesEcb,
            key: DES_KEY,
            plaintext: &[0, 0, 0, 0, 0, 0, 0, 1],
            expected_hex: "3a4cad796cfd7d03feb959b7d4642fcb",
        },
        CipherVector {
            name: "des repeated blocks repeat",
            mode: CipherMode::DesEcb,
            key: DES_KEY,
            plaintext: b"abcdefghabcdefgh",
            expected_hex: "94d4436bc3b5b69394d4436bc3b5b693feb959b7d4642fcb",
        },
    ]
}

/// A guard whose metadata key is the vector's key.
pub fn guard_for(vector: &CipherVector) -> Guard {
    Guard::new(vector.mode, SymmetricKey::from_bytes(vector.key.to_vec())).unwrap()
}

/// Encrypt the vector's plaintext under its key.
pub fn encrypt_vector(vector: &CipherVector) -> Vec<u8> {
    let guard = guard_for(vector);
    guard
        .encrypt(&SymmetricKey::from_bytes(vector.key.to_vec()), vector.plaintext)
        .unwrap()
}
