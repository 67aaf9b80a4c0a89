//! Vault configuration.
//!
//! Every setting has a default except the guard's metadata key, which must
//! be supplied: references written under one metadata key cannot be
//! resolved under another.

use keyward_core::{CipherMode, Guard, SymmetricKey, DEFAULT_RSA_BITS};

use crate::error::{Result, VaultError};

/// Cipher engine settings.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Env: `KEYWARD_GUARD_MODE` (`1`/`aes`, `2`/`rc4`, `3`/`des`)
    /// Default: AES-256-GCM
    pub mode: CipherMode,

    /// Key used to wrap key ids into references.
    /// Env: `KEYWARD_GUARD_KEY` (hex)
    pub metadata_key: Option<SymmetricKey>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: CipherMode::Aes256Gcm,
            metadata_key: None,
        }
    }
}

impl GuardConfig {
    pub fn new(mode: CipherMode, metadata_key: SymmetricKey) -> Self {
        Self {
            mode,
            metadata_key: Some(metadata_key),
        }
    }

    /// Build the guard. Fails if the metadata key is missing or has the
    /// wrong length for the mode.
    pub fn build(&self) -> Result<Guard> {
        let key = self
            .metadata_key
            .clone()
            .ok_or_else(|| VaultError::Config("KEYWARD_GUARD_KEY is not set".into()))?;
        Guard::new(self.mode, key).map_err(|e| VaultError::Config(e.to_string()))
    }
}

/// Configuration for a [`Vault`](crate::Vault).
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub guard: GuardConfig,

    /// RSA modulus size for newly registered users.
    /// Env: `KEYWARD_RSA_BITS`
    /// Default: 2048
    pub rsa_bits: usize,

    /// Prefix of every blob path the vault writes.
    /// Env: `KEYWARD_SHARE_ROOT`
    /// Default: `files`
    pub share_root: String,

    /// Sender address for outgoing notices.
    /// Env: `KEYWARD_MAIL_SENDER`
    pub mail_sender: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            guard: GuardConfig::default(),
            rsa_bits: DEFAULT_RSA_BITS,
            share_root: "files".to_string(),
            mail_sender: "noreply@keyward.local".to_string(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// Unparseable values are logged and ignored, except a malformed
    /// metadata key which is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("KEYWARD_GUARD_MODE") {
            match value.parse::<CipherMode>() {
                Ok(mode) => config.guard.mode = mode,
                Err(_) => {
                    tracing::warn!(value = %value, "Invalid KEYWARD_GUARD_MODE, using default");
                }
            }
        }

        if let Some(value) = lookup("KEYWARD_GUARD_KEY") {
            let bytes = hex::decode(value.trim())
                .map_err(|e| VaultError::Config(format!("KEYWARD_GUARD_KEY is not hex: {}", e)))?;
            config.guard.metadata_key = Some(SymmetricKey::from_bytes(bytes));
        }

        if let Some(value) = lookup("KEYWARD_RSA_BITS") {
            match value.parse::<usize>() {
                Ok(bits) if bits >= 1024 => config.rsa_bits = bits,
                _ => {
                    tracing::warn!(value = %value, "Invalid KEYWARD_RSA_BITS, using default");
                }
            }
        }

        if let Some(value) = lookup("KEYWARD_SHARE_ROOT") {
            config.share_root = value.trim_end_matches('/').to_string();
        }

        if let Some(value) = lookup("KEYWARD_MAIL_SENDER") {
            if !value.is_empty() {
                config.mail_sender = value;
            }
        }

        if config.guard.metadata_key.is_some() {
            // Surface a wrong-length key now rather than on first use.
            config.guard.build()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<VaultConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VaultConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.guard.mode, CipherMode::Aes256Gcm);
        assert!(config.guard.metadata_key.is_none());
        assert_eq!(config.rsa_bits, DEFAULT_RSA_BITS);
        assert_eq!(config.share_root, "files");
        assert!(matches!(config.guard.build(), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let key = "11".repeat(8);
        let config = load(&[
            ("KEYWARD_GUARD_MODE", "des"),
            ("KEYWARD_GUARD_KEY", key.as_str()),
            ("KEYWARD_RSA_BITS", "1024"),
            ("KEYWARD_SHARE_ROOT", "shared/"),
            ("KEYWARD_MAIL_SENDER", "vault@example.org"),
        ])
        .unwrap();

        assert_eq!(config.guard.mode, CipherMode::DesEcb);
        assert_eq!(config.rsa_bits, 1024);
        assert_eq!(config.share_root, "shared");
        assert_eq!(config.mail_sender, "vault@example.org");
        assert_eq!(config.guard.build().unwrap().mode(), CipherMode::DesEcb);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = load(&[("KEYWARD_GUARD_MODE", "rot13"), ("KEYWARD_RSA_BITS", "tiny")]).unwrap();
        assert_eq!(config.guard.mode, CipherMode::Aes256Gcm);
        assert_eq!(config.rsa_bits, DEFAULT_RSA_BITS);
    }

    #[test]
    fn test_malformed_key_is_error() {
        assert!(matches!(
            load(&[("KEYWARD_GUARD_KEY", "zz")]),
            Err(VaultError::Config(_))
        ));
        // 8 bytes is a DES key, not an AES one.
        assert!(matches!(
            load(&[("KEYWARD_GUARD_KEY", "ab".repeat(8).as_str())]),
            Err(VaultError::Config(_))
        ));
    }
}
