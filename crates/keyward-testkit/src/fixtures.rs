//! Test fixtures and helpers.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keyward::{GuardConfig, Mailer, Vault, VaultConfig};
use keyward_core::{CipherMode, Profile, SymmetricKey};
use keyward_perms::TransportKey;
use keyward_store::{MemoryBlobStore, MemoryKeyStore, MemoryStore, UserRecord};

/// RSA modulus size used by fixtures. Small to keep tests fast.
pub const TEST_RSA_BITS: usize = 1024;

/// A vault over in-memory collaborators.
pub type MemoryVault = Vault<MemoryKeyStore, MemoryStore, MemoryBlobStore, RecordingMailer>;

/// One message handed to a [`RecordingMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// A mailer that records messages instead of sending them.
///
/// Clones share the same record, so a test can keep one clone and hand
/// the other to the vault.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `send` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMail> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient == recipient)
            .collect()
    }

    /// Share keys delivered to `recipient`, in order.
    pub fn share_keys(&self, recipient: &str) -> Vec<TransportKey> {
        self.sent_to(recipient)
            .iter()
            .filter_map(|m| extract_key(&m.body))
            .collect()
    }
}

fn extract_key(body: &str) -> Option<TransportKey> {
    let start = body.find("<pre>")? + "<pre>".len();
    let end = start + body[start..].find("</pre>")?;
    TransportKey::from_base64(&body[start..end]).ok()
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mail relay unavailable");
        }
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

/// An in-memory vault plus handles on its mailer.
pub struct TestVault {
    pub vault: MemoryVault,
    pub mailer: RecordingMailer,
}

impl TestVault {
    /// AES-256-GCM vault.
    pub fn new() -> Self {
        Self::with_mode(CipherMode::Aes256Gcm)
    }

    pub fn with_mode(mode: CipherMode) -> Self {
        let mailer = RecordingMailer::new();
        let vault = Vault::new(
            test_config(mode),
            MemoryKeyStore::new(),
            MemoryStore::new(),
            MemoryBlobStore::new(),
            mailer.clone(),
        )
        .unwrap();
        Self { vault, mailer }
    }

    /// Register `username` with email `{username}@example.org`.
    pub async fn register(&self, username: &str) -> UserRecord {
        self.vault
            .register_user(sample_profile(username), "not-a-real-hash")
            .await
            .unwrap()
    }
}

impl Default for TestVault {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestVault {
    type Target = MemoryVault;

    fn deref(&self) -> &MemoryVault {
        &self.vault
    }
}

/// Config with a fixed metadata key and small RSA keys.
pub fn test_config(mode: CipherMode) -> VaultConfig {
    VaultConfig {
        guard: GuardConfig::new(mode, SymmetricKey::from_bytes(vec![0x5a; mode.key_len()])),
        rsa_bits: TEST_RSA_BITS,
        ..VaultConfig::default()
    }
}

/// A profile with every field filled in.
pub fn sample_profile(username: &str) -> Profile {
    Profile {
        username: username.to_string(),
        name: format!("{} Example", username),
        email: email(username),
        phone_number: "+1 555 0100".to_string(),
        gender: "unspecified".to_string(),
        religion: "none".to_string(),
        nationality: "Nowhere".to_string(),
        address: "1 Test Street".to_string(),
        birth_info: "1990-01-01".to_string(),
    }
}

/// The email address fixtures register `username` under.
pub fn email(username: &str) -> String {
    format!("{}@example.org", username)
}
