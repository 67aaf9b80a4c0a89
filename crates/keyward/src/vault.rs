//! The Vault: encrypted resources and capability-based sharing.
//!
//! The Vault owns the guard and the collaborators and exposes the
//! resource encryption flow. The user, file and permission services are
//! implemented as further `impl` blocks in their own modules.

use std::sync::Arc;

use keyward_core::{
    Guard, KeyReference, KeyTable, PrivateKey, PublicKey, SymmetricKey, UserId,
};
use keyward_store::{BlobStore, KeyStore, KeyStoreExt, Repository, UserRecord};
use tracing::debug;

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::mail::Mailer;

/// The main Vault struct.
///
/// Generic over its collaborators so the same flows run against SQLite and
/// the filesystem or against in-memory doubles.
pub struct Vault<K, R, B, M> {
    pub(crate) guard: Guard,
    pub(crate) keys: Arc<K>,
    pub(crate) repo: Arc<R>,
    pub(crate) blobs: Arc<B>,
    pub(crate) mailer: Arc<M>,
    pub(crate) config: VaultConfig,
}

impl<K, R, B, M> Vault<K, R, B, M>
where
    K: KeyStore,
    R: Repository,
    B: BlobStore,
    M: Mailer,
{
    /// Create a vault. Fails if the guard configuration is unusable.
    pub fn new(config: VaultConfig, keys: K, repo: R, blobs: B, mailer: M) -> Result<Self> {
        Self::from_shared(
            config,
            Arc::new(keys),
            Arc::new(repo),
            Arc::new(blobs),
            Arc::new(mailer),
        )
    }

    /// Create a vault over collaborators that are shared with other code.
    pub fn from_shared(
        config: VaultConfig,
        keys: Arc<K>,
        repo: Arc<R>,
        blobs: Arc<B>,
        mailer: Arc<M>,
    ) -> Result<Self> {
        let guard = config.guard.build()?;
        if guard.mode().is_legacy() {
            tracing::warn!(mode = %guard.mode(), "legacy cipher mode selected");
        }
        Ok(Self {
            guard,
            keys,
            repo,
            blobs,
            mailer,
            config,
        })
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resource encryption flow
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt `payload` under a fresh file key.
    ///
    /// Returns the ciphertext and the reference to store beside it. No
    /// authorization happens here; callers check ownership first.
    pub async fn store_encrypted(&self, owner: UserId, payload: &[u8]) -> Result<(Vec<u8>, KeyReference)> {
        let key = self.guard.generate_key();
        let ciphertext = self.guard.encrypt(&key, payload)?;
        let reference = self.keys.store_key(&self.guard, KeyTable::File, key).await?;
        debug!(%owner, size = payload.len(), "encrypted resource");
        Ok((ciphertext, reference))
    }

    /// Inverse of [`Vault::store_encrypted`].
    pub async fn fetch_decrypted(&self, reference: &KeyReference, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.resolve(KeyTable::File, reference).await?;
        Ok(self.guard.decrypt(&key, ciphertext)?)
    }

    pub(crate) async fn resolve(&self, table: KeyTable, reference: &KeyReference) -> Result<SymmetricKey> {
        let key = self.keys.resolve_key(&self.guard, table, reference).await?;
        Ok(key.material)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) async fn user(&self, id: UserId) -> Result<UserRecord> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("user {}", id)))
    }

    pub(crate) async fn user_by_name(&self, username: &str) -> Result<UserRecord> {
        self.repo
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("user {}", username)))
    }

    pub(crate) async fn user_key(&self, user: &UserRecord) -> Result<SymmetricKey> {
        self.resolve(KeyTable::User, &user.key_reference).await
    }

    pub(crate) async fn private_key(&self, user: &UserRecord) -> Result<PrivateKey> {
        let key = self.user_key(user).await?;
        let pem = self.guard.decrypt(&key, &user.sealed_private_key)?;
        let pem = String::from_utf8(pem)
            .map_err(|_| VaultError::KeyFormat(format!("private key of {} is not utf-8", user.id)))?;
        Ok(self.guard.parse_private_key(&pem)?)
    }

    pub(crate) fn public_key(&self, user: &UserRecord) -> Result<PublicKey> {
        Ok(self.guard.parse_public_key(&user.public_key_pem)?)
    }

    /// Address notices for `user` are sent to.
    pub(crate) async fn contact(&self, user: &UserRecord) -> Result<String> {
        let key = self.user_key(user).await?;
        let profile = user.profile.open(&self.guard, &key)?;
        if profile.email.is_empty() {
            Ok(user.username.clone())
        } else {
            Ok(profile.email)
        }
    }

    pub(crate) async fn notify(&self, user: &UserRecord, subject: &str, body: &str) -> Result<()> {
        let recipient = self.contact(user).await?;
        self.mailer
            .send(&recipient, subject, body)
            .await
            .map_err(VaultError::Io)?;
        debug!(user = %user.id, subject, "notice sent");
        Ok(())
    }

    /// Blob path for a new top-level resource.
    pub(crate) fn blob_path(&self, name: &str) -> String {
        let root = self.config.share_root.trim_end_matches('/');
        if root.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", root, name)
        }
    }
}
