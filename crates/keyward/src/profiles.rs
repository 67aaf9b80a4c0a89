//! User registration and profiles.

use keyward_core::{KeyTable, Profile, RsaKeyPair, UserId};
use keyward_perms::{share_path, TransportKey, PROFILE_SNAPSHOT};
use keyward_store::{BlobStore, KeyStore, KeyStoreExt, Repository, StoreError, UserRecord};
use tracing::{info, warn};

use crate::error::{Result, VaultError};
use crate::mail::Mailer;
use crate::vault::Vault;

impl<K, R, B, M> Vault<K, R, B, M>
where
    K: KeyStore,
    R: Repository,
    B: BlobStore,
    M: Mailer,
{
    /// Register a user.
    ///
    /// Generates the user's RSA key pair and user key, seals the private key
    /// and every sensitive profile field under the user key, and stores the
    /// row. `password_hash` is stored as given.
    pub async fn register_user(&self, profile: Profile, password_hash: &str) -> Result<UserRecord> {
        validate_profile(&profile)?;
        if self.repo.get_user_by_username(&profile.username).await?.is_some() {
            return Err(VaultError::StateConflict(format!(
                "username {} is taken",
                profile.username
            )));
        }

        let bits = self.config.rsa_bits;
        let keypair = tokio::task::spawn_blocking(move || RsaKeyPair::generate(bits))
            .await
            .map_err(|e| VaultError::Io(e.into()))??;
        let (private_pem, public_pem) = keypair.to_pem()?;

        let user_key = self.guard.generate_key();
        let sealed_private_key = self.guard.encrypt(&user_key, private_pem.as_bytes())?;
        let sealed_profile = profile.seal(&self.guard, &user_key)?;
        let key_reference = self.keys.store_key(&self.guard, KeyTable::User, user_key).await?;

        let record = UserRecord {
            id: UserId(0),
            username: profile.username.clone(),
            password_hash: password_hash.to_string(),
            public_key_pem: public_pem,
            sealed_private_key,
            profile: sealed_profile,
            key_reference,
        };
        let record = self.repo.insert_user(record).await.map_err(|e| match e {
            StoreError::Conflict(_) => VaultError::StateConflict(format!(
                "username {} is taken",
                profile.username
            )),
            other => other.into(),
        })?;

        info!(user = %record.id, username = %record.username, bits, "registered user");
        Ok(record)
    }

    /// Decrypt a user's own profile.
    pub async fn get_profile(&self, user: UserId) -> Result<Profile> {
        let record = self.user(user).await?;
        let key = self.user_key(&record).await?;
        Ok(record.profile.open(&self.guard, &key)?)
    }

    /// Replace a user's profile, re-sealing it under the existing user key.
    ///
    /// Snapshots already shared with grantees are not refreshed.
    pub async fn update_profile(&self, user: UserId, profile: Profile) -> Result<Profile> {
        validate_profile(&profile)?;
        let mut record = self.user(user).await?;

        if profile.username != record.username {
            if let Some(other) = self.repo.get_user_by_username(&profile.username).await? {
                if other.id != record.id {
                    return Err(VaultError::StateConflict(format!(
                        "username {} is taken",
                        profile.username
                    )));
                }
            }
        }

        let key = self.user_key(&record).await?;
        record.profile = profile.seal(&self.guard, &key)?;
        record.username = profile.username.clone();
        self.repo.update_user(&record).await?;

        info!(%user, "updated profile");
        Ok(profile)
    }

    /// Read another user's profile with a share key.
    ///
    /// The requester presents the transport key they were sent. It must
    /// unwrap, with the requester's private key, to the share key stored for
    /// the pair. The returned profile is the snapshot taken when the
    /// profile request was accepted.
    pub async fn view_shared_profile(
        &self,
        requester: UserId,
        target_username: &str,
        presented: &TransportKey,
    ) -> Result<Profile> {
        let target = self.user_by_name(target_username).await?;
        if target.id == requester {
            return self.get_profile(requester).await;
        }

        let reader = self.user(requester).await?;
        let share = self.presented_share_key(&reader, &target, presented).await?;

        let path = share_path(&self.config.share_root, reader.id, target.id, PROFILE_SNAPSHOT);
        let copy = match self.blobs.read(&path).await {
            Ok(copy) => copy,
            Err(StoreError::NotFound(_)) => {
                warn!(requester = %reader.id, target = %target.id, "profile not shared");
                return Err(VaultError::Unauthorized(format!(
                    "{} has not shared their profile",
                    target.username
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = share.open(&self.guard, &copy)?;
        Ok(Profile::from_json(&snapshot)?)
    }
}

fn validate_profile(profile: &Profile) -> Result<()> {
    if profile.username.trim().is_empty() {
        return Err(VaultError::InvalidInput("username is empty".into()));
    }
    if profile.username.contains('/') {
        return Err(VaultError::InvalidInput("username contains '/'".into()));
    }
    Ok(())
}
