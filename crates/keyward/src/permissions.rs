//! Permission protocol: requests, responses and share-key delivery.
//!
//! A permission always runs from the requester (`source`) to the owner
//! (`target`). The first accepted request for a pair mints the pair's share
//! key; later grants reuse it and no further key is sent.

use keyward_core::{FileId, KeyTable, NotificationId, NotificationStatus, PermissionId, UserId};
use keyward_perms::{
    plan_request, respond, share_dir, share_path, Decision, GrantScope, RequestPlan, ShareKey,
    TransportKey, PROFILE_SNAPSHOT,
};
use keyward_store::{
    blob_name, BlobStore, Direction, FileGrant, FilePermissionRecord, FileRecord, GrantCommit,
    GrantOutcome, GrantPermission, KeyStore, KeyStoreExt, Notification, PermissionRecord,
    Repository, StoreError, UserRecord,
};
use tracing::{debug, info, warn};

use crate::error::{IncompleteStage, Result, VaultError};
use crate::mail::{grant_body, rejection_body, share_key_body, Mailer};
use crate::vault::Vault;

/// Result of answering a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOutcome {
    /// The notification with its new status.
    pub notification: Notification,
    /// Rows written by an accepted request.
    pub grant: Option<GrantOutcome>,
    /// Whether a share key was sent to the requester.
    pub key_delivered: bool,
}

impl<K, R, B, M> Vault<K, R, B, M>
where
    K: KeyStore,
    R: Repository,
    B: BlobStore,
    M: Mailer,
{
    // ─────────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask `target_username` for access to their profile, or to one of their
    /// files when `file` is given.
    ///
    /// A rejected request is re-opened in place. A pending or accepted one,
    /// or an existing grant, is a conflict.
    pub async fn request_permission(
        &self,
        requester: UserId,
        target_username: &str,
        file: Option<FileId>,
    ) -> Result<Notification> {
        let source = self.user(requester).await?;
        let target = self.user_by_name(target_username).await?;
        if source.id == target.id {
            return Err(VaultError::StateConflict("cannot request access from yourself".into()));
        }

        let scope = GrantScope::from_file(file);
        if let GrantScope::File(file_id) = scope {
            match self.repo.get_file(file_id).await? {
                Some(f) if f.owner_id == target.id => {}
                _ => {
                    return Err(VaultError::NotFound(format!(
                        "file {} of {}",
                        file_id, target.username
                    )))
                }
            }
        }

        let latest = self
            .repo
            .latest_notification(source.id, target.id, scope.file_id())
            .await?;
        if self.grant_exists(&source, &target, scope, latest.as_ref()).await? {
            return Err(VaultError::StateConflict(match scope {
                GrantScope::Profile => format!("{} already shared their profile", target.username),
                GrantScope::File(id) => format!("file {} is already shared", id),
            }));
        }

        let notification = match plan_request(latest.as_ref().map(|n| n.status))? {
            RequestPlan::Create => {
                self.repo
                    .insert_notification(Notification {
                        id: NotificationId(0),
                        source_user_id: source.id,
                        target_user_id: target.id,
                        file_id: scope.file_id(),
                        status: NotificationStatus::Pending,
                    })
                    .await?
            }
            RequestPlan::Reopen => {
                // plan_request only reopens an existing row.
                let mut notification = latest.ok_or_else(|| {
                    VaultError::StateConflict("no request to reopen".into())
                })?;
                self.repo
                    .update_notification_status(notification.id, NotificationStatus::Pending)
                    .await?;
                notification.status = NotificationStatus::Pending;
                notification
            }
        };

        info!(
            notification = %notification.id,
            source = %source.id,
            target = %target.id,
            ?scope,
            "permission requested"
        );
        Ok(notification)
    }

    async fn grant_exists(
        &self,
        source: &UserRecord,
        target: &UserRecord,
        scope: GrantScope,
        latest: Option<&Notification>,
    ) -> Result<bool> {
        let Some(permission) = self.repo.find_permission(source.id, target.id).await? else {
            return Ok(false);
        };
        match scope {
            GrantScope::Profile => {
                Ok(latest.map_or(false, |n| n.status == NotificationStatus::Accepted))
            }
            GrantScope::File(file_id) => Ok(self
                .repo
                .find_file_permission(permission.id, file_id)
                .await?
                .is_some()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Responses
    // ─────────────────────────────────────────────────────────────────────────

    /// Accept or reject a pending request addressed to `responder`.
    ///
    /// Accepting re-encrypts the resource under the pair's share key into
    /// the pair's share directory, then commits the notification status, the
    /// permission (when new) and the file grant together. The share key is
    /// sent to the requester only when it was minted by this call.
    ///
    /// A failure after a durable step is reported as
    /// [`VaultError::Incomplete`]. Retrying a failed commit reuses an already
    /// persisted permission. A failed key delivery is recovered with
    /// [`Vault::resend_share_key`].
    pub async fn respond_permission_request(
        &self,
        responder: UserId,
        notification_id: NotificationId,
        decision: Decision,
    ) -> Result<ResponseOutcome> {
        let notification = self
            .repo
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("notification {}", notification_id)))?;

        if notification.target_user_id != responder {
            warn!(%responder, notification = %notification.id, "response by non-target");
            return Err(VaultError::Unauthorized(format!(
                "notification {} is not addressed to {}",
                notification.id, responder
            )));
        }
        let next = respond(notification.status, decision)?;

        let requester = self.user(notification.source_user_id).await?;
        let owner = self.user(responder).await?;

        match decision {
            Decision::Reject => self.reject(notification, next, &requester, &owner).await,
            Decision::Accept => self.accept(notification, &requester, &owner).await,
        }
    }

    async fn reject(
        &self,
        mut notification: Notification,
        next: NotificationStatus,
        requester: &UserRecord,
        owner: &UserRecord,
    ) -> Result<ResponseOutcome> {
        self.repo
            .update_notification_status(notification.id, next)
            .await?;
        notification.status = next;
        info!(notification = %notification.id, "permission rejected");

        let subject = self.subject(owner, GrantScope::from_file(notification.file_id)).await?;
        let body = rejection_body(&owner.username, &subject);
        if let Err(e) = self.notify(requester, "Access request declined", &body).await {
            let persisted = self
                .repo
                .find_permission(requester.id, owner.id)
                .await?
                .is_some();
            return Err(VaultError::incomplete(IncompleteStage::Delivery, persisted, e));
        }

        Ok(ResponseOutcome {
            notification,
            grant: None,
            key_delivered: false,
        })
    }

    async fn accept(
        &self,
        mut notification: Notification,
        requester: &UserRecord,
        owner: &UserRecord,
    ) -> Result<ResponseOutcome> {
        let scope = GrantScope::from_file(notification.file_id);

        let existing = self.repo.find_permission(requester.id, owner.id).await?;
        let persisted = existing.is_some();
        let (share, permission) = match existing {
            Some(permission) => {
                debug!(permission = %permission.id, "reusing share key");
                (self.stored_share_key(&permission).await?, GrantPermission::Existing(permission.id))
            }
            None => {
                let share = ShareKey::mint(&self.guard);
                let storage_key = self.guard.generate_key();
                let wrapped_key = share.wrap_for_storage(&self.guard, &storage_key)?;
                let key_reference = self
                    .keys
                    .store_key(&self.guard, KeyTable::Permission, storage_key)
                    .await?;
                debug!(fingerprint = %share.fingerprint(), "minted share key");
                let record = PermissionRecord {
                    id: PermissionId(0),
                    source_user_id: requester.id,
                    target_user_id: owner.id,
                    wrapped_key,
                    key_reference,
                };
                (share, GrantPermission::New(record))
            }
        };

        let (plaintext, leaf) = match scope {
            GrantScope::Profile => {
                let profile = self.get_profile(owner.id).await?;
                (profile.to_json()?, PROFILE_SNAPSHOT.to_string())
            }
            GrantScope::File(file_id) => {
                let file = self.owned_file(owner.id, file_id).await?;
                let ciphertext = self.blobs.read(&file.storage_path).await?;
                let content = self.fetch_decrypted(&file.key_reference, &ciphertext).await?;
                (content, blob_name())
            }
        };

        let copy = share.seal(&self.guard, &plaintext)?;
        let path = share_path(&self.config.share_root, requester.id, owner.id, &leaf);
        self.write_shared_copy(requester.id, owner.id, &path, &copy)
            .await
            .map_err(|e| VaultError::incomplete(IncompleteStage::SharedCopy, persisted, e))?;

        let commit = GrantCommit {
            notification_id: notification.id,
            permission,
            file_grant: scope.file_id().map(|file_id| FileGrant {
                file_id,
                filepath: path.clone(),
            }),
        };
        let outcome = self
            .repo
            .commit_grant(commit)
            .await
            .map_err(|e| VaultError::incomplete(IncompleteStage::Commit, persisted, e))?;
        notification.status = NotificationStatus::Accepted;
        info!(
            notification = %notification.id,
            permission = %outcome.permission.id,
            path = %path,
            "permission accepted"
        );

        let subject = self.subject(owner, scope).await?;
        let delivery = if persisted {
            let body = grant_body(&owner.username, &subject);
            self.notify(requester, "Access granted", &body).await
        } else {
            self.deliver_share_key(requester, owner, &share, &subject).await
        };
        delivery.map_err(|e| VaultError::incomplete(IncompleteStage::Delivery, true, e))?;

        Ok(ResponseOutcome {
            notification,
            grant: Some(outcome),
            key_delivered: !persisted,
        })
    }

    async fn write_shared_copy(
        &self,
        source: UserId,
        target: UserId,
        path: &str,
        copy: &[u8],
    ) -> Result<()> {
        let dir = share_dir(&self.config.share_root, source, target);
        match self.blobs.make_dir(&dir).await {
            Ok(()) => debug!(dir = %dir, "created share directory"),
            Err(StoreError::AlreadyExists(_)) => debug!(dir = %dir, "share directory exists"),
            Err(e) => return Err(e.into()),
        }
        self.blobs.write(path, copy).await?;
        Ok(())
    }

    async fn deliver_share_key(
        &self,
        requester: &UserRecord,
        owner: &UserRecord,
        share: &ShareKey,
        subject: &str,
    ) -> Result<()> {
        let public_key = self.public_key(requester)?;
        let transport = share.wrap_transport(&public_key)?;
        let body = share_key_body(&owner.username, subject, &transport.to_base64());
        self.notify(requester, "Access granted: your share key", &body)
            .await?;
        info!(source = %requester.id, target = %owner.id, "share key delivered");
        Ok(())
    }

    /// Human-readable name of what a grant covers.
    async fn subject(&self, owner: &UserRecord, scope: GrantScope) -> Result<String> {
        Ok(match scope {
            GrantScope::Profile => format!("the profile of {}", owner.username),
            GrantScope::File(file_id) => match self.repo.get_file(file_id).await? {
                Some(file) => format!("the file {}", file.filename),
                None => format!("file {}", file_id),
            },
        })
    }

    async fn owned_file(&self, owner: UserId, file_id: FileId) -> Result<FileRecord> {
        match self.repo.get_file(file_id).await? {
            Some(file) if file.owner_id == owner => Ok(file),
            Some(_) => Err(VaultError::Unauthorized(format!(
                "file {} does not belong to {}",
                file_id, owner
            ))),
            None => Err(VaultError::NotFound(format!("file {}", file_id))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries and recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// True if `source` is `target` or holds a permission from `target`.
    pub async fn has_permission(&self, source: UserId, target: UserId) -> Result<bool> {
        if source == target {
            return Ok(true);
        }
        Ok(self.repo.find_permission(source, target).await?.is_some())
    }

    /// Requests sent by (`Outgoing`) or addressed to (`Incoming`) `user`.
    pub async fn list_notifications(
        &self,
        user: UserId,
        direction: Direction,
        status: Option<NotificationStatus>,
    ) -> Result<Vec<Notification>> {
        self.user(user).await?;
        Ok(self.repo.list_notifications(user, direction, status).await?)
    }

    /// Send the pair's share key to `requester` again.
    ///
    /// Only the owner side of the permission may do this. Returns the key as
    /// sent.
    pub async fn resend_share_key(&self, owner: UserId, requester: UserId) -> Result<TransportKey> {
        let permission = self
            .repo
            .find_permission(requester, owner)
            .await?
            .ok_or_else(|| {
                VaultError::NotFound(format!("permission from {} to {}", owner, requester))
            })?;
        let owner = self.user(owner).await?;
        let requester = self.user(requester).await?;

        let share = self.stored_share_key(&permission).await?;
        let transport = share.wrap_transport(&self.public_key(&requester)?)?;
        let body = share_key_body(&owner.username, "your shared resources", &transport.to_base64());
        self.notify(&requester, "Your share key", &body).await?;

        info!(permission = %permission.id, "share key re-sent");
        Ok(transport)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Share keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Unwrap a delivered share key with `user`'s private key.
    pub async fn unwrap_share_key(&self, user: UserId, presented: &TransportKey) -> Result<ShareKey> {
        let user = self.user(user).await?;
        let private_key = self.private_key(&user).await?;
        ShareKey::unwrap_transport(presented, &private_key)
            .map_err(|_| VaultError::Unauthorized("share key is not for this user".into()))
    }

    pub(crate) async fn stored_share_key(&self, permission: &PermissionRecord) -> Result<ShareKey> {
        let storage_key = self
            .resolve(KeyTable::Permission, &permission.key_reference)
            .await?;
        Ok(ShareKey::unwrap_stored(
            &self.guard,
            &storage_key,
            &permission.wrapped_key,
        )?)
    }

    /// Check a key presented by `reader` against the share key stored for
    /// (`reader`, `owner`).
    pub(crate) async fn presented_share_key(
        &self,
        reader: &UserRecord,
        owner: &UserRecord,
        presented: &TransportKey,
    ) -> Result<ShareKey> {
        let permission = self
            .repo
            .find_permission(reader.id, owner.id)
            .await?
            .ok_or_else(|| {
                warn!(reader = %reader.id, owner = %owner.id, "no permission");
                VaultError::Unauthorized(format!("{} has not granted access", owner.username))
            })?;

        let private_key = self.private_key(reader).await?;
        let unwrapped = ShareKey::unwrap_transport(presented, &private_key)
            .map_err(|_| VaultError::Unauthorized("key mismatch".into()))?;
        let stored = self.stored_share_key(&permission).await?;
        if unwrapped != stored {
            warn!(reader = %reader.id, owner = %owner.id, "presented key does not match");
            return Err(VaultError::Unauthorized("key mismatch".into()));
        }
        Ok(stored)
    }

    /// The permission and file grant giving `requester` access to `file`.
    pub(crate) async fn file_grant(
        &self,
        requester: UserId,
        file: &FileRecord,
    ) -> Result<Option<(PermissionRecord, FilePermissionRecord)>> {
        let Some(permission) = self.repo.find_permission(requester, file.owner_id).await? else {
            return Ok(None);
        };
        let grant = self
            .repo
            .find_file_permission(permission.id, file.id)
            .await?;
        Ok(grant.map(|g| (permission, g)))
    }
}
