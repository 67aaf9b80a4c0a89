//! File, signing and profile flows.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keyward::core::{
    CipherMode, KeyTable, NotificationId, NotificationStatus, PermissionId, UserId,
};
use keyward::store::{
    BlobStore, Direction, FilePermissionRecord, FileRecord, GrantCommit, GrantOutcome,
    MemoryBlobStore, MemoryKeyStore, MemoryStore, Notification, PermissionRecord, Repository,
    StoreError, UserRecord,
};
use keyward::{verify_signed, Decision, Profile, Vault, VaultError};
use keyward_core::FileId;
use keyward_testkit::fixtures::{email, sample_profile, test_config, RecordingMailer, TestVault};

#[tokio::test]
async fn test_upload_and_owner_read() {
    let t = TestVault::new();
    let alice = t.register("alice").await;

    let file = t
        .upload_file(alice.id, "notes.txt", "text", b"plain notes")
        .await
        .unwrap();
    assert!(!file.is_signed);
    assert!(file.storage_path.starts_with("files/"));

    // Stored bytes are ciphertext.
    let stored = t.blobs().read(&file.storage_path).await.unwrap();
    assert_ne!(stored, b"plain notes");

    let opened = t.get_file(alice.id, file.id).await.unwrap();
    assert_eq!(opened.content, b"plain notes");
    assert_eq!(opened.file, file);
}

#[tokio::test]
async fn test_upload_rejects_empty_name_and_unknown_owner() {
    let t = TestVault::new();
    let alice = t.register("alice").await;

    assert!(matches!(
        t.upload_file(alice.id, " ", "text", b"x").await,
        Err(VaultError::InvalidInput(_))
    ));
    assert!(matches!(
        t.upload_file(keyward::UserId(77), "a", "text", b"x").await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_read_without_grant() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let file = t.upload_file(bob.id, "secret", "text", b"s").await.unwrap();

    assert!(matches!(
        t.get_file(alice.id, file.id).await,
        Err(VaultError::Unauthorized(_))
    ));
    assert!(matches!(
        t.get_file(alice.id, FileId(999)).await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_files_filters_and_annotates() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let doc = t.upload_file(bob.id, "a.pdf", "pdf", b"a").await.unwrap();
    t.upload_file(bob.id, "b.txt", "text", b"b").await.unwrap();

    let own = t.list_files(bob.id, "bob", None).await.unwrap();
    assert_eq!(own.len(), 2);
    assert!(own.iter().all(|entry| entry.grant.is_none()));

    let pdfs = t.list_files(alice.id, "bob", Some("pdf")).await.unwrap();
    assert_eq!(pdfs.len(), 1);
    assert!(pdfs[0].grant.is_none());

    let request = t.request_permission(alice.id, "bob", Some(doc.id)).await.unwrap();
    t.respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();

    let listing = t.list_files(alice.id, "bob", None).await.unwrap();
    let granted: Vec<_> = listing.iter().filter(|e| e.grant.is_some()).collect();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].file.id, doc.id);
}

#[tokio::test]
async fn test_delete_file() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let file = t.upload_file(alice.id, "gone", "text", b"bye").await.unwrap();

    assert!(matches!(
        t.delete_file(bob.id, file.id).await,
        Err(VaultError::Unauthorized(_))
    ));

    t.delete_file(alice.id, file.id).await.unwrap();
    assert!(matches!(
        t.get_file(alice.id, file.id).await,
        Err(VaultError::NotFound(_))
    ));
    assert!(t.blobs().read(&file.storage_path).await.is_err());
    // The key row is left behind.
    assert_eq!(t.keys().len(KeyTable::File), 1);
    assert!(matches!(
        t.delete_file(alice.id, file.id).await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_sign_and_verify() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let file = t
        .upload_file(alice.id, "contract.txt", "text", b"I agree.")
        .await
        .unwrap();

    let signed = t.sign_file(alice.id, file.id).await.unwrap();
    assert!(signed.is_signed);

    let metadata = t.verify_file(alice.id, file.id).await.unwrap();
    assert_eq!(metadata.signed_by, "alice");
    assert_eq!(metadata.contact, email("alice"));

    // The document keeps its original bytes ahead of the trailer.
    let content = t.get_file(alice.id, file.id).await.unwrap().content;
    assert!(content.starts_with(b"I agree.\n%SIGNATURE_DATA:"));
    assert_eq!(verify_signed(&content).unwrap(), metadata);
}

#[tokio::test]
async fn test_sign_twice_conflicts() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let file = t.upload_file(alice.id, "c", "text", b"x").await.unwrap();

    assert!(matches!(
        t.sign_file(bob.id, file.id).await,
        Err(VaultError::Unauthorized(_))
    ));
    t.sign_file(alice.id, file.id).await.unwrap();
    assert!(matches!(
        t.sign_file(alice.id, file.id).await,
        Err(VaultError::StateConflict(_))
    ));
}

#[tokio::test]
async fn test_corrupted_signature_fails() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let file = t.upload_file(alice.id, "c", "text", b"doc").await.unwrap();
    t.sign_file(alice.id, file.id).await.unwrap();

    let content = t.get_file(alice.id, file.id).await.unwrap().content;
    let marker = b"\n%SIGNATURE:";
    let at = content
        .windows(marker.len())
        .position(|w| w == marker)
        .unwrap()
        + marker.len();

    let mut corrupted = content.clone();
    corrupted[at] ^= 0x01;
    assert!(matches!(
        verify_signed(&corrupted),
        Err(keyward::core::GuardError::SignatureInvalid(_))
    ));

    let unsigned = t.upload_file(alice.id, "u", "text", b"plain").await.unwrap();
    assert!(matches!(
        t.verify_file(alice.id, unsigned.id).await,
        Err(VaultError::SignatureInvalid(_))
    ));
}

#[tokio::test]
async fn test_grantee_verifies_signed_copy() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let file = t.upload_file(bob.id, "deed", "text", b"deed").await.unwrap();
    t.sign_file(bob.id, file.id).await.unwrap();

    let request = t.request_permission(alice.id, "bob", Some(file.id)).await.unwrap();
    t.respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();

    let metadata = t.verify_file(alice.id, file.id).await.unwrap();
    assert_eq!(metadata.signed_by, "bob");
}

#[tokio::test]
async fn test_register_and_profile() {
    let t = TestVault::new();
    let alice = t.register("alice").await;

    // Sensitive fields are sealed, the username is not.
    assert_eq!(alice.profile.username, "alice");
    assert_eq!(alice.profile.fields.len(), 8);
    assert_eq!(t.keys().len(KeyTable::User), 1);

    assert_eq!(t.get_profile(alice.id).await.unwrap(), sample_profile("alice"));

    assert!(matches!(
        t.register_user(Profile::new("alice"), "h").await,
        Err(VaultError::StateConflict(_))
    ));
    assert!(matches!(
        t.register_user(Profile::new(""), "h").await,
        Err(VaultError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_update_profile() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    t.register("bob").await;

    let mut profile = t.get_profile(alice.id).await.unwrap();
    profile.address = "2 Other Road".into();
    profile.religion.clear();
    t.update_profile(alice.id, profile.clone()).await.unwrap();
    assert_eq!(t.get_profile(alice.id).await.unwrap(), profile);

    profile.username = "bob".into();
    assert!(matches!(
        t.update_profile(alice.id, profile.clone()).await,
        Err(VaultError::StateConflict(_))
    ));

    profile.username = "alicia".into();
    t.update_profile(alice.id, profile).await.unwrap();
    assert_eq!(
        t.repository()
            .get_user_by_username("alicia")
            .await
            .unwrap()
            .unwrap()
            .id,
        alice.id
    );
}

/// Memory repository whose `mark_signed` can be made to fail.
#[derive(Default)]
struct FlakyRepository {
    inner: MemoryStore,
    fail_mark_signed: AtomicBool,
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn insert_user(&self, user: UserRecord) -> keyward::store::Result<UserRecord> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, id: UserId) -> keyward::store::Result<Option<UserRecord>> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> keyward::store::Result<Option<UserRecord>> {
        self.inner.get_user_by_username(username).await
    }

    async fn update_user(&self, user: &UserRecord) -> keyward::store::Result<()> {
        self.inner.update_user(user).await
    }

    async fn insert_file(&self, file: FileRecord) -> keyward::store::Result<FileRecord> {
        self.inner.insert_file(file).await
    }

    async fn get_file(&self, id: FileId) -> keyward::store::Result<Option<FileRecord>> {
        self.inner.get_file(id).await
    }

    async fn list_files(
        &self,
        owner: UserId,
        file_type: Option<&str>,
    ) -> keyward::store::Result<Vec<FileRecord>> {
        self.inner.list_files(owner, file_type).await
    }

    async fn mark_signed(&self, id: FileId) -> keyward::store::Result<()> {
        if self.fail_mark_signed.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "database unavailable",
            )));
        }
        self.inner.mark_signed(id).await
    }

    async fn delete_file(&self, id: FileId) -> keyward::store::Result<()> {
        self.inner.delete_file(id).await
    }

    async fn insert_permission(
        &self,
        permission: PermissionRecord,
    ) -> keyward::store::Result<PermissionRecord> {
        self.inner.insert_permission(permission).await
    }

    async fn get_permission(
        &self,
        id: PermissionId,
    ) -> keyward::store::Result<Option<PermissionRecord>> {
        self.inner.get_permission(id).await
    }

    async fn find_permission(
        &self,
        source: UserId,
        target: UserId,
    ) -> keyward::store::Result<Option<PermissionRecord>> {
        self.inner.find_permission(source, target).await
    }

    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> keyward::store::Result<Notification> {
        self.inner.insert_notification(notification).await
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> keyward::store::Result<Option<Notification>> {
        self.inner.get_notification(id).await
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
    ) -> keyward::store::Result<()> {
        self.inner.update_notification_status(id, status).await
    }

    async fn latest_notification(
        &self,
        source: UserId,
        target: UserId,
        file: Option<FileId>,
    ) -> keyward::store::Result<Option<Notification>> {
        self.inner.latest_notification(source, target, file).await
    }

    async fn list_notifications(
        &self,
        user: UserId,
        direction: Direction,
        status: Option<NotificationStatus>,
    ) -> keyward::store::Result<Vec<Notification>> {
        self.inner.list_notifications(user, direction, status).await
    }

    async fn find_file_permission(
        &self,
        permission: PermissionId,
        file: FileId,
    ) -> keyward::store::Result<Option<FilePermissionRecord>> {
        self.inner.find_file_permission(permission, file).await
    }

    async fn list_file_permissions(
        &self,
        permission: PermissionId,
    ) -> keyward::store::Result<Vec<FilePermissionRecord>> {
        self.inner.list_file_permissions(permission).await
    }

    async fn commit_grant(&self, commit: GrantCommit) -> keyward::store::Result<GrantOutcome> {
        self.inner.commit_grant(commit).await
    }
}

#[tokio::test]
async fn test_sign_retry_after_unrecorded_signature() {
    let vault = Vault::new(
        test_config(CipherMode::Aes256Gcm),
        MemoryKeyStore::new(),
        FlakyRepository::default(),
        MemoryBlobStore::new(),
        RecordingMailer::new(),
    )
    .unwrap();
    let alice = vault
        .register_user(sample_profile("alice"), "hash")
        .await
        .unwrap();
    let file = vault
        .upload_file(alice.id, "lease.txt", "text", b"lease")
        .await
        .unwrap();

    vault.repository().fail_mark_signed.store(true, Ordering::SeqCst);
    let err = vault.sign_file(alice.id, file.id).await.unwrap_err();
    assert!(matches!(
        err,
        VaultError::SignatureUnrecorded { file: id, .. } if id == file.id
    ));
    assert!(!vault.get_file(alice.id, file.id).await.unwrap().file.is_signed);

    vault.repository().fail_mark_signed.store(false, Ordering::SeqCst);
    let signed = vault.sign_file(alice.id, file.id).await.unwrap();
    assert!(signed.is_signed);

    let content = vault.get_file(alice.id, file.id).await.unwrap().content;
    let marker = b"%SIGNATURE_DATA:";
    let trailers = content.windows(marker.len()).filter(|w| *w == marker).count();
    assert_eq!(trailers, 1);
    assert_eq!(vault.verify_file(alice.id, file.id).await.unwrap().signed_by, "alice");
}
