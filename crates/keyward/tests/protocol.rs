//! Permission protocol scenarios over in-memory collaborators.

use keyward::store::{BlobStore, Direction, Repository};
use keyward::{Decision, IncompleteStage, NotificationStatus, VaultError};
use keyward_core::{CipherMode, FileId, NotificationId};
use keyward_testkit::fixtures::{email, TestVault};

#[tokio::test]
async fn test_profile_then_file_scenario() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let file = t
        .upload_file(bob.id, "report.pdf", "pdf", b"bob's original bytes")
        .await
        .unwrap();

    // Profile grant mints and delivers the share key.
    let request = t.request_permission(alice.id, "bob", None).await.unwrap();
    assert_eq!(request.status, NotificationStatus::Pending);
    let accepted = t
        .respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();
    assert!(accepted.key_delivered);
    assert_eq!(accepted.notification.status, NotificationStatus::Accepted);
    assert!(accepted.grant.as_ref().unwrap().file_permission.is_none());

    let keys = t.mailer.share_keys(&email("alice"));
    assert_eq!(keys.len(), 1);
    let shared = t.view_shared_profile(alice.id, "bob", &keys[0]).await.unwrap();
    assert_eq!(shared, t.get_profile(bob.id).await.unwrap());

    // File grant reuses it.
    let request = t
        .request_permission(alice.id, "bob", Some(file.id))
        .await
        .unwrap();
    let accepted = t
        .respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();
    assert!(!accepted.key_delivered);
    assert_eq!(t.mailer.share_keys(&email("alice")).len(), 1);

    let grant = accepted.grant.unwrap().file_permission.unwrap();
    assert_eq!(grant.file_id, file.id);
    assert!(grant
        .filepath
        .starts_with(&format!("files/{}_{}/", alice.id, bob.id)));

    let share = t.unwrap_share_key(alice.id, &keys[0]).await.unwrap();
    let copy = t.blobs().read(&grant.filepath).await.unwrap();
    assert_eq!(share.open(t.guard(), &copy).unwrap(), b"bob's original bytes");

    assert_eq!(
        t.get_file(alice.id, file.id).await.unwrap().content,
        b"bob's original bytes"
    );
    assert_eq!(
        t.open_shared_file(alice.id, file.id, &keys[0])
            .await
            .unwrap()
            .content,
        b"bob's original bytes"
    );
}

#[tokio::test]
async fn test_share_key_reused_across_files() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let one = t.upload_file(bob.id, "one.txt", "text", b"first").await.unwrap();
    let two = t.upload_file(bob.id, "two.txt", "text", b"second").await.unwrap();

    let r1 = t.request_permission(alice.id, "bob", Some(one.id)).await.unwrap();
    let r2 = t.request_permission(alice.id, "bob", Some(two.id)).await.unwrap();
    t.respond_permission_request(bob.id, r1.id, Decision::Accept)
        .await
        .unwrap();
    t.respond_permission_request(bob.id, r2.id, Decision::Accept)
        .await
        .unwrap();

    assert_eq!(t.repository().permission_count(), 1);
    assert_eq!(t.repository().file_permission_count(), 2);

    let keys = t.mailer.share_keys(&email("alice"));
    assert_eq!(keys.len(), 1);
    let share = t.unwrap_share_key(alice.id, &keys[0]).await.unwrap();

    let listing = t.list_files(alice.id, "bob", None).await.unwrap();
    assert_eq!(listing.len(), 2);
    for (entry, expected) in listing.iter().zip([&b"first"[..], &b"second"[..]]) {
        let grant = entry.grant.as_ref().unwrap();
        let copy = t.blobs().read(&grant.filepath).await.unwrap();
        assert_eq!(share.open(t.guard(), &copy).unwrap(), expected);
    }
}

#[tokio::test]
async fn test_request_twice_while_pending() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    t.register("bob").await;

    t.request_permission(alice.id, "bob", None).await.unwrap();
    let err = t.request_permission(alice.id, "bob", None).await.unwrap_err();
    assert!(matches!(err, VaultError::StateConflict(_)));
    assert_eq!(t.repository().notification_count(), 1);
}

#[tokio::test]
async fn test_rerequest_after_reject_reopens_same_row() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;

    let first = t.request_permission(alice.id, "bob", None).await.unwrap();
    let rejected = t
        .respond_permission_request(bob.id, first.id, Decision::Reject)
        .await
        .unwrap();
    assert_eq!(rejected.notification.status, NotificationStatus::Rejected);
    assert!(rejected.grant.is_none());

    let notices = t.mailer.sent_to(&email("alice"));
    assert_eq!(notices.len(), 1);
    assert!(notices[0].body.contains("declined"));
    assert!(t.mailer.share_keys(&email("alice")).is_empty());

    let again = t.request_permission(alice.id, "bob", None).await.unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.status, NotificationStatus::Pending);
    assert_eq!(t.repository().notification_count(), 1);
    assert_eq!(t.repository().permission_count(), 0);
}

#[tokio::test]
async fn test_respond_twice_fails() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;

    let request = t.request_permission(alice.id, "bob", None).await.unwrap();
    t.respond_permission_request(bob.id, request.id, Decision::Reject)
        .await
        .unwrap();
    let err = t
        .respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::StateConflict(_)));
}

#[tokio::test]
async fn test_respond_as_other_user() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    t.register("bob").await;
    let carol = t.register("carol").await;

    let request = t.request_permission(alice.id, "bob", None).await.unwrap();
    for intruder in [alice.id, carol.id] {
        let err = t
            .respond_permission_request(intruder, request.id, Decision::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));
    }

    let err = t
        .respond_permission_request(alice.id, NotificationId(999), Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
}

#[tokio::test]
async fn test_request_guards() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    t.register("carol").await;
    let own = t.upload_file(alice.id, "mine.txt", "text", b"x").await.unwrap();
    let bobs = t.upload_file(bob.id, "bobs.txt", "text", b"y").await.unwrap();

    assert!(matches!(
        t.request_permission(alice.id, "alice", None).await,
        Err(VaultError::StateConflict(_))
    ));
    assert!(matches!(
        t.request_permission(alice.id, "alice", Some(own.id)).await,
        Err(VaultError::StateConflict(_))
    ));
    // The file exists but carol does not own it.
    assert!(matches!(
        t.request_permission(alice.id, "carol", Some(bobs.id)).await,
        Err(VaultError::NotFound(_))
    ));
    assert!(matches!(
        t.request_permission(alice.id, "bob", Some(FileId(404))).await,
        Err(VaultError::NotFound(_))
    ));
    assert!(matches!(
        t.request_permission(alice.id, "nobody", None).await,
        Err(VaultError::NotFound(_))
    ));

    let request = t.request_permission(alice.id, "bob", Some(bobs.id)).await.unwrap();
    t.respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();
    assert!(matches!(
        t.request_permission(alice.id, "bob", Some(bobs.id)).await,
        Err(VaultError::StateConflict(_))
    ));

    // A file grant does not share the profile.
    let profile = t.request_permission(alice.id, "bob", None).await.unwrap();
    assert_eq!(profile.file_id, None);
}

#[tokio::test]
async fn test_file_grant_does_not_expose_profile() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let file = t.upload_file(bob.id, "f", "text", b"z").await.unwrap();

    let request = t.request_permission(alice.id, "bob", Some(file.id)).await.unwrap();
    t.respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();
    let key = t.mailer.share_keys(&email("alice")).remove(0);

    assert!(matches!(
        t.view_shared_profile(alice.id, "bob", &key).await,
        Err(VaultError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_shared_profile_key_mismatch() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let carol = t.register("carol").await;

    for owner in [&bob, &carol] {
        let request = t
            .request_permission(alice.id, &owner.username, None)
            .await
            .unwrap();
        t.respond_permission_request(owner.id, request.id, Decision::Accept)
            .await
            .unwrap();
    }
    let keys = t.mailer.share_keys(&email("alice"));
    assert_eq!(keys.len(), 2);

    // Carol's key does not open bob's profile.
    let err = t.view_shared_profile(alice.id, "bob", &keys[1]).await.unwrap_err();
    assert!(matches!(err, VaultError::Unauthorized(ref m) if m == "key mismatch"));

    // Nor can a user without a permission use alice's key.
    let err = t.view_shared_profile(carol.id, "bob", &keys[0]).await.unwrap_err();
    assert!(matches!(err, VaultError::Unauthorized(_)));

    // The owner reads their own profile without a key.
    let own = t.view_shared_profile(bob.id, "bob", &keys[0]).await.unwrap();
    assert_eq!(own.username, "bob");
}

#[tokio::test]
async fn test_failed_delivery_is_incomplete_and_resend_recovers() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;

    let request = t.request_permission(alice.id, "bob", None).await.unwrap();
    t.mailer.set_failing(true);
    let err = t
        .respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Incomplete {
            stage: IncompleteStage::Delivery,
            permission_persisted: true,
            ..
        }
    ));

    // The grant itself is committed.
    let stored = t.repository().get_notification(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Accepted);
    assert!(t.has_permission(alice.id, bob.id).await.unwrap());

    t.mailer.set_failing(false);
    let key = t.resend_share_key(bob.id, alice.id).await.unwrap();
    assert_eq!(t.mailer.share_keys(&email("alice")), vec![key.clone()]);
    assert_eq!(t.view_shared_profile(alice.id, "bob", &key).await.unwrap().username, "bob");

    // Only the owner side can re-send.
    assert!(matches!(
        t.resend_share_key(alice.id, bob.id).await,
        Err(VaultError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_has_permission() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;

    assert!(t.has_permission(alice.id, alice.id).await.unwrap());
    assert!(!t.has_permission(alice.id, bob.id).await.unwrap());

    let request = t.request_permission(alice.id, "bob", None).await.unwrap();
    t.respond_permission_request(bob.id, request.id, Decision::Accept)
        .await
        .unwrap();
    assert!(t.has_permission(alice.id, bob.id).await.unwrap());
    assert!(!t.has_permission(bob.id, alice.id).await.unwrap());
}

#[tokio::test]
async fn test_list_notifications() {
    let t = TestVault::new();
    let alice = t.register("alice").await;
    let bob = t.register("bob").await;
    let carol = t.register("carol").await;

    let to_bob = t.request_permission(alice.id, "bob", None).await.unwrap();
    t.request_permission(carol.id, "bob", None).await.unwrap();
    t.request_permission(alice.id, "carol", None).await.unwrap();
    t.respond_permission_request(bob.id, to_bob.id, Decision::Reject)
        .await
        .unwrap();

    let outgoing = t
        .list_notifications(alice.id, Direction::Outgoing, None)
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 2);

    let incoming = t
        .list_notifications(bob.id, Direction::Incoming, None)
        .await
        .unwrap();
    assert_eq!(incoming.len(), 2);

    let pending = t
        .list_notifications(bob.id, Direction::Incoming, Some(NotificationStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source_user_id, carol.id);
}

#[tokio::test]
async fn test_scenario_in_legacy_modes() {
    for mode in [CipherMode::Rc4, CipherMode::DesEcb] {
        let t = TestVault::with_mode(mode);
        let alice = t.register("alice").await;
        let bob = t.register("bob").await;
        let file = t.upload_file(bob.id, "f", "text", b"legacy payload").await.unwrap();

        let request = t.request_permission(alice.id, "bob", Some(file.id)).await.unwrap();
        t.respond_permission_request(bob.id, request.id, Decision::Accept)
            .await
            .unwrap();
        let key = t.mailer.share_keys(&email("alice")).remove(0);
        assert_eq!(
            t.open_shared_file(alice.id, file.id, &key).await.unwrap().content,
            b"legacy payload"
        );
    }
}
