//! Property tests over a live vault.

use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};

use keyward::CipherMode;
use keyward_testkit::fixtures::TestVault;
use keyward_testkit::generators::payload;

fn check_upload_roundtrip(mode: CipherMode) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let t = TestVault::with_mode(mode);
    let alice = rt.block_on(t.register("alice"));

    let mut runner = TestRunner::new(Config::with_cases(32));
    runner
        .run(&payload(2048), |data| {
            let opened = rt.block_on(async {
                let file = t.upload_file(alice.id, "p", "bin", &data).await.unwrap();
                t.get_file(alice.id, file.id).await.unwrap()
            });
            prop_assert_eq!(opened.content, data);
            Ok(())
        })
        .unwrap();
}

#[test]
fn prop_upload_roundtrip_aes() {
    check_upload_roundtrip(CipherMode::Aes256Gcm);
}

#[test]
fn prop_upload_roundtrip_rc4() {
    check_upload_roundtrip(CipherMode::Rc4);
}

#[test]
fn prop_upload_roundtrip_des() {
    check_upload_roundtrip(CipherMode::DesEcb);
}

#[test]
fn prop_references_do_not_cross_vaults() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let first = TestVault::new();
    let second = TestVault::with_mode(CipherMode::Rc4);

    let mut runner = TestRunner::new(Config::with_cases(16));
    runner
        .run(&payload(256), |data| {
            let result = rt.block_on(async {
                let (ciphertext, reference) =
                    first.store_encrypted(keyward::UserId(1), &data).await.unwrap();
                second.fetch_decrypted(&reference, &ciphertext).await
            });
            prop_assert!(result.is_err());
            Ok(())
        })
        .unwrap();
}
