//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keyward_core::{CipherMode, Guard, NotificationStatus, Profile, SymmetricKey};
use keyward_perms::Decision;

/// Any supported cipher mode.
pub fn cipher_mode() -> impl Strategy<Value = CipherMode> {
    prop_oneof![
        Just(CipherMode::Aes256Gcm),
        Just(CipherMode::Rc4),
        Just(CipherMode::DesEcb),
    ]
}

/// A guard with a random metadata key of the right length.
pub fn guard() -> impl Strategy<Value = Guard> {
    (cipher_mode(), any::<[u8; 32]>()).prop_map(|(mode, seed)| {
        let key = SymmetricKey::from_bytes(seed[..mode.key_len()].to_vec());
        Guard::new(mode, key).unwrap()
    })
}

/// Payload bytes up to `max_len`, including empty.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

pub fn notification_status() -> impl Strategy<Value = NotificationStatus> {
    prop_oneof![
        Just(NotificationStatus::Pending),
        Just(NotificationStatus::Rejected),
        Just(NotificationStatus::Accepted),
    ]
}

pub fn decision() -> impl Strategy<Value = Decision> {
    prop_oneof![Just(Decision::Accept), Just(Decision::Reject)]
}

/// A username accepted by registration.
pub fn username() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,15}"
}

/// A profile with arbitrary (possibly empty) sensitive fields.
pub fn profile() -> impl Strategy<Value = Profile> {
    let field = || "[ -~]{0,24}";
    (
        username(),
        (field(), field(), field(), field()),
        (field(), field(), field(), field()),
    )
        .prop_map(
            |(username, (name, email, phone_number, gender), (religion, nationality, address, birth_info))| {
                Profile {
                    username,
                    name,
                    email,
                    phone_number,
                    gender,
                    religion,
                    nationality,
                    address,
                    birth_info,
                }
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_guard_roundtrip(g in guard(), data in payload(256)) {
            let key = g.generate_key();
            let sealed = g.encrypt(&key, &data).unwrap();
            prop_assert_eq!(g.decrypt(&key, &sealed).unwrap(), data);
        }

        #[test]
        fn prop_profile_seal_roundtrip(g in guard(), p in profile()) {
            let key = g.generate_key();
            let sealed = p.seal(&g, &key).unwrap();
            prop_assert_eq!(sealed.open(&g, &key).unwrap(), p);
        }
    }
}
