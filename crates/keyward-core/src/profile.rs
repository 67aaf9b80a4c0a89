//! User profiles and the sensitive-field transform.
//!
//! Only the fields listed in [`SensitiveField::ALL`] are encrypted, each
//! one separately under the owner's user key. The username stays in the
//! clear because it is the lookup key of the user directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{GuardError, Result};
use crate::guard::Guard;
use crate::key::SymmetricKey;

/// Plaintext profile.
///
/// This is also the JSON snapshot shared with grantees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "phoneNumber")]
    pub phone_number: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub religion: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub birth_info: String,
}

/// Profile fields that are encrypted at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveField {
    Name,
    Email,
    PhoneNumber,
    Gender,
    Religion,
    Nationality,
    Address,
    BirthInfo,
}

impl SensitiveField {
    pub const ALL: [SensitiveField; 8] = [
        SensitiveField::Name,
        SensitiveField::Email,
        SensitiveField::PhoneNumber,
        SensitiveField::Gender,
        SensitiveField::Religion,
        SensitiveField::Nationality,
        SensitiveField::Address,
        SensitiveField::BirthInfo,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            SensitiveField::Name => "name",
            SensitiveField::Email => "email",
            SensitiveField::PhoneNumber => "phone_number",
            SensitiveField::Gender => "gender",
            SensitiveField::Religion => "religion",
            SensitiveField::Nationality => "nationality",
            SensitiveField::Address => "address",
            SensitiveField::BirthInfo => "birth_info",
        }
    }
}

impl fmt::Display for SensitiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Profile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: SensitiveField) -> &str {
        match field {
            SensitiveField::Name => &self.name,
            SensitiveField::Email => &self.email,
            SensitiveField::PhoneNumber => &self.phone_number,
            SensitiveField::Gender => &self.gender,
            SensitiveField::Religion => &self.religion,
            SensitiveField::Nationality => &self.nationality,
            SensitiveField::Address => &self.address,
            SensitiveField::BirthInfo => &self.birth_info,
        }
    }

    pub fn set(&mut self, field: SensitiveField, value: String) {
        let slot = match field {
            SensitiveField::Name => &mut self.name,
            SensitiveField::Email => &mut self.email,
            SensitiveField::PhoneNumber => &mut self.phone_number,
            SensitiveField::Gender => &mut self.gender,
            SensitiveField::Religion => &mut self.religion,
            SensitiveField::Nationality => &mut self.nationality,
            SensitiveField::Address => &mut self.address,
            SensitiveField::BirthInfo => &mut self.birth_info,
        };
        *slot = value;
    }

    /// Encrypt every non-empty sensitive field under `key`.
    pub fn seal(&self, guard: &Guard, key: &SymmetricKey) -> Result<SealedProfile> {
        let mut fields = BTreeMap::new();
        for field in SensitiveField::ALL {
            let value = self.get(field);
            if value.is_empty() {
                continue;
            }
            fields.insert(field, guard.encrypt(key, value.as_bytes())?);
        }

        Ok(SealedProfile {
            username: self.username.clone(),
            fields,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| GuardError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| GuardError::Serialization(e.to_string()))
    }
}

/// A profile as stored: username in the clear, sensitive fields encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedProfile {
    pub username: String,
    pub fields: BTreeMap<SensitiveField, Vec<u8>>,
}

impl SealedProfile {
    /// Decrypt all stored fields. Absent fields come back empty.
    pub fn open(&self, guard: &Guard, key: &SymmetricKey) -> Result<Profile> {
        let mut profile = Profile::new(self.username.clone());
        for (field, ciphertext) in &self.fields {
            let plaintext = guard.decrypt(key, ciphertext)?;
            let value = String::from_utf8(plaintext).map_err(|_| {
                GuardError::Serialization(format!("field {} is not utf-8", field))
            })?;
            profile.set(*field, value);
        }
        Ok(profile)
    }

    /// Encode to CBOR.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR encoding into Vec cannot fail");
        buf
    }

    /// Decode from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| GuardError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::CipherMode;

    fn guard() -> Guard {
        Guard::new(CipherMode::Aes256Gcm, SymmetricKey::from_bytes(vec![3u8; 32])).unwrap()
    }

    fn sample() -> Profile {
        Profile {
            username: "alice".into(),
            name: "Alice Liddell".into(),
            email: "alice@example.com".into(),
            phone_number: "+44 20 0000".into(),
            gender: "female".into(),
            religion: String::new(),
            nationality: "UK".into(),
            address: "Oxford".into(),
            birth_info: "1852-05-04".into(),
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let g = guard();
        let key = g.generate_key();
        let sealed = sample().seal(&g, &key).unwrap();
        assert_eq!(sealed.open(&g, &key).unwrap(), sample());
    }

    #[test]
    fn test_seal_skips_empty_and_hides_values() {
        let g = guard();
        let key = g.generate_key();
        let sealed = sample().seal(&g, &key).unwrap();
        assert_eq!(sealed.fields.len(), 7);
        assert!(!sealed.fields.contains_key(&SensitiveField::Religion));
        let stored = sealed.to_bytes();
        assert!(!stored.windows(6).any(|w| w == b"Oxford"));
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let g = guard();
        let sealed = sample().seal(&g, &g.generate_key()).unwrap();
        assert!(matches!(
            sealed.open(&g, &g.generate_key()),
            Err(GuardError::Integrity)
        ));
    }

    #[test]
    fn test_sealed_cbor_roundtrip() {
        let g = guard();
        let sealed = sample().seal(&g, &g.generate_key()).unwrap();
        let decoded = SealedProfile::from_bytes(&sealed.to_bytes()).unwrap();
        assert_eq!(decoded, sealed);
        assert!(SealedProfile::from_bytes(b"\xff\x00").is_err());
    }

    #[test]
    fn test_snapshot_json_field_names() {
        let json = String::from_utf8(sample().to_json().unwrap()).unwrap();
        assert!(json.contains("\"phoneNumber\""));
        assert!(json.contains("\"birth_info\""));
        assert_eq!(Profile::from_json(json.as_bytes()).unwrap(), sample());
    }

    #[test]
    fn test_every_field_settable() {
        let mut profile = Profile::new("bob");
        for field in SensitiveField::ALL {
            profile.set(field, field.to_string());
        }
        for field in SensitiveField::ALL {
            assert_eq!(profile.get(field), field.as_str());
        }
    }
}
