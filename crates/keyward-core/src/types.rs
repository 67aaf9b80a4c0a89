//! Strong identifier types.
//!
//! Every row in the resource repository is addressed by an integer id.
//! The ids are newtypes so a file id can never be passed where a user id
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw integer.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Identifier of a registered user.
    UserId
);
row_id!(
    /// Identifier of an uploaded file.
    FileId
);
row_id!(
    /// Identifier of a (source, target) permission row.
    PermissionId
);
row_id!(
    /// Identifier of a permission request notification.
    NotificationId
);
row_id!(
    /// Identifier of a per-file grant.
    FilePermissionId
);
row_id!(
    /// Identifier of a raw key row inside the key store.
    KeyId
);

/// Lifecycle state of a permission request.
///
/// Stored as its integer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NotificationStatus {
    Pending = 0,
    Rejected = 1,
    Accepted = 2,
}

impl NotificationStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NotificationStatus::Pending),
            1 => Some(NotificationStatus::Rejected),
            2 => Some(NotificationStatus::Accepted),
            _ => None,
        }
    }

    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Rejected => "rejected",
            NotificationStatus::Accepted => "accepted",
        };
        f.write_str(name)
    }
}
