//! What a grant covers and where its shared copy lives.
//!
//! Shared copies are stored under a directory named after the pair,
//! `{root}/{source}_{target}/`, so every copy readable with one share key
//! sits in one place.

use keyward_core::{FileId, UserId};
use serde::{Deserialize, Serialize};

/// File name of the profile snapshot inside a share directory.
pub const PROFILE_SNAPSHOT: &str = "profile.json";

/// The resource a request or grant is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantScope {
    Profile,
    File(FileId),
}

impl GrantScope {
    pub fn from_file(file: Option<FileId>) -> Self {
        file.map_or(GrantScope::Profile, GrantScope::File)
    }

    pub fn file_id(&self) -> Option<FileId> {
        match self {
            GrantScope::Profile => None,
            GrantScope::File(id) => Some(*id),
        }
    }

    pub fn is_profile(&self) -> bool {
        matches!(self, GrantScope::Profile)
    }
}

/// Share directory for a (source, target) pair.
pub fn share_dir(root: &str, source: UserId, target: UserId) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        format!("{}_{}", source, target)
    } else {
        format!("{}/{}_{}", root, source, target)
    }
}

/// Path of one shared copy inside the pair's directory.
pub fn share_path(root: &str, source: UserId, target: UserId, name: &str) -> String {
    format!("{}/{}", share_dir(root, source, target), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_paths() {
        assert_eq!(share_dir("files", UserId(3), UserId(9)), "files/3_9");
        assert_eq!(share_dir("files/", UserId(3), UserId(9)), "files/3_9");
        assert_eq!(share_dir("", UserId(3), UserId(9)), "3_9");
        assert_eq!(
            share_path("files", UserId(3), UserId(9), PROFILE_SNAPSHOT),
            "files/3_9/profile.json"
        );
    }

    #[test]
    fn test_pair_order_matters() {
        assert_ne!(
            share_dir("files", UserId(1), UserId(2)),
            share_dir("files", UserId(2), UserId(1))
        );
    }

    #[test]
    fn test_scope() {
        assert_eq!(GrantScope::from_file(None), GrantScope::Profile);
        assert_eq!(GrantScope::from_file(Some(FileId(4))).file_id(), Some(FileId(4)));
        assert!(GrantScope::Profile.is_profile());
    }
}
