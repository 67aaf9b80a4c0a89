//! # Keyward Permissions
//!
//! The capability side of Keyward: how one user asks for access to
//! another user's profile or file, and how the owner's answer turns into
//! a key the requester can use.
//!
//! ## Key Concepts
//!
//! - **Notification**: a request, moving Pending → Accepted | Rejected
//! - **Share key**: one symmetric key per (requester, owner) pair, minted on
//!   the first accepted request and reused afterwards
//! - **Shared copy**: a resource re-encrypted under the share key and stored
//!   in the pair's share directory
//!
//! This crate is pure logic. The service layer in `keyward` drives it
//! against the store.

pub mod error;
pub mod grant;
pub mod notification;
pub mod sharekey;

pub use error::{PermsError, Result};
pub use grant::{share_dir, share_path, GrantScope, PROFILE_SNAPSHOT};
pub use notification::{plan_request, respond, Action, Decision, RequestPlan};
pub use sharekey::{ShareKey, TransportKey};
