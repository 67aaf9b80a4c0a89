//! Permission request state machine.
//!
//! ```text
//!            request                 accept
//!   (none) ──────────► Pending ─────────────► Accepted
//!                       ▲   │
//!               request │   │ reject
//!                       │   ▼
//!                      Rejected
//! ```
//!
//! A rejected request is re-opened in place rather than duplicated.
//! Accepted is terminal. A response is only valid while Pending.

use keyward_core::NotificationStatus;
use std::fmt;

use crate::error::{PermsError, Result};

/// Something a user does to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Request,
    Accept,
    Reject,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Request => "request",
            Action::Accept => "accept",
            Action::Reject => "reject",
        };
        f.write_str(name)
    }
}

/// The owner's answer to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub const fn action(&self) -> Action {
        match self {
            Decision::Accept => Action::Accept,
            Decision::Reject => Action::Reject,
        }
    }

    /// Status the notification moves to.
    pub const fn status(&self) -> NotificationStatus {
        match self {
            Decision::Accept => NotificationStatus::Accepted,
            Decision::Reject => NotificationStatus::Rejected,
        }
    }
}

/// What a new request does to the notification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPlan {
    /// No earlier request: insert a Pending row.
    Create,
    /// The latest request was rejected: set it back to Pending.
    Reopen,
}

/// Decide how to record a request given the latest notification status
/// for the same pair and scope.
pub fn plan_request(latest: Option<NotificationStatus>) -> Result<RequestPlan> {
    match latest {
        None => Ok(RequestPlan::Create),
        Some(NotificationStatus::Rejected) => Ok(RequestPlan::Reopen),
        Some(from) => Err(PermsError::InvalidTransition {
            from,
            action: Action::Request,
        }),
    }
}

/// Validate a response and return the new status.
pub fn respond(current: NotificationStatus, decision: Decision) -> Result<NotificationStatus> {
    match current {
        NotificationStatus::Pending => Ok(decision.status()),
        from => Err(PermsError::InvalidTransition {
            from,
            action: decision.action(),
        }),
    }
}
