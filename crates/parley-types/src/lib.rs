//! Core shared types for the parley federated messaging proxy.
//!
//! This crate defines the domain model used across the workspace:
//! user and group records, the group permission matrix, qualified
//! identity helpers, configuration, and the central error type.
//! No other crate should define shared types — everything lives here.

pub mod config;
pub mod identity;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A durable user record.
///
/// A user exists iff `id` is non-empty; loading an unknown id yields
/// `User::default()` rather than an error, so callers branch on
/// [`User::exists`]. `public_keys` is FIFO-bounded by the configured
/// key cap; `finalised` transitions false→true exactly once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Qualified identity, `local@domain`.
    pub id: String,
    /// Argon2id PHC hash of the signup password.
    pub password_hash: String,
    /// Base32 TOTP seed issued at signup.
    pub totp_seed: String,
    /// Whether the second-factor proof completed signup.
    pub finalised: bool,
    /// Bearer tokens minted for this user, oldest first.
    pub tokens: Vec<String>,
    /// Published public keys, oldest first.
    pub public_keys: Vec<String>,
}

impl User {
    /// True when this record refers to a stored user.
    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A durable group record.
///
/// The creator is inserted into both `owners` and `members` at
/// creation. Owners are authoritative whether or not they also appear
/// in `members`; `members` is the set messages fan out to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Qualified group identity, `g:local@domain`.
    pub id: String,
    pub owners: Vec<String>,
    pub members: Vec<String>,
    /// Open groups may be joined without an invitation.
    pub is_open: bool,
    /// Broadcast groups silence non-owner members for read and post.
    pub is_broadcast: bool,
}

/// An operation a user may attempt against a group, as evaluated by
/// [`Group::permits`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupOp {
    Read,
    Post,
    Join,
    Modify,
    Leave,
}

impl Group {
    /// True when this record refers to a stored group.
    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    fn is_owner(&self, user: &str) -> bool {
        self.owners.iter().any(|o| o == user)
    }

    fn is_member(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user)
    }

    /// Evaluates the group permission matrix.
    ///
    /// Leave is always permitted. Owners may do anything. Join is the
    /// only operation available to a non-member, and only when the
    /// group is open. Members of a broadcast group may neither read
    /// nor post; members of a normal group may do both. Nobody but an
    /// owner may modify.
    pub fn permits(&self, user: &str, op: GroupOp) -> bool {
        if op == GroupOp::Leave {
            return true;
        }

        if self.is_owner(user) {
            return true;
        }

        if !self.is_member(user) {
            // Join is the only thing a non-member can attempt, and it
            // is still subject to the open check below.
            if op != GroupOp::Join {
                return false;
            }
        }

        if op == GroupOp::Join && self.is_open {
            return true;
        }

        if !self.is_broadcast && (op == GroupOp::Read || op == GroupOp::Post) {
            return true;
        }

        false
    }
}

// ---------------------------------------------------------------------------
// ParleyError
// ---------------------------------------------------------------------------

/// Central error type for the proxy.
///
/// Variants are semantic: each maps to exactly one transport status at
/// the RPC edge. `BadGroup` is deliberately opaque: it covers both a
/// missing group and a denied operation so callers cannot probe for
/// group existence.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParleyError {
    #[error("missing or unreadable bearer token")]
    Unauthenticated,

    #[error("must finalise signup")]
    NeedFinalise,

    #[error("incorrect password or user id")]
    BadPassword,

    #[error("incorrect totp token")]
    BadTotp,

    #[error("password must be between 16 and 64 characters")]
    PasswordPolicy,

    #[error("missing or poorly formed input")]
    Input,

    #[error("sender does not match the authenticated operator")]
    MismatchedSender,

    #[error("operator id is not from the peer's domain")]
    MismatchedDomain,

    #[error("group could not be found")]
    BadGroup,

    #[error("user could not be found")]
    BadUser,

    #[error("recipient is on a non-peered domain")]
    NotPeered,

    #[error("unable to connect to peer")]
    InaccessiblePeer,

    #[error("an internal error occurred")]
    General,
}

/// Convenience result type using [`ParleyError`].
pub type Result<T> = std::result::Result<T, ParleyError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn group(open: bool, broadcast: bool) -> Group {
        Group {
            id: "g:test-group-aabbccdd@example.com".into(),
            owners: vec!["owner@example.com".into()],
            members: vec!["owner@example.com".into(), "member@example.com".into()],
            is_open: open,
            is_broadcast: broadcast,
        }
    }

    #[test]
    fn owner_may_do_anything() {
        let g = group(false, false);
        for op in [
            GroupOp::Read,
            GroupOp::Post,
            GroupOp::Join,
            GroupOp::Modify,
            GroupOp::Leave,
        ] {
            assert!(g.permits("owner@example.com", op), "owner denied {op:?}");
        }
    }

    #[test]
    fn member_of_normal_group_reads_and_posts() {
        let g = group(false, false);
        assert!(g.permits("member@example.com", GroupOp::Read));
        assert!(g.permits("member@example.com", GroupOp::Post));
        assert!(!g.permits("member@example.com", GroupOp::Modify));
    }

    #[test]
    fn member_of_broadcast_group_is_silenced() {
        let g = group(false, true);
        assert!(!g.permits("member@example.com", GroupOp::Read));
        assert!(!g.permits("member@example.com", GroupOp::Post));
        assert!(g.permits("member@example.com", GroupOp::Leave));
    }

    #[test]
    fn non_member_may_only_join_open_groups() {
        let closed = group(false, false);
        assert!(!closed.permits("drifter@example.com", GroupOp::Join));
        assert!(!closed.permits("drifter@example.com", GroupOp::Read));
        assert!(!closed.permits("drifter@example.com", GroupOp::Post));
        assert!(!closed.permits("drifter@example.com", GroupOp::Modify));

        let open = group(true, false);
        assert!(open.permits("drifter@example.com", GroupOp::Join));
        assert!(!open.permits("drifter@example.com", GroupOp::Read));
    }

    #[test]
    fn leave_is_always_permitted() {
        let g = group(false, true);
        assert!(g.permits("drifter@example.com", GroupOp::Leave));
        assert!(g.permits("member@example.com", GroupOp::Leave));
        assert!(g.permits("owner@example.com", GroupOp::Leave));
    }

    #[test]
    fn owner_outside_member_set_is_still_owner() {
        let mut g = group(false, true);
        g.members.retain(|m| m != "owner@example.com");
        assert!(g.permits("owner@example.com", GroupOp::Read));
        assert!(g.permits("owner@example.com", GroupOp::Modify));
    }

    #[test]
    fn empty_records_do_not_exist() {
        assert!(!User::default().exists());
        assert!(!Group::default().exists());
        assert!(User {
            id: "someone@example.com".into(),
            ..User::default()
        }
        .exists());
    }

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            ParleyError::BadGroup.to_string(),
            "group could not be found"
        );
        assert_eq!(
            ParleyError::NotPeered.to_string(),
            "recipient is on a non-peered domain"
        );
    }
}
