//! Qualified identity helpers.
//!
//! Identities are strings of the form `local@domain`; group identities
//! prefix the local part with `g:`. Domain equality against the
//! configured domain decides whether an identity is served here or by
//! a federated peer.

use crate::{ParleyError, Result};

/// Prefix that marks a group identity.
pub const GROUP_PREFIX: &str = "g:";

/// Extracts the domain part of a qualified identity.
///
/// Exactly one `@` is required; anything else is malformed input.
pub fn domain(id: &str) -> Result<&str> {
    let mut parts = id.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(d), None) => Ok(d),
        _ => Err(ParleyError::Input),
    }
}

/// True when `id` is shaped like a group identity.
pub fn is_group(id: &str) -> bool {
    id.len() > GROUP_PREFIX.len() && id.starts_with(GROUP_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_of_well_formed_identity() {
        assert_eq!(domain("alice@example.com"), Ok("example.com"));
        assert_eq!(domain("g:band-practice-aabb@other.net"), Ok("other.net"));
    }

    #[test]
    fn domain_requires_exactly_one_separator() {
        assert_eq!(domain("alice"), Err(ParleyError::Input));
        assert_eq!(domain("alice@one@two"), Err(ParleyError::Input));
        assert_eq!(domain(""), Err(ParleyError::Input));
    }

    #[test]
    fn group_shape() {
        assert!(is_group("g:band-practice-aabb@example.com"));
        assert!(!is_group("alice@example.com"));
        assert!(!is_group("g:"));
    }
}
