//! Credential and identity primitives for the parley proxy.
//!
//! # Modules
//!
//! - [`password`] — argon2id hashing and constant-time verification.
//! - [`totp`] — TOTP seed issuance and code validation (RFC 6238).
//! - [`mint`] — identity, group-identity, and token minting.
//! - [`wordlist`] — the embedded word list identities draw from.
//!
//! The proxy never holds long-term key material: everything here
//! operates on per-user secrets that live in the repository.

pub mod mint;
pub mod password;
pub mod totp;
pub mod wordlist;

pub use mint::{IdProbe, Minter};
