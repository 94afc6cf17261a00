//! Durable state and the per-identity message channel.
//!
//! Everything the proxy persists (users, groups, the token index)
//! goes through the [`Repository`] contract. The production
//! implementation is [`RedisStore`]; tests use the in-memory store
//! behind the `memory` feature. Mutation ordering is delegated to the
//! backend: concurrent writers to the same record race via
//! read-modify-write, and last write wins.
//!
//! # Modules
//!
//! - [`envelope`] — the self-describing channel payload codec.
//! - [`redis`] — Redis-backed [`Repository`].
//! - `memory` — deterministic in-process [`Repository`] (feature
//!   `memory`).

pub mod envelope;
pub mod redis;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use parley_types::{Group, User};

pub use envelope::Envelope;
pub use self::redis::RedisStore;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures surfaced by a [`Repository`] implementation.
///
/// Callers collapse these to the proxy's `general` error at the
/// admission and service boundaries; the variants exist so logs can
/// say what actually happened.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("backend error: {reason}")]
    Backend { reason: String },

    /// An insert hit an existing record.
    #[error("record already exists: {id}")]
    Exists { id: String },

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {reason}")]
    Codec { reason: String },
}

/// Convenience alias.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Byte payloads from a per-identity subscription, publish order.
pub type MessageStream = BoxStream<'static, Vec<u8>>;

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// The durable-state contract the rest of the proxy builds on.
///
/// Record semantics:
///
/// - Loading an unknown id yields the empty record (`id == ""`),
///   never an error; callers branch on `exists()`.
/// - `add_user` never overwrites.
/// - `id_exists` treats backend failure as "exists" so identity
///   minting retries instead of colliding on a flaky backend.
/// - `add_token` appends to the user record and inserts into the
///   token index; success means both writes landed.
/// - `delete_token` removes from the index only; the index is the
///   authority consulted on every authenticated call.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn add_user(&self, id: &str, totp_seed: &str, password_hash: &str) -> StoreResult<()>;

    async fn id_exists(&self, id: &str) -> bool;

    async fn load_user(&self, id: &str) -> StoreResult<User>;

    async fn save_user(&self, user: &User) -> StoreResult<()>;

    async fn add_token(&self, user_id: &str, token: &str) -> StoreResult<()>;

    async fn delete_token(&self, token: &str) -> StoreResult<()>;

    /// Token index lookup; `""` (not an error) on miss.
    async fn user_id_by_token(&self, token: &str) -> StoreResult<String>;

    async fn mark_finalised(&self, id: &str) -> StoreResult<()>;

    async fn add_group(
        &self,
        id: &str,
        owner: &str,
        is_open: bool,
        is_broadcast: bool,
    ) -> StoreResult<()>;

    async fn load_group(&self, id: &str) -> StoreResult<Group>;

    async fn save_group(&self, group: &Group) -> StoreResult<()>;

    /// Adds `user` to the member set; already-present and empty ids
    /// are no-ops.
    async fn join_group(&self, id: &str, user: &str) -> StoreResult<()>;

    /// Removes `user` from both the owner and member sets.
    async fn remove_from_group(&self, id: &str, user: &str) -> StoreResult<()>;

    /// Subscribes to the per-identity channel. The stream ends when
    /// the subscription is torn down or the backend signals an error.
    async fn messages(&self, user_id: &str) -> StoreResult<MessageStream>;

    /// Publishes one payload to the recipient's channel. Lossy when
    /// nobody is subscribed.
    async fn write_message(&self, recipient: &str, payload: Vec<u8>) -> StoreResult<()>;
}
