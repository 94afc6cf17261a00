//! The parley proxy: admission, federation, and the four gRPC
//! services.
//!
//! Every inbound RPC passes through the admission pipeline in
//! [`admission`], which authenticates the caller and resolves who is
//! acting on what. Handlers receive that [`admission::Metadata`]
//! explicitly and either operate on the [`Repository`] (local
//! operand) or delegate to a [`federation::Peer`] (remote operand).
//!
//! # Modules
//!
//! - [`admission`] — per-RPC authentication and actor derivation.
//! - [`federation`] — outbound handles to peered proxies.
//! - [`auth_service`] — Signup / Finalise / Token.
//! - [`groups_service`] — membership, permissions, cross-domain ops.
//! - [`messaging_service`] — Send / Subscribe relay fabric.
//! - [`user_service`] — public keys and token management.
//! - [`server`] — wiring everything onto one listener.

pub mod admission;
pub mod auth_service;
pub mod federation;
pub mod groups_service;
pub mod messaging_service;
pub mod server;
pub mod user_service;

mod errors;

#[cfg(test)]
pub(crate) mod testutil;

use async_trait::async_trait;

use parley_crypto::{IdProbe, Minter};
use parley_store::Repository;
use parley_types::config::Configuration;

use crate::federation::PeerTable;

/// Shared, read-only-after-startup state behind every service.
pub struct Core<R> {
    pub config: Configuration,
    pub store: R,
    pub minter: Minter,
    pub peers: PeerTable,
}

impl<R: Repository> Core<R> {
    pub fn new(config: Configuration, store: R, peers: PeerTable) -> Self {
        let minter = Minter::new(config.domain_name.clone());
        Self {
            config,
            store,
            minter,
            peers,
        }
    }

    /// Collision probe over this core's repository, for minting.
    pub(crate) fn probe(&self) -> StoreProbe<'_, R> {
        StoreProbe(&self.store)
    }
}

/// Adapts the repository's `id_exists` to the minting probe seam.
pub(crate) struct StoreProbe<'a, R>(&'a R);

#[async_trait]
impl<R: Repository> IdProbe for StoreProbe<'_, R> {
    async fn id_exists(&self, id: &str) -> bool {
        self.0.id_exists(id).await
    }
}
