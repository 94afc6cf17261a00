//! Shared fixtures for unit tests: a core over the in-memory store,
//! peered with one remote domain that is never actually dialled.

use std::sync::Arc;

use tonic::metadata::MetadataMap;

use parley_store::memory::MemoryStore;
use parley_store::Repository;
use parley_types::config::{Configuration, FederationConfig};
use parley_types::Group;

use crate::federation::PeerTable;
use crate::Core;

pub(crate) const OTHER_PSK: &str = "psk-other";

/// A core for `example.com`, federated with `other.net`.
pub(crate) async fn peered_core() -> Arc<Core<MemoryStore>> {
    let config = Configuration {
        domain_name: "example.com".into(),
        federations: [(
            "other.net".to_string(),
            FederationConfig {
                connection_string: "http://127.0.0.1:19999".into(),
                psk: OTHER_PSK.into(),
            },
        )]
        .into_iter()
        .collect(),
        ..Configuration::default()
    };
    config.validate().unwrap();

    let peers = PeerTable::from_config(&config).unwrap();
    Arc::new(Core::new(config, MemoryStore::new(), peers))
}

/// Stores a user and one indexed token; returns the token.
pub(crate) async fn seed_user(core: &Core<MemoryStore>, id: &str, finalised: bool) -> String {
    core.store.add_user(id, "seed", "unused-hash").await.unwrap();
    if finalised {
        core.store.mark_finalised(id).await.unwrap();
    }

    let token = format!("tok-{id}");
    core.store.add_token(id, &token).await.unwrap();
    token
}

/// Stores a group record as given.
pub(crate) async fn seed_group(core: &Core<MemoryStore>, group: Group) {
    core.store.save_group(&group).await.unwrap();
}

/// Metadata carrying `authorization: bearer <token>`.
pub(crate) fn bearer(token: &str) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    metadata.insert(
        "authorization",
        format!("bearer {token}").parse().unwrap(),
    );
    metadata
}
