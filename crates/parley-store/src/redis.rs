//! Redis-backed [`Repository`].
//!
//! Records are CBOR blobs keyed by their identity; the token index is
//! a single hash keyed by token value. Commands run over a shared
//! [`ConnectionManager`] (cheap to clone, reconnects internally);
//! every `messages` subscription gets its own pub/sub connection,
//! torn down when the returned stream is dropped.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;

use parley_types::{Group, User};

use crate::{MessageStream, Repository, StoreError, StoreResult};

/// Hash mapping token values to user ids.
const TOKEN_INDEX_KEY: &str = "tokens:ids";

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend {
        reason: e.to_string(),
    }
}

/// [`Repository`] over a Redis instance.
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis instance at `addr` (a `redis://` URL).
    pub async fn connect(addr: &str) -> StoreResult<Self> {
        let client = Client::open(addr).map_err(backend)?;
        let manager = client.get_connection_manager().await.map_err(backend)?;

        tracing::debug!("redis connection established");
        Ok(Self { client, manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Loads a record by primary key; a missing key yields the
    /// default (empty) record.
    async fn load<T>(&self, id: &str) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let bytes: Option<Vec<u8>> = self.conn().get(id).await.map_err(backend)?;

        match bytes {
            Some(bytes) => ciborium::from_reader(bytes.as_slice()).map_err(|e| StoreError::Codec {
                reason: e.to_string(),
            }),
            None => Ok(T::default()),
        }
    }

    async fn save<T: Serialize>(&self, id: &str, record: &T) -> StoreResult<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(record, &mut bytes).map_err(|e| StoreError::Codec {
            reason: e.to_string(),
        })?;

        let _: () = self.conn().set(id, bytes).await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl Repository for RedisStore {
    async fn add_user(&self, id: &str, totp_seed: &str, password_hash: &str) -> StoreResult<()> {
        let user = User {
            id: id.to_string(),
            password_hash: password_hash.to_string(),
            totp_seed: totp_seed.to_string(),
            ..User::default()
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(&user, &mut bytes).map_err(|e| StoreError::Codec {
            reason: e.to_string(),
        })?;

        // NX: minting already probed for collisions, but the record
        // must still never be clobbered by a racing signup.
        let created: bool = self.conn().set_nx(id, bytes).await.map_err(backend)?;
        if !created {
            return Err(StoreError::Exists { id: id.to_string() });
        }

        Ok(())
    }

    async fn id_exists(&self, id: &str) -> bool {
        // A flaky backend reads as "taken" so minting retries rather
        // than risking a collision.
        match self.load::<User>(id).await {
            Ok(user) => user.exists(),
            Err(_) => true,
        }
    }

    async fn load_user(&self, id: &str) -> StoreResult<User> {
        self.load(id).await
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.save(&user.id, user).await
    }

    async fn add_token(&self, user_id: &str, token: &str) -> StoreResult<()> {
        let mut user = self.load_user(user_id).await?;
        if !user.exists() {
            return Err(StoreError::Backend {
                reason: format!("no such user {user_id}"),
            });
        }

        user.tokens.push(token.to_string());
        self.save_user(&user).await?;

        // The record write above lands first; if this index write
        // fails the orphaned token is purged on its next use.
        let _: () = self
            .conn()
            .hset(TOKEN_INDEX_KEY, token, user_id)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> StoreResult<()> {
        let _: () = self
            .conn()
            .hdel(TOKEN_INDEX_KEY, token)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn user_id_by_token(&self, token: &str) -> StoreResult<String> {
        let id: Option<String> = self
            .conn()
            .hget(TOKEN_INDEX_KEY, token)
            .await
            .map_err(backend)?;

        Ok(id.unwrap_or_default())
    }

    async fn mark_finalised(&self, id: &str) -> StoreResult<()> {
        let mut user = self.load_user(id).await?;
        if !user.exists() {
            return Err(StoreError::Backend {
                reason: format!("no such user {id}"),
            });
        }

        if user.finalised {
            return Ok(());
        }

        user.finalised = true;
        self.save_user(&user).await
    }

    async fn add_group(
        &self,
        id: &str,
        owner: &str,
        is_open: bool,
        is_broadcast: bool,
    ) -> StoreResult<()> {
        let group = Group {
            id: id.to_string(),
            owners: vec![owner.to_string()],
            members: vec![owner.to_string()],
            is_open,
            is_broadcast,
        };

        self.save_group(&group).await
    }

    async fn load_group(&self, id: &str) -> StoreResult<Group> {
        self.load(id).await
    }

    async fn save_group(&self, group: &Group) -> StoreResult<()> {
        self.save(&group.id, group).await
    }

    async fn join_group(&self, id: &str, user: &str) -> StoreResult<()> {
        let mut group = self.load_group(id).await?;
        if !group.exists() {
            return Err(StoreError::Backend {
                reason: format!("no such group {id}"),
            });
        }

        if user.is_empty() || group.members.iter().any(|m| m == user) {
            return Ok(());
        }

        group.members.push(user.to_string());
        self.save_group(&group).await
    }

    async fn remove_from_group(&self, id: &str, user: &str) -> StoreResult<()> {
        let mut group = self.load_group(id).await?;
        if !group.exists() {
            return Err(StoreError::Backend {
                reason: format!("no such group {id}"),
            });
        }

        group.owners.retain(|o| o != user);
        group.members.retain(|m| m != user);
        self.save_group(&group).await
    }

    async fn messages(&self, user_id: &str) -> StoreResult<MessageStream> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(backend)?;
        pubsub.subscribe(user_id).await.map_err(backend)?;

        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed())
    }

    async fn write_message(&self, recipient: &str, payload: Vec<u8>) -> StoreResult<()> {
        let _: () = self
            .conn()
            .publish(recipient, payload)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
