//! Deterministic in-process [`Repository`] for tests.
//!
//! Mirrors the backend semantics the proxy depends on: empty records
//! on miss, conservative `id_exists` under injected failure, lossy
//! per-identity channels with no replay (broadcast channels drop the
//! payload when nobody subscribes). Test-only helpers fabricate the
//! inconsistent states the admission pipeline must heal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use parley_types::{Group, User};

use crate::{MessageStream, Repository, StoreError, StoreResult};

/// Buffered payloads per subscriber before the channel drops messages.
const CHANNEL_CAPACITY: usize = 64;

/// In-memory [`Repository`].
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    groups: Mutex<HashMap<String, Group>>,
    token_index: Mutex<HashMap<String, String>>,
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent backend operation fail, as a flaky or
    /// unreachable backend would.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Deletes a user record while leaving any token-index entries in
    /// place, producing the stale-token state.
    pub fn remove_user(&self, id: &str) {
        self.users.lock().unwrap().remove(id);
    }

    /// Inserts a raw token-index entry without touching user records.
    pub fn index_token(&self, token: &str, user_id: &str) {
        self.token_index
            .lock()
            .unwrap()
            .insert(token.to_string(), user_id.to_string());
    }

    /// True when the token index still holds `token`.
    pub fn token_indexed(&self, token: &str) -> bool {
        self.token_index.lock().unwrap().contains_key(token)
    }

    /// Number of stored user records.
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn sender_for(&self, id: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn add_user(&self, id: &str, totp_seed: &str, password_hash: &str) -> StoreResult<()> {
        self.check()?;

        let mut users = self.users.lock().unwrap();
        if users.contains_key(id) {
            return Err(StoreError::Exists { id: id.to_string() });
        }

        users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                password_hash: password_hash.to_string(),
                totp_seed: totp_seed.to_string(),
                ..User::default()
            },
        );
        Ok(())
    }

    async fn id_exists(&self, id: &str) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }

        self.users.lock().unwrap().contains_key(id)
    }

    async fn load_user(&self, id: &str) -> StoreResult<User> {
        self.check()?;
        Ok(self.users.lock().unwrap().get(id).cloned().unwrap_or_default())
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.check()?;
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn add_token(&self, user_id: &str, token: &str) -> StoreResult<()> {
        self.check()?;

        {
            let mut users = self.users.lock().unwrap();
            let user = users.get_mut(user_id).ok_or_else(|| StoreError::Backend {
                reason: format!("no such user {user_id}"),
            })?;
            user.tokens.push(token.to_string());
        }

        self.index_token(token, user_id);
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> StoreResult<()> {
        self.check()?;
        self.token_index.lock().unwrap().remove(token);
        Ok(())
    }

    async fn user_id_by_token(&self, token: &str) -> StoreResult<String> {
        self.check()?;
        Ok(self
            .token_index
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_finalised(&self, id: &str) -> StoreResult<()> {
        self.check()?;

        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(id).ok_or_else(|| StoreError::Backend {
            reason: format!("no such user {id}"),
        })?;
        user.finalised = true;
        Ok(())
    }

    async fn add_group(
        &self,
        id: &str,
        owner: &str,
        is_open: bool,
        is_broadcast: bool,
    ) -> StoreResult<()> {
        self.check()?;

        self.groups.lock().unwrap().insert(
            id.to_string(),
            Group {
                id: id.to_string(),
                owners: vec![owner.to_string()],
                members: vec![owner.to_string()],
                is_open,
                is_broadcast,
            },
        );
        Ok(())
    }

    async fn load_group(&self, id: &str) -> StoreResult<Group> {
        self.check()?;
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_group(&self, group: &Group) -> StoreResult<()> {
        self.check()?;
        self.groups
            .lock()
            .unwrap()
            .insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn join_group(&self, id: &str, user: &str) -> StoreResult<()> {
        self.check()?;

        let mut groups = self.groups.lock().unwrap();
        let group = groups.get_mut(id).ok_or_else(|| StoreError::Backend {
            reason: format!("no such group {id}"),
        })?;

        if !user.is_empty() && !group.members.iter().any(|m| m == user) {
            group.members.push(user.to_string());
        }
        Ok(())
    }

    async fn remove_from_group(&self, id: &str, user: &str) -> StoreResult<()> {
        self.check()?;

        let mut groups = self.groups.lock().unwrap();
        let group = groups.get_mut(id).ok_or_else(|| StoreError::Backend {
            reason: format!("no such group {id}"),
        })?;

        group.owners.retain(|o| o != user);
        group.members.retain(|m| m != user);
        Ok(())
    }

    async fn messages(&self, user_id: &str) -> StoreResult<MessageStream> {
        self.check()?;

        let rx = self.sender_for(user_id).subscribe();
        Ok(BroadcastStream::new(rx)
            .filter_map(|item| async move { item.ok() })
            .boxed())
    }

    async fn write_message(&self, recipient: &str, payload: Vec<u8>) -> StoreResult<()> {
        self.check()?;

        // A send without subscribers errors; that is exactly the
        // lossy no-subscriber semantics of the real channel.
        let _ = self.sender_for(recipient).send(payload);
        Ok(())
    }
}
