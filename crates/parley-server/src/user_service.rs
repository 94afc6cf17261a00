//! `User` service: public keys and token management.
//!
//! Key and token management only ever applies to local users: these
//! endpoints refuse peers. The PublicKey stream is the one exception:
//! peers read keys here on behalf of their own users, and requests
//! for users of a peered domain are proxied through to it.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use parley_proto::user_server::User;
use parley_proto::{PublicKeyRequest, PublicKeyValue, TokenList, TokenValue};
use parley_store::Repository;
use parley_types::{identity, ParleyError};

use crate::errors::{internal, to_status};
use crate::federation;
use crate::Core;

pub struct UserService<R> {
    core: Arc<Core<R>>,
}

impl<R> UserService<R> {
    pub fn new(core: Arc<Core<R>>) -> Self {
        Self { core }
    }
}

#[tonic::async_trait]
impl<R: Repository> User for UserService<R> {
    /// Appends a public key, dropping the oldest keys beyond the cap.
    async fn add_public_key(
        &self,
        request: Request<PublicKeyValue>,
    ) -> std::result::Result<Response<()>, Status> {
        let operator = self
            .core
            .admit_local(request.metadata())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        let mut user = self
            .core
            .store
            .load_user(&operator.id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        user.public_keys.push(req.value);
        let max = self.core.config.max_keys;
        if user.public_keys.len() >= max {
            let excess = user.public_keys.len() - max;
            user.public_keys.drain(..excess);
        }

        self.core
            .store
            .save_user(&user)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    /// Removes a stored key; removing an unknown key is a no-op.
    async fn del_public_key(
        &self,
        request: Request<PublicKeyValue>,
    ) -> std::result::Result<Response<()>, Status> {
        let operator = self
            .core
            .admit_local(request.metadata())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        let mut user = self
            .core
            .store
            .load_user(&operator.id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        user.public_keys.retain(|k| k != &req.value);

        self.core
            .store
            .save_user(&user)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    type PublicKeyStream =
        Pin<Box<dyn Stream<Item = std::result::Result<PublicKeyValue, Status>> + Send>>;

    /// Streams a user's stored keys, wherever that user lives.
    ///
    /// Groups have no keys of their own; clients keep per-member key
    /// stores instead.
    async fn public_key(
        &self,
        request: Request<PublicKeyRequest>,
    ) -> std::result::Result<Response<Self::PublicKeyStream>, Status> {
        let operator = self
            .core
            .authenticate(request.metadata())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        let owner = req.owner.ok_or(to_status(ParleyError::Input))?;
        if identity::is_group(&owner.id) {
            return Err(to_status(ParleyError::Input));
        }

        let domain = identity::domain(&owner.id).map_err(to_status)?;

        if domain == self.core.config.domain_name {
            let user = self
                .core
                .store
                .load_user(&owner.id)
                .await
                .map_err(|e| to_status(internal(e)))?;

            let keys: Vec<std::result::Result<PublicKeyValue, Status>> = user
                .public_keys
                .into_iter()
                .map(|value| Ok(PublicKeyValue { value }))
                .collect();

            return Ok(Response::new(Box::pin(tokio_stream::iter(keys))));
        }

        let peer = self
            .core
            .peers
            .get(domain)
            .ok_or(to_status(ParleyError::NotPeered))?;

        let inbound = peer
            .public_key(&operator.id, PublicKeyRequest { owner: Some(owner) })
            .await?;

        Ok(Response::new(Box::pin(
            inbound.map(|item| item.map_err(federation::clean)),
        )))
    }

    /// Lists the operator's token values for housekeeping.
    async fn tokens(
        &self,
        request: Request<()>,
    ) -> std::result::Result<Response<TokenList>, Status> {
        let operator = self
            .core
            .admit_local(request.metadata())
            .await
            .map_err(to_status)?;

        let user = self
            .core
            .store
            .load_user(&operator.id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(TokenList {
            values: user.tokens,
        }))
    }

    /// Revokes a token through the index, the authority every
    /// authenticated call consults.
    async fn del_token(
        &self,
        request: Request<TokenValue>,
    ) -> std::result::Result<Response<()>, Status> {
        self.core
            .admit_local(request.metadata())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        self.core
            .store
            .delete_token(&req.value)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }
}
