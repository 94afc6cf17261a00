//! The admission pipeline: per-RPC authentication, operator
//! derivation, and operand resolution.
//!
//! Handlers invoke the pipeline explicitly and receive the derived
//! [`Metadata`] as a value; nothing rides along hidden in a request
//! context. Three strata:
//!
//! 1. **Authenticate** — classify the bearer token as a local user
//!    token or a peer PSK and derive the operator [`Actor`].
//! 2. **Validate operator** — cross-check any sender the request
//!    declares, and pin peer-supplied operator ids to the peer's own
//!    domain.
//! 3. **Resolve operand** — locate the entity being operated on,
//!    locally or behind a peered domain.
//!
//! Federatable endpoints (Send, all Groups operations) run all three;
//! user endpoints stop after authentication. Request shapes expose
//! their operand through the [`Federated`] capability trait rather
//! than a type switch.

use tonic::metadata::MetadataMap;

use parley_store::Repository;
use parley_types::{identity, ParleyError, Result};

use crate::errors::internal;
use crate::federation::Peer;
use crate::Core;

/// Header a relaying proxy uses to name the originating operator.
pub const OPERATOR_ID_HEADER: &str = "operator_id";

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// A request-scoped identity: either a local user (trusted through
/// token ownership) or an identity forwarded by a peered proxy
/// (trusted only as far as its domain).
#[derive(Clone, Debug)]
pub struct Actor {
    pub id: String,
    pub is_local: bool,
    /// Set on remote actors: the handle for the domain they live on.
    pub peer: Option<Peer>,
}

impl Actor {
    fn local(id: String) -> Self {
        Self {
            id,
            is_local: true,
            peer: None,
        }
    }

    fn remote(id: String, peer: Peer) -> Self {
        Self {
            id,
            is_local: false,
            peer: Some(peer),
        }
    }
}

/// What the pipeline derives for a fully federatable request.
pub struct Metadata {
    /// Who is acting.
    pub operator: Actor,
    /// What is being acted on: a message recipient or a group.
    pub operand: Actor,
}

// ---------------------------------------------------------------------------
// Federated capability
// ---------------------------------------------------------------------------

/// Implemented by request types that take the full pipeline.
///
/// `operand_id` names the entity operated on; `declared_sender` is the
/// sender field on shapes that carry one, which Stratum B cross-checks
/// against the authenticated operator.
pub trait Federated {
    fn operand_id(&self) -> Option<&str>;

    fn declared_sender(&self) -> Option<&str> {
        None
    }

    /// True when the shape must carry a sender (message wrappers).
    fn requires_sender(&self) -> bool {
        false
    }
}

macro_rules! group_operand {
    ($($ty:ty),+ $(,)?) => {
        $(impl Federated for $ty {
            fn operand_id(&self) -> Option<&str> {
                Some(&self.group_id)
            }
        })+
    };
}

group_operand!(
    parley_proto::JoinRequest,
    parley_proto::InfoRequest,
    parley_proto::InviteRequest,
    parley_proto::PromoteRequest,
    parley_proto::DemoteRequest,
    parley_proto::LeaveRequest,
);

impl Federated for parley_proto::MessageWrapper {
    fn operand_id(&self) -> Option<&str> {
        self.recipient.as_ref().map(|r| r.id.as_str())
    }

    fn declared_sender(&self) -> Option<&str> {
        self.sender.as_ref().map(|s| s.id.as_str())
    }

    fn requires_sender(&self) -> bool {
        true
    }
}

// Group creation has no operand: the group id is minted later.
impl Federated for parley_proto::Group {
    fn operand_id(&self) -> Option<&str> {
        None
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

impl<R: Repository> Core<R> {
    /// Stratum A: classifies the bearer token and derives the
    /// operator.
    ///
    /// A token that resolves through the index to a missing user is
    /// stale; it is purged here so the state heals on encounter.
    pub async fn authenticate(&self, metadata: &MetadataMap) -> Result<Actor> {
        let token = bearer_token(metadata)?;

        let id = self
            .store
            .user_id_by_token(&token)
            .await
            .map_err(internal)?;

        if !id.is_empty() {
            let user = self.store.load_user(&id).await;
            match user {
                Ok(user) if user.exists() => {
                    if !user.finalised {
                        return Err(ParleyError::NeedFinalise);
                    }

                    return Ok(Actor::local(id));
                }
                _ => {
                    tracing::debug!(user = %id, "purging stale token");
                    self.store.delete_token(&token).await.map_err(internal)?;

                    return Err(ParleyError::Unauthenticated);
                }
            }
        }

        let peer = match self.peers.by_psk(&token) {
            Some(peer) => peer.clone(),
            None => return Err(ParleyError::NotPeered),
        };

        let operator_id = metadata
            .get(OPERATOR_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if operator_id.is_empty() {
            return Err(ParleyError::Input);
        }

        Ok(Actor::remote(operator_id.to_string(), peer))
    }

    /// Stratum B: validates the operator against the request shape.
    ///
    /// Local operators are trusted by token ownership; a declared
    /// sender must still match them. Peer-forwarded operators must at
    /// least come from the peer's own domain; the peer has already
    /// validated the rest.
    pub fn validate_operator<F: Federated>(&self, operator: &Actor, request: &F) -> Result<()> {
        if operator.id.is_empty() {
            return Err(ParleyError::Input);
        }

        match request.declared_sender() {
            Some(sender) if sender != operator.id => return Err(ParleyError::MismatchedSender),
            None if request.requires_sender() => return Err(ParleyError::Input),
            _ => {}
        }

        if operator.is_local {
            return Ok(());
        }

        let domain = identity::domain(&operator.id).map_err(|_| ParleyError::Input)?;
        match &operator.peer {
            Some(peer) if peer.domain() == domain => Ok(()),
            Some(_) => Err(ParleyError::MismatchedDomain),
            None => Err(ParleyError::Input),
        }
    }

    /// Stratum C: resolves the operand to our domain or a peer.
    pub fn resolve_operand(&self, id: &str) -> Result<Actor> {
        if id.is_empty() {
            return Err(ParleyError::Input);
        }

        let domain = identity::domain(id).map_err(|_| ParleyError::Input)?;
        if domain == self.config.domain_name {
            return Ok(Actor::local(id.to_string()));
        }

        match self.peers.get(domain) {
            Some(peer) => Ok(Actor::remote(id.to_string(), peer.clone())),
            None => Err(ParleyError::NotPeered),
        }
    }

    /// The full pipeline for federatable endpoints.
    pub async fn admit_federated<F: Federated>(
        &self,
        metadata: &MetadataMap,
        request: &F,
    ) -> Result<Metadata> {
        let operator = self.authenticate(metadata).await?;
        self.validate_operator(&operator, request)?;

        let operand_id = request.operand_id().ok_or(ParleyError::Input)?;
        let operand = self.resolve_operand(operand_id)?;

        Ok(Metadata { operator, operand })
    }

    /// Stratum A plus a local-user requirement, for the non-federated
    /// user endpoints.
    pub async fn admit_local(&self, metadata: &MetadataMap) -> Result<Actor> {
        let operator = self.authenticate(metadata).await?;
        if !operator.is_local {
            return Err(ParleyError::Input);
        }

        Ok(operator)
    }
}

/// Extracts the bearer token from the `authorization` header.
pub(crate) fn bearer_token(metadata: &MetadataMap) -> Result<String> {
    let value = metadata
        .get("authorization")
        .ok_or(ParleyError::Unauthenticated)?
        .to_str()
        .map_err(|_| ParleyError::Unauthenticated)?;

    let (scheme, token) = value.split_once(' ').ok_or(ParleyError::Unauthenticated)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(ParleyError::Unauthenticated);
    }

    Ok(token.trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
