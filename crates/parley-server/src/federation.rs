//! Outbound handles to peered proxies.
//!
//! One [`Peer`] per configured federation, built at startup over a
//! lazy channel and shared read-only for the process lifetime. Every
//! outbound call authenticates with the peer's PSK and names the
//! originating operator, so the peer can run its own admission against
//! the forwarded identity.

use std::collections::HashMap;

use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status, Streaming};

use parley_proto::groups_client::GroupsClient;
use parley_proto::messaging_client::MessagingClient;
use parley_proto::user_client::UserClient;
use parley_types::config::Configuration;
use parley_types::{ParleyError, Result};

use crate::admission::OPERATOR_ID_HEADER;
use crate::errors::to_status;

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A single federated peer: domain, PSK, and typed clients for the
/// three proxied namespaces.
#[derive(Clone, Debug)]
pub struct Peer {
    domain: String,
    psk: String,
    messaging: MessagingClient<Channel>,
    groups: GroupsClient<Channel>,
    user: UserClient<Channel>,
}

impl Peer {
    /// Builds the handle. The channel connects lazily: a peer that is
    /// down at startup only fails when first called.
    fn connect(domain: &str, connection_string: &str, psk: &str) -> Result<Self> {
        let endpoint =
            Endpoint::from_shared(connection_string.to_string()).map_err(|_| ParleyError::Input)?;
        let channel = endpoint.connect_lazy();

        Ok(Self {
            domain: domain.to_string(),
            psk: psk.to_string(),
            messaging: MessagingClient::new(channel.clone()),
            groups: GroupsClient::new(channel.clone()),
            user: UserClient::new(channel),
        })
    }

    /// The domain this handle proxies to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The PSK the peer authenticates with, for admission's scan.
    pub(crate) fn psk(&self) -> &str {
        &self.psk
    }

    /// Wraps a message with the PSK bearer and the operator header.
    fn request<T>(&self, operator: &str, message: T) -> std::result::Result<Request<T>, Status> {
        let bearer: MetadataValue<_> = format!("bearer {}", self.psk)
            .parse()
            .map_err(|_| Status::internal("unencodable peer credentials"))?;
        let operator: MetadataValue<_> = operator
            .parse()
            .map_err(|_| Status::invalid_argument("unencodable operator id"))?;

        let mut request = Request::new(message);
        request.metadata_mut().insert("authorization", bearer);
        request.metadata_mut().insert(OPERATOR_ID_HEADER, operator);
        Ok(request)
    }

    /// Relays a message wrapper to the peer.
    pub async fn send(
        &self,
        operator: &str,
        wrapper: parley_proto::MessageWrapper,
    ) -> std::result::Result<(), Status> {
        let mut client = self.messaging.clone();
        client
            .send(self.request(operator, wrapper)?)
            .await
            .map(|_| ())
            .map_err(clean)
    }

    pub async fn join_group(
        &self,
        operator: &str,
        request: parley_proto::JoinRequest,
    ) -> std::result::Result<(), Status> {
        let mut client = self.groups.clone();
        client
            .join(self.request(operator, request)?)
            .await
            .map(|_| ())
            .map_err(clean)
    }

    pub async fn group_info(
        &self,
        operator: &str,
        request: parley_proto::InfoRequest,
    ) -> std::result::Result<parley_proto::Group, Status> {
        let mut client = self.groups.clone();
        client
            .info(self.request(operator, request)?)
            .await
            .map(|response| response.into_inner())
            .map_err(clean)
    }

    pub async fn invite_to_group(
        &self,
        operator: &str,
        request: parley_proto::InviteRequest,
    ) -> std::result::Result<(), Status> {
        let mut client = self.groups.clone();
        client
            .invite(self.request(operator, request)?)
            .await
            .map(|_| ())
            .map_err(clean)
    }

    pub async fn promote_user(
        &self,
        operator: &str,
        request: parley_proto::PromoteRequest,
    ) -> std::result::Result<(), Status> {
        let mut client = self.groups.clone();
        client
            .promote_user(self.request(operator, request)?)
            .await
            .map(|_| ())
            .map_err(clean)
    }

    pub async fn demote_user(
        &self,
        operator: &str,
        request: parley_proto::DemoteRequest,
    ) -> std::result::Result<(), Status> {
        let mut client = self.groups.clone();
        client
            .demote_user(self.request(operator, request)?)
            .await
            .map(|_| ())
            .map_err(clean)
    }

    pub async fn leave_group(
        &self,
        operator: &str,
        request: parley_proto::LeaveRequest,
    ) -> std::result::Result<(), Status> {
        let mut client = self.groups.clone();
        client
            .leave(self.request(operator, request)?)
            .await
            .map(|_| ())
            .map_err(clean)
    }

    /// Opens the peer's public-key stream for a user it serves.
    pub async fn public_key(
        &self,
        operator: &str,
        request: parley_proto::PublicKeyRequest,
    ) -> std::result::Result<Streaming<parley_proto::PublicKeyValue>, Status> {
        let mut client = self.user.clone();
        client
            .public_key(self.request(operator, request)?)
            .await
            .map(|response| response.into_inner())
            .map_err(clean)
    }
}

/// Normalizes transport-level failure to `inaccessiblePeer`; business
/// statuses from the peer pass through as returned.
pub(crate) fn clean(status: Status) -> Status {
    if status.code() == Code::Unavailable {
        return to_status(ParleyError::InaccessiblePeer);
    }

    status
}

// ---------------------------------------------------------------------------
// PeerTable
// ---------------------------------------------------------------------------

/// All configured peers, keyed by domain. Read-only after startup.
#[derive(Clone, Default)]
pub struct PeerTable {
    peers: HashMap<String, Peer>,
}

impl PeerTable {
    /// Builds a handle per configured federation.
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let mut peers = HashMap::new();
        for (domain, federation) in &config.federations {
            peers.insert(
                domain.clone(),
                Peer::connect(domain, &federation.connection_string, &federation.psk)?,
            );
        }

        Ok(Self { peers })
    }

    pub fn get(&self, domain: &str) -> Option<&Peer> {
        self.peers.get(domain)
    }

    /// Resolves a presented bearer token to the peer it authenticates.
    ///
    /// Every configured PSK is compared in constant time, whether or
    /// not an earlier one already matched.
    pub fn by_psk(&self, presented: &str) -> Option<&Peer> {
        let mut found = None;
        for peer in self.peers.values() {
            if constant_time_eq(presented.as_bytes(), peer.psk().as_bytes()) && found.is_none() {
                found = Some(peer);
            }
        }

        found
    }
}

/// Compares two byte slices in constant time; the comparison time
/// depends only on the lengths, not the content.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
