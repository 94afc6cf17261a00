//! `Messaging` service: the Send / Subscribe relay fabric.
//!
//! Messages address users, never group channels: a group conversation
//! rides in the wrapper's `group_id` and is authorized against the
//! Post permission before the payload is published to each recipient's
//! own channel. The proxy treats the message body as opaque bytes
//! throughout.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use parley_proto::messaging_server::Messaging;
use parley_proto::{InfoRequest, MessageWrapper, Recipient, UserId};
use parley_store::{Envelope, Repository};
use parley_types::{identity, Group, GroupOp, ParleyError};

use crate::admission::{self, Metadata};
use crate::errors::{internal, to_status};
use crate::groups_service::group_from_proto;
use crate::Core;

/// Per-subscriber buffer between the repository channel and the
/// client; a slow client backpressures into the channel iterator.
const SUBSCRIBE_BUFFER: usize = 16;

pub struct MessagingService<R> {
    core: Arc<Core<R>>,
}

impl<R> MessagingService<R> {
    pub fn new(core: Arc<Core<R>>) -> Self {
        Self { core }
    }
}

impl<R: Repository> MessagingService<R> {
    /// Loads a group wherever it lives: ours from the repository, a
    /// peered domain's through its Info endpoint.
    async fn group_anywhere(
        &self,
        operator: &str,
        group_id: &str,
    ) -> std::result::Result<Group, Status> {
        let domain = identity::domain(group_id).map_err(to_status)?;

        if domain == self.core.config.domain_name {
            let group = self
                .core
                .store
                .load_group(group_id)
                .await
                .map_err(|e| to_status(internal(e)))?;
            if !group.exists() {
                return Err(to_status(ParleyError::BadGroup));
            }
            return Ok(group);
        }

        let peer = self
            .core
            .peers
            .get(domain)
            .ok_or(to_status(ParleyError::NotPeered))?;
        let info = peer
            .group_info(
                operator,
                InfoRequest {
                    group_id: group_id.to_string(),
                },
            )
            .await?;

        Ok(group_from_proto(info))
    }
}

#[tonic::async_trait]
impl<R: Repository> Messaging for MessagingService<R> {
    /// Relays one wrapper: to a peer when the recipient is remote,
    /// otherwise onto the recipient's local channel.
    async fn send(
        &self,
        request: Request<MessageWrapper>,
    ) -> std::result::Result<Response<()>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let wrapper = request.into_inner();

        // Nothing subscribes to a group channel; group messages go to
        // each member directly with the group named in the wrapper.
        if identity::is_group(&operand.id) {
            return Err(to_status(ParleyError::Input));
        }

        if !operand.is_local {
            let peer = operand
                .peer
                .as_ref()
                .ok_or(to_status(ParleyError::NotPeered))?;
            peer.send(&operator.id, wrapper).await?;
            return Ok(Response::new(()));
        }

        let group_id = wrapper
            .recipient
            .as_ref()
            .map(|r| r.group_id.clone())
            .unwrap_or_default();

        if !group_id.is_empty() {
            if !identity::is_group(&group_id) {
                return Err(to_status(ParleyError::Input));
            }

            let group = self.group_anywhere(&operator.id, &group_id).await?;
            if !group.permits(&operator.id, GroupOp::Post) {
                return Err(to_status(ParleyError::BadGroup));
            }
        }

        let envelope = Envelope {
            recipient: operand.id.clone(),
            sender: operator.id,
            encoded: wrapper.encoded,
            group_id: (!group_id.is_empty()).then_some(group_id),
        };
        let payload = envelope
            .to_bytes()
            .map_err(|e| to_status(internal(e)))?;

        self.core
            .store
            .write_message(&operand.id, payload)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    type SubscribeStream =
        Pin<Box<dyn Stream<Item = std::result::Result<MessageWrapper, Status>> + Send>>;

    /// Streams the operator's channel until the client goes away, the
    /// backend closes the subscription, or the bearer token is
    /// revoked mid-stream. Peers may not subscribe.
    async fn subscribe(
        &self,
        request: Request<()>,
    ) -> std::result::Result<Response<Self::SubscribeStream>, Status> {
        let operator = self
            .core
            .authenticate(request.metadata())
            .await
            .map_err(to_status)?;
        if !operator.is_local {
            return Err(to_status(ParleyError::Input));
        }

        let token = admission::bearer_token(request.metadata()).map_err(to_status)?;

        let mut source = self
            .core
            .store
            .messages(&operator.id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        let core = self.core.clone();
        let (tx, rx) = mpsc::channel(SUBSCRIBE_BUFFER);
        tokio::spawn(async move {
            let mut revalidate = tokio::time::interval(core.config.revalidate_frequency());

            loop {
                tokio::select! {
                    maybe = source.next() => {
                        let Some(payload) = maybe else { break };

                        let item = match Envelope::from_bytes(&payload) {
                            Ok(envelope) => Ok(wrapper_from_envelope(envelope)),
                            Err(e) => {
                                tracing::warn!(%e, "dropping undecodable channel payload");
                                let _ = tx.send(Err(to_status(ParleyError::General))).await;
                                break;
                            }
                        };

                        if tx.send(item).await.is_err() {
                            // Client went away; tear the subscription down.
                            break;
                        }
                    }
                    _ = revalidate.tick() => {
                        // A token revoked after subscription must not
                        // keep draining the channel forever. Transient
                        // lookup failures leave the stream alone.
                        if let Ok(id) = core.store.user_id_by_token(&token).await {
                            if id.is_empty() {
                                tracing::debug!(user = %operator.id, "token revoked; closing stream");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

fn wrapper_from_envelope(envelope: Envelope) -> MessageWrapper {
    MessageWrapper {
        sender: Some(UserId {
            id: envelope.sender,
        }),
        recipient: Some(Recipient {
            id: envelope.recipient,
            group_id: envelope.group_id.unwrap_or_default(),
        }),
        encoded: envelope.encoded,
    }
}
