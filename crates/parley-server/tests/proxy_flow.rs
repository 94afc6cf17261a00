//! End-to-end flows over the in-memory store: the full signup →
//! finalise → token → message path, and a group conversation from
//! creation to an authorized post.

use std::sync::Arc;

use futures_util::StreamExt;
use tonic::Request;

use parley_crypto::totp;
use parley_proto::authentication_server::Authentication;
use parley_proto::groups_server::Groups;
use parley_proto::messaging_server::Messaging;
use parley_proto::{Auth, JoinRequest, MessageWrapper, Recipient, SignupRequest, UserId};
use parley_server::auth_service::AuthService;
use parley_server::federation::PeerTable;
use parley_server::groups_service::GroupsService;
use parley_server::messaging_service::MessagingService;
use parley_server::Core;
use parley_store::memory::MemoryStore;
use parley_types::config::Configuration;

const PASSWORD: &str = "a password of size";

fn standalone_core() -> Arc<Core<MemoryStore>> {
    let config = Configuration {
        domain_name: "example.com".into(),
        ..Configuration::default()
    };
    config.validate().unwrap();

    let peers = PeerTable::from_config(&config).unwrap();
    Arc::new(Core::new(config, MemoryStore::new(), peers))
}

fn with_bearer<T>(token: &str, message: T) -> Request<T> {
    let mut request = Request::new(message);
    request.metadata_mut().insert(
        "authorization",
        format!("bearer {token}").parse().unwrap(),
    );
    request
}

/// Runs the whole credential lifecycle and returns `(id, token)`.
async fn onboard(auth: &AuthService<MemoryStore>) -> (String, String) {
    let signup = auth
        .signup(Request::new(SignupRequest {
            password: PASSWORD.into(),
        }))
        .await
        .unwrap()
        .into_inner();

    let code = totp::current_code(&signup.totp_seed).unwrap();
    auth.finalise(Request::new(Auth {
        user_id: signup.id.clone(),
        password: PASSWORD.into(),
        totp: code,
    }))
    .await
    .unwrap();

    let code = totp::current_code(&signup.totp_seed).unwrap();
    let token = auth
        .token(Request::new(Auth {
            user_id: signup.id.clone(),
            password: PASSWORD.into(),
            totp: code,
        }))
        .await
        .unwrap()
        .into_inner()
        .value;

    (signup.id, token)
}

#[tokio::test]
async fn signup_to_delivered_message() {
    let core = standalone_core();
    let auth = AuthService::new(core.clone());
    let messaging = MessagingService::new(core.clone());

    let (alice, alice_token) = onboard(&auth).await;
    let (bob, bob_token) = onboard(&auth).await;

    let mut inbox = messaging
        .subscribe(with_bearer(&bob_token, ()))
        .await
        .unwrap()
        .into_inner();

    messaging
        .send(with_bearer(
            &alice_token,
            MessageWrapper {
                sender: Some(UserId { id: alice.clone() }),
                recipient: Some(Recipient {
                    id: bob.clone(),
                    group_id: String::new(),
                }),
                encoded: b"sealed for bob".to_vec(),
            },
        ))
        .await
        .unwrap();

    let received = inbox.next().await.unwrap().unwrap();
    assert_eq!(received.sender.unwrap().id, alice);
    assert_eq!(received.recipient.unwrap().id, bob);
    assert_eq!(received.encoded, b"sealed for bob");
}

#[tokio::test]
async fn group_conversation_from_create_to_post() {
    let core = standalone_core();
    let auth = AuthService::new(core.clone());
    let groups = GroupsService::new(core.clone());
    let messaging = MessagingService::new(core.clone());

    let (owner, owner_token) = onboard(&auth).await;
    let (member, member_token) = onboard(&auth).await;

    let group = groups
        .create(with_bearer(
            &owner_token,
            parley_proto::Group {
                is_open: true,
                ..parley_proto::Group::default()
            },
        ))
        .await
        .unwrap()
        .into_inner();

    groups
        .join(with_bearer(
            &member_token,
            JoinRequest {
                group_id: group.id.clone(),
            },
        ))
        .await
        .unwrap();

    let mut inbox = messaging
        .subscribe(with_bearer(&owner_token, ()))
        .await
        .unwrap()
        .into_inner();

    // The member posts to the owner on behalf of the group.
    messaging
        .send(with_bearer(
            &member_token,
            MessageWrapper {
                sender: Some(UserId { id: member.clone() }),
                recipient: Some(Recipient {
                    id: owner.clone(),
                    group_id: group.id.clone(),
                }),
                encoded: b"sealed for the group".to_vec(),
            },
        ))
        .await
        .unwrap();

    let received = inbox.next().await.unwrap().unwrap();
    assert_eq!(received.sender.unwrap().id, member);
    assert_eq!(received.recipient.unwrap().group_id, group.id);
}
