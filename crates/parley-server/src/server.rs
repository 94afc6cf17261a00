//! Server wiring: all four services plus reflection on one listener.
//!
//! The reflection service is registered alongside the proxy's own
//! namespaces and never passes through admission, so schema-driven
//! tooling can introspect without credentials.
//!
//! # Graceful shutdown
//!
//! `serve` takes a `tokio::sync::watch::Receiver<bool>`; when the
//! value becomes `true` the server stops accepting connections and
//! drains in-flight requests.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tonic::transport::Server;

use parley_proto::authentication_server::AuthenticationServer;
use parley_proto::groups_server::GroupsServer;
use parley_proto::messaging_server::MessagingServer;
use parley_proto::user_server::UserServer;
use parley_store::Repository;

use crate::auth_service::AuthService;
use crate::groups_service::GroupsService;
use crate::messaging_service::MessagingService;
use crate::user_service::UserService;
use crate::Core;

/// Returns a future that resolves when the shutdown watch fires.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if rx.changed().await.is_err() {
            break;
        }
        if *rx.borrow() {
            break;
        }
    }
}

/// Binds the configured listener and serves until shutdown.
pub async fn serve<R: Repository>(
    core: Arc<Core<R>>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), String> {
    let addr: SocketAddr = core
        .config
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr '{}': {e}", core.config.listen_addr))?;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(parley_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .map_err(|e| format!("reflection setup failed: {e}"))?;

    tracing::info!(
        %addr,
        domain = %core.config.domain_name,
        peers = core.config.federations.len(),
        "proxy listening"
    );

    Server::builder()
        .add_service(AuthenticationServer::new(AuthService::new(core.clone())))
        .add_service(GroupsServer::new(GroupsService::new(core.clone())))
        .add_service(MessagingServer::new(MessagingService::new(core.clone())))
        .add_service(UserServer::new(UserService::new(core)))
        .add_service(reflection)
        .serve_with_shutdown(addr, wait_for_shutdown(shutdown_rx))
        .await
        .map_err(|e| format!("server error: {e}"))?;

    tracing::info!("proxy stopped");
    Ok(())
}
