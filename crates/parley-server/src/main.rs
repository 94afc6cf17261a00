//! parley-proxy -- one federated messaging proxy deployment.
//!
//! Usage:
//!
//!   parley-proxy [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>   Load settings from a JSON config file
//!   --domain <NAME>   Domain this deployment serves (required unless
//!                     set in the config file)
//!   --listen <ADDR>   gRPC bind address (default: 0.0.0.0:8080)
//!   --redis <URL>     Redis URL (default: redis://127.0.0.1:6379)
//!   -h, --help        Show this help
//!
//! Environment:
//!
//!   RUST_LOG          Log level filter (default: info)
//!
//! The proxy runs until interrupted with Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use parley_server::federation::PeerTable;
use parley_server::{server, Core};
use parley_store::RedisStore;
use parley_types::config::Configuration;

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, matching the config file's layering)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: Option<PathBuf>,
    domain: Option<String>,
    listen: Option<String>,
    redis: Option<String>,
}

impl CliArgs {
    fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut cli = Self {
            config_path: None,
            domain: None,
            listen: None,
            redis: None,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    i += 1;
                    cli.config_path = args.get(i).map(PathBuf::from);
                }
                "--domain" => {
                    i += 1;
                    cli.domain = args.get(i).cloned();
                }
                "--listen" => {
                    i += 1;
                    cli.listen = args.get(i).cloned();
                }
                "--redis" => {
                    i += 1;
                    cli.redis = args.get(i).cloned();
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("unknown argument: {other}");
                    eprintln!("use --help for usage information");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        cli
    }

    /// Overlays CLI flags onto a loaded configuration.
    fn apply(&self, mut config: Configuration) -> Configuration {
        if let Some(ref domain) = self.domain {
            config.domain_name = domain.clone();
        }
        if let Some(ref listen) = self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref redis) = self.redis {
            config.redis_addr = redis.clone();
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = CliArgs::parse_from_env();

    let base = match &cli.config_path {
        Some(path) => match Configuration::load(path) {
            Ok(config) => config,
            Err(_) => {
                tracing::error!(path = %path.display(), "failed to load config file");
                std::process::exit(1);
            }
        },
        None => Configuration::default(),
    };

    let config = cli.apply(base);
    if config.validate().is_err() {
        tracing::error!("invalid configuration: check domain_name and federation PSKs");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!("proxy error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Configuration) -> Result<(), String> {
    let store = RedisStore::connect(&config.redis_addr)
        .await
        .map_err(|e| format!("redis connection failed: {e}"))?;

    let peers = PeerTable::from_config(&config)
        .map_err(|e| format!("federation setup failed: {e}"))?;

    let core = Arc::new(Core::new(config, store, peers));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    server::serve(core, shutdown_rx).await
}

fn print_help() {
    println!(
        r#"parley-proxy - federated messaging proxy

USAGE:
    parley-proxy [OPTIONS]

OPTIONS:
    --config <PATH>   Load settings from a JSON config file
    --domain <NAME>   Domain this deployment serves
    --listen <ADDR>   gRPC bind address (default: 0.0.0.0:8080)
    --redis <URL>     Redis URL (default: redis://127.0.0.1:6379)
    -h, --help        Show this help

EXAMPLES:
    # Minimal single-domain deployment
    parley-proxy --domain example.com

    # Full configuration, including federations, from a file
    parley-proxy --config /etc/parley/proxy.json

ENVIRONMENT:
    RUST_LOG          Log level filter (default: info)
"#
    );
}
