//! viewlink — transport and trust layer probe
//!
//! Connects to a remote-display server, optionally upgrades the socket to
//! TLS, and runs the peer's certificate through the trust-on-first-use
//! store. Exits zero when the connection (and trust gate, under TLS)
//! succeeded.
//!
//! # Architecture Overview
//!
//! ```text
//!   connect(host[:port])
//!        │
//!        ▼
//!   ┌──────────┐    ┌──────────┐    ┌───────────────┐
//!   │ resolver │───▶│  socket  │───▶│ TLS handshake │
//!   │ + cache  │    │  tuning  │    │  (optional)   │
//!   └──────────┘    └──────────┘    └───────┬───────┘
//!                                           │ peer RSA key
//!                                           ▼
//!                                   ┌───────────────┐
//!                                   │  trust store  │  ~/.local/share/
//!                                   │  (TOFU gate)  │  viewlink/certs/
//!                                   └───────┬───────┘
//!                                           │
//!                            trusted ◀──────┴──────▶ refused
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use viewlink::config::{load_config, KeyChangePolicy, ViewlinkConfig};
use viewlink::lifecycle::Shutdown;
use viewlink::net::Connection;
use viewlink::trust::{FileStore, FixedPrompt, PromptAnswer, StdinPrompt, TrustPrompt};

#[derive(Parser)]
#[command(name = "viewlink")]
#[command(about = "Probe the transport and trust layer of a remote-display server", long_about = None)]
struct Cli {
    /// Server to connect to, as `host` or `host:port`.
    target: String,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stay on the plaintext socket, skipping the TLS upgrade.
    #[arg(long)]
    plain: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viewlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let (hostname, port) = parse_target(&cli.target)?;

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ViewlinkConfig::default(),
    };

    tracing::info!(
        target = %cli.target,
        port = port.unwrap_or(config.transport.port),
        handshake_timeout_secs = config.transport.handshake_timeout_secs,
        aux_redirection = config.transport.aux_redirection,
        "viewlink starting"
    );

    let shutdown = Shutdown::new();
    let mut connection = Connection::new(config.transport.clone(), &shutdown);
    connection.connect(hostname, port).await?;

    if let Some(local) = connection.local_address() {
        tracing::info!(local = %local, "Connection established");
    }

    if !cli.plain {
        let cache_root = config
            .trust
            .cache_root
            .clone()
            .or_else(FileStore::default_root)
            .ok_or("no home directory and no trust.cache_root configured")?;
        let store = Arc::new(FileStore::open(cache_root)?);
        let prompt = prompt_for_policy(config.trust.on_key_change);

        connection.tls_upgrade(store, prompt).await?;
        tracing::info!(
            peer_key_bytes = connection.peer_public_key().map(<[u8]>::len),
            "TLS session trusted and ready"
        );
    }

    connection.disconnect().await;
    tracing::info!("Probe complete");
    Ok(())
}

/// Split `host` or `host:port`; an IPv6 literal needs brackets to carry
/// a port, as in `[::1]:3390`.
fn parse_target(target: &str) -> Result<(&str, Option<u16>), String> {
    if let Some(rest) = target.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, "")) => Ok((host, None)),
            Some((host, port)) => port
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .map(|p| (host, Some(p)))
                .ok_or_else(|| format!("invalid port in target '{target}'")),
            None => Err(format!("unclosed bracket in target '{target}'")),
        };
    }

    // More than one colon without brackets is a bare IPv6 literal.
    if target.matches(':').count() > 1 {
        return Ok((target, None));
    }
    match target.split_once(':') {
        Some((host, port)) => port
            .parse()
            .map(|p| (host, Some(p)))
            .map_err(|_| format!("invalid port in target '{target}'")),
        None => Ok((target, None)),
    }
}

fn prompt_for_policy(policy: KeyChangePolicy) -> Arc<dyn TrustPrompt> {
    match policy {
        KeyChangePolicy::Ask => Arc::new(StdinPrompt),
        KeyChangePolicy::Accept => Arc::new(FixedPrompt::new(Some(PromptAnswer::Yes))),
        KeyChangePolicy::Reject => Arc::new(FixedPrompt::new(Some(PromptAnswer::No))),
    }
}
