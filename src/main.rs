//! Secure media retrieval proxy.
//!
//! Fetches images and other binary media from untrusted upstream URLs on
//! behalf of callers, and hands them back with framing a browser cannot be
//! tricked by.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     MEDIA PROXY                       │
//!                     │                                                       │
//!  GET /media/{id}    │  ┌────────┐   ┌─────────┐   ┌──────────────────────┐ │
//!  ───────────────────┼─▶│  http  │──▶│ records │──▶│   fetch::redirect    │ │
//!                     │  │ server │   │  store  │   │  (per-hop url_guard) │─┼──▶ Upstream
//!                     │  └────────┘   └─────────┘   └──────────┬───────────┘ │
//!                     │                                         ▼             │
//!                     │                              ┌──────────────────────┐ │
//!                     │                              │    fetch::stream     │◀┼─── body
//!                     │                              │  (cap + head bytes)  │ │
//!                     │                              └──────────┬───────────┘ │
//!                     │                                         ▼             │
//!  Response           │  ┌──────────┐               ┌──────────────────────┐ │
//!  ◀──────────────────┼──│ response │◀──────────────│ media::sniff +       │ │
//!                     │  │ (stream) │               │ media::disposition   │ │
//!                     │  └──────────┘               └──────────────────────┘ │
//!                     │                                                       │
//!                     │  Cross-cutting: config, observability, lifecycle     │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use media_proxy::config::{load_config, validation::validate_config, ConfigError, ProxyConfig};
use media_proxy::http::HttpServer;
use media_proxy::lifecycle::{signals, Shutdown};
use media_proxy::net::tls::load_tls_config;
use media_proxy::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "media-proxy", version, about = "Secure media retrieval proxy")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn load(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    match &cli.config {
        Some(path) => load_config(path),
        None => {
            let config = ProxyConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "media-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        allow_list = config.allow_list.hosts.len(),
        records = config.records.len(),
        hop_limit = config.fetch.hop_limit,
        timeout_secs = config.fetch.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    match tls {
        Some(tls) => {
            let rustls = load_tls_config(&tls).await?;
            let addr: SocketAddr = bind_address.parse()?;
            server.run_tls(addr, rustls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
