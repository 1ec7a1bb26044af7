//! Conductor client — entry point.
//!
//! Joins the DHT, finds the conductor hosts announced under a content
//! identifier, then reads commands from stdin.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use libp2p::StreamProtocol;
use tokio::io::BufReader;

use conductor_cli::config::ConductorConfig;
use conductor_cli::logging::init_tracing;
use conductor_cli::Dispatcher;
use conductor_core::{PeerDirectory, SessionState};
use conductor_network::{
    load_or_generate_keypair, ConductorNode, ContentId, ProtocolClient, ProviderLookup,
};

/// Conductor client
#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Drive pods on conductor hosts over libp2p")]
struct Args {
    /// Content identifier the conductor hosts announce themselves under.
    #[arg(long)]
    cid: Option<String>,

    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    /// Bootstrap peer multiaddress (repeatable). Replaces the configured list.
    #[arg(long)]
    bootstrap: Vec<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ConductorConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging.level, &config.logging.format)?;

    // Handle --init flag
    if args.init {
        let config = ConductorConfig::default();
        config.save(&args.config)?;
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    if !args.bootstrap.is_empty() {
        config.network.bootstrap_peers = args.bootstrap;
    }
    let Some(cid) = args.cid.or_else(|| config.discovery.content_id.clone()) else {
        anyhow::bail!("no content identifier: use the flag --cid");
    };
    let content_id = ContentId::new(cid)?;
    let protocol = StreamProtocol::try_from_owned(config.protocol.protocol_id.clone())
        .map_err(|e| anyhow::anyhow!("invalid protocol id {}: {:?}", config.protocol.protocol_id, e))?;

    tracing::info!("conductor client v{}", env!("CARGO_PKG_VERSION"));

    let keypair = load_or_generate_keypair(&config.identity.keypair_path)?;
    let mut node = ConductorNode::new(keypair, config.node_config())?;
    node.start().await?;
    let handle = node.handle()?;
    let node_task = tokio::spawn(async move { node.run().await });

    handle
        .connect_bootstrap()
        .await
        .context("failed to connect to the bootstrap peers")?;

    tokio::time::sleep(Duration::from_secs(config.discovery.settle_secs)).await;

    println!("My id: {}", handle.local_peer_id());
    let addrs = handle.listen_addrs().await?;
    let addrs: Vec<String> = addrs.iter().map(ToString::to_string).collect();
    println!("My address: [{}]", addrs.join(" "));

    let routing_table_size = handle.routing_table_size().await?;
    tracing::info!(size = routing_table_size, "DHT routing table size");

    let providers = handle
        .find_providers(&content_id)
        .await
        .context("failed to find providers")?;
    tracing::info!(%content_id, count = providers.len(), "providers found");

    let session = SessionState::new(PeerDirectory::new(providers));
    let client = ProtocolClient::new(handle.clone())
        .with_protocol(protocol)
        .with_response_mode(config.protocol.response_mode, config.protocol.response_capacity);
    let mut dispatcher = Dispatcher::new(session, client);

    let input = BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();
    tokio::select! {
        result = dispatcher.run(input, &mut output) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    handle.shutdown().await?;
    match node_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "node event loop error"),
        Err(e) => tracing::error!(error = %e, "node task panicked"),
        Ok(Ok(())) => {}
    }
    tracing::info!("conductor client exited cleanly");
    Ok(())
}
