//! Tern sync node binary.
//!
//! Bootstraps a local blockchain from the Bitcoin P2P network: header sync
//! from one peer at a time, then parallel block download to a quorum.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tern_core::checkpoint::Checkpoint;
use tern_core::constants::NetworkKind;
use tern_core::types::Hash256;
use tern_node_lib::{Node, NodeConfig};
use tracing::{error, info};

/// Tern — a Bitcoin full-node front-end that bootstraps from its peers.
#[derive(Parser, Debug)]
#[command(name = "tern-node", version, about = "Bitcoin initial block-chain sync node")]
struct Args {
    /// Network to join: mainnet, testnet, or regtest
    #[arg(long, default_value = "mainnet")]
    network: String,

    /// Data directory for blockchain storage
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// Additional peer addresses to dial (comma-separated host:port)
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Minimum header sync rate before a channel is evicted (hashes/sec)
    #[arg(long)]
    headers_per_second: Option<u32>,

    /// Minimum block sync rate before a channel is evicted (blocks/min)
    #[arg(long)]
    blocks_per_minute: Option<u32>,

    /// Successful peer syncs required to finish the block phase
    #[arg(long)]
    quorum: Option<u32>,

    /// Concurrent block sync connections
    #[arg(long)]
    connections: Option<u32>,

    /// Extra checkpoint anchors, as height:hash pairs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    checkpoint: Vec<String>,

    /// Dial timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig, String> {
        let network = match self.network.as_str() {
            "mainnet" => NetworkKind::Mainnet,
            "testnet" => NetworkKind::Testnet,
            "regtest" => NetworkKind::Regtest,
            other => return Err(format!("unknown network '{other}'")),
        };

        let mut config = NodeConfig::for_network(network);
        config.log_level = self.log_level;

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        config.network.seeds.extend(self.peers);

        if let Some(rate) = self.headers_per_second {
            config.sync.headers_per_second = rate;
        }
        if let Some(rate) = self.blocks_per_minute {
            config.sync.blocks_per_minute = rate;
        }
        if let Some(quorum) = self.quorum {
            if quorum == 0 {
                return Err("quorum must be at least 1".to_string());
            }
            config.sync.quorum = quorum;
        }
        if let Some(connections) = self.connections {
            config.sync.connections = connections;
        }
        if let Some(secs) = self.connect_timeout {
            config.network.connect_timeout = Duration::from_secs(secs);
        }

        for entry in &self.checkpoint {
            config.checkpoints.push(parse_checkpoint(entry)?);
        }

        Ok(config)
    }
}

/// Parse a "height:hash" checkpoint argument.
fn parse_checkpoint(entry: &str) -> Result<Checkpoint, String> {
    let (height, hash) = entry
        .split_once(':')
        .ok_or_else(|| format!("checkpoint '{entry}' is not height:hash"))?;
    let height: u32 = height
        .parse()
        .map_err(|_| format!("invalid checkpoint height '{height}'"))?;
    let hash = Hash256::from_hex(hash)
        .map_err(|_| format!("invalid checkpoint hash '{hash}'"))?;
    Ok(Checkpoint::new(height, hash))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    init_logging(&config.log_level);

    info!("Tern sync node v{}", env!("CARGO_PKG_VERSION"));
    info!(network = ?config.network_kind(), data_dir = ?config.data_dir);

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {e}");
        process::exit(1);
    }

    let node = match Node::open(config) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!("failed to open node: {e}");
            process::exit(1);
        }
    };

    let mut runner = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.run().await })
    };

    let outcome = tokio::select! {
        finished = &mut runner => finished,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, stopping sync");
            node.stop();
            (&mut runner).await
        }
    };

    match outcome {
        Ok(Ok(())) => info!("shutdown complete"),
        Ok(Err(e)) => {
            error!("sync failed: {e}");
            process::exit(1);
        }
        Err(e) => {
            error!("node task failed: {e}");
            process::exit(1);
        }
    }
}

/// Initialize tracing with the given log level, honoring `RUST_LOG`.
fn init_logging(level_str: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}
