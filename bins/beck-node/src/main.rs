//! beck full node binary.
//!
//! Starts the peer RPC server, the sync loop, and the miner over a
//! RocksDB block store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use beck_core::constants::{DEFAULT_NODE_PORT, DEFAULT_SEED_URL};
use beck_node_lib::storage::RocksStore;
use beck_node_lib::{Node, NodeConfig, rpc};

/// beck: a minimal proof-of-work cryptocurrency node.
#[derive(Parser, Debug)]
#[command(name = "beck-node", version, about = "beck full node")]
struct Args {
    /// Port the peer RPC server listens on
    #[arg(short, long, default_value_t = DEFAULT_NODE_PORT)]
    port: u16,

    /// URL of the seed registry
    #[arg(short, long, default_value = DEFAULT_SEED_URL)]
    seed_server: String,

    /// Directory for persistent data
    #[arg(long, default_value = "beck-data")]
    data_dir: PathBuf,

    /// Address (public key hex) credited by mined coinbases
    #[arg(long)]
    payout_address: Option<String>,

    /// Disable the mining task
    #[arg(long)]
    no_mine: bool,

    /// Disable peer discovery and sync (single-node mode)
    #[arg(long)]
    no_sync: bool,

    /// Log at debug level
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn into_config(self) -> NodeConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };
        NodeConfig {
            port: self.port,
            seed_server: self.seed_server,
            data_dir: self.data_dir,
            payout_address: self.payout_address,
            mine: !self.no_mine,
            sync: !self.no_sync,
            log_level: log_level.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();
    init_logging(&config.log_level);

    info!("beck node v{}", env!("CARGO_PKG_VERSION"));
    info!(port = config.port, seed = %config.seed_server, "starting");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {:?}", config.data_dir))?;
    let store = Arc::new(RocksStore::open(config.db_path()).context("opening block store")?);

    let node = Node::new(config.clone(), store).context("starting node")?;
    info!(height = node.chain_length(), "chain initialized");

    let app = rpc::router(Arc::clone(&node));
    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;
    info!("peer RPC listening on {}", config.listen_addr());

    tokio::select! {
        served = axum::serve(listener, app) => {
            served.context("RPC server exited")?;
        }
        _ = Arc::clone(&node).run() => {
            info!("node event loop exited");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    node.miner().terminate();
    info!("shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides the CLI level.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
