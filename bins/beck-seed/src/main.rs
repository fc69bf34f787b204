//! Seed registry: the DNS-style rendezvous point for beck nodes.
//!
//! `POST /` with a port registers the caller (keyed by observed IP and
//! declared port) and returns the other live peers. Entries expire after
//! [`ENTRY_DURATION`] seconds without re-registration. `GET /` returns
//! the full live list.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{ConnectInfo, Form, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use clap::Parser;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use beck_core::constants::{DEFAULT_SEED_PORT, ENTRY_DURATION};

/// beck seed registry.
#[derive(Parser, Debug)]
#[command(name = "beck-seed", version, about = "beck peer registry")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_SEED_PORT)]
    port: u16,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// A registered peer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
struct PeerEntry {
    ip: String,
    port: u16,
    /// Last registration time, unix seconds.
    time: i64,
}

#[derive(Deserialize)]
struct Registration {
    port: u16,
}

#[derive(Default)]
struct Registry {
    peers: Mutex<Vec<PeerEntry>>,
}

impl Registry {
    /// Drop entries that have not re-registered within the window.
    fn prune(&self, now: i64) {
        self.peers
            .lock()
            .retain(|p| now - p.time < ENTRY_DURATION as i64);
    }

    /// Refresh or insert the caller; return everyone else.
    fn register(&self, ip: String, port: u16, now: i64) -> Vec<PeerEntry> {
        let mut peers = self.peers.lock();
        let mut others = Vec::with_capacity(peers.len());
        let mut seen = false;
        for entry in peers.iter_mut() {
            if entry.ip == ip && entry.port == port {
                entry.time = now;
                seen = true;
            } else {
                others.push(entry.clone());
            }
        }
        if !seen {
            peers.push(PeerEntry { ip, port, time: now });
        }
        others
    }

    fn list(&self) -> Vec<PeerEntry> {
        self.peers.lock().clone()
    }
}

/// `POST /` — register the caller, reply with the rest of the list.
async fn register(
    State(registry): State<Arc<Registry>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(registration): Form<Registration>,
) -> Json<Vec<PeerEntry>> {
    let now = Utc::now().timestamp();
    registry.prune(now);
    let ip = addr.ip().to_string();
    debug!(%ip, port = registration.port, "peer registered");
    Json(registry.register(ip, registration.port, now))
}

/// `GET /` — the current live peer list.
async fn list(State(registry): State<Arc<Registry>>) -> Json<Vec<PeerEntry>> {
    registry.prune(Utc::now().timestamp());
    Json(registry.list())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let registry = Arc::new(Registry::default());
    let app = Router::new()
        .route("/", get(list).post(register))
        .with_state(registry);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("seed registry listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("seed server exited")?;
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
