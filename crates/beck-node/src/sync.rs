//! Peer discovery, chain synchronization, and gossip.
//!
//! On a timer the node registers with the seed, greets every listed peer,
//! and syncs against the tallest one: a binary search over its own header
//! hashes finds the last block the peer agrees on, then everything the
//! peer has above that point is fetched and ingested. Gossip is
//! fire-and-forget with bounded timeouts and never blocks ingestion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use beck_core::constants::NODE_VERSION;
use beck_core::types::{Block, Hash};

use crate::node::Node;

/// A peer as listed by the seed registry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub ip: String,
    pub port: u16,
    /// Seed-side registration time, unix seconds.
    #[serde(default)]
    pub time: i64,
}

impl PeerInfo {
    /// Base URL of the peer's RPC server.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

/// Body of a `greet` exchange, both directions.
#[derive(Serialize, Deserialize, Debug)]
pub struct Greeting {
    pub port: u16,
    pub version: String,
    pub blockheight: u64,
}

/// Response half of a `greet` exchange.
#[derive(Serialize, Deserialize, Debug)]
pub struct GreetingReply {
    pub version: String,
    pub blockheight: u64,
}

#[derive(Serialize)]
struct HashQuery<'a> {
    headerhash: &'a str,
}

#[derive(Serialize)]
struct HeightQuery {
    myheight: i64,
}

#[derive(Serialize)]
struct SeedRegistration {
    port: u16,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("http: {0}")]
    Http(String),
    #[error("peer returned no block for {0}")]
    MissingBlock(String),
    #[error("bad payload from peer: {0}")]
    Codec(String),
    #[error("synced block rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Http(e.to_string())
    }
}

/// Register with the seed and fetch the current peer list.
pub async fn fetch_peer_list(
    client: &reqwest::Client,
    seed_url: &str,
    my_port: u16,
) -> Result<Vec<PeerInfo>, SyncError> {
    let peers = client
        .post(seed_url)
        .form(&SeedRegistration { port: my_port })
        .send()
        .await?
        .json::<Vec<PeerInfo>>()
        .await?;
    Ok(peers)
}

/// Exchange versions and chain heights with a peer.
pub async fn greet(
    client: &reqwest::Client,
    peer: &PeerInfo,
    my_port: u16,
    my_height: u64,
) -> Result<GreetingReply, SyncError> {
    let reply = client
        .post(format!("{}/greet", peer.url()))
        .form(&Greeting {
            port: my_port,
            version: NODE_VERSION.to_string(),
            blockheight: my_height,
        })
        .send()
        .await?
        .json::<GreetingReply>()
        .await?;
    Ok(reply)
}

/// Ask a peer whether a header hash is on its active chain.
async fn checkblock(
    client: &reqwest::Client,
    peer: &PeerInfo,
    hash: &Hash,
) -> Result<bool, SyncError> {
    let known = client
        .post(format!("{}/checkblock", peer.url()))
        .form(&HashQuery { headerhash: hash.as_str() })
        .send()
        .await?
        .json::<bool>()
        .await?;
    Ok(known)
}

/// Fetch the peer's active-chain header hashes strictly above `height`.
async fn get_block_hashes(
    client: &reqwest::Client,
    peer: &PeerInfo,
    height: i64,
) -> Result<Vec<String>, SyncError> {
    let hashes = client
        .post(format!("{}/getblockhashes", peer.url()))
        .form(&HeightQuery { myheight: height })
        .send()
        .await?
        .json::<Vec<String>>()
        .await?;
    Ok(hashes)
}

/// Fetch a serialized block body by header hash.
async fn get_block(
    client: &reqwest::Client,
    peer: &PeerInfo,
    hash: &Hash,
) -> Result<String, SyncError> {
    let body = client
        .post(format!("{}/getblock", peer.url()))
        .form(&HashQuery { headerhash: hash.as_str() })
        .send()
        .await?
        .text()
        .await?;
    Ok(body)
}

/// One discovery-and-sync round.
///
/// Unreachable peers are dropped from the working set; a failed sync
/// aborts the round and is retried on the next timer tick.
pub async fn sync_round(node: &Arc<Node>) {
    let client = node.sync_client();

    let peers = match fetch_peer_list(&client, node.seed_server(), node.port()).await {
        Ok(peers) => peers,
        Err(e) => {
            debug!(error = %e, "seed registry unreachable");
            return;
        }
    };

    let mut reachable = Vec::new();
    let mut best: Option<(PeerInfo, u64)> = None;
    for peer in peers {
        match greet(&client, &peer, node.port(), node.chain_length()).await {
            Ok(reply) => {
                debug!(peer = %peer.url(), height = reply.blockheight, version = %reply.version, "greeted peer");
                if best.as_ref().is_none_or(|(_, h)| reply.blockheight > *h) {
                    best = Some((peer.clone(), reply.blockheight));
                }
                reachable.push(peer);
            }
            Err(e) => {
                debug!(peer = %peer.url(), error = %e, "dropping unreachable peer");
            }
        }
    }
    node.set_peers(reachable);

    let Some((peer, height)) = best else {
        return;
    };
    if height <= node.chain_length() {
        return;
    }

    info!(peer = %peer.url(), theirs = height, ours = node.chain_length(), "syncing");
    if let Err(e) = sync_with_peer(node, &client, &peer).await {
        warn!(peer = %peer.url(), error = %e, "sync aborted");
    }
}

/// Sync against one peer: fork-point binary search, then block fetch.
pub async fn sync_with_peer(
    node: &Arc<Node>,
    client: &reqwest::Client,
    peer: &PeerInfo,
) -> Result<(), SyncError> {
    // Largest index of ours the peer also has on its active chain; -1 when
    // nothing matches.
    let mut lo: i64 = 0;
    let mut hi: i64 = node.chain_length() as i64 - 1;
    let mut fork_height: i64 = -1;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let Some(hash) = node.active_hash_at(mid as u64) else {
            break;
        };
        if checkblock(client, peer, &hash).await? {
            fork_height = mid;
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }
    debug!(fork_height, "fork point located");

    let hashes = get_block_hashes(client, peer, fork_height).await?;
    for hash_hex in hashes {
        let hash = Hash::from_hex(&hash_hex).map_err(|e| SyncError::Codec(e.to_string()))?;
        let body = get_block(client, peer, &hash).await?;
        if body.trim().is_empty() {
            return Err(SyncError::MissingBlock(hash.to_string()));
        }
        let block =
            Block::from_canonical_json(&body).map_err(|e| SyncError::Codec(e.to_string()))?;
        node.submit_block(&block)
            .map_err(|e| SyncError::Rejected(e.to_string()))?;
    }
    Ok(())
}

/// Broadcast a serialized block to every peer, fire-and-forget.
pub fn broadcast_block(client: &reqwest::Client, peers: &[PeerInfo], body: String) {
    broadcast(client, peers, "newblock", body);
}

/// Broadcast a serialized transaction to every peer, fire-and-forget.
pub fn broadcast_transaction(client: &reqwest::Client, peers: &[PeerInfo], body: String) {
    broadcast(client, peers, "newtransaction", body);
}

fn broadcast(client: &reqwest::Client, peers: &[PeerInfo], endpoint: &str, body: String) {
    for peer in peers {
        let client = client.clone();
        let url = format!("{}/{}", peer.url(), endpoint);
        let body = body.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).body(body).send().await {
                debug!(%url, error = %e, "gossip send failed");
            }
        });
    }
}
