//! The peer RPC surface.
//!
//! Plain HTTP request/response: queries are form-encoded, replies are
//! JSON, and `newblock`/`newtransaction` carry the canonical JSON body
//! directly. Consensus rejections are acked with a failure marker rather
//! than an HTTP error; the peer is not punished, the artifact is dropped.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use beck_core::constants::NODE_VERSION;
use beck_core::types::{Block, Hash, Transaction};

use crate::node::Node;
use crate::sync::{Greeting, GreetingReply};

/// Ack for `newblock` / `newtransaction`.
pub const ACK_OK: &str = "ok";
/// Failure marker for a consensus-rejected artifact.
pub const ACK_REJECTED: &str = "rejected";
/// Failure marker for an unparseable artifact.
pub const ACK_MALFORMED: &str = "malformed";

#[derive(Deserialize)]
struct HashQuery {
    headerhash: String,
}

#[derive(Deserialize)]
struct HeightQuery {
    myheight: i64,
}

/// Build the peer RPC router.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/greet", post(greet))
        .route("/getblock", post(getblock))
        .route("/checkblock", post(checkblock))
        .route("/getblockhashes", post(getblockhashes))
        .route("/newblock", post(newblock))
        .route("/newtransaction", post(newtransaction))
        .with_state(node)
}

/// `POST /greet` — exchange versions and chain heights.
async fn greet(State(node): State<Arc<Node>>, Form(peer): Form<Greeting>) -> Json<GreetingReply> {
    debug!(peer_port = peer.port, peer_height = peer.blockheight, "greeted by peer");
    Json(GreetingReply {
        version: NODE_VERSION.to_string(),
        blockheight: node.chain_length(),
    })
}

/// `POST /getblock` — a stored block's serialized body, or empty.
async fn getblock(State(node): State<Arc<Node>>, Form(query): Form<HashQuery>) -> String {
    let Ok(hash) = Hash::from_hex(&query.headerhash) else {
        return String::new();
    };
    node.block_raw(&hash).unwrap_or_default()
}

/// `POST /checkblock` — whether the hash is on our active chain.
async fn checkblock(State(node): State<Arc<Node>>, Form(query): Form<HashQuery>) -> Json<bool> {
    let Ok(hash) = Hash::from_hex(&query.headerhash) else {
        return Json(false);
    };
    Json(node.is_on_active_chain(&hash))
}

/// `POST /getblockhashes` — active-chain hashes strictly above the
/// caller's height.
async fn getblockhashes(
    State(node): State<Arc<Node>>,
    Form(query): Form<HeightQuery>,
) -> Json<Vec<String>> {
    let hashes = node
        .hashes_above(query.myheight)
        .into_iter()
        .map(|h| h.to_string())
        .collect();
    Json(hashes)
}

/// `POST /newblock` — ingest a gossiped block.
async fn newblock(State(node): State<Arc<Node>>, body: String) -> Json<&'static str> {
    let block = match Block::from_canonical_json(&body) {
        Ok(block) => block,
        Err(e) => {
            debug!(error = %e, "dropping malformed block");
            return Json(ACK_MALFORMED);
        }
    };
    match node.submit_block(&block) {
        Ok(_) => Json(ACK_OK),
        Err(e) => {
            debug!(error = %e, "rejected gossiped block");
            Json(ACK_REJECTED)
        }
    }
}

/// `POST /newtransaction` — ingest a gossiped transaction.
async fn newtransaction(State(node): State<Arc<Node>>, body: String) -> Json<&'static str> {
    let tx = match Transaction::from_canonical_json(&body) {
        Ok(tx) => tx,
        Err(e) => {
            debug!(error = %e, "dropping malformed transaction");
            return Json(ACK_MALFORMED);
        }
    };
    match node.submit_transaction(&tx) {
        Ok(_) => Json(ACK_OK),
        Err(e) => {
            debug!(error = %e, "rejected gossiped transaction");
            Json(ACK_REJECTED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use beck_core::genesis;
    use beck_core::store::MemoryBlockStore;

    use crate::config::NodeConfig;

    fn test_node() -> Arc<Node> {
        let config = NodeConfig {
            mine: false,
            sync: false,
            ..NodeConfig::default()
        };
        Node::new(config, Arc::new(MemoryBlockStore::new())).unwrap()
    }

    #[tokio::test]
    async fn greet_reports_our_height() {
        let node = test_node();
        let reply = greet(
            State(node),
            Form(Greeting { port: 9001, version: "0.1.0".into(), blockheight: 7 }),
        )
        .await;
        assert_eq!(reply.0.blockheight, 1);
        assert_eq!(reply.0.version, NODE_VERSION);
    }

    #[tokio::test]
    async fn getblock_serves_stored_blocks() {
        let node = test_node();
        let genesis = genesis::genesis_block();
        let hash = genesis.header.hash().unwrap();

        let body = getblock(
            State(node),
            Form(HashQuery { headerhash: hash.to_string() }),
        )
        .await;
        assert_eq!(body, genesis.canonical_json().unwrap());
    }

    #[tokio::test]
    async fn getblock_unknown_is_empty_marker() {
        let node = test_node();
        let body = getblock(
            State(Arc::clone(&node)),
            Form(HashQuery { headerhash: "ab".repeat(32) }),
        )
        .await;
        assert!(body.is_empty());

        let body = getblock(State(node), Form(HashQuery { headerhash: "garbage".into() })).await;
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn checkblock_reflects_active_chain() {
        let node = test_node();
        let hash = genesis::genesis_block().header.hash().unwrap();

        let known = checkblock(
            State(Arc::clone(&node)),
            Form(HashQuery { headerhash: hash.to_string() }),
        )
        .await;
        assert!(known.0);

        let unknown = checkblock(
            State(node),
            Form(HashQuery { headerhash: "ab".repeat(32) }),
        )
        .await;
        assert!(!unknown.0);
    }

    #[tokio::test]
    async fn getblockhashes_strictly_above() {
        let node = test_node();
        let all = getblockhashes(State(Arc::clone(&node)), Form(HeightQuery { myheight: -1 })).await;
        assert_eq!(all.0.len(), 1);

        let none = getblockhashes(State(node), Form(HeightQuery { myheight: 0 })).await;
        assert!(none.0.is_empty());
    }

    #[tokio::test]
    async fn newblock_acks_duplicates_and_flags_garbage() {
        let node = test_node();
        let genesis_body = genesis::genesis_block().canonical_json().unwrap();

        // Duplicate of an already-known block: silent success.
        let ack = newblock(State(Arc::clone(&node)), genesis_body).await;
        assert_eq!(ack.0, ACK_OK);

        let ack = newblock(State(node), "not json".to_string()).await;
        assert_eq!(ack.0, ACK_MALFORMED);
    }

    #[tokio::test]
    async fn newtransaction_rejects_invalid() {
        let node = test_node();
        let mut tx = genesis::genesis_block().transactions[0].clone();
        tx.is_coinbase = false;
        let body = tx.canonical_json().unwrap();

        let ack = newtransaction(State(Arc::clone(&node)), body).await;
        assert_eq!(ack.0, ACK_REJECTED);
        assert_eq!(node.mempool_len(), 0);
    }
}
