//! Protocol constants. All monetary values are in the smallest unit
//! (1 BECK = 10^8 units).

/// Smallest-unit multiplier: 1 BECK = 10^8 units.
pub const COIN: u64 = 100_000_000;

/// Total issuance cap.
pub const MAX_COINS: u64 = 21_000_000 * COIN;

/// Reward paid by the coinbase of the first reward epoch.
pub const INITIAL_BLOCK_REWARD: u64 = 50 * COIN;

/// The block reward halves every this many blocks.
pub const REWARD_UPDATE_INTERVAL: u64 = 20_000;

/// Length of a hash in lowercase hex characters (32 bytes).
pub const HASH_LENGTH_HEX: usize = 64;

/// Maximum serialized size of a block (and of a single transaction), in KiB.
pub const MAX_BLOCK_SIZE_KB: u64 = 4096;

/// [`MAX_BLOCK_SIZE_KB`] expressed in bytes.
pub const MAX_BLOCK_SIZE_BYTES: u64 = MAX_BLOCK_SIZE_KB * 1024;

/// A block timestamp may not be further than this ahead of local time.
pub const BLOCK_MAX_TIME_FUTURE_SECS: i64 = 2 * 60 * 60;

/// The difficulty target is recomputed every this many blocks.
pub const BLOCK_DIFFICULTY_UPDATE_INTERVAL: u64 = 1024;

/// Target average spacing between blocks, in seconds.
pub const AVERAGE_BLOCK_MINE_INTERVAL: u64 = 10 * 60;

/// Number of trailing headers whose median timestamp bounds a new block's
/// timestamp from below.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Confirmations required before a coinbase output becomes spendable.
pub const COINBASE_MATURITY: u64 = 100;

/// A side chain is kept alive while its tip is within this many blocks of
/// the active tip.
pub const FORK_CHAIN_HEIGHT: u64 = 10;

/// Difficulty of a fresh chain, before the first retarget.
pub const INITIAL_BLOCK_DIFFICULTY: u64 = 1;

/// Version stamped into transactions and block headers.
pub const PROTOCOL_VERSION: u32 = 1;

/// Node software version exchanged in peer greetings.
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pending mempool fees that trigger the miner.
pub const MINE_FEE_THRESHOLD: u64 = 1000;

/// Pending mempool bytes that trigger the miner (5/8 of the block budget).
pub const MINE_SIZE_THRESHOLD_BYTES: u64 = MAX_BLOCK_SIZE_BYTES * 5 / 8;

/// Seconds after which a seed registry entry expires.
pub const ENTRY_DURATION: u64 = 60 * 60 * 24;

/// Default listen port for a node's peer RPC server.
pub const DEFAULT_NODE_PORT: u16 = 9000;

/// Default listen port for the seed registry.
pub const DEFAULT_SEED_PORT: u16 = 8080;

/// Default seed registry URL.
pub const DEFAULT_SEED_URL: &str = "http://localhost:8080";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuance_cap_in_smallest_units() {
        assert_eq!(MAX_COINS, 2_100_000_000_000_000);
    }

    #[test]
    fn size_budget_is_4_mib() {
        assert_eq!(MAX_BLOCK_SIZE_BYTES, 4_194_304);
    }

    #[test]
    fn mine_size_threshold_below_budget() {
        assert!(MINE_SIZE_THRESHOLD_BYTES < MAX_BLOCK_SIZE_BYTES);
    }
}
