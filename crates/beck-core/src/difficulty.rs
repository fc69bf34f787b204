//! Proof-of-work target arithmetic and difficulty retargeting.
//!
//! The difficulty is an integer divisor `D`: a header hash, read as a
//! 256-bit big-endian integer, is valid iff it is strictly below
//! `MAX_TARGET / D`. Higher `D` means a smaller window of acceptable
//! hashes. Retargeting rescales `D` every
//! [`BLOCK_DIFFICULTY_UPDATE_INTERVAL`] blocks by the ratio of expected to
//! observed interval time, never dropping below 1.

use uint::construct_uint;

use crate::constants::{AVERAGE_BLOCK_MINE_INTERVAL, BLOCK_DIFFICULTY_UPDATE_INTERVAL};
use crate::types::Hash;

construct_uint! {
    /// 256-bit unsigned integer for hash/target comparison.
    pub struct U256(4);
}

/// The easiest possible target: every difficulty divides this.
pub const MAX_TARGET: U256 = U256::MAX;

/// The hash threshold for a given difficulty divisor.
pub fn pow_threshold(difficulty: u64) -> U256 {
    MAX_TARGET / U256::from(difficulty.max(1))
}

/// Whether a header hash satisfies a difficulty divisor.
///
/// A malformed hash never satisfies any difficulty.
pub fn is_proper_difficulty(hash: &Hash, difficulty: u64) -> bool {
    match U256::from_str_radix(hash.as_str(), 16) {
        Ok(value) => value < pow_threshold(difficulty),
        Err(_) => false,
    }
}

/// Rescale a difficulty divisor after a retarget interval.
///
/// `elapsed_secs` is the wall-clock time the last
/// [`BLOCK_DIFFICULTY_UPDATE_INTERVAL`] blocks actually took. The new
/// difficulty is `old * expected / elapsed`, floored, clamped to at least 1.
/// Non-positive elapsed times (possible with adversarial timestamps inside
/// the future-drift allowance) are treated as one second.
pub fn retarget(old_difficulty: u64, elapsed_secs: i64) -> u64 {
    let expected = (AVERAGE_BLOCK_MINE_INTERVAL * BLOCK_DIFFICULTY_UPDATE_INTERVAL) as u128;
    let elapsed = elapsed_secs.max(1) as u128;
    let scaled = (old_difficulty as u128) * expected / elapsed;
    scaled.clamp(1, u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::dhash_str;

    const EXPECTED: i64 =
        (AVERAGE_BLOCK_MINE_INTERVAL * BLOCK_DIFFICULTY_UPDATE_INTERVAL) as i64;

    #[test]
    fn threshold_halves_with_doubled_difficulty() {
        assert_eq!(pow_threshold(2), MAX_TARGET / U256::from(2u64));
        assert!(pow_threshold(2) < pow_threshold(1));
    }

    #[test]
    fn zero_difficulty_is_clamped() {
        assert_eq!(pow_threshold(0), pow_threshold(1));
    }

    #[test]
    fn difficulty_one_accepts_real_hashes() {
        // Any honest digest is far below U256::MAX.
        assert!(is_proper_difficulty(&dhash_str("block"), 1));
    }

    #[test]
    fn extreme_difficulty_rejects_real_hashes() {
        let hash = dhash_str("block");
        // A hash with its top bit set fails once the threshold shrinks
        // below it; u64::MAX shrinks the window to ~2^192.
        assert!(!is_proper_difficulty(&hash, u64::MAX));
    }

    #[test]
    fn malformed_hash_never_passes() {
        let bad = Hash::from_digest("not-hex".to_string());
        assert!(!is_proper_difficulty(&bad, 1));
    }

    #[test]
    fn retarget_on_schedule_is_stable() {
        assert_eq!(retarget(1000, EXPECTED), 1000);
    }

    #[test]
    fn retarget_fast_blocks_raise_difficulty() {
        assert_eq!(retarget(1000, EXPECTED / 2), 2000);
    }

    #[test]
    fn retarget_slow_blocks_lower_difficulty() {
        assert_eq!(retarget(1000, EXPECTED * 2), 500);
    }

    #[test]
    fn retarget_never_drops_below_one() {
        assert_eq!(retarget(1, EXPECTED * 10), 1);
    }

    #[test]
    fn retarget_clamps_non_positive_elapsed() {
        assert_eq!(retarget(5, 0), retarget(5, 1));
        assert_eq!(retarget(5, -100), retarget(5, 1));
    }

    #[test]
    fn retarget_floors() {
        // 1000 * expected / (expected * 3) = 333.33… → 333
        assert_eq!(retarget(1000, EXPECTED * 3), 333);
    }
}
