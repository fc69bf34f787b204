//! Error types for the beck protocol.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("serialization: {0}")] Serialization(String),
    #[error("parse: {0}")] Parse(String),
    #[error("malformed hash: {0:?}")] MalformedHash(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid secret key")] InvalidSecretKey,
    #[error("invalid public key")] InvalidPublicKey,
    #[error("invalid signature encoding")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("oversized: {size} > {max}")] Oversized { size: u64, max: u64 },
    #[error("output {index} amount {amount} exceeds coin cap")] AmountOutOfRange { index: u64, amount: u64 },
    #[error("coinbase input {0} carries a payout reference")] CoinbaseWithPayout(u64),
    #[error("input {0} has no payout reference")] MissingPayout(u64),
    #[error("input {0} payout txid is not a 64-char hex hash")] MalformedPayoutTxid(u64),
    #[error("input {0} is missing a signature or public key")] EmptyCredentials(u64),
    #[error("locktime {locktime} is in the future (now {now})")] LocktimeInFuture { locktime: i64, now: i64 },
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("coinbase output from height {origin_height} immature at length {chain_length}")]
    ImmatureCoinbase { origin_height: u64, chain_length: u64 },
    #[error("invalid signature on input {index}")] InvalidSignature { index: u64 },
    #[error("value overflow")] ValueOverflow,
    #[error("inputs {inputs} do not exceed outputs {outputs}")] InputsDoNotCoverOutputs { inputs: u64, outputs: u64 },
    #[error("declared fee {declared} != actual fee {actual}")] FeeMismatch { declared: u64, actual: u64 },
    #[error(transparent)] Codec(#[from] CodecError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("oversized: {size} > {max}")] Oversized { size: u64, max: u64 },
    #[error("no transactions")] EmptyTransactions,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("unexpected coinbase at index {0}")] UnexpectedCoinbase(u64),
    #[error("merkle root mismatch")] InvalidMerkleRoot,
    #[error("declared difficulty {got} below chain difficulty {required}")]
    DifficultyBelowChain { got: u64, required: u64 },
    #[error("header hash does not meet the difficulty target")] InvalidPow,
    #[error("timestamp {timestamp} too far in the future (limit {limit})")]
    TimestampTooFarFuture { timestamp: i64, limit: i64 },
    #[error("timestamp {timestamp} not past the median {median}")]
    TimestampNotPastMedian { timestamp: i64, median: i64 },
    #[error("previous block hash does not match the chain tip")] InvalidPrevHash,
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("duplicate txid in block: {0}")] DuplicateTxid(String),
    #[error("double spend within block: {0}")] DoubleSpend(String),
    #[error("coinbase must have exactly two outputs, got {0}")] CoinbaseOutputCount(u64),
    #[error("coinbase reward {got} != expected {expected}")] CoinbaseRewardMismatch { got: u64, expected: u64 },
    #[error("coinbase fee output {got} != collected fees {expected}")] CoinbaseFeesMismatch { got: u64, expected: u64 },
    #[error("fee total overflow")] FeeOverflow,
    #[error("transaction {index}: {source}")] Transaction { index: u64, source: TransactionError },
    #[error(transparent)] Codec(#[from] CodecError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend: {0}")] Backend(String),
    #[error(transparent)] Codec(#[from] CodecError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block rejected: {0}")] Rejected(#[from] BlockError),
    #[error("no tracked chain contains parent {0}")] UnknownParent(String),
    #[error("chain inconsistency: {0}")] Inconsistent(String),
    #[error(transparent)] Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyKnown(String),
    #[error(transparent)] Invalid(#[from] TransactionError),
    #[error(transparent)] Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum BeckError {
    #[error(transparent)] Codec(#[from] CodecError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error("network: {0}")] Network(String),
}
