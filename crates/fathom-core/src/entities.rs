//! Decoded block entities delivered to the user handler.
//!
//! Quantity fields (`gas`, `value`, header `size`, ...) are 256-bit integers
//! parsed from the archive's hex strings; they are never narrowed into
//! machine words. Addresses and hashes stay as lowercase `0x`-prefixed hex
//! strings, matching the filter vocabulary.

use crate::error::{Error, Result};
use alloy_primitives::U256;

/// Decoded block header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Short id, `"{height}-{hash[3:7]}"`.
    pub id: String,
    /// Block height.
    pub height: i64,
    /// Canonical block hash.
    pub hash: String,
    /// Hash of the parent block.
    pub parent_hash: String,
    /// Milliseconds since epoch. The archive reports seconds.
    pub timestamp: i64,
    pub nonce: U256,
    pub size: U256,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub sha3_uncles: String,
    pub logs_bloom: String,
    pub transactions_root: String,
    pub state_root: String,
    pub receipts_root: String,
    pub miner: String,
    pub difficulty: String,
    pub total_difficulty: String,
    pub extra_data: String,
}

/// Decoded event log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    /// `"{height}-{index}-{hash[3:11]}"`.
    pub id: String,
    /// Emitter address, lowercase hex.
    pub address: String,
    /// Position of the log within its block.
    pub index: i64,
    /// Position of the emitting transaction within the block.
    pub transaction_index: i64,
    pub topics: Vec<String>,
    pub data: String,
    pub removed: bool,
}

/// Decoded transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// `"{height}-{index}-{hash[3:11]}"`.
    pub id: String,
    /// Position of the transaction within its block.
    pub index: i64,
    pub hash: String,
    pub from: String,
    /// Absent for contract creations.
    pub to: Option<String>,
    pub value: U256,
    pub nonce: U256,
    pub gas: U256,
    pub gas_price: U256,
    pub input: String,
    /// First 4 bytes of `input`, the method selector.
    pub sighash: Option<String>,
    pub v: U256,
    pub r: String,
    pub s: String,
    pub chain_id: Option<i64>,
    /// Transaction envelope type.
    pub kind: Option<i64>,
}

/// One unit delivered to the handler: a log or a transaction.
///
/// `address` is the canonical filter key: the emitter for log items, and
/// `to` (or `from` for contract creations) for transaction items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// An event log, joined with its transaction when that was selected.
    EvmLog {
        address: String,
        log: Log,
        transaction: Option<Transaction>,
    },
    /// A transaction.
    Transaction {
        address: String,
        transaction: Transaction,
    },
}

impl Item {
    /// The canonical filter key of the item.
    pub fn address(&self) -> &str {
        match self {
            Item::EvmLog { address, .. } => address,
            Item::Transaction { address, .. } => address,
        }
    }

    /// Total order of items within one block.
    ///
    /// Logs order by `(transaction_index, log index)`, transactions by their
    /// index, and a log sorts before the transaction that emitted it, so
    /// events appear ahead of the enclosing call marker.
    pub fn ordering_key(&self) -> (i64, u8, i64) {
        match self {
            Item::EvmLog { log, .. } => (log.transaction_index, 0, log.index),
            Item::Transaction { transaction, .. } => (transaction.index, 1, 0),
        }
    }
}

/// A fully decoded block: header plus its ordered items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub header: BlockHeader,
    /// Ordered by [`Item::ordering_key`].
    pub items: Vec<Item>,
}

/// Build a block id: `"{height}-{hash[3:7]}"`.
pub fn format_block_id(height: i64, hash: &str) -> String {
    format!("{}-{}", height, hash_window(hash, 3, 7))
}

/// Build a log or transaction id: `"{height}-{index}-{hash[3:11]}"`.
pub fn format_item_id(height: i64, index: i64, hash: &str) -> String {
    format!("{}-{}-{}", height, index, hash_window(hash, 3, 11))
}

fn hash_window(hash: &str, start: usize, end: usize) -> &str {
    let len = hash.len();
    hash.get(start.min(len)..end.min(len)).unwrap_or("")
}

/// Parse a `0x`-prefixed hex quantity into a 256-bit integer.
///
/// An empty or absent quantity decodes to zero: fields outside the query's
/// selection are zero-valued by contract.
pub fn parse_quantity(value: &str) -> Result<U256> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|_| Error::InvalidQuantity {
        value: value.to_string(),
    })
}
