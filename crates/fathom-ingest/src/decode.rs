//! Decoding archive JSON blocks into typed entities.
//!
//! The archive returns one entry per block, carrying the header plus the
//! logs and transactions that matched the query. Decoding assigns ids,
//! converts hex quantities into 256-bit integers, joins each log with its
//! transaction by `transactionIndex`, and orders the resulting items so
//! that events appear ahead of the call that emitted them.
//!
//! Attributes outside the query's field selection arrive absent and decode
//! to their zero values; only malformed values are errors. A failure while
//! decoding a block aborts the whole batch, enriched with the block's
//! height and hash.

use crate::error::{Error, Result};
use fathom_core::{
    format_block_id, format_item_id, parse_quantity, BlockData, BlockHeader, Item, Log,
    Transaction,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One block entry as returned by the archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub block: RawHeader,
    #[serde(default)]
    pub logs: Vec<RawLog>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

/// Block header in wire form. Only identity fields are required; anything
/// outside the field selection is simply absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHeader {
    pub number: i64,
    pub hash: String,
    pub parent_hash: Option<String>,
    /// Seconds since epoch.
    pub timestamp: Option<i64>,
    pub nonce: Option<String>,
    pub size: Option<String>,
    pub gas_limit: Option<String>,
    pub gas_used: Option<String>,
    pub sha3_uncles: Option<String>,
    pub logs_bloom: Option<String>,
    pub transactions_root: Option<String>,
    pub state_root: Option<String>,
    pub receipts_root: Option<String>,
    pub miner: Option<String>,
    pub difficulty: Option<String>,
    pub total_difficulty: Option<String>,
    pub extra_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub index: i64,
    pub transaction_index: i64,
    #[serde(default)]
    pub topics: Vec<String>,
    pub data: Option<String>,
    pub removed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub index: i64,
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub nonce: Option<String>,
    pub gas: Option<String>,
    pub gas_price: Option<String>,
    pub input: Option<String>,
    pub v: Option<String>,
    pub r: Option<String>,
    pub s: Option<String>,
    pub chain_id: Option<i64>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<i64>,
}

/// Decode and flatten a whole response payload, sorted by ascending height.
pub fn decode_batch(data: Vec<Vec<RawBlock>>) -> Result<Vec<BlockData>> {
    let mut blocks = data
        .into_iter()
        .flatten()
        .map(|raw| decode_block(&raw))
        .collect::<Result<Vec<_>>>()?;
    blocks.sort_by_key(|b| b.header.height);
    Ok(blocks)
}

/// Decode a single block into its typed form.
pub fn decode_block(raw: &RawBlock) -> Result<BlockData> {
    decode_block_inner(raw).map_err(|reason| Error::Decode {
        block_height: raw.block.number,
        block_hash: raw.block.hash.clone(),
        reason,
    })
}

fn decode_block_inner(raw: &RawBlock) -> std::result::Result<BlockData, String> {
    let header = decode_header(&raw.block)?;
    let height = header.height;
    let block_hash = &header.hash;

    let transactions: BTreeMap<i64, Transaction> = raw
        .transactions
        .iter()
        .map(|tx| Ok((tx.index, decode_transaction(tx, height, block_hash)?)))
        .collect::<std::result::Result<_, String>>()?;

    let mut items = Vec::with_capacity(raw.logs.len() + transactions.len());

    for raw_log in &raw.logs {
        let log = decode_log(raw_log, height, block_hash)?;
        let transaction = transactions.get(&log.transaction_index).cloned();
        items.push(Item::EvmLog {
            address: log.address.clone(),
            log,
            transaction,
        });
    }

    for transaction in transactions.into_values() {
        let address = transaction
            .to
            .clone()
            .unwrap_or_else(|| transaction.from.clone());
        items.push(Item::Transaction {
            address,
            transaction,
        });
    }

    items.sort_by_key(Item::ordering_key);

    Ok(BlockData { header, items })
}

fn decode_header(raw: &RawHeader) -> std::result::Result<BlockHeader, String> {
    Ok(BlockHeader {
        id: format_block_id(raw.number, &raw.hash),
        height: raw.number,
        hash: raw.hash.to_ascii_lowercase(),
        parent_hash: lowercase_or_empty(&raw.parent_hash),
        // Archive reports seconds; entities carry milliseconds.
        timestamp: raw.timestamp.unwrap_or(0) * 1000,
        nonce: quantity(&raw.nonce, "nonce")?,
        size: quantity(&raw.size, "size")?,
        gas_limit: quantity(&raw.gas_limit, "gasLimit")?,
        gas_used: quantity(&raw.gas_used, "gasUsed")?,
        sha3_uncles: raw.sha3_uncles.clone().unwrap_or_default(),
        logs_bloom: raw.logs_bloom.clone().unwrap_or_default(),
        transactions_root: raw.transactions_root.clone().unwrap_or_default(),
        state_root: raw.state_root.clone().unwrap_or_default(),
        receipts_root: raw.receipts_root.clone().unwrap_or_default(),
        miner: lowercase_or_empty(&raw.miner),
        difficulty: raw.difficulty.clone().unwrap_or_default(),
        total_difficulty: raw.total_difficulty.clone().unwrap_or_default(),
        extra_data: raw.extra_data.clone().unwrap_or_default(),
    })
}

fn decode_log(raw: &RawLog, height: i64, block_hash: &str) -> std::result::Result<Log, String> {
    Ok(Log {
        id: format_item_id(height, raw.index, block_hash),
        address: raw.address.to_ascii_lowercase(),
        index: raw.index,
        transaction_index: raw.transaction_index,
        topics: raw.topics.iter().map(|t| t.to_ascii_lowercase()).collect(),
        data: raw.data.clone().unwrap_or_default(),
        removed: raw.removed.unwrap_or(false),
    })
}

fn decode_transaction(
    raw: &RawTransaction,
    height: i64,
    block_hash: &str,
) -> std::result::Result<Transaction, String> {
    let input = raw.input.clone().unwrap_or_default().to_ascii_lowercase();
    Ok(Transaction {
        id: format_item_id(height, raw.index, block_hash),
        index: raw.index,
        hash: lowercase_or_empty(&raw.hash),
        from: lowercase_or_empty(&raw.from),
        to: raw.to.as_ref().map(|s| s.to_ascii_lowercase()),
        value: quantity(&raw.value, "value")?,
        nonce: quantity(&raw.nonce, "nonce")?,
        gas: quantity(&raw.gas, "gas")?,
        gas_price: quantity(&raw.gas_price, "gasPrice")?,
        sighash: sighash(&input),
        input,
        v: quantity(&raw.v, "v")?,
        r: raw.r.clone().unwrap_or_default(),
        s: raw.s.clone().unwrap_or_default(),
        chain_id: raw.chain_id,
        kind: raw.kind,
    })
}

/// First 4 bytes of the input data: `0x` plus 8 hex digits.
fn sighash(input: &str) -> Option<String> {
    if input.len() >= 10 && input.starts_with("0x") {
        Some(input[..10].to_string())
    } else {
        None
    }
}

fn quantity(
    value: &Option<String>,
    field: &str,
) -> std::result::Result<alloy_primitives::U256, String> {
    match value {
        Some(v) => parse_quantity(v).map_err(|e| format!("field '{field}': {e}")),
        None => Ok(alloy_primitives::U256::ZERO),
    }
}

fn lowercase_or_empty(value: &Option<String>) -> String {
    value
        .as_ref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}
