//! Core data model for the fathom EVM archive processor.
//!
//! This crate provides:
//! - Block [`Range`] algebra used by the batch planner
//! - Filter clauses and field selection ([`DataRequest`] and friends)
//! - The batch planner ([`merge_batch_requests`], [`apply_range_bound`])
//! - Decoded block entities delivered to user handlers
//! - Prometheus metrics helpers
//!
//! Everything here is pure data and arithmetic; the HTTP archive client,
//! the decode layer, and the ingest pipeline live in `fathom-ingest`.

mod entities;
mod error;
mod filter;
mod plan;
mod range;

pub mod metrics;

pub use entities::{
    format_block_id, format_item_id, parse_quantity, BlockData, BlockHeader, Item, Log,
    Transaction,
};
pub use error::{Error, Result};
pub use filter::{
    DataRequest, FieldSelection, LogRequest, TxRequest, BLOCK_DEFAULT_FIELDS, LOG_DEFAULT_FIELDS,
    TX_DEFAULT_FIELDS,
};
pub use plan::{apply_range_bound, merge_batch_requests, BatchRequest};
pub use range::Range;
