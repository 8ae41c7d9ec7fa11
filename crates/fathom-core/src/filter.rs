//! Filter clauses and field selection for archive queries.
//!
//! A [`DataRequest`] is the unit the batch planner works with: a set of log
//! clauses and transaction clauses plus request-wide flags. Clauses from
//! different registrations are merged by concatenation (in registration
//! order) and flags by OR, so merging is associative and a request merged
//! with itself selects the same data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Block header fields every query receives, whatever the caller selected.
pub const BLOCK_DEFAULT_FIELDS: &[&str] = &["number", "hash", "parentHash", "timestamp"];

/// Log fields every log clause receives.
pub const LOG_DEFAULT_FIELDS: &[&str] =
    &["address", "data", "index", "topics", "transactionIndex"];

/// Transaction fields every transaction clause receives.
pub const TX_DEFAULT_FIELDS: &[&str] = &["hash", "index", "from", "to", "input"];

/// Requested attribute names for each entity kind.
///
/// Names follow the archive's camelCase vocabulary (`gasPrice`, not
/// `gas_price`). Identity attributes are injected on top of whatever the
/// caller asks for, so an empty selection still yields decodable blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// Block header attributes.
    pub block: BTreeSet<String>,
    /// Log attributes.
    pub log: BTreeSet<String>,
    /// Transaction attributes.
    pub transaction: BTreeSet<String>,
}

impl FieldSelection {
    /// Selection with the given log attributes.
    pub fn logs<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            log: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Selection with the given transaction attributes.
    pub fn transactions<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transaction: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Union `other` into this selection.
    pub fn merge(&mut self, other: &FieldSelection) {
        self.block.extend(other.block.iter().cloned());
        self.log.extend(other.log.iter().cloned());
        self.transaction.extend(other.transaction.iter().cloned());
    }
}

/// A single log filter clause.
///
/// `address: None` matches logs from any contract. `topics` is positional:
/// each inner list is an OR-set of accepted values for that topic slot, and
/// an empty inner list accepts anything at that position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    /// Emitter addresses to match, or `None` for any.
    pub address: Option<Vec<String>>,
    /// Positional topic filter.
    pub topics: Vec<Vec<String>>,
    /// Attributes to fetch for matching logs.
    pub field_selection: FieldSelection,
}

/// A single transaction filter clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    /// `to` addresses to match, or `None` for any.
    pub address: Option<Vec<String>>,
    /// Method selectors (first 4 bytes of input) to match, or `None` for any.
    pub sighash: Option<Vec<String>>,
    /// Attributes to fetch for matching transactions.
    pub field_selection: FieldSelection,
}

/// The merged filter request attached to a plan segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    /// Log clauses, in registration order.
    pub logs: Vec<LogRequest>,
    /// Transaction clauses, in registration order.
    pub transactions: Vec<TxRequest>,
    /// Fetch headers for every block in range, matches or not.
    pub include_all_blocks: bool,
}

impl DataRequest {
    /// A request with a single log clause.
    pub fn from_log(log: LogRequest) -> Self {
        Self {
            logs: vec![log],
            ..Self::default()
        }
    }

    /// A request with a single transaction clause.
    pub fn from_tx(tx: TxRequest) -> Self {
        Self {
            transactions: vec![tx],
            ..Self::default()
        }
    }

    /// Merge two requests: clauses concatenate, flags OR.
    pub fn merge(&self, other: &DataRequest) -> DataRequest {
        let mut logs = Vec::with_capacity(self.logs.len() + other.logs.len());
        logs.extend(self.logs.iter().cloned());
        logs.extend(other.logs.iter().cloned());

        let mut transactions =
            Vec::with_capacity(self.transactions.len() + other.transactions.len());
        transactions.extend(self.transactions.iter().cloned());
        transactions.extend(other.transactions.iter().cloned());

        DataRequest {
            logs,
            transactions,
            include_all_blocks: self.include_all_blocks || other.include_all_blocks,
        }
    }
}
