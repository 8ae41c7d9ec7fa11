//! Encoding of batch requests into the archive's query DSL.
//!
//! The archive accepts a JSON document of the shape
//! `{fromBlock, toBlock, logs: [...], transactions: [...]}` where every
//! clause carries its own field selection as maps of attribute name to
//! `true`. Identity attributes are always requested, whatever the caller
//! selected, so the decoder can construct ids and join logs to their
//! transactions.

use crate::error::{Error, Result};
use fathom_core::{
    DataRequest, FieldSelection, LogRequest, Range, TxRequest, BLOCK_DEFAULT_FIELDS,
    LOG_DEFAULT_FIELDS, TX_DEFAULT_FIELDS,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// A query document ready to POST to `{url}/query`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveQuery {
    pub from_block: i64,
    pub to_block: i64,
    #[serde(skip_serializing_if = "is_false")]
    pub include_all_blocks: bool,
    pub logs: Vec<LogQuery>,
    pub transactions: Vec<TxQuery>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub address: Option<Vec<String>>,
    pub topics: Vec<Vec<String>>,
    pub field_selection: QueryFieldSelection,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxQuery {
    pub address: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sighash: Option<Vec<String>>,
    pub field_selection: QueryFieldSelection,
}

/// Field selection in wire form: attribute name to `true` per entity kind.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryFieldSelection {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub block: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub log: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub transaction: BTreeMap<String, bool>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Encode one plan segment into a query bounded by the observed archive
/// height: `toBlock = min(height, end(range))`.
pub fn build_query(request: &DataRequest, range: Range, archive_height: i64) -> Result<ArchiveQuery> {
    let from_block = range.from;
    let to_block = archive_height.min(range.end());
    if from_block > to_block {
        return Err(Error::Config(format!(
            "query range inverted: fromBlock {from_block} is above toBlock {to_block}"
        )));
    }

    Ok(ArchiveQuery {
        from_block,
        to_block,
        include_all_blocks: request.include_all_blocks,
        logs: request.logs.iter().map(encode_log_clause).collect(),
        transactions: request.transactions.iter().map(encode_tx_clause).collect(),
    })
}

fn encode_log_clause(clause: &LogRequest) -> LogQuery {
    LogQuery {
        address: lowercase_set(&clause.address),
        topics: clause
            .topics
            .iter()
            .map(|slot| slot.iter().map(|t| t.to_ascii_lowercase()).collect())
            .collect(),
        field_selection: assemble_log_selection(&clause.field_selection),
    }
}

fn encode_tx_clause(clause: &TxRequest) -> TxQuery {
    TxQuery {
        address: lowercase_set(&clause.address),
        sighash: lowercase_set(&clause.sighash),
        field_selection: assemble_tx_selection(&clause.field_selection),
    }
}

fn lowercase_set(values: &Option<Vec<String>>) -> Option<Vec<String>> {
    values
        .as_ref()
        .map(|v| v.iter().map(|s| s.to_ascii_lowercase()).collect())
}

/// Selection for a log clause: log and block defaults always, and the
/// transaction defaults exactly when the caller asked for any transaction
/// context (a selected nested entity pulls in its identity attributes).
fn assemble_log_selection(fields: &FieldSelection) -> QueryFieldSelection {
    QueryFieldSelection {
        block: with_defaults(BLOCK_DEFAULT_FIELDS, &fields.block),
        log: with_defaults(LOG_DEFAULT_FIELDS, &fields.log),
        transaction: if fields.transaction.is_empty() {
            BTreeMap::new()
        } else {
            with_defaults(TX_DEFAULT_FIELDS, &fields.transaction)
        },
    }
}

/// Selection for a transaction clause: transaction and block defaults always.
fn assemble_tx_selection(fields: &FieldSelection) -> QueryFieldSelection {
    QueryFieldSelection {
        block: with_defaults(BLOCK_DEFAULT_FIELDS, &fields.block),
        log: fields.log.iter().map(|f| (f.clone(), true)).collect(),
        transaction: with_defaults(TX_DEFAULT_FIELDS, &fields.transaction),
    }
}

fn with_defaults(
    defaults: &[&str],
    requested: &std::collections::BTreeSet<String>,
) -> BTreeMap<String, bool> {
    defaults
        .iter()
        .map(|f| (f.to_string(), true))
        .chain(requested.iter().map(|f| (f.clone(), true)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_request() -> DataRequest {
        DataRequest::from_log(LogRequest {
            address: Some(vec!["0xAB".to_string()]),
            topics: vec![vec!["0xDDf2".to_string()], vec![]],
            field_selection: FieldSelection::logs(["removed"]),
        })
    }

    #[test]
    fn test_to_block_is_min_of_height_and_range_end() {
        let q = build_query(&log_request(), Range::new(10, Some(20)).unwrap(), 15).unwrap();
        assert_eq!((q.from_block, q.to_block), (10, 15));

        let q = build_query(&log_request(), Range::new(10, Some(20)).unwrap(), 100).unwrap();
        assert_eq!((q.from_block, q.to_block), (10, 20));

        let q = build_query(&log_request(), Range::open(10), 100).unwrap();
        assert_eq!((q.from_block, q.to_block), (10, 100));
    }

    #[test]
    fn test_inverted_query_range_rejected() {
        assert!(build_query(&log_request(), Range::new(10, Some(20)).unwrap(), 9).is_err());
    }

    #[test]
    fn test_log_selection_gets_identity_defaults() {
        let q = build_query(&log_request(), Range::new(0, Some(1)).unwrap(), 10).unwrap();
        let sel = &q.logs[0].field_selection;
        for field in LOG_DEFAULT_FIELDS {
            assert!(sel.log.contains_key(*field), "missing log field {field}");
        }
        for field in BLOCK_DEFAULT_FIELDS {
            assert!(sel.block.contains_key(*field), "missing block field {field}");
        }
        assert!(sel.log.contains_key("removed"));
        // No transaction context was selected.
        assert!(sel.transaction.is_empty());
    }

    #[test]
    fn test_selected_transaction_context_injects_tx_defaults() {
        let request = DataRequest::from_log(LogRequest {
            address: None,
            topics: vec![],
            field_selection: FieldSelection::transactions(["gasPrice"]),
        });
        let q = build_query(&request, Range::new(0, Some(1)).unwrap(), 10).unwrap();
        let sel = &q.logs[0].field_selection;
        for field in TX_DEFAULT_FIELDS {
            assert!(sel.transaction.contains_key(*field), "missing tx field {field}");
        }
        assert!(sel.transaction.contains_key("gasPrice"));
    }

    #[test]
    fn test_addresses_and_topics_lowercased() {
        let q = build_query(&log_request(), Range::new(0, Some(1)).unwrap(), 10).unwrap();
        assert_eq!(q.logs[0].address, Some(vec!["0xab".to_string()]));
        assert_eq!(q.logs[0].topics[0], vec!["0xddf2".to_string()]);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let request = DataRequest {
            transactions: vec![TxRequest {
                address: Some(vec!["0xab".into()]),
                sighash: Some(vec!["0xa9059cbb".into()]),
                field_selection: FieldSelection::default(),
            }],
            include_all_blocks: true,
            ..DataRequest::default()
        };
        let q = build_query(&request, Range::new(5, Some(9)).unwrap(), 9).unwrap();
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["fromBlock"], 5);
        assert_eq!(json["toBlock"], 9);
        assert_eq!(json["includeAllBlocks"], true);
        assert_eq!(json["transactions"][0]["sighash"][0], "0xa9059cbb");
        assert_eq!(
            json["transactions"][0]["fieldSelection"]["transaction"]["index"],
            true
        );
    }
}
