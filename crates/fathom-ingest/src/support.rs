//! Test fixtures shared by the pipeline and processor tests.

use crate::archive::{ArchiveQuery, ArchiveStatus, DataSource, QueryResponse};
use crate::decode::{RawBlock, RawHeader};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Scripted in-process archive.
///
/// Heights are returned per call, with the last entry repeating forever.
/// Query responses are consumed front to back; running out of script is an
/// error so a test never silently loops.
#[derive(Clone)]
pub(crate) struct MockArchive {
    inner: Arc<Inner>,
}

struct Inner {
    heights: Vec<i64>,
    height_calls: AtomicUsize,
    responses: Mutex<VecDeque<Result<QueryResponse>>>,
    queries: Mutex<Vec<ArchiveQuery>>,
}

impl MockArchive {
    pub(crate) fn new(heights: Vec<i64>) -> Self {
        assert!(!heights.is_empty(), "mock archive needs at least one height");
        Self {
            inner: Arc::new(Inner {
                heights,
                height_calls: AtomicUsize::new(0),
                responses: Mutex::new(VecDeque::new()),
                queries: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn with_response(self, response: QueryResponse) -> Self {
        self.inner.responses.lock().push_back(Ok(response));
        self
    }

    pub(crate) fn with_query_error(self, error: Error) -> Self {
        self.inner.responses.lock().push_back(Err(error));
        self
    }

    /// Queries issued so far, in order.
    pub(crate) fn queries(&self) -> Vec<ArchiveQuery> {
        self.inner.queries.lock().clone()
    }

    pub(crate) fn height_calls(&self) -> usize {
        self.inner.height_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DataSource for MockArchive {
    async fn height(&self) -> Result<i64> {
        let call = self.inner.height_calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.inner.heights.len() - 1);
        Ok(self.inner.heights[index])
    }

    async fn query(&self, query: &ArchiveQuery) -> Result<QueryResponse> {
        self.inner.queries.lock().push(query.clone());
        self.inner.responses.lock().pop_front().unwrap_or_else(|| {
            Err(Error::Archive {
                message: "mock archive ran out of scripted responses".to_string(),
            })
        })
    }
}

/// A status document whose computed height equals `height`.
pub(crate) fn status_at(height: i64) -> ArchiveStatus {
    ArchiveStatus {
        parquet_block_number: height,
        db_min_block_number: height,
        db_max_block_number: height,
    }
}

/// A bare block entry at `height` with a deterministic hash.
pub(crate) fn raw_block(height: i64) -> RawBlock {
    RawBlock {
        block: RawHeader {
            number: height,
            hash: format!("0x{height:064x}"),
            parent_hash: None,
            timestamp: Some(height),
            nonce: None,
            size: None,
            gas_limit: None,
            gas_used: None,
            sha3_uncles: None,
            logs_bloom: None,
            transactions_root: None,
            state_root: None,
            receipts_root: None,
            miner: None,
            difficulty: None,
            total_difficulty: None,
            extra_data: None,
        },
        logs: Vec::new(),
        transactions: Vec::new(),
    }
}

/// A query response reporting `height` and covering blocks up to
/// `next_block - 1`.
pub(crate) fn response(height: i64, blocks: Vec<RawBlock>, next_block: i64) -> QueryResponse {
    QueryResponse {
        status: status_at(height),
        data: vec![blocks],
        next_block,
        metrics: None,
    }
}
