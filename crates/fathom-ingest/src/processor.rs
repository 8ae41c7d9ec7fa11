//! The processor driver: wiring between plan, pipeline, database and the
//! user handler.
//!
//! The driver owns the outer loop. At startup it asks the database for the
//! last committed height, clamps the configured range against it, builds
//! the batch plan and spawns the ingest pipeline. Every non-empty batch is
//! delivered to the handler inside a database transaction spanning exactly
//! the decoded blocks; the checkpoint then advances to the end of the
//! batch's range, which may lie past the last decoded block when a segment
//! matched nothing.

use crate::archive::{ArchiveClient, DataSource, RetryInfo, RetryObserver};
use crate::config::{resolve_squid_id, ProcessorConfig};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::pipeline::{Ingest, IngestOptions};
use fathom_core::{
    apply_range_bound, merge_batch_requests, BatchRequest, BlockData, DataRequest, LogRequest,
    Range, TxRequest,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler gets for one batch.
pub struct BatchContext<S> {
    /// Decoded blocks, ascending by height, items ordered within each block.
    pub blocks: Vec<BlockData>,
    /// The open transaction's store handle.
    pub store: S,
}

/// An EVM archive data processor.
///
/// Register filters, then call [`run`](Processor::run) with a database and
/// a handler. The processor pulls batches from the archive until the
/// configured range is exhausted and returns; any unrecovered failure
/// surfaces as an error.
#[derive(Default)]
pub struct Processor {
    config: ProcessorConfig,
    registrations: Vec<BatchRequest>,
}

impl Processor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the archive endpoint URL.
    pub fn with_archive(mut self, url: impl Into<String>) -> Self {
        self.config.archive_url = Some(url.into());
        self
    }

    /// Bound every registered filter by `range`.
    pub fn with_block_range(mut self, range: Range) -> Self {
        self.config.block_range = range;
        self
    }

    /// Override the sleep between archive height polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Override the squid identifier sent as `x-squid-id`.
    pub fn with_squid_id(mut self, squid_id: impl Into<String>) -> Self {
        self.config.squid_id = Some(squid_id.into());
        self
    }

    /// Subscribe to logs matching `request` within `range`.
    pub fn add_log_request(self, range: Range, request: LogRequest) -> Self {
        self.add_request(range, DataRequest::from_log(request))
    }

    /// Subscribe to transactions matching `request` within `range`.
    pub fn add_tx_request(self, range: Range, request: TxRequest) -> Self {
        self.add_request(range, DataRequest::from_tx(request))
    }

    /// Fetch every block header in `range`, matches or not.
    pub fn include_all_blocks(self, range: Range) -> Self {
        self.add_request(
            range,
            DataRequest {
                include_all_blocks: true,
                ..DataRequest::default()
            },
        )
    }

    /// Subscribe to an arbitrary request within `range`.
    pub fn add_request(mut self, range: Range, request: DataRequest) -> Self {
        self.registrations.push(BatchRequest { range, request });
        self
    }

    /// Run against the configured archive endpoint.
    pub async fn run<D, H, Fut>(self, db: D, handler: H) -> Result<()>
    where
        D: Database,
        H: Fn(BatchContext<D::Store>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let url = self
            .config
            .archive_url
            .clone()
            .ok_or_else(|| Error::Config("no archive endpoint configured".to_string()))?;
        let squid_id = self
            .config
            .squid_id
            .clone()
            .unwrap_or_else(resolve_squid_id);
        let client = ArchiveClient::new(url, &squid_id)?.with_retry_observer(retry_observer());
        self.run_with_source(client, db, handler).await
    }

    /// Run against an arbitrary [`DataSource`]. Useful for local archives
    /// and tests.
    pub async fn run_with_source<S, D, H, Fut>(self, source: S, mut db: D, handler: H) -> Result<()>
    where
        S: DataSource,
        D: Database,
        H: Fn(BatchContext<D::Store>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let height_at_start = db.connect().await.map_err(Error::Database)?;
        tracing::info!("last committed block: {}", height_at_start);

        let configured = self.config.block_range;
        if configured.end() < height_at_start + 1 {
            tracing::info!(
                "requested range {} is already behind block {}, nothing to do",
                configured,
                height_at_start
            );
            return Ok(());
        }
        let effective = Range {
            from: configured.from.max(height_at_start + 1),
            to: configured.to,
        };

        let plan = apply_range_bound(merge_batch_requests(self.registrations), &effective);
        tracing::info!("processing {} within {} plan segments", effective, plan.len());

        let options = IngestOptions {
            poll_interval: self.config.poll_interval,
        };
        let mut ingest = Ingest::spawn(source, plan, options);
        let handler = Arc::new(handler);

        while let Some(batch) = ingest.next_batch().await {
            let batch = batch?;
            let last_block = batch.range.end();
            let block_count = batch.blocks.len();
            let item_count: usize = batch.blocks.iter().map(|b| b.items.len()).sum();
            let fetch_seconds = (batch.fetch_end_time - batch.fetch_start_time)
                .num_milliseconds()
                .max(0) as f64
                / 1000.0;

            if let (Some(first), Some(last)) = (batch.blocks.first(), batch.blocks.last()) {
                let span = (first.header.height, last.header.height);
                let blocks = batch.blocks;
                let handler = Arc::clone(&handler);
                db.transact(span.0, span.1, move |store| {
                    let ctx = BatchContext { blocks, store };
                    async move { handler.as_ref()(ctx).await }
                })
                .await
                .map_err(Error::Handler)?;
            }

            db.advance(last_block).await.map_err(Error::Database)?;

            metrics::gauge!("processor_last_block").set(last_block as f64);
            metrics::gauge!("processor_archive_height").set(ingest.archive_height() as f64);
            metrics::counter!("processor_batches_total").increment(1);
            metrics::counter!("processor_blocks_total").increment(block_count as u64);
            metrics::counter!("processor_items_total").increment(item_count as u64);

            let range_len = (last_block - batch.range.from + 1).max(0) as f64;
            tracing::info!(
                "{} done: {} blocks, {} items, {:.1} blocks/s (archive height {})",
                batch.range,
                block_count,
                item_count,
                if fetch_seconds > 0.0 {
                    range_len / fetch_seconds
                } else {
                    0.0
                },
                ingest.archive_height()
            );
        }

        tracing::info!("processing reached the end of the requested range");
        Ok(())
    }
}

fn retry_observer() -> RetryObserver {
    Arc::new(|info: &RetryInfo<'_>| {
        metrics::counter!("archive_retries_total").increment(1);
        tracing::warn!(
            "archive request failed ({}), retry {} in {:?}",
            info.error,
            info.errors_in_row,
            info.backoff
        );
    })
}
