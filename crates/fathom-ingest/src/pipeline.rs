//! The prefetch pipeline between the archive and the driver loop.
//!
//! A single producer task walks the plan head-first: it waits for the
//! archive to reach the segment's first block, queries, decodes, and pushes
//! the finished batch into a bounded channel. The consumer pulls batches in
//! FIFO order via [`Ingest::next_batch`], so delivery order follows plan
//! order and the producer runs at most [`PREFETCH_CAPACITY`] batches ahead.
//!
//! A response that covers less than the requested range re-queues the
//! remainder as the new plan head. Errors travel through the channel like
//! batches and end the producer; dropping the [`Ingest`] makes the
//! producer's send fail, halting it after the current fetch.

use crate::archive::{build_query, DataSource};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::decode::decode_batch;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use fathom_core::{BatchRequest, BlockData, DataRequest, Range};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How many decoded batches may sit ahead of the consumer.
pub const PREFETCH_CAPACITY: usize = 3;

/// A decoded batch as delivered to the driver.
#[derive(Debug, Clone)]
pub struct BlockBatch {
    /// Decoded blocks, ascending by height. May be empty when nothing in
    /// the covered range matched.
    pub blocks: Vec<BlockData>,
    /// The range this batch settles; `to` is always present.
    pub range: Range,
    /// The filter request the batch was fetched with.
    pub request: DataRequest,
    /// When the archive round trip started.
    pub fetch_start_time: DateTime<Utc>,
    /// When the archive round trip finished.
    pub fetch_end_time: DateTime<Utc>,
}

/// Tuning knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Sleep between archive height polls while the plan head is above the
    /// archive's watermark.
    pub poll_interval: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Consumer handle of the prefetch pipeline.
pub struct Ingest {
    batches: mpsc::Receiver<Result<BlockBatch>>,
    archive_height: Arc<AtomicI64>,
}

impl Ingest {
    /// Spawn the producer task over `plan` and return the consumer handle.
    pub fn spawn<S: DataSource>(source: S, plan: Vec<BatchRequest>, options: IngestOptions) -> Self {
        let (tx, rx) = mpsc::channel(PREFETCH_CAPACITY);
        let archive_height = Arc::new(AtomicI64::new(-1));
        let shared_height = Arc::clone(&archive_height);
        tokio::spawn(async move {
            let mut plan: VecDeque<BatchRequest> = plan.into();
            if let Err(err) = drive(&source, &mut plan, &options, &tx, &shared_height).await {
                // The consumer may already be gone; then there is no one
                // left to tell.
                let _ = tx.send(Err(err)).await;
            }
        });
        Self {
            batches: rx,
            archive_height,
        }
    }

    /// Next batch in plan order, or `None` once the plan is exhausted.
    pub async fn next_batch(&mut self) -> Option<Result<BlockBatch>> {
        self.batches.recv().await
    }

    /// Last observed archive height; `-1` before the first observation.
    /// Monotonically non-decreasing.
    pub fn archive_height(&self) -> i64 {
        self.archive_height.load(Ordering::SeqCst)
    }
}

async fn drive<S: DataSource>(
    source: &S,
    plan: &mut VecDeque<BatchRequest>,
    options: &IngestOptions,
    batches: &mpsc::Sender<Result<BlockBatch>>,
    shared_height: &AtomicI64,
) -> Result<()> {
    let mut archive_height: i64 = -1;

    while let Some(head) = plan.front().cloned() {
        // Wait until the archive has the segment's first block.
        while archive_height < head.range.from {
            let observed = source.height().await?;
            if observed > archive_height {
                archive_height = observed;
                shared_height.store(observed, Ordering::SeqCst);
            }
            if archive_height >= head.range.from {
                break;
            }
            tracing::debug!(
                "archive height {} below {}, polling again in {:?}",
                archive_height,
                head.range.from,
                options.poll_interval
            );
            tokio::time::sleep(options.poll_interval).await;
        }

        let query = build_query(&head.request, head.range, archive_height)?;
        let fetch_start_time = Utc::now();
        let response = source.query(&query).await?;
        let fetch_end_time = Utc::now();
        metrics::histogram!("archive_query_duration_seconds").record(
            (fetch_end_time - fetch_start_time)
                .num_milliseconds()
                .max(0) as f64
                / 1000.0,
        );

        let response_height = response.status.height();
        if response_height < archive_height {
            return Err(Error::HeightRegression {
                observed: archive_height,
                received: response_height,
            });
        }
        archive_height = response_height;
        shared_height.store(response_height, Ordering::SeqCst);

        if response.next_block <= head.range.from {
            return Err(Error::Archive {
                message: format!(
                    "archive made no progress: nextBlock {} is not above fromBlock {}",
                    response.next_block, head.range.from
                ),
            });
        }
        let to = (response.next_block - 1).min(head.range.end());

        let blocks = decode_batch(response.data)?;
        if let (Some(first), Some(last)) = (blocks.first(), blocks.last()) {
            if first.header.height < head.range.from || last.header.height > to {
                return Err(Error::Archive {
                    message: format!(
                        "blocks [{}, {}] fall outside the requested range [{}, {}]",
                        first.header.height, last.header.height, head.range.from, to
                    ),
                });
            }
        }

        // Re-queue the uncovered remainder, or retire the segment.
        if to < head.range.end() {
            if let Some(front) = plan.front_mut() {
                front.range.from = to + 1;
            }
        } else {
            plan.pop_front();
        }

        let batch = BlockBatch {
            blocks,
            range: Range {
                from: head.range.from,
                to: Some(to),
            },
            request: head.request,
            fetch_start_time,
            fetch_end_time,
        };
        if batches.send(Ok(batch)).await.is_err() {
            // Consumer dropped; stop fetching.
            return Ok(());
        }
    }
    Ok(())
}
