//! Archive scan daemon.
//!
//! Pulls a block range from an archive endpoint with an optional log
//! filter, counts what comes back, and records per-block item counts in an
//! in-memory store. Useful for smoke-testing an archive deployment and as
//! a worked example of the processor API.
//!
//! # Usage
//!
//! ```bash
//! # Scan a bounded range for Transfer events of one contract
//! fathom-ingest \
//!     --archive https://eth.archive.example.net \
//!     --from-block 12000000 --to-block 12100000 \
//!     --address 0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48 \
//!     --topic0 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef
//! ```

use anyhow::Result;
use clap::Parser;
use fathom_core::metrics::{init_metrics, prometheus_port_from_env, start_metrics_server};
use fathom_core::{FieldSelection, Item, LogRequest, Range};
use fathom_ingest::{BatchContext, MemoryDatabase, MemoryStore, Processor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Archive scan daemon.
#[derive(Parser, Debug)]
#[command(name = "fathom-ingest")]
#[command(about = "Scan an EVM archive range and report what it contains")]
#[command(version)]
struct Args {
    /// Archive endpoint URL
    #[arg(long)]
    archive: String,

    /// First block to scan
    #[arg(long, default_value = "0")]
    from_block: i64,

    /// Last block to scan (open-ended when omitted)
    #[arg(long)]
    to_block: Option<i64>,

    /// Log emitter addresses to match (comma-separated; any when omitted)
    #[arg(long, value_delimiter = ',')]
    address: Vec<String>,

    /// topic0 values to match (comma-separated)
    #[arg(long, value_delimiter = ',')]
    topic0: Vec<String>,

    /// Fetch every block header in range, matches or not
    #[arg(long)]
    include_all_blocks: bool,

    /// Sleep between archive height polls, in milliseconds
    #[arg(long, default_value = "5000")]
    poll_interval_ms: u64,

    /// Metrics HTTP server port (falls back to PROCESSOR_PROMETHEUS_PORT /
    /// PROMETHEUS_PORT; 0 picks an ephemeral port; off when unset)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Override the x-squid-id header (falls back to SQUID_ID)
    #[arg(long)]
    squid_id: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("fathom_ingest=debug".parse().unwrap()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing::info!("fathom archive scan starting...");

    if let Some(port) = args.metrics_port.or_else(prometheus_port_from_env) {
        let handle = init_metrics();
        start_metrics_server(port, handle).await?;
    }

    let range = Range::new(args.from_block, args.to_block)?;
    let filter = LogRequest {
        address: (!args.address.is_empty()).then(|| args.address.clone()),
        topics: if args.topic0.is_empty() {
            vec![]
        } else {
            vec![args.topic0.clone()]
        },
        field_selection: FieldSelection::default(),
    };

    tracing::info!("Configuration:");
    tracing::info!("  Archive: {}", args.archive);
    tracing::info!("  Range: {}", range);
    tracing::info!(
        "  Addresses: {}",
        if args.address.is_empty() {
            "any".to_string()
        } else {
            args.address.join(", ")
        }
    );
    tracing::info!("  topic0 filters: {}", args.topic0.len());

    let mut processor = Processor::new()
        .with_archive(&args.archive)
        .with_block_range(range)
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .add_log_request(range, filter);
    if args.include_all_blocks {
        processor = processor.include_all_blocks(range);
    }
    if let Some(squid_id) = args.squid_id {
        processor = processor.with_squid_id(squid_id);
    }

    let logs_seen = Arc::new(AtomicU64::new(0));
    let txs_seen = Arc::new(AtomicU64::new(0));
    let handler = {
        let logs_seen = Arc::clone(&logs_seen);
        let txs_seen = Arc::clone(&txs_seen);
        move |ctx: BatchContext<MemoryStore>| {
            let logs_seen = Arc::clone(&logs_seen);
            let txs_seen = Arc::clone(&txs_seen);
            async move {
                for block in &ctx.blocks {
                    for item in &block.items {
                        match item {
                            Item::EvmLog { .. } => logs_seen.fetch_add(1, Ordering::Relaxed),
                            Item::Transaction { .. } => txs_seen.fetch_add(1, Ordering::Relaxed),
                        };
                    }
                    ctx.store
                        .put(block.header.id.clone(), block.items.len().to_string());
                }
                anyhow::Ok(())
            }
        }
    };

    let db = MemoryDatabase::new();
    let db_view = db.clone();
    processor.run(db, handler).await?;

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SCAN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Last block:        {}", db_view.last_height());
    tracing::info!("Blocks with items: {}", db_view.entries().len());
    tracing::info!("Logs:              {}", logs_seen.load(Ordering::Relaxed));
    tracing::info!("Transactions:      {}", txs_seen.load(Ordering::Relaxed));

    Ok(())
}
