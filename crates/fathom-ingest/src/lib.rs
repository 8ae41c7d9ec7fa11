//! Ingest pipeline for the fathom EVM archive processor.
//!
//! This crate pulls historical block data out of an archive service and
//! delivers it, decoded and ordered, to a user handler under transactional
//! progress tracking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Registrations│  (log and transaction filters over block ranges)
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Batch plan  │  disjoint, strictly increasing {range, request} list
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐   HTTP    ┌─────────┐
//! │Ingest pipeline├──────────►│ Archive │  prefetches up to 3 batches
//! └──────┬───────┘  retries  └─────────┘
//!        ▼
//! ┌──────────────┐
//! │    Driver    │  handler inside a DB transaction, then checkpoint
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`archive`] - query DSL encoder and HTTP client with retry/backoff
//! - [`decode`] - archive JSON to typed blocks, items ordered per block
//! - [`pipeline`] - bounded prefetch between archive and driver
//! - [`database`] - the checkpoint database seam
//! - [`processor`] - the driver loop and registration API

pub mod archive;
pub mod config;
pub mod database;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod processor;

#[cfg(test)]
mod support;

pub use error::{Error, Result};

pub use archive::{ArchiveClient, ArchiveQuery, DataSource, QueryResponse};
pub use config::ProcessorConfig;
pub use database::{Database, MemoryDatabase, MemoryStore};
pub use pipeline::{BlockBatch, Ingest, IngestOptions};
pub use processor::{BatchContext, Processor};
