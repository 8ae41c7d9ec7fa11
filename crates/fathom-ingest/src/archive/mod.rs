//! Archive service access.
//!
//! [`query`] encodes a plan segment into the archive's query DSL;
//! [`client`] speaks HTTP to the service with retry and backoff. The
//! pipeline depends only on the [`DataSource`] trait so it can be driven
//! by fakes in tests.

mod client;
mod query;

pub use client::{
    backoff_for, ArchiveClient, ArchiveStatus, DataSource, QueryResponse, RetryInfo,
    RetryObserver, BACKOFF_SCHEDULE_MS,
};
pub use query::{build_query, ArchiveQuery, LogQuery, QueryFieldSelection, TxQuery};
