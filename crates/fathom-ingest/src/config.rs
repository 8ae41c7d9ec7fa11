//! Processor configuration and environment resolution.

use fathom_core::Range;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::Duration;

/// Environment variable overriding the squid identifier header.
pub const SQUID_ID_ENV: &str = "SQUID_ID";

/// How long the pipeline sleeps between archive height polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Static configuration of a [`Processor`](crate::Processor).
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Base URL of the archive service.
    pub archive_url: Option<String>,
    /// Outer bound applied to every registered filter range.
    pub block_range: Range,
    /// Sleep between archive height polls while waiting for data.
    pub poll_interval: Duration,
    /// Value of the `x-squid-id` header; resolved lazily when unset.
    pub squid_id: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            archive_url: None,
            block_range: Range::open(0),
            poll_interval: DEFAULT_POLL_INTERVAL,
            squid_id: None,
        }
    }
}

/// Resolve the squid identifier: the `SQUID_ID` environment variable when
/// set, otherwise a random 10 character alphanumeric id.
pub fn resolve_squid_id() -> String {
    match std::env::var(SQUID_ID_ENV) {
        Ok(id) if !id.trim().is_empty() => id,
        _ => random_squid_id(),
    }
}

fn random_squid_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}
