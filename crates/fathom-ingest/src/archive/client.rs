//! HTTP client for the archive service.
//!
//! Two endpoints matter: `GET /status` for the archive's ingestion
//! watermark and `POST /query` for filtered block data. Transient failures
//! (HTTP 429/502/503, connect errors, timeouts) are retried forever on a
//! fixed backoff schedule; everything else surfaces immediately. Each
//! retry invokes the configured [`RetryObserver`] so the driver can emit
//! logs and metrics.

use crate::archive::query::ArchiveQuery;
use crate::decode::RawBlock;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Backoff schedule in milliseconds; the index is clamped to the last entry.
pub const BACKOFF_SCHEDULE_MS: [u64; 6] = [100, 500, 2000, 5000, 10_000, 20_000];

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Backoff before the next attempt, given how many attempts already failed.
pub fn backoff_for(errors_in_row: u32) -> Duration {
    let index = (errors_in_row as usize).min(BACKOFF_SCHEDULE_MS.len() - 1);
    Duration::from_millis(BACKOFF_SCHEDULE_MS[index])
}

/// Context handed to the retry observer on every retried failure.
pub struct RetryInfo<'a> {
    /// The transient error that triggered the retry.
    pub error: &'a Error,
    /// Query being retried, when the failing call was a query.
    pub query: Option<&'a ArchiveQuery>,
    /// Consecutive failures so far, counting this one.
    pub errors_in_row: u32,
    /// Sleep before the next attempt.
    pub backoff: Duration,
}

/// Callback invoked on every retried failure.
pub type RetryObserver = Arc<dyn Fn(&RetryInfo<'_>) + Send + Sync>;

/// Ingestion watermark of the archive, as reported by `GET /status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStatus {
    pub parquet_block_number: i64,
    pub db_max_block_number: i64,
    pub db_min_block_number: i64,
}

impl ArchiveStatus {
    /// The maximum height the archive guarantees queryable.
    ///
    /// The parquet store lags the hot database: when parquet has advanced
    /// past the database's lower bound the two are contiguous and the
    /// database head is the answer, otherwise only parquet is trustworthy.
    /// Height `0` means the archive holds no data yet and maps to `-1`.
    pub fn height(&self) -> i64 {
        let height = if self.parquet_block_number > self.db_min_block_number {
            self.db_max_block_number
        } else {
            self.parquet_block_number
        };
        if height == 0 {
            -1
        } else {
            height
        }
    }
}

/// A successful `POST /query` response.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// Archive watermark at response time.
    pub status: ArchiveStatus,
    /// Jagged block data; flatten before decoding.
    pub data: Vec<Vec<RawBlock>>,
    /// First block NOT covered by this response.
    pub next_block: i64,
    /// Opaque server-side timing data.
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryEnvelope {
    #[serde(default)]
    errors: Vec<ArchiveErrorMessage>,
    status: Option<ArchiveStatus>,
    data: Option<Vec<Vec<RawBlock>>>,
    next_block: Option<i64>,
    #[serde(default)]
    metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ArchiveErrorMessage {
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    path: Option<serde_json::Value>,
}

impl QueryEnvelope {
    fn into_response(self) -> Result<QueryResponse> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(Error::Archive {
                message: err.message,
            });
        }
        let (Some(status), Some(data), Some(next_block)) = (self.status, self.data, self.next_block)
        else {
            return Err(Error::Archive {
                message: "query response is missing status, data or nextBlock".to_string(),
            });
        };
        Ok(QueryResponse {
            status,
            data,
            next_block,
            metrics: self.metrics,
        })
    }
}

/// The archive as the pipeline sees it. [`ArchiveClient`] is the real
/// implementation; tests drive the pipeline with in-process fakes.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Current archive height, `-1` when the archive has no data yet.
    async fn height(&self) -> Result<i64>;

    /// Execute a filtered block query.
    async fn query(&self, query: &ArchiveQuery) -> Result<QueryResponse>;
}

/// HTTP client for a single archive endpoint.
pub struct ArchiveClient {
    http: reqwest::Client,
    url: String,
    on_retry: Option<RetryObserver>,
}

impl ArchiveClient {
    /// Create a client for `url`, sending `squid_id` as the `x-squid-id`
    /// header on every request.
    pub fn new(url: impl Into<String>, squid_id: &str) -> Result<Self> {
        let url: String = url.into();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-squid-id",
            reqwest::header::HeaderValue::from_str(squid_id)
                .map_err(|_| Error::Config(format!("invalid squid id: {squid_id:?}")))?,
        );

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            on_retry: None,
        })
    }

    /// Install a retry observer.
    pub fn with_retry_observer(mut self, on_retry: RetryObserver) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    /// Fetch the archive's status document.
    pub async fn status(&self) -> Result<ArchiveStatus> {
        let url = format!("{}/status", self.url);
        self.with_retry(None, || async {
            metrics::counter!("archive_requests_total").increment(1);
            let response = self.http.get(&url).send().await.map_err(|e| Error::Http {
                url: url.clone(),
                source: e,
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    url: url.clone(),
                });
            }
            response.json().await.map_err(|e| Error::Http {
                url: url.clone(),
                source: e,
            })
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, query: Option<&ArchiveQuery>, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut errors_in_row: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    let backoff = backoff_for(errors_in_row);
                    errors_in_row += 1;
                    if let Some(on_retry) = self.on_retry.as_deref() {
                        on_retry(&RetryInfo {
                            error: &err,
                            query,
                            errors_in_row,
                            backoff,
                        });
                    }
                    tracing::debug!(
                        "archive request failed ({}), attempt {} retries in {:?}",
                        err,
                        errors_in_row,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait::async_trait]
impl DataSource for ArchiveClient {
    async fn height(&self) -> Result<i64> {
        Ok(self.status().await?.height())
    }

    async fn query(&self, query: &ArchiveQuery) -> Result<QueryResponse> {
        let url = format!("{}/query", self.url);
        self.with_retry(Some(query), || async {
            metrics::counter!("archive_requests_total").increment(1);
            let response = self
                .http
                .post(&url)
                .json(query)
                .send()
                .await
                .map_err(|e| Error::Http {
                    url: url.clone(),
                    source: e,
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::HttpStatus {
                    status: status.as_u16(),
                    url: url.clone(),
                });
            }
            let envelope: QueryEnvelope = response.json().await.map_err(|e| Error::Http {
                url: url.clone(),
                source: e,
            })?;
            envelope.into_response()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_transient_failure_retries_and_notifies_observer() {
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let observed_in = Arc::clone(&observed);
        let client = ArchiveClient::new("http://archive.local", "test-squid")
            .unwrap()
            .with_retry_observer(Arc::new(move |info: &RetryInfo<'_>| {
                observed_in.lock().push((info.errors_in_row, info.backoff));
            }));

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_in = Arc::clone(&attempts);
        let value = client
            .with_retry(None, || {
                let attempts = Arc::clone(&attempts_in);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::HttpStatus {
                            status: 503,
                            url: "http://archive.local/query".to_string(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // Exactly one retry: first failure in a row, 100 ms backoff.
        assert_eq!(*observed.lock(), vec![(1, Duration::from_millis(100))]);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let observed_in = Arc::clone(&observed);
        let client = ArchiveClient::new("http://archive.local", "test-squid")
            .unwrap()
            .with_retry_observer(Arc::new(move |info: &RetryInfo<'_>| {
                observed_in.lock().push(info.errors_in_row);
            }));

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_in = Arc::clone(&attempts);
        let err = client
            .with_retry(None, || {
                let attempts = Arc::clone(&attempts_in);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::HttpStatus {
                        status: 400,
                        url: "http://archive.local/query".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 400, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(observed.lock().is_empty());
    }

    #[test]
    fn test_backoff_schedule_and_clamp() {
        // The k-th consecutive failure sleeps schedule[min(k-1, 5)].
        for (k, expected) in [(1u32, 100u64), (2, 500), (3, 2000), (4, 5000), (5, 10_000), (6, 20_000)]
        {
            assert_eq!(backoff_for(k - 1), Duration::from_millis(expected));
        }
        // From the 7th failure on, the schedule stays at its last entry.
        assert_eq!(backoff_for(6), Duration::from_millis(20_000));
        assert_eq!(backoff_for(100), Duration::from_millis(20_000));
    }

    #[test]
    fn test_height_prefers_db_head_when_parquet_caught_up() {
        let status = ArchiveStatus {
            parquet_block_number: 500,
            db_min_block_number: 400,
            db_max_block_number: 900,
        };
        assert_eq!(status.height(), 900);
    }

    #[test]
    fn test_height_falls_back_to_parquet() {
        let status = ArchiveStatus {
            parquet_block_number: 300,
            db_min_block_number: 400,
            db_max_block_number: 900,
        };
        assert_eq!(status.height(), 300);
    }

    #[test]
    fn test_empty_archive_maps_to_minus_one() {
        let status = ArchiveStatus {
            parquet_block_number: 0,
            db_min_block_number: 0,
            db_max_block_number: 0,
        };
        assert_eq!(status.height(), -1);
    }

    #[test]
    fn test_error_envelope_is_terminal() {
        let envelope: QueryEnvelope = serde_json::from_value(serde_json::json!({
            "errors": [{"message": "unknown field 'foo'", "path": ["logs", 0]}]
        }))
        .unwrap();
        let err = envelope.into_response().unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
        assert!(err.to_string().contains("unknown field 'foo'"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_incomplete_envelope_rejected() {
        let envelope: QueryEnvelope =
            serde_json::from_value(serde_json::json!({"nextBlock": 10})).unwrap();
        assert!(envelope.into_response().is_err());
    }

    #[test]
    fn test_full_envelope_parses() {
        let envelope: QueryEnvelope = serde_json::from_value(serde_json::json!({
            "status": {"parquetBlockNumber": 10, "dbMaxBlockNumber": 30, "dbMinBlockNumber": 5},
            "data": [[]],
            "nextBlock": 21,
            "metrics": {"totalTime": 12}
        }))
        .unwrap();
        let response = envelope.into_response().unwrap();
        assert_eq!(response.next_block, 21);
        assert_eq!(response.status.height(), 30);
    }
}
