//! The checkpoint database seam.
//!
//! The processor persists nothing itself: progress and user data live in a
//! caller-supplied [`Database`]. Every non-empty batch is handed to the
//! user handler inside `transact`, and the checkpoint only moves via
//! `advance`, so a crash replays at most one uncommitted batch.
//!
//! [`MemoryDatabase`] is the in-process implementation used by tests and
//! the daemon's dry-run mode.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// Transactional progress store consumed by the processor driver.
#[async_trait]
pub trait Database: Send + 'static {
    /// Handle the user handler works against inside a transaction.
    type Store: Send + 'static;

    /// Open the database and return the last persisted height, or `-1`
    /// when nothing was committed yet.
    async fn connect(&mut self) -> anyhow::Result<i64>;

    /// Run `f` atomically against a transaction spanning blocks
    /// `[from, to]`. An error from `f` aborts the transaction.
    async fn transact<F, Fut>(&mut self, from: i64, to: i64, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(Self::Store) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static;

    /// Commit progress up to `height` without touching user data.
    async fn advance(&mut self, height: i64) -> anyhow::Result<()>;
}

#[derive(Default)]
struct MemoryState {
    height: Mutex<i64>,
    spans: Mutex<Vec<(i64, i64)>>,
    entries: Mutex<Vec<(String, String)>>,
}

/// In-memory [`Database`]. Nothing survives the process; "transactions"
/// are plain handler invocations. Clones share state, so tests can keep a
/// handle for inspection while the processor owns the other.
#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<MemoryState>,
}

/// Store handle of [`MemoryDatabase`]: an append-only key/value log.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    /// Append an entry.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.entries.lock().push((key.into(), value.into()));
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        let state = MemoryState {
            height: Mutex::new(-1),
            ..MemoryState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Start from an already-persisted height, as after a restart.
    pub fn with_height(height: i64) -> Self {
        let db = Self::new();
        *db.state.height.lock() = height;
        db
    }

    /// Last committed height.
    pub fn last_height(&self) -> i64 {
        *self.state.height.lock()
    }

    /// Block spans of every transaction run so far, in order.
    pub fn committed_spans(&self) -> Vec<(i64, i64)> {
        self.state.spans.lock().clone()
    }

    /// Entries written through [`MemoryStore::put`].
    pub fn entries(&self) -> Vec<(String, String)> {
        self.state.entries.lock().clone()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Store = MemoryStore;

    async fn connect(&mut self) -> anyhow::Result<i64> {
        Ok(self.last_height())
    }

    async fn transact<F, Fut>(&mut self, from: i64, to: i64, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(Self::Store) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.state.spans.lock().push((from, to));
        let store = MemoryStore {
            state: Arc::clone(&self.state),
        };
        f(store).await
    }

    async fn advance(&mut self, height: i64) -> anyhow::Result<()> {
        *self.state.height.lock() = height;
        Ok(())
    }
}
