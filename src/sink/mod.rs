//! Persistent keyed stores for cleaned records
//!
//! A sink is owned by exactly one writer thread. Upserts are
//! insert-if-absent: the first value written for a key wins.

mod sled_store;

pub use sled_store::SledSink;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure to persist or read back records. Fatal for the run.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Stored value for {key:?} is not valid UTF-8")]
    Encoding { key: String },

    #[error("Sink is closed")]
    Closed,

    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Result of an insert-if-absent write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Keyed store the writer persists cleaned records into
pub trait Sink: Send {
    /// Store `value` under `key` unless the key already exists. A successful
    /// return means the row is committed.
    fn upsert(&mut self, key: &str, value: &str) -> Result<UpsertOutcome, SinkError>;

    /// Flush and release the store. Later upserts fail with [`SinkError::Closed`].
    fn close(&mut self) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<String, String>,
    closed: bool,
    close_calls: usize,
    attempts: usize,
    fail_after: Option<usize>,
}

/// In-memory sink. Clones share the same rows, so a caller can keep a handle
/// and inspect what the writer stored.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every upsert after the first `n`
    pub fn fail_after(self, n: usize) -> Self {
        self.state.lock().fail_after = Some(n);
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().rows.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all stored rows, ordered by key
    pub fn rows(&self) -> BTreeMap<String, String> {
        self.state.lock().rows.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of times `close` was called
    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

impl Sink for MemorySink {
    fn upsert(&mut self, key: &str, value: &str) -> Result<UpsertOutcome, SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }

        state.attempts += 1;
        if let Some(limit) = state.fail_after {
            if state.attempts > limit {
                return Err(SinkError::Rejected(format!("injected failure after {} writes", limit)));
            }
        }

        if state.rows.contains_key(key) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }
        state.rows.insert(key.to_string(), value.to_string());
        Ok(UpsertOutcome::Inserted)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}
