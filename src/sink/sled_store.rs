//! sled-backed sink
//!
//! Rows live in a single named tree: key = page title, value = cleaned text,
//! both UTF-8.

use super::{Sink, SinkError, UpsertOutcome};
use std::path::Path;
use tracing::debug;

/// Durable insert-if-absent store on top of a sled tree
pub struct SledSink {
    db: sled::Db,
    tree: sled::Tree,
    sync_writes: bool,
    closed: bool,
}

impl SledSink {
    /// Open or create the database at `path` and the tree `tree_name` inside it
    pub fn open(path: impl AsRef<Path>, tree_name: &str) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let tree = db.open_tree(tree_name)?;

        debug!("Opened sink {} (tree {}, {} rows)", path.display(), tree_name, tree.len());

        Ok(Self {
            db,
            tree,
            sync_writes: false,
            closed: false,
        })
    }

    /// Flush to disk after every inserted row
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, SinkError> {
        match self.tree.get(key.as_bytes())? {
            Some(value) => decode(key, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Iterate over all rows in key order
    pub fn iter(&self) -> impl Iterator<Item = Result<(String, String), SinkError>> + '_ {
        self.tree.iter().map(|entry| {
            let (key, value) = entry?;
            let key = String::from_utf8(key.to_vec()).map_err(|e| SinkError::Encoding {
                key: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            })?;
            let value = decode(&key, &value)?;
            Ok((key, value))
        })
    }
}

fn decode(key: &str, value: &[u8]) -> Result<String, SinkError> {
    String::from_utf8(value.to_vec()).map_err(|_| SinkError::Encoding { key: key.to_string() })
}

impl Sink for SledSink {
    fn upsert(&mut self, key: &str, value: &str) -> Result<UpsertOutcome, SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }

        let swapped = self
            .tree
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value.as_bytes()))?;

        match swapped {
            Ok(()) => {
                if self.sync_writes {
                    self.tree.flush()?;
                }
                Ok(UpsertOutcome::Inserted)
            }
            Err(_) => Ok(UpsertOutcome::AlreadyPresent),
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.db.flush()?;
        debug!("Closed sink with {} rows", self.tree.len());
        Ok(())
    }
}
