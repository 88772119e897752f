//! Transform worker pool
//!
//! N identical threads move records from the input channel to the output
//! channel through a [`TextTransform`]. There is no ordering between workers.

use super::channel::BoundedChannel;
use super::metrics::PipelineCounters;
use super::supervisor::{AbortOnPanic, CancelHandle, PipelineError};
use crate::import::{CleanedRecord, RawRecord, TextTransform};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

struct Worker {
    input: Arc<BoundedChannel<RawRecord>>,
    output: Arc<BoundedChannel<CleanedRecord>>,
    transform: Arc<dyn TextTransform>,
    counters: Arc<PipelineCounters>,
    cancel: CancelHandle,
    min_body_length: usize,
}

impl Worker {
    fn run(self, name: &str) {
        let _guard = AbortOnPanic(self.cancel.clone());
        let mut handled = 0u64;

        while let Some(raw) = self.input.get() {
            if self.cancel.is_cancelled() {
                break;
            }

            let body = match self.transform.apply(&raw.body) {
                Ok(body) => body,
                Err(e) => {
                    warn!("Skipping page {:?}: {}", raw.key(), e);
                    self.counters.transform_failed.inc();
                    continue;
                }
            };
            self.counters.transformed.inc();
            handled += 1;

            // Result of a transform that straddled a cancel is discarded
            if self.cancel.is_cancelled() {
                break;
            }

            if body.chars().count() < self.min_body_length {
                trace!("Dropping short page {:?}", raw.key());
                self.counters.filtered_short.inc();
                continue;
            }

            if self.output.put(CleanedRecord::from_raw(raw, body)).is_err() {
                break;
            }
        }

        debug!("{} exiting after {} records", name, handled);
    }
}

/// Running transform workers
pub struct TransformPool {
    workers: Vec<(String, JoinHandle<()>)>,
}

impl TransformPool {
    /// Start `workers` threads named `transform-{n}`
    pub fn spawn(
        workers: usize,
        input: Arc<BoundedChannel<RawRecord>>,
        output: Arc<BoundedChannel<CleanedRecord>>,
        transform: Arc<dyn TextTransform>,
        counters: Arc<PipelineCounters>,
        cancel: CancelHandle,
        min_body_length: usize,
    ) -> io::Result<Self> {
        let mut handles = Vec::with_capacity(workers);

        for n in 0..workers.max(1) {
            let name = format!("transform-{}", n);
            let worker = Worker {
                input: Arc::clone(&input),
                output: Arc::clone(&output),
                transform: Arc::clone(&transform),
                counters: Arc::clone(&counters),
                cancel: cancel.clone(),
                min_body_length,
            };

            let thread_name = name.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run(&thread_name))?;
            handles.push((name, handle));
        }

        debug!("Started {} transform workers", handles.len());
        Ok(Self { workers: handles })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker. Reports the first worker that panicked.
    pub fn join(self) -> Result<(), PipelineError> {
        let mut panicked = None;

        for (name, handle) in self.workers {
            if handle.join().is_err() && panicked.is_none() {
                panicked = Some(name);
            }
        }

        match panicked {
            Some(name) => Err(PipelineError::WorkerPanicked(name)),
            None => Ok(()),
        }
    }
}
