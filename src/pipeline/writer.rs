//! Sink writer
//!
//! A single thread owns the sink and serializes every write. It runs until the
//! output channel reports end-of-stream, then closes the sink exactly once,
//! whether the run completed, was cancelled, or failed.

use super::channel::BoundedChannel;
use super::metrics::PipelineCounters;
use super::supervisor::{AbortOnPanic, CancelHandle, PipelineError};
use crate::import::CleanedRecord;
use crate::sink::{Sink, SinkError, UpsertOutcome};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Background thread persisting cleaned records
pub struct SinkWriter {
    handle: JoinHandle<Result<(), SinkError>>,
}

impl SinkWriter {
    pub fn spawn(
        output: Arc<BoundedChannel<CleanedRecord>>,
        sink: Box<dyn Sink>,
        counters: Arc<PipelineCounters>,
        abort: CancelHandle,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("sink-writer".to_string())
            .spawn(move || run(output, sink, counters, abort))?;

        Ok(Self { handle })
    }

    /// Wait for the writer to finish
    pub fn join(self) -> Result<(), PipelineError> {
        self.handle
            .join()
            .map_err(|_| PipelineError::WriterPanicked)?
            .map_err(PipelineError::Sink)
    }
}

fn run(
    output: Arc<BoundedChannel<CleanedRecord>>,
    mut sink: Box<dyn Sink>,
    counters: Arc<PipelineCounters>,
    abort: CancelHandle,
) -> Result<(), SinkError> {
    let _guard = AbortOnPanic(abort.clone());
    debug!("Sink writer started");

    let written = write_all(&output, sink.as_mut(), &counters);
    if let Err(ref e) = written {
        error!("Sink write failed: {}", e);
        abort.abort();
    }

    let closed = sink.close();
    match (written, closed) {
        (Err(e), Err(close_err)) => {
            warn!("Failed to close sink after write error: {}", close_err);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => {
            info!(
                "Sink writer finished: {} written, {} duplicates",
                counters.written.get(),
                counters.duplicates.get()
            );
            closed
        }
    }
}

fn write_all(
    output: &BoundedChannel<CleanedRecord>,
    sink: &mut dyn Sink,
    counters: &PipelineCounters,
) -> Result<(), SinkError> {
    while let Some(record) = output.get() {
        match sink.upsert(&record.identifier, &record.body)? {
            UpsertOutcome::Inserted => counters.written.inc(),
            UpsertOutcome::AlreadyPresent => {
                debug!("Duplicate page {:?} ignored", record.identifier);
                counters.duplicates.inc();
            }
        }
    }
    Ok(())
}
