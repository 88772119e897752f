//! Pipeline supervisor and cancellation protocol
//!
//! The supervisor owns the run: it starts the worker pool, the writer and the
//! monitor, drives the extractor on the calling thread, and then shuts the
//! stages down in order. Cancellation and fatal errors share one path: both
//! channels are cancelled (discarding queued records and waking every blocked
//! caller), the cancel flag is raised, and each stage exits on its own.
//!
//! ```text
//! RUNNING ──extraction done──▶ DRAINING ──stages joined──▶ STOPPED
//!    │                            │                           ▲
//!    └──cancel / error──▶ CANCELLING ◀──cancel / error──┘      │
//!                             └────────stages joined─────────┘
//! ```

use super::channel::BoundedChannel;
use super::metrics::{PipelineCounters, PipelineStats};
use super::monitor::Monitor;
use super::pool::TransformPool;
use super::writer::SinkWriter;
use crate::config::PipelineConfig;
use crate::import::{CleanedRecord, ParseError, RawRecord, StreamExtractor, TextTransform};
use crate::sink::{Sink, SinkError};
use parking_lot::Mutex;
use std::fmt;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    /// Input exhausted; remaining records are flowing to the sink
    Draining,
    /// Stopping early after a cancel request or a fatal error
    Cancelling,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Cancelling => "cancelling",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Fatal pipeline failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Transform worker {0} panicked")]
    WorkerPanicked(String),

    #[error("Sink writer panicked")]
    WriterPanicked,

    #[error("Failed to start pipeline thread: {0}")]
    Spawn(#[source] std::io::Error),
}

struct Control {
    state: Mutex<PipelineState>,
    /// Set by an operator cancel, not by error aborts
    requested: AtomicBool,
    /// Raised on any early stop; polled by the extractor and the workers
    halted: Arc<AtomicBool>,
    input: Arc<BoundedChannel<RawRecord>>,
    output: Arc<BoundedChannel<CleanedRecord>>,
}

/// Shared handle used to stop a running pipeline.
///
/// Cloning is cheap. `cancel` may be called from any thread, any number of
/// times; only the first call while the pipeline is live has an effect.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Control>,
}

impl CancelHandle {
    pub(crate) fn new(
        input: Arc<BoundedChannel<RawRecord>>,
        output: Arc<BoundedChannel<CleanedRecord>>,
    ) -> Self {
        Self {
            inner: Arc::new(Control {
                state: Mutex::new(PipelineState::Running),
                requested: AtomicBool::new(false),
                halted: Arc::new(AtomicBool::new(false)),
                input,
                output,
            }),
        }
    }

    /// Request an orderly early stop. Returns `false` if the pipeline was
    /// already stopping or stopped.
    pub fn cancel(&self) -> bool {
        let stopped = self.halt(true);
        if stopped {
            info!("Cancellation requested");
        }
        stopped
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        *self.inner.state.lock()
    }

    /// Whether the pipeline has been told to stop early
    pub fn is_cancelled(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// Flag raised on any early stop, for stages that do not block on a channel
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.halted)
    }

    /// Stop after a fatal error inside the pipeline
    pub(crate) fn abort(&self) -> bool {
        let stopped = self.halt(false);
        if stopped {
            warn!("Aborting pipeline");
        }
        stopped
    }

    fn halt(&self, requested: bool) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !matches!(*state, PipelineState::Running | PipelineState::Draining) {
                return false;
            }
            if requested {
                self.inner.requested.store(true, Ordering::SeqCst);
            }
            *state = PipelineState::Cancelling;
        }

        self.inner.halted.store(true, Ordering::SeqCst);
        let raw = self.inner.input.cancel();
        let cleaned = self.inner.output.cancel();
        debug!("Discarded {} queued raw and {} queued cleaned records", raw, cleaned);
        true
    }

    fn begin_drain(&self) {
        let mut state = self.inner.state.lock();
        if *state == PipelineState::Running {
            *state = PipelineState::Draining;
        }
    }

    /// Mark the run finished; returns whether an operator cancel was seen
    fn finish(&self) -> bool {
        let mut state = self.inner.state.lock();
        *state = PipelineState::Stopped;
        self.inner.requested.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Aborts the pipeline if the owning thread unwinds
pub(crate) struct AbortOnPanic(pub(crate) CancelHandle);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(PipelineError),
}

/// Final result of a run, always carrying the counters
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: PipelineStats,
    pub elapsed: Duration,
}

impl RunReport {
    /// Process exit code: 0 success, 130 cancelled, 1 error
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Completed => 0,
            RunOutcome::Cancelled => 130,
            RunOutcome::Failed(_) => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match &self.outcome {
            RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Wires extractor, transform pool, writer and monitor into one run
pub struct Supervisor {
    config: PipelineConfig,
    extractor: StreamExtractor,
    transform: Arc<dyn TextTransform>,
    sink: Box<dyn Sink>,
    input: Arc<BoundedChannel<RawRecord>>,
    output: Arc<BoundedChannel<CleanedRecord>>,
    counters: Arc<PipelineCounters>,
    control: CancelHandle,
    show_progress: bool,
}

impl Supervisor {
    pub fn new(
        config: PipelineConfig,
        extractor: StreamExtractor,
        transform: Arc<dyn TextTransform>,
        sink: Box<dyn Sink>,
    ) -> Self {
        let counters = PipelineCounters::shared();
        let input = Arc::new(BoundedChannel::new(config.input_capacity));
        let output = Arc::new(BoundedChannel::new(config.output_capacity));
        let control = CancelHandle::new(Arc::clone(&input), Arc::clone(&output));
        let extractor = extractor
            .with_counters(Arc::clone(&counters))
            .with_cancel_flag(control.flag());

        Self {
            config,
            extractor,
            transform,
            sink,
            input,
            output,
            counters,
            control,
            show_progress: false,
        }
    }

    /// Render the monitor as a terminal spinner instead of debug logs
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.control.clone()
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Run the pipeline to completion, cancellation, or failure
    pub fn run<R: BufRead>(self, reader: R) -> RunReport {
        let Supervisor {
            config,
            mut extractor,
            transform,
            sink,
            input,
            output,
            counters,
            control,
            show_progress,
        } = self;

        let start = Instant::now();
        info!(
            "Starting pipeline (workers={}, input_capacity={}, output_capacity={})",
            config.workers, config.input_capacity, config.output_capacity
        );

        let monitor = match Monitor::spawn(
            config.monitor_interval(),
            Arc::clone(&input),
            Arc::clone(&output),
            Arc::clone(&counters),
            show_progress,
        ) {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                warn!("Monitor unavailable: {}", e);
                None
            }
        };

        let mut failure: Option<PipelineError> = None;

        let writer = match SinkWriter::spawn(Arc::clone(&output), sink, Arc::clone(&counters), control.clone()) {
            Ok(writer) => Some(writer),
            Err(e) => {
                failure = Some(PipelineError::Spawn(e));
                None
            }
        };

        let pool = match TransformPool::spawn(
            config.workers,
            Arc::clone(&input),
            Arc::clone(&output),
            transform,
            Arc::clone(&counters),
            control.clone(),
            config.min_body_length,
        ) {
            Ok(pool) => Some(pool),
            Err(e) => {
                failure.get_or_insert(PipelineError::Spawn(e));
                None
            }
        };

        if failure.is_none() {
            match extractor.extract(reader, |record| input.put(record)) {
                Ok(extraction) => info!("Extraction finished: {:?}", extraction),
                Err(e) => {
                    error!("Extraction failed: {}", e);
                    failure = Some(PipelineError::Parse(e));
                }
            }
        }

        if failure.is_some() {
            control.abort();
        } else {
            control.begin_drain();
        }

        // Input complete: workers finish what is queued, then see EOF
        input.close();
        if let Some(pool) = pool {
            if let Err(e) = pool.join() {
                error!("{}", e);
                failure.get_or_insert(e);
            }
        }

        output.close();
        if let Some(writer) = writer {
            if let Err(e) = writer.join() {
                error!("{}", e);
                failure.get_or_insert(e);
            }
        }

        if let Some(monitor) = monitor {
            monitor.stop();
        }

        let cancelled = control.finish();
        let elapsed = start.elapsed();
        let stats = counters.snapshot(elapsed);

        let outcome = match failure {
            Some(e) => RunOutcome::Failed(e),
            None if cancelled => RunOutcome::Cancelled,
            None => RunOutcome::Completed,
        };

        info!(
            "Pipeline stopped ({:?}): extracted={} written={} duplicates={} in {:.1}s",
            outcome,
            stats.extracted,
            stats.written,
            stats.duplicates,
            elapsed.as_secs_f64()
        );

        RunReport { outcome, stats, elapsed }
    }
}
