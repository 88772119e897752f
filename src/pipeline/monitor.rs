//! Periodic pipeline status
//!
//! Samples channel depths and counters on a fixed interval. The monitor only
//! reads; stopping it has no effect on the run.

use super::channel::BoundedChannel;
use super::metrics::{PipelineCounters, PipelineStats};
use crate::import::{CleanedRecord, RawRecord};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Format one status line
pub fn status_line(input_depth: usize, output_depth: usize, stats: &PipelineStats) -> String {
    format!(
        "input={} output={} read={} written={} rate={:.1}/s",
        input_depth, output_depth, stats.extracted, stats.written, stats.docs_per_second
    )
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct Sampler {
    input: Arc<BoundedChannel<RawRecord>>,
    output: Arc<BoundedChannel<CleanedRecord>>,
    counters: Arc<PipelineCounters>,
    started: Instant,
    progress_bar: Option<ProgressBar>,
}

impl Sampler {
    fn line(&self) -> String {
        let stats = self.counters.snapshot(self.started.elapsed());
        status_line(self.input.len(), self.output.len(), &stats)
    }

    fn report(&self) {
        let line = self.line();
        match self.progress_bar {
            Some(ref pb) => pb.set_message(line),
            None => debug!("{}", line),
        }
    }

    fn finish(&self) {
        let line = self.line();
        match self.progress_bar {
            Some(ref pb) => pb.finish_with_message(line),
            None => debug!("{}", line),
        }
    }
}

/// Background status reporter
pub struct Monitor {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Start sampling every `interval`. With `show_progress` the line is drawn
    /// on a terminal spinner, otherwise it is logged at debug level.
    pub fn spawn(
        interval: Duration,
        input: Arc<BoundedChannel<RawRecord>>,
        output: Arc<BoundedChannel<CleanedRecord>>,
        counters: Arc<PipelineCounters>,
        show_progress: bool,
    ) -> io::Result<Self> {
        let progress_bar = if show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let sampler = Sampler {
            input,
            output,
            counters,
            started: Instant::now(),
            progress_bar,
        };
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let interval = interval.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || {
                let mut stopped = thread_signal.stopped.lock();
                while !*stopped {
                    let _ = thread_signal.wake.wait_for(&mut stopped, interval);
                    if !*stopped {
                        sampler.report();
                    }
                }
                drop(stopped);
                sampler.finish();
            })?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stop sampling and wait for the final line
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
