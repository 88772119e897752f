//! Concurrent extraction pipeline
//!
//! ```text
//! StreamExtractor ─▶ input channel ─▶ TransformPool (N threads) ─▶ output channel ─▶ SinkWriter
//!                         ▲                                             ▲
//!                         └──────────── Supervisor / Monitor ───────────┘
//! ```

pub mod channel;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod supervisor;
pub mod writer;

pub use channel::{BoundedChannel, ChannelError};
pub use metrics::{Counter, PipelineCounters, PipelineStats};
pub use monitor::{status_line, Monitor};
pub use pool::TransformPool;
pub use supervisor::{CancelHandle, PipelineError, PipelineState, RunOutcome, RunReport, Supervisor};
pub use writer::SinkWriter;
