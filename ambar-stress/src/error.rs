use std::io;

use thiserror::Error;

/// Ways a stress run can fail.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A value came out of the queue that no worker ever pushed.
    #[error("corrupted value drained from queue: {value:?}")]
    Corrupted { value: String },
    /// A value came out of the queue more than once.
    #[error("value drained twice: {value:?}")]
    Duplicated { value: String },
    /// Values pushed by workers never came out of the queue.
    #[error("{} value(s) lost, first: {:?}", .missing.len(), .missing.first())]
    Lost { missing: Vec<String> },
    /// The queue ran dry before the requested drain count.
    #[error("expected to drain {expected} elements, queue ran dry after {got}")]
    DrainShort { expected: usize, got: usize },
    /// A worker thread panicked.
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },
    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
}
