//! The recirculation scenario and its verification.
//!
//! Every worker contributes one tagged string, then repeatedly takes whatever
//! element is at the front and puts it straight back. Nodes change hands on
//! every round, so the pool and the busy flag are exercised under contention
//! while the set of live elements stays fixed. After the workers join, the
//! queue must still hold exactly the original elements.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use ambar::Queue;
use tracing::{debug, info};

use crate::error::HarnessError;

/// Parameters of one stress run.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub threads: usize,
    pub rounds: usize,
    /// Elements popped (and required) right after the workers join.
    pub drain: usize,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct Report {
    pub drained: usize,
    pub remaining: usize,
    pub allocated_nodes: usize,
    pub elapsed: Duration,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok: drained {}, remaining {}, {} nodes allocated, {:?}",
            self.drained, self.remaining, self.allocated_nodes, self.elapsed
        )
    }
}

fn element(worker: usize) -> String {
    format!("node from thread {}", worker)
}

/// Runs the scenario described by `config` and verifies the result.
pub fn run(config: &Config) -> Result<Report, HarnessError> {
    let queue = Arc::new(Queue::new());
    let start = Arc::new(Barrier::new(config.threads));
    let began = Instant::now();

    let mut handles = Vec::with_capacity(config.threads);
    for worker in 0..config.threads {
        let queue = Arc::clone(&queue);
        let start = Arc::clone(&start);
        let rounds = config.rounds;

        let handle = thread::Builder::new()
            .name(format!("worker-{}", worker))
            .spawn(move || {
                start.wait();
                info!(worker, "worker started");
                queue.push(element(worker));

                for _ in 0..rounds {
                    let value = loop {
                        if let Some(value) = queue.try_pop() {
                            break value;
                        }
                        thread::yield_now();
                    };
                    queue.push(value);
                }
                info!(worker, rounds, "worker finished");
            })
            .map_err(|source| HarnessError::Spawn { worker, source })?;
        handles.push(handle);
    }

    for (worker, handle) in handles.into_iter().enumerate() {
        handle
            .join()
            .map_err(|_| HarnessError::WorkerPanicked { worker })?;
    }
    let elapsed = began.elapsed();

    let mut drained = Vec::with_capacity(config.drain);
    for got in 0..config.drain {
        match queue.try_pop() {
            Some(value) => drained.push(value),
            None => {
                return Err(HarnessError::DrainShort {
                    expected: config.drain,
                    got,
                });
            }
        }
    }
    debug!(drained = drained.len(), empty = queue.is_empty(), "drain complete");

    let rest: Vec<String> = std::iter::from_fn(|| queue.try_pop()).collect();
    let report = Report {
        drained: drained.len(),
        remaining: rest.len(),
        allocated_nodes: queue.allocated_nodes(),
        elapsed,
    };

    verify(config.threads, drained.into_iter().chain(rest))?;
    Ok(report)
}

/// Checks that `values` is a permutation of the elements pushed by
/// `threads` workers.
pub fn verify(threads: usize, values: impl IntoIterator<Item = String>) -> Result<(), HarnessError> {
    let mut seen: HashMap<String, bool> = (0..threads).map(|i| (element(i), false)).collect();

    for value in values {
        match seen.get_mut(&value) {
            None => return Err(HarnessError::Corrupted { value }),
            Some(true) => return Err(HarnessError::Duplicated { value }),
            Some(flag) => *flag = true,
        }
    }

    let mut missing: Vec<String> = seen
        .into_iter()
        .filter_map(|(value, found)| (!found).then_some(value))
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(HarnessError::Lost { missing });
    }
    Ok(())
}
