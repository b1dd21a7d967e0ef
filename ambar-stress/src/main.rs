//! Recirculation stress run for the ambar queue.
//!
//! Usage:
//!     cargo run --release -p ambar-stress -- --threads 32 --rounds 100
//!
//! Environment variables:
//!     RUST_LOG  Event filter (default: ambar=info,ambar_stress=info)

mod error;
mod harness;

use clap::Parser;
use tracing::info;

use crate::error::HarnessError;
use crate::harness::Config;

/// Hammer one queue with workers that pop and re-push their elements, then
/// check that every element survived exactly once.
#[derive(Parser, Debug)]
#[command(name = "ambar-stress")]
#[command(about = "Recirculation stress harness for the ambar queue")]
struct Cli {
    /// Number of worker threads, each contributing one element.
    #[arg(long, default_value_t = 32)]
    threads: usize,

    /// Pop-and-re-push rounds per worker.
    #[arg(long, default_value_t = 100)]
    rounds: usize,

    /// Elements to drain after the workers join (default: threads / 2).
    #[arg(long)]
    drain: Option<usize>,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ambar=info,ambar_stress=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}

fn main() -> Result<(), HarnessError> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config {
        threads: cli.threads,
        rounds: cli.rounds,
        drain: cli.drain.unwrap_or(cli.threads / 2),
    };

    let report = harness::run(&config)?;

    info!(
        drained = report.drained,
        remaining = report.remaining,
        allocated_nodes = report.allocated_nodes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "all {} elements accounted for",
        config.threads
    );
    println!("{report}");
    Ok(())
}
