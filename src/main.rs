//! # Rorado: CRF Beam-Search Basecalling
//!
//! Decodes externally produced emission-score tensors into called reads.
//!
//! ## Usage
//! ```bash
//! rorado --signal reads.rsig --emissions scores.rems --out calls.fastq
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use rorado::config::Config;
use rorado::error::Result;
use rorado::pipelines::BasecallPipeline;
use rorado::utils::telemetry::Heartbeat;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::parse_and_validate()?;
    let n_threads = config.nthreads();

    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
        .ok();

    eprintln!("rorado v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Threads: {}", n_threads);
    eprintln!("Signal: {:?}", config.signal);
    eprintln!("Emissions: {:?}", config.emissions);

    let mut pipeline = BasecallPipeline::new(config);
    let _heartbeat = Heartbeat::start(pipeline.telemetry(), Duration::from_secs(10));
    let summary = pipeline.run()?;

    eprintln!("Reads: {}  Bases: {}", summary.reads, summary.bases);
    Ok(())
}
