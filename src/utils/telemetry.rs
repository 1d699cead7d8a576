//! # Telemetry Blackboard
//!
//! Thread-safe progress tracking for the basecall pipeline. Worker threads
//! update relaxed atomic counters with negligible overhead; an optional
//! heartbeat thread periodically reads and reports them. The blackboard is
//! injected explicitly at every call site; there is no process-wide
//! mutable state, so tests run deterministic pipelines with their own
//! instance (or ignore it entirely).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::info;

/// Processing stage for high-level progress tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Initializing = 0,
    LoadingSignal = 1,
    Decoding = 2,
    WritingOutput = 3,
    Complete = 4,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::LoadingSignal => "Loading Signal",
            Stage::Decoding => "Decoding",
            Stage::WritingOutput => "Writing Output",
            Stage::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Stage::Initializing,
            1 => Stage::LoadingSignal,
            2 => Stage::Decoding,
            3 => Stage::WritingOutput,
            _ => Stage::Complete,
        }
    }
}

/// Progress counters shared between workers and the heartbeat reporter.
///
/// All fields use relaxed ordering; the reporter only needs eventual
/// visibility of approximate values.
#[derive(Debug)]
pub struct Telemetry {
    stage: AtomicU64,
    reads_total: AtomicU64,
    reads_done: AtomicU64,
    chunks_done: AtomicU64,
    bases_written: AtomicU64,
    start_time: Instant,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            stage: AtomicU64::new(Stage::Initializing as u64),
            reads_total: AtomicU64::new(0),
            reads_done: AtomicU64::new(0),
            chunks_done: AtomicU64::new(0),
            bases_written: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u64, Ordering::Relaxed);
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u64(self.stage.load(Ordering::Relaxed))
    }

    pub fn set_reads_total(&self, n: u64) {
        self.reads_total.store(n, Ordering::Relaxed);
    }

    pub fn add_reads_done(&self, n: u64) {
        self.reads_done.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_chunks_done(&self, n: u64) {
        self.chunks_done.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bases_written(&self, n: u64) {
        self.bases_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reads_done(&self) -> u64 {
        self.reads_done.load(Ordering::Relaxed)
    }

    pub fn chunks_done(&self) -> u64 {
        self.chunks_done.load(Ordering::Relaxed)
    }

    pub fn bases_written(&self) -> u64 {
        self.bases_written.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Periodic progress reporter. Dropping the guard stops the thread.
pub struct Heartbeat {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Spawn a reporter that logs progress every `interval`.
    pub fn start(telemetry: Arc<Telemetry>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                let total = telemetry.reads_total.load(Ordering::Relaxed);
                info!(
                    stage = telemetry.stage().as_str(),
                    reads = telemetry.reads_done(),
                    reads_total = total,
                    chunks = telemetry.chunks_done(),
                    bases = telemetry.bases_written(),
                    elapsed_s = telemetry.elapsed().as_secs(),
                    "progress"
                );
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
