//! # Rorado Library Root
//!
//! ## Role
//! The crate root that declares all public modules and re-exports common
//! types.
//!
//! ## Spec
//! - Declare all public modules (`pub mod data`, `pub mod model`, etc.).
//! - Re-export commonly used types for ergonomic access.
//! - This allows the decode core to be used as a library by other tools
//!   (e.g., an in-process model runner) or by the binary executable.
//!
//! ## Module Structure
//! ```text
//! rorado
//! ├── data        # In-memory representations (reads, chunks)
//! ├── io          # Container I/O (signal, emissions, FASTQ)
//! ├── model       # Algorithms (CRF scans, beam search, quality)
//! ├── pipelines   # High-level orchestration (basecall, stitching)
//! └── utils       # Helpers (threading harness, workspaces, telemetry)
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;
