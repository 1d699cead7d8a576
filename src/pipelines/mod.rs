//! # Pipeline Module
//!
//! High-level orchestration of the basecall workflow. Coordinates I/O,
//! chunking, decoding and stitching.

pub mod basecall;
pub mod stitch;

pub use basecall::{BasecallPipeline, PipelineSummary};
