//! # I/O Module
//!
//! Container readers and writers at the edges of the decode core: raw
//! signal in, externally produced emission tensors in, FASTQ out. The core
//! itself has no file-format knowledge; everything it consumes arrives
//! through these seams.

pub mod emissions;
pub mod fastq;
pub mod signal;

pub use emissions::{EmissionSource, FileEmissionSource};
pub use fastq::FastqWriter;
pub use signal::{SignalReader, SignalWriter};
