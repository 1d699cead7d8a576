//! # Data Module
//!
//! In-memory representations of reads and chunks. This is the core "Model"
//! layer.
//!
//! ## Design Philosophy: Data-Oriented Design
//! - **Flat buffers:** Signal samples and decode outputs live in contiguous
//!   vectors, never per-element boxes.
//! - **Geometry first:** A `Chunk` is pure geometry (offset, ordinal, size);
//!   decoded payloads attach later and the two never drift apart.

pub mod chunk;
pub mod read;

// Re-export commonly used types
pub use chunk::{chunk_read, Chunk, DecodedChunk};
pub use read::{DecodedRead, SignalRead};
