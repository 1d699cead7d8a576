//! # Utilities Module
//!
//! Cross-cutting helpers that don't belong in domain-specific modules.
//!
//! ## Sub-modules
//! - `threading`: the work-distribution harness (static split + stealing)
//! - `workspace`: pre-allocated buffers for zero-allocation hot paths
//! - `telemetry`: injected progress blackboard + heartbeat reporter

pub mod telemetry;
pub mod threading;
pub mod workspace;
