//! # Model Module
//!
//! The decoding core: CRF lattice geometry, forward/backward scans, the
//! beam-search decoder, and quality calibration.
//!
//! ## Why a guided beam search instead of pure Viterbi
//!
//! A Viterbi pass yields the single max-score path but no calibrated
//! per-base confidence, and it cannot merge distinct transition orders that
//! emit the same base sequence. The shipped decoder runs a full
//! forward/backward scan first and uses the backward table twice: as an
//! A*-style guide ranking beam candidates by their best possible future,
//! and (combined with the forward pass) as the posterior table that scores
//! emitted bases. Path-hash merging then collapses stay/step orderings of
//! the same sequence so probability mass is never double-counted against
//! the beam cutoff.
//!
//! The lattice algorithms are implemented once, over the [`tensor::ScoresView`]
//! accessor; f32 and quantised-i8 emissions go down the identical code path.

pub mod beam;
pub mod crf;
pub mod qscore;
pub mod scan;
pub mod tensor;
