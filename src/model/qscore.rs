//! # Quality Scorer
//!
//! Converts the winning decode path and its per-block posterior mass into a
//! called sequence with calibrated per-base Phred qualities. Stay timesteps
//! accumulate evidence onto the pending base, so a base supported by a long
//! run of stays is scored on all of its timesteps, not just the emitting
//! one.

use crate::model::beam::DecodePath;
use crate::model::crf::{CrfParams, BASE_CHARS, NUM_BASES};

/// Empirical calibration exponent applied to the correct-base probability
/// before Phred conversion.
const QSCORE_POWER: f32 = 0.4;

/// Phred clamp range.
const QSCORE_MIN: f32 = 1.0;
const QSCORE_MAX: f32 = 50.0;

/// Convert an accumulated correct-base probability into a printable quality
/// character: power transform, Phred conversion, affine model calibration,
/// clamp to `[1, 50]`, then the `'!' + score` ASCII convention.
pub fn phred_char(p: f32, q_shift: f32, q_scale: f32) -> u8 {
    let p = p.clamp(0.0, 1.0).powf(QSCORE_POWER);
    let err = (1.0 - p).max(1e-7);
    let q = -10.0 * err.log10() * q_scale + q_shift;
    let q = q.clamp(QSCORE_MIN, QSCORE_MAX);
    (33.5 + q) as u8
}

/// Materialise the base sequence and quality string for one decoded chunk.
///
/// `base_probs` is the `[T][NUM_BASES]` table from
/// [`crate::model::beam::path_base_probs`]: per block, the merged posterior
/// mass of each candidate emitted base.
pub fn sequence_and_qstring(
    path: &DecodePath,
    base_probs: &[f32],
    crf: &CrfParams,
    q_shift: f32,
    q_scale: f32,
) -> (String, String) {
    let seq_len = path.moves.iter().map(|&m| m as usize).sum::<usize>();
    if seq_len == 0 {
        return (String::new(), String::new());
    }

    let mut sequence = Vec::with_capacity(seq_len);
    let mut base_mass = vec![0.0f32; seq_len];
    let mut total_mass = vec![0.0f32; seq_len];

    let mut pos = 0usize;
    for (block, &state) in path.states.iter().enumerate() {
        let base = crf.emitted_base(state as usize);
        if path.moves[block] == 1 {
            pos = sequence.len();
            sequence.push(BASE_CHARS[base]);
        }
        let row = &base_probs[block * NUM_BASES..(block + 1) * NUM_BASES];
        base_mass[pos] += row[base];
        total_mass[pos] += row.iter().sum::<f32>();
    }

    let qstring: Vec<u8> = base_mass
        .iter()
        .zip(&total_mass)
        .map(|(&b, &t)| {
            let p = if t > 0.0 { b / t } else { 0.0 };
            phred_char(p, q_shift, q_scale)
        })
        .collect();

    // both are pure ASCII by construction
    (
        String::from_utf8(sequence).expect("base alphabet is ASCII"),
        String::from_utf8(qstring).expect("phred range is ASCII"),
    )
}
