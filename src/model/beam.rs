//! # Beam Search Decoder
//!
//! Approximate best-path search over the CRF lattice. A fixed-width beam of
//! hypotheses is advanced one timestep at a time; each hypothesis spawns
//! four "step" successors and one "stay" successor, scored against the
//! emission block plus the backward-guide value of the target state.
//!
//! Stay-then-step and step-then-stay transition orders can emit identical
//! base sequences. Left unmerged, the probability mass of one biological
//! hypothesis is double-counted across beam slots and can starve the true
//! best path out of the beam, so rejoining paths are detected with a rolling
//! 64-bit path hash (screened through a one-hash bloom bitset, then
//! confirmed exactly) and merged via log-sum-exp.
//!
//! The full per-timestep beam history is retained so the winning path can be
//! reconstructed in O(T) by walking back-pointers from the final best slot.

use bitvec::prelude::*;

use crate::error::{Result, RoradoError};
use crate::model::crf::{CrfParams, NUM_BASES};
use crate::model::tensor::{PosteriorTable, ScoresView};
use crate::model::scan::log_sum_exp;

/// Hard cap on the beam width; back-pointers are stored as `u8`.
pub const MAX_BEAM_WIDTH: usize = 256;

/// Bucket count of the duplicate-path bloom bitset.
const HASH_PRESENT_BITS: usize = 4096;

/// Seed for the rolling path hash.
const HASH_SEED: u64 = 0x880355f21e6d1965;

/// One retained hypothesis at one timestep.
#[derive(Clone, Copy, Debug, Default)]
pub struct BeamElement {
    /// CRF state (k-mer) of this hypothesis
    pub state: u32,
    /// Index into the previous timestep's beam row
    pub prev_element_index: u8,
    /// True if this element repeated its state rather than stepping
    pub stay: bool,
}

/// Expansion candidate, transient within one timestep.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    score: f32,
    hash: u64,
    state: u32,
    prev_element_index: u8,
    stay: bool,
}

/// The winning path through the lattice for one chunk.
#[derive(Clone, Debug, Default)]
pub struct DecodePath {
    /// CRF state at every output timestep
    pub states: Vec<u32>,
    /// 1 where a new base was emitted, 0 on a stay; `moves[0]` is always 1
    pub moves: Vec<u8>,
    /// Accumulated path score of the winning hypothesis
    pub score: f32,
}

type HashFilter = BitArr!(for HASH_PRESENT_BITS, in u64, Lsb0);

/// Reusable buffers for the beam search; sized lazily, reused across chunks
/// by each decoder thread.
#[derive(Debug, Default)]
pub struct BeamScratch {
    /// `(T+1) x beam_width` element history
    history: Vec<BeamElement>,
    scores: Vec<f32>,
    hashes: Vec<u64>,
    candidates: Vec<Candidate>,
    seed_order: Vec<u32>,
    filter: HashFilter,
}

/// Mix function of the 64-bit path hash (fasthash finaliser).
#[inline]
fn hash_mix(mut h: u64) -> u64 {
    h ^= h >> 23;
    h = h.wrapping_mul(0x2127_599b_f432_5c37);
    h ^= h >> 47;
    h
}

/// Extend a rolling path hash with one value (seed state or emitted base).
#[inline]
pub(crate) fn chain_hash(hash: u64, value: u64) -> u64 {
    hash_mix(hash ^ hash_mix(value))
}

/// Exact duplicate confirmation behind the bloom screen: scan the step
/// candidates sharing the stay's trailing base for an identical path hash
/// and merge on a hit. The merged slot gets the log-sum-exp of both scores;
/// the losing slot is pushed to `f32::MIN` so pruning drops it. On an exact
/// score tie the step survives.
///
/// Returns true if a merge happened.
fn merge_duplicate_paths(
    step_candidates: &mut [Candidate],
    stay: &mut Candidate,
) -> bool {
    let trailing_base = stay.state & (NUM_BASES as u32 - 1);
    for step in step_candidates
        .iter_mut()
        .filter(|c| (c.state & (NUM_BASES as u32 - 1)) == trailing_base)
    {
        if step.hash == stay.hash {
            let merged = log_sum_exp(step.score, stay.score);
            if stay.score > step.score {
                stay.score = merged;
                step.score = f32::MIN;
            } else {
                step.score = merged;
                stay.score = f32::MIN;
            }
            return true;
        }
    }
    false
}

/// Count candidates whose score clears `cutoff`.
#[inline]
fn count_exceeding(candidates: &[Candidate], cutoff: f32) -> usize {
    candidates.iter().filter(|c| c.score >= cutoff).count()
}

/// Find the pruning cutoff for one timestep's candidate pool.
///
/// Starts from `max_score - ln(beam_cut)`; if more candidates clear that
/// bar than the beam can hold, binary-searches (at most 10 iterations) for
/// a cutoff keeping between 80% and 100% of `beam_width`. Non-convergence
/// falls back to the highest cutoff tried; the caller hard-truncates to the
/// beam width either way.
fn select_cutoff(candidates: &[Candidate], max_score: f32, beam_cut: f32, beam_width: usize) -> f32 {
    let guess = max_score - beam_cut.ln();
    if count_exceeding(candidates, guess) <= beam_width {
        return guess;
    }

    let min_keep = (beam_width * 4) / 5;
    let mut low = guess;
    let mut high = max_score;
    for _ in 0..10 {
        let mid = 0.5 * (low + high);
        let count = count_exceeding(candidates, mid);
        if count > beam_width {
            low = mid;
        } else if count < min_keep {
            high = mid;
        } else {
            return mid;
        }
    }
    high
}

/// Run the beam search over one chunk's emission block.
///
/// `bwd` is the backward-guide table from [`crate::model::scan::backward_scan`]
/// (`(T+1) * num_states` values). Beam widths above [`MAX_BEAM_WIDTH`] are a
/// fatal configuration error.
pub fn beam_search(
    scores: &ScoresView<'_>,
    crf: &CrfParams,
    bwd: &[f32],
    beam_width: usize,
    beam_cut: f32,
    fixed_stay_score: f32,
    scratch: &mut BeamScratch,
) -> Result<DecodePath> {
    if beam_width == 0 || beam_width > MAX_BEAM_WIDTH {
        return Err(RoradoError::config(format!(
            "beam width must be in 1..={}, got {}",
            MAX_BEAM_WIDTH, beam_width
        )));
    }
    let num_states = crf.num_states;
    let num_timesteps = scores.num_timesteps();
    if num_timesteps == 0 {
        return Ok(DecodePath::default());
    }

    let beam_width = beam_width.min(num_states);

    scratch.history.clear();
    scratch
        .history
        .resize((num_timesteps + 1) * beam_width, BeamElement::default());
    scratch.scores.clear();
    scratch.scores.resize(beam_width, 0.0);
    scratch.hashes.clear();
    scratch.hashes.resize(beam_width, 0);

    // Seed from the top guide values via partial selection, not a full sort.
    let guide0 = &bwd[..num_states];
    scratch.seed_order.clear();
    scratch.seed_order.extend(0..num_states as u32);
    if beam_width < num_states {
        scratch.seed_order.select_nth_unstable_by(beam_width - 1, |&a, &b| {
            guide0[b as usize].total_cmp(&guide0[a as usize])
        });
    }
    for i in 0..beam_width {
        let state = scratch.seed_order[i];
        scratch.history[i] = BeamElement {
            state,
            prev_element_index: 0,
            stay: false,
        };
        scratch.scores[i] = 0.0;
        scratch.hashes[i] = chain_hash(HASH_SEED, u64::from(state));
    }

    let mut current_width = beam_width;

    for ts in 0..num_timesteps {
        let guide_row = &bwd[(ts + 1) * num_states..(ts + 2) * num_states];
        let row_base = ts * beam_width;
        scratch.candidates.clear();
        scratch.filter.fill(false);

        // Step successors: shift the k-mer by one base.
        for elem_idx in 0..current_width {
            let state = scratch.history[row_base + elem_idx].state as usize;
            let prev_score = scratch.scores[elem_idx];
            let prev_hash = scratch.hashes[elem_idx];
            let dropped = crf.high_base(state);
            for base in 0..NUM_BASES {
                let succ = crf.successor(state, base);
                let trans = crf.transition_idx(succ, dropped);
                let hash = chain_hash(prev_hash, base as u64);
                scratch
                    .filter
                    .set(hash as usize % HASH_PRESENT_BITS, true);
                scratch.candidates.push(Candidate {
                    score: prev_score + scores.fetch(ts, trans) + guide_row[succ],
                    hash,
                    state: succ as u32,
                    prev_element_index: elem_idx as u8,
                    stay: false,
                });
            }
        }
        let num_steps = scratch.candidates.len();

        // Stay successors: same k-mer, fixed additive score. A stay whose
        // hash trips the bloom filter is exactly checked against the step
        // candidates and merged if the paths really rejoined.
        for elem_idx in 0..current_width {
            let state = scratch.history[row_base + elem_idx].state;
            let mut stay = Candidate {
                score: scratch.scores[elem_idx]
                    + fixed_stay_score
                    + guide_row[state as usize],
                hash: scratch.hashes[elem_idx],
                state,
                prev_element_index: elem_idx as u8,
                stay: true,
            };
            if scratch.filter[stay.hash as usize % HASH_PRESENT_BITS] {
                let (steps, _) = scratch.candidates.split_at_mut(num_steps);
                merge_duplicate_paths(steps, &mut stay);
            }
            scratch.candidates.push(stay);
        }

        // Prune back to the beam width.
        let max_score = scratch
            .candidates
            .iter()
            .fold(f32::MIN, |acc, c| acc.max(c.score));
        let cutoff = select_cutoff(&scratch.candidates, max_score, beam_cut, beam_width);

        let next_base = (ts + 1) * beam_width;
        let mut kept = 0usize;
        for cand_idx in 0..scratch.candidates.len() {
            let cand = scratch.candidates[cand_idx];
            if cand.score >= cutoff && kept < beam_width {
                scratch.history[next_base + kept] = BeamElement {
                    state: cand.state,
                    prev_element_index: cand.prev_element_index,
                    stay: cand.stay,
                };
                // Remove the guide contribution: it is a per-timestep
                // heuristic, re-added for the next expansion, never part of
                // the accumulated path score.
                scratch.scores[kept] = cand.score - guide_row[cand.state as usize];
                scratch.hashes[kept] = cand.hash;
                kept += 1;
            }
        }
        current_width = kept;
    }

    // Force the globally best hypothesis into slot 0 so backtracking always
    // starts there.
    let mut best_idx = 0;
    for i in 1..current_width {
        if scratch.scores[i] > scratch.scores[best_idx] {
            best_idx = i;
        }
    }
    let final_base = num_timesteps * beam_width;
    scratch.history.swap(final_base, final_base + best_idx);
    scratch.scores.swap(0, best_idx);

    // Backtrace through the retained history.
    let mut path = DecodePath {
        states: vec![0; num_timesteps],
        moves: vec![0; num_timesteps],
        score: scratch.scores[0],
    };
    let mut elem_idx = 0usize;
    for row in (1..=num_timesteps).rev() {
        let elem = scratch.history[row * beam_width + elem_idx];
        path.states[row - 1] = elem.state;
        path.moves[row - 1] = if elem.stay { 0 } else { 1 };
        elem_idx = elem.prev_element_index as usize;
    }
    // Every chunk starts with a base emission.
    path.moves[0] = 1;

    Ok(path)
}

/// Per-block posterior mass of each candidate emitted base along a decoded
/// path, merging probability across shift-equivalent k-mer states.
///
/// For the path state at block `t`, the four low-base variants are each
/// aggregated with their left- and right-shifted aliases (deduplicated) out
/// of posterior row `t + 1`. Output layout: `[T][NUM_BASES]`.
pub fn path_base_probs(path: &DecodePath, posts: &PosteriorTable, crf: &CrfParams) -> Vec<f32> {
    let num_states = crf.num_states;
    let msb = num_states / NUM_BASES;
    let mut probs = vec![0.0f32; path.states.len() * NUM_BASES];
    let mut aliases = [0usize; 2 * NUM_BASES + 1];

    for (block, &state) in path.states.iter().enumerate() {
        let row = posts.row(block + 1);
        for base in 0..NUM_BASES {
            let variant = (state as usize & !(NUM_BASES - 1)) | base;
            let l_shift = variant >> crate::model::crf::NUM_BASE_BITS;
            let r_shift = (variant << crate::model::crf::NUM_BASE_BITS) % num_states;
            aliases[0] = variant;
            for i in 0..NUM_BASES {
                aliases[1 + 2 * i] = l_shift + i * msb;
                aliases[2 + 2 * i] = r_shift + i;
            }
            let mut mass = 0.0f32;
            for (i, &alias) in aliases.iter().enumerate() {
                if aliases[..i].contains(&alias) {
                    continue;
                }
                mass += row[alias];
            }
            probs[block * NUM_BASES + base] = mass.clamp(0.0, 1.0);
        }
    }
    probs
}
