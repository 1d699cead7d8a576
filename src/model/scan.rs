//! # Forward/Backward Scanner
//!
//! Textbook forward-backward over the CRF lattice, all accumulation in
//! log-space. The backward pass produces the log-partition table the beam
//! search uses as its guide; the forward pass is fused with the posterior
//! combination and a max-subtracted softmax to yield a row-stochastic
//! probability table over states at every timestep boundary.
//!
//! Each state has `NUM_BASES + 1` incoming/outgoing transitions: four steps
//! plus one stay. The stay carries a fixed additive score independent of
//! network output.

use aligned_vec::{AVec, ConstAlign};
use wide::f32x8;

use crate::model::crf::{CrfParams, NUM_BASES};
use crate::model::tensor::{PosteriorTable, ScoresView};

/// Scan buffers are 32-byte aligned for the f32x8 loops.
pub type ScanBuffer = AVec<f32, ConstAlign<32>>;

/// Numerically stable pairwise log-sum-exp:
/// `max(x,y) + ln(1 + exp(-|x-y|))`.
#[inline]
pub fn log_sum_exp(x: f32, y: f32) -> f32 {
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    if lo == f32::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

/// Log-sum-exp over the five transition scores out of (or into) one state.
#[inline]
fn log_sum_exp5(vals: [f32; NUM_BASES + 1]) -> f32 {
    let mut max = vals[0];
    for &v in &vals[1..] {
        if v > max {
            max = v;
        }
    }
    if max == f32::NEG_INFINITY {
        return f32::NEG_INFINITY;
    }
    let mut sum = 0.0f32;
    for &v in &vals {
        sum += (v - max).exp();
    }
    max + sum.ln()
}

/// Backward pass: fill `bwd` (`(T+1) * num_states`, row `T` all zero) with
/// log-partition values propagating from the last timestep to the first.
///
/// `bwd[ts][s]` accumulates over the stay into `s` at `ts+1` and the four
/// step transitions into the successors of `s`.
pub fn backward_scan(
    scores: &ScoresView<'_>,
    crf: &CrfParams,
    fixed_stay_score: f32,
    bwd: &mut ScanBuffer,
) {
    let num_states = crf.num_states;
    let num_timesteps = scores.num_timesteps();
    bwd.resize((num_timesteps + 1) * num_states, 0.0);
    bwd.fill(0.0);

    for ts in (0..num_timesteps).rev() {
        let (head, tail) = bwd.split_at_mut((ts + 1) * num_states);
        let row = &mut head[ts * num_states..];
        let next = &tail[..num_states];

        for state in 0..num_states {
            let succ0 = crf.successor(state, 0);
            let dropped = crf.high_base(state);
            let trans0 = crf.transition_idx(succ0, dropped);

            let mut vals = [0.0f32; NUM_BASES + 1];
            for base in 0..NUM_BASES {
                // successors are contiguous; their transition indices are
                // NUM_BASES apart
                vals[base] =
                    scores.fetch(ts, trans0 + base * NUM_BASES) + next[succ0 + base];
            }
            vals[NUM_BASES] = fixed_stay_score + next[state];
            row[state] = log_sum_exp5(vals);
        }
    }
}

/// Forward pass fused with posterior combination: for every timestep
/// boundary, combine the running forward row with the matching backward row
/// and softmax-normalise into `posts`.
pub fn forward_posteriors(
    scores: &ScoresView<'_>,
    crf: &CrfParams,
    fixed_stay_score: f32,
    bwd: &[f32],
    fwd_prev: &mut ScanBuffer,
    fwd_curr: &mut ScanBuffer,
    posts: &mut PosteriorTable,
) {
    let num_states = crf.num_states;
    let num_timesteps = scores.num_timesteps();
    posts.resize(num_timesteps + 1, num_states);

    fwd_prev.resize(num_states, 0.0);
    fwd_prev.fill(0.0);
    fwd_curr.resize(num_states, 0.0);
    fwd_curr.fill(0.0);

    combine_softmax(fwd_prev, &bwd[..num_states], posts.row_mut(0));

    for ts in 0..num_timesteps {
        for succ in 0..num_states {
            let mut vals = [0.0f32; NUM_BASES + 1];
            for dropped in 0..NUM_BASES {
                let pred = crf.predecessor(succ, dropped);
                vals[dropped] =
                    fwd_prev[pred] + scores.fetch(ts, crf.transition_idx(succ, dropped));
            }
            vals[NUM_BASES] = fwd_prev[succ] + fixed_stay_score;
            fwd_curr[succ] = log_sum_exp5(vals);
        }

        let bwd_row = &bwd[(ts + 1) * num_states..(ts + 2) * num_states];
        combine_softmax(fwd_curr, bwd_row, posts.row_mut(ts + 1));
        std::mem::swap(fwd_prev, fwd_curr);
    }
}

/// `out[s] = softmax(fwd[s] + bwd[s])` with max subtraction for stability.
/// Vectorised body with a scalar tail.
fn combine_softmax(fwd: &[f32], bwd: &[f32], out: &mut [f32]) {
    let n = fwd.len();

    let mut max = f32::NEG_INFINITY;
    for i in 0..n {
        let v = fwd[i] + bwd[i];
        out[i] = v;
        if v > max {
            max = v;
        }
    }

    let max_vec = f32x8::splat(max);
    let mut sum_vec = f32x8::splat(0.0);
    let mut k = 0;
    while k + 8 <= n {
        let mut arr = [0.0f32; 8];
        arr.copy_from_slice(&out[k..k + 8]);
        let vals = f32x8::from(arr);
        let exps = (vals - max_vec).exp();
        let res: [f32; 8] = exps.into();
        out[k..k + 8].copy_from_slice(&res);
        sum_vec += exps;
        k += 8;
    }
    let mut sum = sum_vec.reduce_add();
    for i in k..n {
        out[i] = (out[i] - max).exp();
        sum += out[i];
    }

    let inv = 1.0 / sum;
    let inv_vec = f32x8::splat(inv);
    k = 0;
    while k + 8 <= n {
        let mut arr = [0.0f32; 8];
        arr.copy_from_slice(&out[k..k + 8]);
        let res: [f32; 8] = (f32x8::from(arr) * inv_vec).into();
        out[k..k + 8].copy_from_slice(&res);
        k += 8;
    }
    for v in &mut out[k..n] {
        *v *= inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tensor::ScoreTensor;

    fn uniform_tensor(num_timesteps: usize, crf: &CrfParams) -> ScoreTensor {
        ScoreTensor::from_f32(
            num_timesteps,
            1,
            crf.num_transitions,
            vec![0.0; num_timesteps * crf.num_transitions],
        )
        .unwrap()
    }

    #[test]
    fn test_log_sum_exp_pairwise() {
        let got = log_sum_exp(1.0, 2.0);
        let want = (1.0f64.exp() + 2.0f64.exp()).ln() as f32;
        assert!((got - want).abs() < 1e-6);
        assert_eq!(log_sum_exp(f32::NEG_INFINITY, 3.0), 3.0);
    }

    #[test]
    fn test_backward_boundary_row_is_zero() {
        let crf = CrfParams::from_state_len(2);
        let tensor = uniform_tensor(3, &crf);
        let view = tensor.view(0, 1.0);
        let mut bwd = ScanBuffer::new(32);
        backward_scan(&view, &crf, 2.0, &mut bwd);
        assert_eq!(bwd.len(), 4 * crf.num_states);
        assert!(bwd[3 * crf.num_states..].iter().all(|&v| v == 0.0));
        // earlier rows accumulate positive mass from the stay bonus
        assert!(bwd[0] > 0.0);
    }

    #[test]
    fn test_uniform_scores_give_uniform_posteriors() {
        let crf = CrfParams::from_state_len(2);
        let tensor = uniform_tensor(4, &crf);
        let view = tensor.view(0, 1.0);
        let mut bwd = ScanBuffer::new(32);
        backward_scan(&view, &crf, 0.0, &mut bwd);

        let mut posts = PosteriorTable::default();
        let (mut fwd_a, mut fwd_b) = (ScanBuffer::new(32), ScanBuffer::new(32));
        forward_posteriors(&view, &crf, 0.0, &bwd, &mut fwd_a, &mut fwd_b, &mut posts);

        let expect = 1.0 / crf.num_states as f32;
        for row in 0..posts.num_rows() {
            for &p in posts.row(row) {
                assert!((p - expect).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_posterior_rows_are_stochastic() {
        let crf = CrfParams::from_state_len(3);
        let num_timesteps = 5;
        // deterministic pseudo-random scores
        let data: Vec<f32> = (0..num_timesteps * crf.num_transitions)
            .map(|i| ((i * 2654435761usize) % 1000) as f32 / 250.0 - 2.0)
            .collect();
        let tensor = ScoreTensor::from_f32(num_timesteps, 1, crf.num_transitions, data).unwrap();
        let view = tensor.view(0, 1.0);

        let mut bwd = ScanBuffer::new(32);
        backward_scan(&view, &crf, 2.0, &mut bwd);
        let mut posts = PosteriorTable::default();
        let (mut fwd_a, mut fwd_b) = (ScanBuffer::new(32), ScanBuffer::new(32));
        forward_posteriors(&view, &crf, 2.0, &bwd, &mut fwd_a, &mut fwd_b, &mut posts);

        for row in 0..posts.num_rows() {
            let sum: f32 = posts.row(row).iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "row {} sums to {}", row, sum);
            assert!(posts.row(row).iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }
}
