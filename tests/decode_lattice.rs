//! Decoder behaviour on synthetic lattices with a known best path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rorado::config::DecoderParams;
use rorado::model::beam::{beam_search, MAX_BEAM_WIDTH};
use rorado::model::crf::{CrfParams, BASE_CHARS, NUM_BASES};
use rorado::model::scan::{backward_scan, forward_posteriors};
use rorado::model::tensor::ScoreTensor;
use rorado::pipelines::basecall::decode_chunk;
use rorado::utils::workspace::DecodeWorkspace;

/// Encode the k-mer ending at global position `g` of `bases`; positions
/// before the start of the buffer read as base 0.
fn state_at(bases: &[usize], g: isize, crf: &CrfParams) -> usize {
    let mut state = 0usize;
    for i in 0..crf.state_len {
        let pos = g - (crf.state_len - 1 - i) as isize;
        let base = if pos >= 0 { bases[pos as usize] } else { 0 };
        state = (state << 2) | base;
    }
    state & crf.state_mask()
}

/// Emission block where the path emitting `bases[g0..g0+t]` scores `hi`
/// per step and every other step transition is impossible.
fn golden_scores(
    bases: &[usize],
    g0: usize,
    num_timesteps: usize,
    crf: &CrfParams,
    hi: f32,
) -> ScoreTensor {
    let mut data = vec![f32::NEG_INFINITY; num_timesteps * crf.num_transitions];
    for t in 0..num_timesteps {
        let g = (g0 + t) as isize;
        let succ = state_at(bases, g, crf);
        let pred = state_at(bases, g - 1, crf);
        let trans = crf.transition_idx(succ, crf.high_base(pred));
        data[t * crf.num_transitions + trans] = hi;
    }
    ScoreTensor::from_f32(num_timesteps, 1, crf.num_transitions, data).unwrap()
}

fn random_bases(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..NUM_BASES)).collect()
}

#[test]
fn dominant_path_is_decoded_exactly() {
    let crf = CrfParams::from_state_len(2);
    let num_timesteps = 24;
    let bases = random_bases(num_timesteps, 42);
    let tensor = golden_scores(&bases, 0, num_timesteps, &crf, 20.0);
    let view = tensor.view(0, 1.0);

    let params = DecoderParams::default();
    let mut ws = DecodeWorkspace::new();
    let decoded = decode_chunk(&view, &crf, &params, &mut ws).unwrap();

    let expected: String = bases
        .iter()
        .map(|&b| BASE_CHARS[b] as char)
        .collect();
    assert_eq!(decoded.sequence, expected);
    assert_eq!(decoded.moves, vec![1u8; num_timesteps]);
    assert_eq!(decoded.qstring.len(), num_timesteps);
}

#[test]
fn dominant_path_has_posterior_one() {
    let crf = CrfParams::from_state_len(2);
    let num_timesteps = 16;
    let bases = random_bases(num_timesteps, 7);
    let tensor = golden_scores(&bases, 0, num_timesteps, &crf, 20.0);
    let view = tensor.view(0, 1.0);

    let mut ws = DecodeWorkspace::new();
    backward_scan(&view, &crf, 2.0, &mut ws.bwd);
    forward_posteriors(
        &view,
        &crf,
        2.0,
        &ws.bwd,
        &mut ws.fwd_prev,
        &mut ws.fwd_curr,
        &mut ws.posts,
    );

    for t in 0..num_timesteps {
        let state = state_at(&bases, t as isize, &crf);
        let p = ws.posts.row(t + 1)[state];
        assert!(
            (p - 1.0).abs() < 1e-4,
            "timestep {} posterior {} not ~1.0",
            t,
            p
        );
    }
}

#[test]
fn stays_are_decoded_when_steps_are_impossible() {
    // only one step transition, at the very first timestep; everything
    // after it can only stay
    let crf = CrfParams::from_state_len(2);
    let num_timesteps = 8;
    let bases = vec![2usize; 1];
    let mut data = vec![f32::NEG_INFINITY; num_timesteps * crf.num_transitions];
    let succ = state_at(&bases, 0, &crf);
    let pred = state_at(&bases, -1, &crf);
    data[crf.transition_idx(succ, crf.high_base(pred))] = 20.0;
    let tensor = ScoreTensor::from_f32(num_timesteps, 1, crf.num_transitions, data).unwrap();
    let view = tensor.view(0, 1.0);

    let params = DecoderParams::default();
    let mut ws = DecodeWorkspace::new();
    let decoded = decode_chunk(&view, &crf, &params, &mut ws).unwrap();

    assert_eq!(decoded.sequence, "G");
    assert_eq!(decoded.moves[0], 1);
    assert!(decoded.moves[1..].iter().all(|&m| m == 0));
}

#[test]
fn beam_width_boundary() {
    let crf = CrfParams::from_state_len(3);
    let num_timesteps = 4;
    let bases = random_bases(num_timesteps, 1);
    let tensor = golden_scores(&bases, 0, num_timesteps, &crf, 10.0);
    let view = tensor.view(0, 1.0);

    let mut ws = DecodeWorkspace::new();
    backward_scan(&view, &crf, 2.0, &mut ws.bwd);

    let at_cap = beam_search(
        &view,
        &crf,
        &ws.bwd,
        MAX_BEAM_WIDTH,
        100.0,
        2.0,
        &mut ws.beam,
    );
    assert!(at_cap.is_ok());

    let over_cap = beam_search(
        &view,
        &crf,
        &ws.bwd,
        MAX_BEAM_WIDTH + 1,
        100.0,
        2.0,
        &mut ws.beam,
    );
    assert!(over_cap.is_err());
}

#[test]
fn quantised_emissions_decode_like_f32() {
    // the same dominant lattice, quantised to i8 with a 0.25 scale
    let crf = CrfParams::from_state_len(2);
    let num_timesteps = 12;
    let bases = random_bases(num_timesteps, 99);

    let mut i8_data = vec![-128i8; num_timesteps * crf.num_transitions];
    for t in 0..num_timesteps {
        let g = t as isize;
        let succ = state_at(&bases, g, &crf);
        let pred = state_at(&bases, g - 1, &crf);
        let trans = crf.transition_idx(succ, crf.high_base(pred));
        i8_data[t * crf.num_transitions + trans] = 80; // 80 * 0.25 = 20.0
    }
    let tensor =
        ScoreTensor::from_i8(num_timesteps, 1, crf.num_transitions, i8_data, 0.25).unwrap();
    let view = tensor.view(0, 1.0);

    let params = DecoderParams::default();
    let mut ws = DecodeWorkspace::new();
    let decoded = decode_chunk(&view, &crf, &params, &mut ws).unwrap();

    let expected: String = bases.iter().map(|&b| BASE_CHARS[b] as char).collect();
    assert_eq!(decoded.sequence, expected);
}
