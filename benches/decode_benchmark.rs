use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rorado::model::beam::beam_search;
use rorado::model::crf::CrfParams;
use rorado::model::scan::{backward_scan, forward_posteriors, ScanBuffer};
use rorado::model::tensor::ScoreTensor;
use rorado::utils::workspace::DecodeWorkspace;

fn synthetic_tensor(num_timesteps: usize, crf: &CrfParams) -> ScoreTensor {
    // deterministic pseudo-random logits
    let data: Vec<f32> = (0..num_timesteps * crf.num_transitions)
        .map(|i| ((i.wrapping_mul(2654435761)) % 997) as f32 / 100.0 - 5.0)
        .collect();
    ScoreTensor::from_f32(num_timesteps, 1, crf.num_transitions, data).unwrap()
}

/// Benchmark the backward scan with different k-mer context lengths
fn bench_backward_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("backward_scan");
    let num_timesteps = 200;

    for state_len in [3usize, 4, 5] {
        let crf = CrfParams::from_state_len(state_len);
        group.throughput(Throughput::Elements(
            (num_timesteps * crf.num_states) as u64,
        ));
        group.bench_with_input(
            BenchmarkId::new("state_len", state_len),
            &state_len,
            |b, _| {
                let tensor = synthetic_tensor(num_timesteps, &crf);
                let view = tensor.view(0, 1.0);
                let mut bwd = ScanBuffer::new(32);
                b.iter(|| {
                    backward_scan(black_box(&view), &crf, 2.0, &mut bwd);
                    black_box(bwd.len())
                })
            },
        );
    }
    group.finish();
}

/// Benchmark the fused forward/posterior pass
fn bench_forward_posteriors(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_posteriors");
    group.sample_size(50);
    let num_timesteps = 200;

    for state_len in [3usize, 4, 5] {
        let crf = CrfParams::from_state_len(state_len);
        group.throughput(Throughput::Elements(
            (num_timesteps * crf.num_states) as u64,
        ));
        group.bench_with_input(
            BenchmarkId::new("state_len", state_len),
            &state_len,
            |b, _| {
                let tensor = synthetic_tensor(num_timesteps, &crf);
                let view = tensor.view(0, 1.0);
                let mut ws = DecodeWorkspace::new();
                backward_scan(&view, &crf, 2.0, &mut ws.bwd);
                b.iter(|| {
                    forward_posteriors(
                        black_box(&view),
                        &crf,
                        2.0,
                        &ws.bwd,
                        &mut ws.fwd_prev,
                        &mut ws.fwd_curr,
                        &mut ws.posts,
                    );
                    black_box(ws.posts.num_rows())
                })
            },
        );
    }
    group.finish();
}

/// Benchmark the beam search across beam widths
fn bench_beam_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("beam_search");
    group.sample_size(50);
    let num_timesteps = 200;
    let crf = CrfParams::from_state_len(4);

    for beam_width in [8usize, 32, 64] {
        group.throughput(Throughput::Elements(num_timesteps as u64));
        group.bench_with_input(
            BenchmarkId::new("width", beam_width),
            &beam_width,
            |b, &beam_width| {
                let tensor = synthetic_tensor(num_timesteps, &crf);
                let view = tensor.view(0, 1.0);
                let mut ws = DecodeWorkspace::new();
                backward_scan(&view, &crf, 2.0, &mut ws.bwd);
                b.iter(|| {
                    let path = beam_search(
                        black_box(&view),
                        &crf,
                        &ws.bwd,
                        beam_width,
                        100.0,
                        2.0,
                        &mut ws.beam,
                    )
                    .unwrap();
                    black_box(path.states.len())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_backward_scan,
    bench_forward_posteriors,
    bench_beam_search
);
criterion_main!(benches);
