//! Benchmarks for the host-side kernels of the motion forecasting harness.
//!
//! All benchmark inputs come from the deterministic synthetic corpus, so the
//! numbers are reproducible across runs.
//!
//! Run with:
//!
//! ```bash
//! cargo bench -p motion-forecast-train
//! ```
//!
//! Criterion HTML reports are written to `target/criterion/`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{s, Array2, Array3, Axis};
use std::sync::Arc;
use motion_forecast_train::{
    config::{Representation, TrainingConfig},
    dataset::{DataLoader, MotionSource, SyntheticMotionConfig, SyntheticMotionSource, WindowedDataset},
    geometry::{forward_kinematics_sequence, revert_coordinate_space},
    metrics::{evaluator_for, mean_euler_error},
    normalization::NormalizationStats,
    skeleton::Skeleton,
};

fn lie_frames(frames: usize) -> Array2<f32> {
    let cfg = SyntheticMotionConfig { frames_per_sequence: frames, ..SyntheticMotionConfig::default() };
    let source = SyntheticMotionSource::new(cfg, Representation::Lie);
    source
        .train_corpus()
        .map(|c| c.sequences()[0].frames.clone())
        .unwrap_or_else(|_| Array2::zeros((frames, 39)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Forward kinematics
// ─────────────────────────────────────────────────────────────────────────────

/// Forward kinematics of the 12-joint stick figure for increasing sequence
/// lengths.
fn bench_forward_kinematics(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_kinematics");
    let skeleton = Skeleton::stick_figure();

    for frames in [10_usize, 75, 300] {
        let seq = lie_frames(frames);
        group.bench_with_input(BenchmarkId::new("frames", frames), &seq, |b, seq| {
            b.iter(|| {
                let _ = forward_kinematics_sequence(black_box(seq.view()), black_box(&skeleton));
            });
        });
    }
    group.finish();
}

/// Root trajectory reversion over a 75-frame horizon.
fn bench_revert_coordinate_space(c: &mut Criterion) {
    let seq = lie_frames(75);
    c.bench_function("revert_coordinate_space_75", |b| {
        b.iter(|| {
            let _ = revert_coordinate_space(
                black_box(seq.view()),
                nalgebra::Rotation3::identity(),
                nalgebra::Vector3::zeros(),
            );
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric kernels
// ─────────────────────────────────────────────────────────────────────────────

/// Euler-angle error of 8 samples over a 10-frame horizon.
fn bench_mean_euler_error(c: &mut Criterion) {
    let seq = lie_frames(160);
    let gt: Vec<Array2<f32>> = (0..8).map(|i| seq.slice(s![i * 10..i * 10 + 10, ..]).to_owned()).collect();
    let pred: Vec<Array2<f32>> = gt.iter().map(|g| g.mapv(|v| v + 0.01)).collect();

    c.bench_function("mean_euler_error_8x10", |b| {
        b.iter(|| {
            let _ = mean_euler_error(black_box(&pred), black_box(&gt), 10);
        });
    });
}

/// Full angle-space evaluation (Euler error + FK + MPJPE) of one action.
fn bench_angle_space_evaluator(c: &mut Criterion) {
    let seq = lie_frames(160);
    let stats = NormalizationStats::fit(&[seq.clone()]).unwrap_or_else(|_| NormalizationStats::identity(39));
    let evaluator = evaluator_for(Representation::Lie, stats.clone(), Arc::new(Skeleton::stick_figure()));

    let mut gt = Array3::<f32>::zeros((8, 10, 39));
    for i in 0..8 {
        gt.index_axis_mut(Axis(0), i).assign(&stats.normalize(seq.slice(s![i * 10..i * 10 + 10, ..])));
    }
    let pred = gt.mapv(|v| v * 0.98);

    c.bench_function("angle_space_evaluate_8x10", |b| {
        b.iter(|| {
            let _ = evaluator.evaluate("walking", black_box(pred.view()), black_box(gt.view()), &[1, 3, 7, 9]);
        });
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Batching
// ─────────────────────────────────────────────────────────────────────────────

/// One shuffled pass over the default-window training stream.
fn bench_data_loader_pass(c: &mut Criterion) {
    let cfg = TrainingConfig::default();
    let source = SyntheticMotionSource::new(SyntheticMotionConfig::default(), Representation::Lie);
    let Ok(corpus) = source.train_corpus() else { return };
    let dataset = WindowedDataset::new(&corpus, cfg.input_window_size, cfg.output_window_size, 1);

    c.bench_function("data_loader_pass", |b| {
        b.iter(|| {
            let loader = DataLoader::new(black_box(&dataset), cfg.batch_size, true, 7);
            for batch in loader.iter() {
                let _ = black_box(batch);
            }
        });
    });
}

criterion_group!(
    benches,
    // Kinematics
    bench_forward_kinematics,
    bench_revert_coordinate_space,
    // Metrics
    bench_mean_euler_error,
    bench_angle_space_evaluator,
    // Batching
    bench_data_loader_pass,
);

criterion_main!(benches);
