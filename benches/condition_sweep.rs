use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::{Array2, Array3};
use seeglang::{
    condition, correlation::correlate_condition, linregress, AnalysisConfig, SpeakerCondition,
    Transcript, WordEvent,
};

fn series(n: usize, phase: f64) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * 0.37 + phase).sin() + 0.01 * i as f64).collect()
}

fn bench_condition(c: &mut Criterion) {
    let x = series(2000, 0.0);
    c.bench_function("condition 2000 words", |b| {
        b.iter(|| black_box(condition(black_box(&x), 1.5).unwrap().values.len()))
    });
}

fn bench_linregress(c: &mut Criterion) {
    let x = series(2000, 0.0);
    let y = series(2000, 1.1);
    c.bench_function("linregress 2000 words", |b| {
        b.iter(|| black_box(linregress(black_box(&x), black_box(&y)).unwrap().pvalue))
    });
}

/// One condition of one electrode over a reduced embedding block.
fn bench_correlate_condition(c: &mut Criterion) {
    let cfg = AnalysisConfig { n_units: 64, n_layers: 13, ..AnalysisConfig::default() };
    let n_words = 400;
    let transcript = Transcript::new(
        (0..n_words)
            .map(|i| {
                let s = 5.0 + 0.6 * i as f64;
                WordEvent::new(s, s + 0.4, (i % 2) as u32)
            })
            .collect(),
    );
    let n_samples = 5_000 + (0.6 * n_words as f64 * 1000.0) as usize;
    let envelope = Array2::from_shape_fn((n_samples, 5), |(t, b)| {
        1.0 + (t as f64 * 1e-3 * (b + 1) as f64).sin().abs()
    });
    let emb = Array3::from_shape_fn((n_words, cfg.n_units, cfg.n_layers), |(w, u, l)| {
        (w as f64 * 0.11 + u as f64 * 0.7 + l as f64).cos()
    });
    c.bench_function("correlate_condition [5 × 64 × 13]", |b| {
        b.iter(|| {
            let out = correlate_condition(
                envelope.view(),
                &transcript,
                &emb,
                SpeakerCondition::Speaking,
                &cfg,
            )
            .unwrap();
            black_box(out.len())
        })
    });
}

criterion_group!(benches, bench_condition, bench_linregress, bench_correlate_condition);
criterion_main!(benches);
