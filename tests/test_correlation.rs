mod common;
use common::{layout, write_embeddings, write_envelope, write_transcript, Word};
use seeglang::correlation::{run_electrode, ElectrodeCorrelation, RunOutcome};
use seeglang::io::ManifestEntry;
use seeglang::{AnalysisConfig, RunContext};
use ndarray::{Array2, Array3};

const N_WORDS: usize = 40;

fn small_cfg() -> AnalysisConfig {
    AnalysisConfig { n_bands: 2, n_units: 3, n_layers: 2, ..AnalysisConfig::default() }
}

/// Word i starts at 5 + i s; every third word (including the first) is heard.
fn words() -> Vec<Word> {
    (0..N_WORDS)
        .map(|i| {
            let s = 5.0 + i as f64;
            (s, s + 0.4, if i % 3 == 0 { 1 } else { 0 })
        })
        .collect()
}

/// Per-word amplitude, rounded through f32 like the envelope file.
fn level(i: usize) -> f64 {
    (1.0 + 0.5 * (i as f64 * 0.9).sin() + 0.01 * i as f64) as f32 as f64
}

/// Band 0 holds `level(i)` in the 500 ms before each spoken word and in the
/// 500 ms after each heard word; band 1 is an unrelated oscillation.
fn envelope(words: &[Word]) -> Array2<f64> {
    let mut env = Array2::from_shape_fn((50_000, 2), |(t, b)| {
        if b == 0 { 1.0 } else { 2.0 + (t as f64 * 0.37e-3).sin() }
    });
    for (i, &(s, _, sid)) in words.iter().enumerate() {
        let idx = (s * 1000.0) as usize;
        let range = if sid == 0 { idx - 500..idx } else { idx..idx + 500 };
        env.slice_mut(ndarray::s![range, 0]).fill(level(i));
    }
    env
}

/// Cell (0, 0) is the word amplitude, cell (1, 0) an affine map of it, the
/// rest unrelated.
fn embeddings() -> Array3<f64> {
    Array3::from_shape_fn((N_WORDS, 3, 2), |(w, u, l)| match (u, l) {
        (0, 0) => level(w),
        (1, 0) => 2.0 * level(w) + 3.0,
        _ => (w as f64 * 1.3 + u as f64 + l as f64 * 0.7).sin(),
    })
}

fn setup(root: &std::path::Path) -> (RunContext, ManifestEntry) {
    let layout = layout(root);
    let w = words();
    write_envelope(&layout, "P01", "LA1", &envelope(&w));
    write_transcript(&layout, "P01", &w);
    write_embeddings(&layout, "P01", &embeddings());
    let entry = ManifestEntry { pid: "P01".into(), electrode: "LA1".into() };
    (RunContext::new(small_cfg(), layout), entry)
}

#[test]
fn identical_series_fit_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, entry) = setup(dir.path());

    assert_eq!(run_electrode(&ctx, &entry).unwrap(), RunOutcome::Written);
    let path = ctx.layout.correlation_artifact("P01", "LA1");
    let r = ElectrodeCorrelation::load(&path).unwrap();

    assert_eq!(r.self_speech.shape(), &[1, 2, 3, 2, 5]);
    assert_eq!(r.other_speech.shape(), &[1, 2, 3, 2, 5]);

    // Band 0 amplitude vs the identical embedding cell.
    let fit = r.self_speech.slice(ndarray::s![0, 0, 0, 0, ..]).to_vec();
    let (slope, intercept, rv, p, se) = (fit[0], fit[1], fit[2], fit[3], fit[4]);
    assert!((slope - 1.0).abs() < 1e-9, "slope={slope}");
    assert!(intercept.abs() < 1e-9, "intercept={intercept}");
    assert!((rv - 1.0).abs() < 1e-9, "r={rv}");
    assert!(p < 1e-10, "p={p}");
    assert!(se < 1e-6, "stderr={se}");

    // Conditioning is affine-equivariant: y = 2x + c keeps r = 1, slope = 2.
    let slope2 = r.self_speech[[0, 0, 1, 0, 0]];
    let r2 = r.self_speech[[0, 0, 1, 0, 2]];
    assert!((slope2 - 2.0).abs() < 1e-6, "slope={slope2}");
    assert!((r2 - 1.0).abs() < 1e-9, "r={r2}");

    // Every regression is defined for the listening words too.
    assert!(r.other_speech.iter().all(|v| v.is_finite()));
}

#[test]
fn second_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, entry) = setup(dir.path());
    let path = ctx.layout.correlation_artifact("P01", "LA1");

    assert_eq!(run_electrode(&ctx, &entry).unwrap(), RunOutcome::Written);
    let bytes = std::fs::read(&path).unwrap();
    let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();

    // Inputs disappear: a skip must not even read them.
    std::fs::remove_file(ctx.layout.embeddings("P01")).unwrap();
    assert_eq!(run_electrode(&ctx, &entry).unwrap(), RunOutcome::Skipped);
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);
}

#[test]
fn missing_inputs_fail_without_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _) = setup(dir.path());
    let entry = ManifestEntry { pid: "P01".into(), electrode: "NOPE".into() };
    assert!(run_electrode(&ctx, &entry).is_err());
    assert!(!ctx.layout.correlation_artifact("P01", "NOPE").exists());
}

#[test]
fn embedding_word_count_must_match_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, entry) = setup(dir.path());
    write_embeddings(&ctx.layout, "P01", &Array3::zeros((N_WORDS - 1, 3, 2)));
    let err = run_electrode(&ctx, &entry).unwrap_err();
    assert!(format!("{err:#}").contains("word rows"), "{err:#}");
}
