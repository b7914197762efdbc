/// correlate: envelope ↔ GPT-2 embedding regression for every electrode in a
/// manifest.
///
/// Electrodes are independent and run in parallel; each one writes
///   {out}/{pid}/{electrode}_electrode_correlation.safetensors
/// with tensors `self_speech` and `other_speech`, shape [1, 5, 768, 13, 5].
/// Existing artifacts are left untouched, so an interrupted run can simply be
/// restarted.  A failing electrode is logged and does not stop the others.
use anyhow::Result;
use clap::Parser;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use seeglang::{
    correlation::{run_electrode, RunOutcome},
    io::load_manifest,
    AnalysisConfig, DataLayout, RunContext,
};

#[derive(Parser, Debug)]
#[command(name = "correlate", about = "sEEG envelope / GPT-2 embedding correlation per electrode")]
struct Args {
    /// Electrode manifest CSV (columns: pid, electrode).
    #[arg(long)]
    manifest: PathBuf,

    /// Input root (envelope/, transcription/, embeddings/).
    #[arg(long)]
    data: PathBuf,

    /// Output root.
    #[arg(long, default_value = "result")]
    out: PathBuf,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = 8)]
    jobs: usize,

    /// IQR multiplier for outlier clipping.
    #[arg(long, default_value_t = 1.5)]
    outlier_k: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let ctx = RunContext::new(
        AnalysisConfig { outlier_k: args.outlier_k, ..AnalysisConfig::default() },
        DataLayout::new(&args.data, &args.out),
    );
    let manifest = load_manifest(&args.manifest)?;
    println!("Loaded {} electrodes from {}", manifest.len(), args.manifest.display());

    let pool = rayon::ThreadPoolBuilder::new().num_threads(args.jobs).build()?;
    let outcomes: Vec<Result<RunOutcome>> = pool.install(|| {
        manifest
            .par_iter()
            .map(|entry| {
                let r = run_electrode(&ctx, entry);
                if let Err(e) = &r {
                    error!(pid = %entry.pid, electrode = %entry.electrode, "correlation failed: {e:#}");
                }
                r
            })
            .collect()
    });

    let written = outcomes.iter().filter(|r| matches!(r, Ok(RunOutcome::Written))).count();
    let skipped = outcomes.iter().filter(|r| matches!(r, Ok(RunOutcome::Skipped))).count();
    let failed = outcomes.iter().filter(|r| r.is_err()).count();
    println!("Written {written}, skipped {skipped}, failed {failed} → {}", args.out.display());

    if failed > 0 {
        anyhow::bail!("{failed} electrode(s) failed");
    }
    Ok(())
}
