/// selectivity: speaker-transition selectivity for every electrode in a
/// manifest.
///
/// Writes, and rewrites every `--checkpoint-every` electrodes,
///   {out}/selectivity_during_transitions_sign.safetensors
///   {out}/selectivity_during_transitions_p.safetensors
/// each with `values` [electrodes, 2, 5] (NaN = absent), `present` and `done`.
/// Restarting with the same manifest skips electrodes already done.
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use seeglang::{
    io::load_manifest, selectivity::run_selectivity, AnalysisConfig, DataLayout, RunContext,
};

#[derive(Parser, Debug)]
#[command(name = "selectivity", about = "sEEG selectivity during speaker transitions")]
struct Args {
    /// Electrode manifest CSV (columns: pid, electrode).
    #[arg(long)]
    manifest: PathBuf,

    /// Input root (envelope/, transcription/).
    #[arg(long)]
    data: PathBuf,

    /// Output root.
    #[arg(long, default_value = "result")]
    out: PathBuf,

    /// Electrodes between two checkpoints.
    #[arg(long, default_value_t = 50)]
    checkpoint_every: usize,

    /// Participants whose transcripts stay in memory.
    #[arg(long, default_value_t = 4)]
    transcript_cache: usize,

    /// IQR multiplier for outlier clipping.
    #[arg(long, default_value_t = 1.5)]
    outlier_k: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let cfg = AnalysisConfig {
        checkpoint_every: args.checkpoint_every,
        transcript_cache: args.transcript_cache,
        outlier_k: args.outlier_k,
        ..AnalysisConfig::default()
    };
    let ctx = RunContext::new(cfg, DataLayout::new(&args.data, &args.out));

    let manifest = load_manifest(&args.manifest)?;
    println!("Loaded {} electrodes from {}", manifest.len(), args.manifest.display());

    let store = run_selectivity(&ctx, &manifest)?;
    println!(
        "Done {}/{} electrodes → {}",
        store.completed(),
        store.n_electrodes(),
        args.out.display()
    );
    Ok(())
}
