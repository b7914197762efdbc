//! Run configuration.
//!
//! [`AnalysisConfig`] holds every tunable parameter of the alignment and
//! statistics pipeline, [`DataLayout`] maps participants and electrodes to
//! files, and [`RunContext`] bundles both so a driver invocation receives all
//! of its settings explicitly.
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Configuration for the correlation and selectivity analyses.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use seeglang::AnalysisConfig;
///
/// let cfg = AnalysisConfig {
///     outlier_k:        3.0,   // only cap extreme values
///     checkpoint_every: 10,
///     ..AnalysisConfig::default()
/// };
/// assert_eq!(cfg.window_len(), 8000);
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Sampling rate of the band envelopes in Hz.
    ///
    /// Event times in seconds are mapped to sample indices with
    /// `floor(t × sfreq)`.
    ///
    /// Default: `1000.0` Hz (1 sample = 1 ms).
    pub sfreq: f64,

    /// Samples kept on each side of an event.
    ///
    /// Every aligned window has exactly `2 × half_window` samples with the
    /// event at offset `half_window`.  Events closer than this to either end
    /// of the recording get a constant window (see [`crate::window`]).
    ///
    /// Default: `4000` (± 4 s).
    pub half_window: usize,

    /// Number of frequency bands (columns) in every envelope array.
    ///
    /// Default: `5`.
    pub n_bands: usize,

    /// Window columns averaged for events that precede speech onset.
    ///
    /// Default: `3500..4000` (the 500 ms before onset).
    pub pre_onset: Range<usize>,

    /// Window columns averaged for events that follow heard speech onset.
    ///
    /// Default: `4000..4500` (the 500 ms after onset).
    pub post_onset: Range<usize>,

    /// IQR multiplier used for outlier clipping.
    ///
    /// Default: `1.5`.
    pub outlier_k: f64,

    /// Width in seconds of the guard windows used to validate a transition:
    /// words ending in `(t − guard, t]` and words starting in `[t, t + guard)`.
    ///
    /// Default: `1.0` s.
    pub transition_guard: f64,

    /// Spacing in seconds of the steady-state listening probes.
    ///
    /// Default: `0.5` s.
    pub probe_step: f64,

    /// Number of electrodes processed between two selectivity checkpoints.
    ///
    /// Default: `50`.
    pub checkpoint_every: usize,

    /// Hidden units per embedding layer.
    ///
    /// Default: `768` (GPT-2 small).
    pub n_units: usize,

    /// Embedding layers (input embedding + transformer blocks).
    ///
    /// Default: `13`.
    pub n_layers: usize,

    /// Participants whose transcripts stay cached in the selectivity run.
    ///
    /// Default: `4`.
    pub transcript_cache: usize,
}

impl Default for AnalysisConfig {
    /// Returns the published analysis settings:
    /// 1 kHz · ±4 s windows · 5 bands · k = 1.5 · 768 × 13 embeddings.
    fn default() -> Self {
        Self {
            sfreq: 1000.0,
            half_window: 4000,
            n_bands: 5,
            pre_onset: 3500..4000,
            post_onset: 4000..4500,
            outlier_k: 1.5,
            transition_guard: 1.0,
            probe_step: 0.5,
            checkpoint_every: 50,
            n_units: 768,
            n_layers: 13,
            transcript_cache: 4,
        }
    }
}

impl AnalysisConfig {
    /// Number of samples in one aligned window (`2 × half_window`).
    ///
    /// ```
    /// use seeglang::AnalysisConfig;
    /// assert_eq!(AnalysisConfig::default().window_len(), 8000);
    /// ```
    pub fn window_len(&self) -> usize {
        2 * self.half_window
    }

    /// Sample index of an event time, `floor(t × sfreq)`.
    pub fn time_to_index(&self, t: f64) -> i64 {
        (t * self.sfreq).floor() as i64
    }
}

/// Where inputs are read from and artifacts are written to.
///
/// ```text
/// {data_root}/envelope/{pid}/{electrode}_envelope.safetensors
/// {data_root}/transcription/{pid}.csv
/// {data_root}/embeddings/{pid}_gpt2.safetensors
/// {out_root}/{pid}/{electrode}_electrode_correlation.safetensors
/// {out_root}/selectivity_during_transitions_{sign,p}.safetensors
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub data_root: PathBuf,
    pub out_root: PathBuf,
}

impl DataLayout {
    pub fn new(data_root: impl Into<PathBuf>, out_root: impl Into<PathBuf>) -> Self {
        Self { data_root: data_root.into(), out_root: out_root.into() }
    }

    pub fn envelope(&self, pid: &str, electrode: &str) -> PathBuf {
        self.data_root
            .join("envelope")
            .join(pid)
            .join(format!("{electrode}_envelope.safetensors"))
    }

    pub fn transcript(&self, pid: &str) -> PathBuf {
        self.data_root.join("transcription").join(format!("{pid}.csv"))
    }

    pub fn embeddings(&self, pid: &str) -> PathBuf {
        self.data_root.join("embeddings").join(format!("{pid}_gpt2.safetensors"))
    }

    pub fn correlation_dir(&self, pid: &str) -> PathBuf {
        self.out_root.join(pid)
    }

    pub fn correlation_artifact(&self, pid: &str, electrode: &str) -> PathBuf {
        self.correlation_dir(pid)
            .join(format!("{electrode}_electrode_correlation.safetensors"))
    }

    /// `kind` is `"sign"` or `"p"`.
    pub fn selectivity_artifact(&self, kind: &str) -> PathBuf {
        self.out_root
            .join(format!("selectivity_during_transitions_{kind}.safetensors"))
    }

    pub fn out_root(&self) -> &Path {
        &self.out_root
    }
}

/// Configuration and paths handed to each driver invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub cfg: AnalysisConfig,
    pub layout: DataLayout,
}

impl RunContext {
    pub fn new(cfg: AnalysisConfig, layout: DataLayout) -> Self {
        Self { cfg, layout }
    }
}
