//! # seeglang — sEEG envelopes aligned to conversation
//!
//! `seeglang` aligns band-limited sEEG envelopes (1 kHz, one column per
//! frequency band) with a word-level conversation transcript and runs two
//! analyses per electrode:
//!
//! - **correlation**: regress every GPT-2 embedding cell (768 units × 13
//!   layers) on the word-locked envelope amplitude, separately for words the
//!   participant speaks and words they hear;
//! - **selectivity**: compare the amplitude around speaker-turn transitions
//!   with steady-state listening.
//!
//! ## Pipeline overview
//!
//! ```text
//! envelope [T, 5]          transcript (start, end, sid)       embeddings [W, 768, 13]
//!   │                          │                                   │
//!   ├─ window::align_to_events ┤ word onsets / transitions         ├─ clean_embeddings
//!   ├─ slice mean (±500 ms)    │                                   │
//!   │                          │                                   │
//!   ├─ condition (lag-1 removal + IQR clipping) ───────────────────┤
//!   │                                                              │
//!   ├─ correlation: linregress per (band, unit, layer) ────────────┘
//!   │     └─→ [1, 5, 768, 13, 5] × {self_speech, other_speech}
//!   │
//!   └─ selectivity: IQR clipping, index + t-test vs listening probes
//!         └─→ [electrodes, 2, 5] × {sign, p}
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use seeglang::{AnalysisConfig, DataLayout, RunContext};
//! use seeglang::io::load_manifest;
//! use std::path::Path;
//!
//! let ctx = RunContext::new(
//!     AnalysisConfig::default(),
//!     DataLayout::new("data", "result"),
//! );
//! let manifest = load_manifest(Path::new("data/electrodes.csv")).unwrap();
//!
//! // One artifact per electrode; existing artifacts are skipped.
//! for entry in &manifest {
//!     seeglang::correlation::run_electrode(&ctx, entry).unwrap();
//! }
//!
//! // One store for the whole manifest, checkpointed every 50 electrodes.
//! let store = seeglang::selectivity::run_selectivity(&ctx, &manifest).unwrap();
//! println!("{} electrodes done", store.completed());
//! ```
//!
//! ## Running individual steps
//!
//! ```
//! use seeglang::{condition, iqr_bounds, linregress, AnalysisConfig};
//! use seeglang::window::event_amplitudes;
//! use ndarray::Array1;
//!
//! let cfg = AnalysisConfig::default();
//! let band = Array1::from_shape_fn(60_000, |t| (t as f64 * 1e-3).sin().abs());
//!
//! let onsets = [5.0, 12.5, 20.0, 31.0, 44.0];
//! let amps = event_amplitudes(&onsets, band.view(), 4000..4500, &cfg).unwrap();
//!
//! let b = iqr_bounds(&amps, 1.5).unwrap();
//! assert!(b.upper >= b.lower);
//!
//! let treated = condition(&amps, 1.5).unwrap();
//! assert_eq!(treated.values.len(), amps.len() - 1);
//!
//! let fit = linregress(&treated.values, &treated.values).unwrap();
//! assert!((fit.slope - 1.0).abs() < 1e-9);
//! ```

pub mod condition;
pub mod config;
pub mod correlation;
pub mod error;
pub mod io;
pub mod outlier;
pub mod selectivity;
pub mod stats;
pub mod transitions;
pub mod window;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{AnalysisConfig, DataLayout, RunContext};

// error
pub use error::AnalysisError;

// outlier + condition
pub use outlier::{clip_to_bounds, confine_outliers, iqr_bounds, percentile, ClipCounts, Clipped, OutlierBounds};
pub use condition::{condition, lag1_autocorrelation, remove_autocorrelation, Conditioned};

// window
pub use window::{align_to_events, event_amplitudes, slice_means};

// transitions
pub use transitions::{
    detect_transitions, listening_probes, valid_listen_transitions, valid_speak_transitions,
    EventClasses, SpeakerCondition, Transcript, Transitions, WordEvent,
};

// stats
pub use stats::{linregress, ttest_ind, LinRegress, TTest};

// drivers
pub use correlation::{clean_embeddings, correlate_electrode, run_electrode, ElectrodeCorrelation, RunOutcome};
pub use selectivity::{
    electrode_selectivity, run_selectivity, selectivity_index, ElectrodeSelectivity,
    SelectivityStore, SelectivityValue, Transition, TranscriptCache,
};

// io
pub use io::{load_embeddings, load_envelope, load_manifest, load_transcript, ManifestEntry, StFile, StWriter};
