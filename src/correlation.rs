//! Envelope ↔ embedding correlation for one electrode.
//!
//! For each speaker condition (participant speaking / listening):
//!
//! 1. One amplitude per word: align every band to the word onsets and average
//!    the 500 ms before onset (speaking) or after onset (listening).
//! 2. Condition the amplitude series of each band (lag-1 removal + clipping).
//! 3. For every `(unit, layer)` of the embedding tensor, condition the series
//!    of that cell over the same words and regress it on the conditioned
//!    amplitudes.
//!
//! The result per condition is a `[1, bands, units, layers, 5]` tensor whose
//! last axis is `[slope, intercept, r, p, stderr]`.
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array2, Array3, Array5, ArrayView2, Axis, Ix5};
use tracing::{debug, info, warn};

use crate::condition::condition;
use crate::config::{AnalysisConfig, RunContext};
use crate::error::AnalysisError;
use crate::io::{load_embeddings, load_envelope, load_transcript, ManifestEntry, StFile, StWriter};
use crate::stats::{linregress, LinRegress};
use crate::transitions::{SpeakerCondition, Transcript};
use crate::window::event_amplitudes;

/// Number of values stored per regression (`[slope, intercept, r, p, stderr]`).
pub const REGRESSION_OUTPUTS: usize = 5;

/// Mark the first word row missing, then replace every word row that has a
/// missing cell, entirely, by the mean of each `(unit, layer)` over the words
/// where that cell is present.
///
/// Returns the number of word rows that were replaced.
pub fn clean_embeddings(emb: &mut Array3<f64>) -> usize {
    if emb.is_empty() {
        return 0;
    }
    emb.index_axis_mut(Axis(0), 0).fill(f64::NAN);

    let (_, n_units, n_layers) = emb.dim();
    let mut sums = Array2::<f64>::zeros((n_units, n_layers));
    let mut counts = Array2::<f64>::zeros((n_units, n_layers));
    for word in emb.outer_iter() {
        for ((s, c), &v) in sums.iter_mut().zip(counts.iter_mut()).zip(word.iter()) {
            if !v.is_nan() {
                *s += v;
                *c += 1.0;
            }
        }
    }
    let means = &sums / &counts;

    let mut replaced = 0;
    for mut word in emb.outer_iter_mut() {
        if word.iter().any(|v| v.is_nan()) {
            word.assign(&means);
            replaced += 1;
        }
    }
    replaced
}

/// Window columns averaged for words of `cond`.
pub fn onset_slice(cond: SpeakerCondition, cfg: &AnalysisConfig) -> std::ops::Range<usize> {
    match cond {
        SpeakerCondition::Speaking => cfg.pre_onset.clone(),
        SpeakerCondition::Listening => cfg.post_onset.clone(),
    }
}

fn check_inputs(
    envelope: &ArrayView2<f64>,
    transcript: &Transcript,
    embeddings: &Array3<f64>,
    cfg: &AnalysisConfig,
) -> Result<(), AnalysisError> {
    if envelope.ncols() < cfg.n_bands {
        return Err(AnalysisError::ShapeMismatch {
            what: "envelope",
            expected: vec![envelope.nrows(), cfg.n_bands],
            got: envelope.shape().to_vec(),
        });
    }
    let (n_words, n_units, n_layers) = embeddings.dim();
    if n_words != transcript.len() {
        return Err(AnalysisError::EmbeddingRowMismatch {
            embedding: n_words,
            transcript: transcript.len(),
        });
    }
    if (n_units, n_layers) != (cfg.n_units, cfg.n_layers) {
        return Err(AnalysisError::ShapeMismatch {
            what: "embeddings",
            expected: vec![n_words, cfg.n_units, cfg.n_layers],
            got: embeddings.shape().to_vec(),
        });
    }
    Ok(())
}

/// Regression tensor `[1, n_bands, n_units, n_layers, 5]` for one condition.
///
/// Cells whose regression is undefined (fewer than two words, or a constant
/// conditioned amplitude series) are NaN.
pub fn correlate_condition(
    envelope: ArrayView2<f64>,
    transcript: &Transcript,
    embeddings: &Array3<f64>,
    cond: SpeakerCondition,
    cfg: &AnalysisConfig,
) -> Result<Array5<f64>> {
    check_inputs(&envelope, transcript, embeddings, cfg)?;
    let shape = (1, cfg.n_bands, cfg.n_units, cfg.n_layers, REGRESSION_OUTPUTS);
    let mut out = Array5::<f64>::from_elem(shape, f64::NAN);

    let rows = transcript.indices(cond);
    let onsets = transcript.onsets(cond);
    let cols = onset_slice(cond, cfg);

    // Conditioned amplitude series per band; `None` when unusable.
    let mut amps: Vec<Option<Vec<f64>>> = Vec::with_capacity(cfg.n_bands);
    for band in 0..cfg.n_bands {
        let raw = event_amplitudes(&onsets, envelope.column(band), cols.clone(), cfg)?;
        match condition(&raw, cfg.outlier_k) {
            Ok(c) => {
                if c.is_degenerate() {
                    warn!(cond = cond.name(), band, "constant amplitude series, lag-1 removal skipped");
                }
                debug!(
                    cond = cond.name(), band,
                    clipped_high = c.counts.high, clipped_low = c.counts.low,
                    "amplitudes conditioned"
                );
                amps.push(Some(c.values));
            }
            Err(e) => {
                warn!(cond = cond.name(), band, "amplitudes not usable: {e}");
                amps.push(None);
            }
        }
    }
    if amps.iter().all(Option::is_none) {
        return Ok(out);
    }

    let mut series = vec![0.0; rows.len()];
    let mut degenerate_cells = 0usize;
    for unit in 0..cfg.n_units {
        for layer in 0..cfg.n_layers {
            for (s, &r) in series.iter_mut().zip(&rows) {
                *s = embeddings[[r, unit, layer]];
            }
            let Ok(y) = condition(&series, cfg.outlier_k) else {
                continue;
            };
            if y.is_degenerate() {
                degenerate_cells += 1;
            }
            for (band, x) in amps.iter().enumerate() {
                let Some(x) = x else { continue };
                let fit = linregress(x, &y.values).unwrap_or_else(LinRegress::nan);
                for (k, v) in fit.to_array().into_iter().enumerate() {
                    out[[0, band, unit, layer, k]] = v;
                }
            }
        }
    }
    if degenerate_cells > 0 {
        debug!(cond = cond.name(), degenerate_cells, "constant embedding cells passed through");
    }
    Ok(out)
}

/// Both condition tensors of one electrode.
#[derive(Debug, Clone)]
pub struct ElectrodeCorrelation {
    pub self_speech: Array5<f64>,
    pub other_speech: Array5<f64>,
}

impl ElectrodeCorrelation {
    pub fn get(&self, cond: SpeakerCondition) -> &Array5<f64> {
        match cond {
            SpeakerCondition::Speaking => &self.self_speech,
            SpeakerCondition::Listening => &self.other_speech,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_f64_array(SpeakerCondition::Speaking.name(), &self.self_speech);
        w.add_f64_array(SpeakerCondition::Listening.name(), &self.other_speech);
        w.write(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let st = StFile::open(path)?;
        let read = |cond: SpeakerCondition| -> Result<Array5<f64>> {
            st.tensor_f64(cond.name())?
                .into_dimensionality::<Ix5>()
                .with_context(|| format!("{}: '{}' is not 5-d", path.display(), cond.name()))
        };
        Ok(Self {
            self_speech: read(SpeakerCondition::Speaking)?,
            other_speech: read(SpeakerCondition::Listening)?,
        })
    }
}

/// Correlate an already loaded electrode.  `embeddings` must be cleaned.
pub fn correlate_electrode(
    envelope: ArrayView2<f64>,
    transcript: &Transcript,
    embeddings: &Array3<f64>,
    cfg: &AnalysisConfig,
) -> Result<ElectrodeCorrelation> {
    Ok(ElectrodeCorrelation {
        self_speech: correlate_condition(envelope, transcript, embeddings, SpeakerCondition::Speaking, cfg)?,
        other_speech: correlate_condition(envelope, transcript, embeddings, SpeakerCondition::Listening, cfg)?,
    })
}

/// What [`run_electrode`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The artifact already existed; nothing was read or written.
    Skipped,
    Written,
}

/// Load, correlate and persist one electrode.  An existing artifact marks the
/// electrode as done.
pub fn run_electrode(ctx: &RunContext, entry: &ManifestEntry) -> Result<RunOutcome> {
    let layout = &ctx.layout;
    let out_path = layout.correlation_artifact(&entry.pid, &entry.electrode);
    if out_path.exists() {
        info!(pid = %entry.pid, electrode = %entry.electrode, "artifact exists, skipping");
        return Ok(RunOutcome::Skipped);
    }

    let envelope = load_envelope(&layout.envelope(&entry.pid, &entry.electrode))?;
    let transcript = load_transcript(&layout.transcript(&entry.pid))?;
    let mut embeddings = load_embeddings(&layout.embeddings(&entry.pid))?;
    let imputed = clean_embeddings(&mut embeddings);
    debug!(pid = %entry.pid, imputed, "embedding rows imputed");

    let result = correlate_electrode(envelope.view(), &transcript, &embeddings, &ctx.cfg)
        .with_context(|| format!("{}/{}", entry.pid, entry.electrode))?;

    let dir = layout.correlation_dir(&entry.pid);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    result.write(&out_path)?;
    info!(pid = %entry.pid, electrode = %entry.electrode, path = %out_path.display(), "artifact written");
    Ok(RunOutcome::Written)
}
