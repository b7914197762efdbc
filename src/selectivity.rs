//! Selectivity of band envelopes around speaker-turn transitions.
//!
//! For every electrode and band, the amplitude around valid transitions to
//! speaking (500 ms before onset) and to listening (500 ms after onset) is
//! compared with steady-state listening probes (500 ms after each probe):
//!
//! ```text
//! index = (mean(class) − mean(control)) / (mean(class) + mean(control))
//! p     = ttest_ind(class, control)              (pooled variance)
//! ```
//!
//! Amplitudes are IQR-clipped per event set; there is no lag-1 removal here
//! because event sets are not a sequence of neighbouring words.
//!
//! Results go to a [`SelectivityStore`] owned by the caller, checkpointed to
//! disk every `checkpoint_every` electrodes.  On restart, electrodes already
//! done in the checkpoint are matched by `(pid, electrode)` and skipped, so the
//! manifest may be reordered or extended between runs.
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Ix1, Ix3};
use tracing::{debug, info, warn};

use crate::config::{AnalysisConfig, RunContext};
use crate::error::AnalysisError;
use crate::io::{load_envelope, load_transcript, ManifestEntry, StFile, StWriter};
use crate::outlier::confine_outliers;
use crate::stats::{mean, ttest_ind};
use crate::transitions::{EventClasses, Transcript};
use crate::window::event_amplitudes;

/// Transition classes, in result-matrix order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ToSpeak = 0,
    ToListen = 1,
}

impl Transition {
    pub const ALL: [Transition; 2] = [Transition::ToSpeak, Transition::ToListen];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// `(mean(class) − mean(control)) / (mean(class) + mean(control))`.
///
/// `None` when either set is empty.
pub fn selectivity_index(class: &[f64], control: &[f64]) -> Option<f64> {
    let (a, b) = (mean(class)?, mean(control)?);
    Some((a - b) / (a + b))
}

/// One cell of the result matrices.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectivityValue {
    pub index: Option<f64>,
    pub pvalue: Option<f64>,
}

/// `[2, n_bands]` results of one electrode.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeSelectivity {
    pub cells: Array2<SelectivityValue>,
}

impl ElectrodeSelectivity {
    pub fn get(&self, t: Transition, band: usize) -> SelectivityValue {
        self.cells[[t.index(), band]]
    }
}

fn clipped_amplitudes(
    times: &[f64],
    signal: ArrayView1<f64>,
    cols: std::ops::Range<usize>,
    cfg: &AnalysisConfig,
) -> Result<Vec<f64>> {
    let amps = event_amplitudes(times, signal, cols, cfg)?;
    Ok(confine_outliers(amps, cfg.outlier_k)
        .map(|c| c.values)
        .unwrap_or_default())
}

/// Selectivity of every band of one electrode.
pub fn electrode_selectivity(
    envelope: ArrayView2<f64>,
    classes: &EventClasses,
    cfg: &AnalysisConfig,
) -> Result<ElectrodeSelectivity> {
    if envelope.ncols() < cfg.n_bands {
        return Err(AnalysisError::ShapeMismatch {
            what: "envelope",
            expected: vec![envelope.nrows(), cfg.n_bands],
            got: envelope.shape().to_vec(),
        }
        .into());
    }
    let mut cells = Array2::<SelectivityValue>::default((Transition::ALL.len(), cfg.n_bands));
    for band in 0..cfg.n_bands {
        let sig = envelope.column(band);
        let speak = clipped_amplitudes(&classes.to_speak, sig, cfg.pre_onset.clone(), cfg)?;
        let listen = clipped_amplitudes(&classes.to_listen, sig, cfg.post_onset.clone(), cfg)?;
        let control = clipped_amplitudes(&classes.control, sig, cfg.post_onset.clone(), cfg)?;

        for (t, class) in Transition::ALL.into_iter().zip([&speak, &listen]) {
            cells[[t.index(), band]] = SelectivityValue {
                index: selectivity_index(class, &control),
                pvalue: ttest_ind(class, &control).map(|tt| tt.pvalue),
            };
        }
    }
    Ok(ElectrodeSelectivity { cells })
}

// ── Result store ──────────────────────────────────────────────────────────────

/// Header metadata key holding the `[pid, electrode]` of every row.
const ROW_KEYS: &str = "electrodes";

/// `[n_electrodes, 2, n_bands]` selectivity indices and p-values with an
/// explicit present/absent state per cell, plus a per-row done flag.
///
/// On disk each matrix is a safetensors file with `values` (F64, NaN where
/// absent), `present` (U8 mask) and `done` (U8 per electrode).  When rows are
/// keyed by a manifest, the keys go to the header metadata so a later run can
/// match rows by electrode rather than by position.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectivityStore {
    index: Array3<Option<f64>>,
    pvalue: Array3<Option<f64>>,
    done: Array1<bool>,
    keys: Vec<Option<ManifestEntry>>,
    sign_path: PathBuf,
    p_path: PathBuf,
}

impl SelectivityStore {
    pub fn new(n_electrodes: usize, n_bands: usize, sign_path: PathBuf, p_path: PathBuf) -> Self {
        let shape = (n_electrodes, Transition::ALL.len(), n_bands);
        Self {
            index: Array3::from_elem(shape, None),
            pvalue: Array3::from_elem(shape, None),
            done: Array1::from_elem(n_electrodes, false),
            keys: vec![None; n_electrodes],
            sign_path,
            p_path,
        }
    }

    /// Empty store with row `i` keyed by `manifest[i]`.
    pub fn for_manifest(
        manifest: &[ManifestEntry],
        n_bands: usize,
        sign_path: PathBuf,
        p_path: PathBuf,
    ) -> Self {
        let mut store = Self::new(manifest.len(), n_bands, sign_path, p_path);
        store.keys = manifest.iter().cloned().map(Some).collect();
        store
    }

    pub fn n_electrodes(&self) -> usize {
        self.done.len()
    }

    pub fn n_bands(&self) -> usize {
        self.index.shape()[2]
    }

    pub fn index(&self) -> &Array3<Option<f64>> {
        &self.index
    }

    pub fn pvalue(&self) -> &Array3<Option<f64>> {
        &self.pvalue
    }

    /// Electrode stored in `row`, if the store is keyed.
    pub fn key(&self, row: usize) -> Option<&ManifestEntry> {
        self.keys[row].as_ref()
    }

    pub fn write_row(&mut self, row: usize, t: Transition, band: usize, value: SelectivityValue) {
        self.index[[row, t.index(), band]] = value.index;
        self.pvalue[[row, t.index(), band]] = value.pvalue;
    }

    /// Store every cell of `sel` in `row` and mark the row done.
    pub fn write_electrode(&mut self, row: usize, sel: &ElectrodeSelectivity) {
        for t in Transition::ALL {
            for band in 0..sel.cells.ncols() {
                self.write_row(row, t, band, sel.get(t, band));
            }
        }
        self.done[row] = true;
    }

    pub fn is_done(&self, row: usize) -> bool {
        self.done[row]
    }

    pub fn completed(&self) -> usize {
        self.done.iter().filter(|&&d| d).count()
    }

    fn keys_json(&self) -> Result<String> {
        let rows: Vec<serde_json::Value> = self
            .keys
            .iter()
            .map(|k| match k {
                Some(e) => serde_json::json!([e.pid, e.electrode]),
                None => serde_json::Value::Null,
            })
            .collect();
        Ok(serde_json::to_string(&rows)?)
    }

    fn parse_keys(json: &str, n: usize) -> Result<Vec<Option<ManifestEntry>>> {
        let rows: Vec<Option<(String, String)>> =
            serde_json::from_str(json).context("malformed row keys")?;
        if rows.len() != n {
            return Err(AnalysisError::ShapeMismatch {
                what: "row keys",
                expected: vec![n],
                got: vec![rows.len()],
            }
            .into());
        }
        Ok(rows
            .into_iter()
            .map(|r| r.map(|(pid, electrode)| ManifestEntry { pid, electrode }))
            .collect())
    }

    fn write_matrix(&self, path: &Path, m: &Array3<Option<f64>>, keys: &str) -> Result<()> {
        let values = m.mapv(|c| c.unwrap_or(f64::NAN));
        let present: Vec<u8> = m.iter().map(|c| c.is_some() as u8).collect();
        let done: Vec<u8> = self.done.iter().map(|&d| d as u8).collect();
        let mut w = StWriter::new();
        w.add_f64_array("values", &values);
        w.add_u8("present", &present, m.shape());
        w.add_u8("done", &done, &[done.len()]);
        w.set_metadata(ROW_KEYS, keys);
        w.write(path)
    }

    /// Overwrite both artifacts with the full in-memory state.
    pub fn checkpoint(&self) -> Result<()> {
        let keys = self.keys_json()?;
        self.write_matrix(&self.sign_path, &self.index, &keys)?;
        self.write_matrix(&self.p_path, &self.pvalue, &keys)?;
        debug!(completed = self.completed(), "selectivity checkpoint written");
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn read_matrix(path: &Path) -> Result<(Array3<Option<f64>>, Array1<bool>, Vec<Option<ManifestEntry>>)> {
        let st = StFile::open(path)?;
        let values = st.tensor_f64("values")?.into_dimensionality::<Ix3>()
            .with_context(|| format!("{}: 'values' is not 3-d", path.display()))?;
        let present = st.tensor_u8("present")?.into_dimensionality::<Ix3>()
            .with_context(|| format!("{}: 'present' is not 3-d", path.display()))?;
        let done = st.tensor_u8("done")?.into_dimensionality::<Ix1>()
            .with_context(|| format!("{}: 'done' is not 1-d", path.display()))?;
        if values.shape() != present.shape() {
            return Err(AnalysisError::ShapeMismatch {
                what: "present mask",
                expected: values.shape().to_vec(),
                got: present.shape().to_vec(),
            }
            .into());
        }
        let keys = match st.metadata(ROW_KEYS) {
            Some(json) => Self::parse_keys(json, values.shape()[0])
                .with_context(|| format!("{}: row keys", path.display()))?,
            None => vec![None; values.shape()[0]],
        };
        let mut m = Array3::from_elem(values.dim(), None);
        ndarray::Zip::from(&mut m)
            .and(&values)
            .and(&present)
            .for_each(|c, &v, &p| *c = (p != 0).then_some(v));
        Ok((m, done.mapv(|d| d != 0), keys))
    }

    /// Load a previous checkpoint written by [`checkpoint`](Self::checkpoint).
    pub fn load(sign_path: PathBuf, p_path: PathBuf) -> Result<Self> {
        let (index, done, keys) = Self::read_matrix(&sign_path)?;
        let (pvalue, done_p, keys_p) = Self::read_matrix(&p_path)?;
        if index.shape() != pvalue.shape() || done.len() != index.shape()[0] {
            return Err(AnalysisError::ShapeMismatch {
                what: "selectivity checkpoint",
                expected: index.shape().to_vec(),
                got: pvalue.shape().to_vec(),
            }
            .into());
        }
        // A row counts as done only if both files agree on it.
        let done = ndarray::Zip::from(&done)
            .and(&done_p)
            .map_collect(|&a, &b| a && b);
        let keys = keys
            .into_iter()
            .zip(keys_p)
            .map(|(a, b)| if a == b { a } else { None })
            .collect();
        Ok(Self { index, pvalue, done, keys, sign_path, p_path })
    }

    /// Copy row `from` of `prev` into row `to`, including its done flag.
    fn adopt_row(&mut self, to: usize, prev: &Self, from: usize) {
        self.index.index_axis_mut(Axis(0), to).assign(&prev.index.index_axis(Axis(0), from));
        self.pvalue.index_axis_mut(Axis(0), to).assign(&prev.pvalue.index_axis(Axis(0), from));
        self.done[to] = prev.done[from];
    }

    /// Store for `manifest` that reuses every finished row of an existing
    /// checkpoint whose electrode key matches, wherever it sits in the new
    /// manifest.  Unkeyed or unmatched rows start empty.
    pub fn resume_or_new(
        manifest: &[ManifestEntry],
        n_bands: usize,
        sign_path: PathBuf,
        p_path: PathBuf,
    ) -> Self {
        let mut store = Self::for_manifest(manifest, n_bands, sign_path.clone(), p_path.clone());
        if !(sign_path.exists() && p_path.exists()) {
            return store;
        }
        let prev = match Self::load(sign_path, p_path) {
            Ok(prev) if prev.n_bands() == n_bands => prev,
            Ok(prev) => {
                warn!(bands = prev.n_bands(), "checkpoint band count differs, starting over");
                return store;
            }
            Err(e) => {
                warn!("unreadable checkpoint, starting over: {e:#}");
                return store;
            }
        };

        let mut finished: HashMap<&ManifestEntry, usize> = HashMap::new();
        for row in 0..prev.n_electrodes() {
            if let (true, Some(key)) = (prev.done[row], prev.key(row)) {
                finished.entry(key).or_insert(row);
            }
        }
        for (row, entry) in manifest.iter().enumerate() {
            if let Some(&from) = finished.get(entry) {
                store.adopt_row(row, &prev, from);
            }
        }
        info!(
            reused = store.completed(),
            previous = prev.completed(),
            "resuming from selectivity checkpoint"
        );
        store
    }
}

// ── Transcript cache ─────────────────────────────────────────────────────────

/// Participant id → transcript, keeping the `capacity` most recently used.
#[derive(Debug)]
pub struct TranscriptCache {
    capacity: usize,
    entries: VecDeque<(String, Arc<Transcript>)>,
    pub hits: usize,
    pub misses: usize,
}

impl TranscriptCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: VecDeque::new(), hits: 0, misses: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == pid)
    }

    pub fn get_or_load<F>(&mut self, pid: &str, load: F) -> Result<Arc<Transcript>>
    where
        F: FnOnce(&str) -> Result<Transcript>,
    {
        if let Some(pos) = self.entries.iter().position(|(k, _)| k == pid) {
            self.hits += 1;
            if let Some(e) = self.entries.remove(pos) {
                let t = Arc::clone(&e.1);
                self.entries.push_front(e);
                return Ok(t);
            }
        }
        self.misses += 1;
        let t = Arc::new(load(pid)?);
        self.entries.push_front((pid.to_string(), Arc::clone(&t)));
        self.entries.truncate(self.capacity);
        Ok(t)
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Run the selectivity analysis over `manifest`, row `i` ↔ `manifest[i]`.
///
/// Electrodes whose inputs fail to load are logged and left absent (and not
/// done, so a rerun retries them).
pub fn run_selectivity(ctx: &RunContext, manifest: &[ManifestEntry]) -> Result<SelectivityStore> {
    let cfg = &ctx.cfg;
    let layout = &ctx.layout;
    std::fs::create_dir_all(layout.out_root())
        .with_context(|| format!("creating {}", layout.out_root().display()))?;

    let mut store = SelectivityStore::resume_or_new(
        manifest,
        cfg.n_bands,
        layout.selectivity_artifact("sign"),
        layout.selectivity_artifact("p"),
    );
    let mut cache = TranscriptCache::new(cfg.transcript_cache);
    let every = cfg.checkpoint_every.max(1);
    let mut failed = 0usize;

    for (ii, entry) in manifest.iter().enumerate() {
        if !store.is_done(ii) {
            let result = (|| -> Result<ElectrodeSelectivity> {
                let envelope = load_envelope(&layout.envelope(&entry.pid, &entry.electrode))?;
                let transcript =
                    cache.get_or_load(&entry.pid, |pid| load_transcript(&layout.transcript(pid)))?;
                let classes = EventClasses::from_transcript(&transcript, cfg);
                debug!(
                    pid = %entry.pid, electrode = %entry.electrode,
                    to_speak = classes.to_speak.len(),
                    to_listen = classes.to_listen.len(),
                    control = classes.control.len(),
                    "event classes"
                );
                electrode_selectivity(envelope.view(), &classes, cfg)
            })();
            match result {
                Ok(sel) => store.write_electrode(ii, &sel),
                Err(e) => {
                    failed += 1;
                    warn!(pid = %entry.pid, electrode = %entry.electrode, "selectivity failed: {e:#}");
                }
            }
        }

        if ii % every == every - 1 {
            store.checkpoint()?;
        }
        if ii % 100 == 0 {
            info!(electrode = ii, of = manifest.len(), "selectivity progress");
        }
    }

    store.checkpoint()?;
    info!(
        completed = store.completed(), failed,
        transcript_loads = cache.misses,
        transcripts_cached = cache.len(),
        "selectivity finished"
    );
    Ok(store)
}
