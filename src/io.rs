//! File I/O: safetensors tensors and header-indexed CSV tables.
//!
//! - [`StFile`] / [`StWriter`]: minimal safetensors reader and writer
//!   (reads F32, F64, I32, U8; writes F32, F64, U8), header parsed with
//!   `serde_json`.
//! - [`load_envelope`], [`load_embeddings`]: numeric inputs.
//! - [`load_transcript`], [`load_manifest`]: CSV inputs.
use anyhow::{bail, Context, Result};
use ndarray::{Array, Array2, Array3, ArrayD, Dimension, IxDyn};
use std::collections::HashMap;
use std::path::Path;

use crate::error::AnalysisError;
use crate::transitions::{Transcript, WordEvent};

// ── Safetensors reader ────────────────────────────────────────────────────────

/// A safetensors file loaded into memory.
pub struct StFile {
    bytes: Vec<u8>,
    header: HashMap<String, serde_json::Value>,
    metadata: HashMap<String, String>,
    data_start: usize,
}

struct Entry<'a> {
    dtype: &'a str,
    shape: Vec<usize>,
    raw: &'a [u8],
}

impl StFile {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            bail!("safetensors file too small");
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        if bytes.len() < 8 + n {
            bail!("safetensors header length {n} exceeds file size {}", bytes.len());
        }
        let mut header: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..8 + n])
                .context("failed to parse safetensors header")?;
        let metadata = match header.remove("__metadata__") {
            Some(m) => serde_json::from_value(m).context("__metadata__ must map strings to strings")?,
            None => HashMap::new(),
        };
        Ok(Self { bytes, header, metadata, data_start: 8 + n })
    }

    /// A `__metadata__` entry of the header.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Tensor names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.header.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn entry(&self, name: &str) -> Result<Entry<'_>> {
        let e = self
            .header
            .get(name)
            .with_context(|| format!("missing '{name}' tensor (have {:?})", self.names()))?;
        let dtype = e["dtype"]
            .as_str()
            .with_context(|| format!("'{name}': missing dtype"))?;
        let shape = e["shape"]
            .as_array()
            .with_context(|| format!("'{name}': missing shape"))?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize))
            .collect::<Option<Vec<_>>>()
            .with_context(|| format!("'{name}': bad shape"))?;
        let offsets = e["data_offsets"]
            .as_array()
            .with_context(|| format!("'{name}': missing data_offsets"))?;
        let (s, end) = match (offsets.first().and_then(|v| v.as_u64()), offsets.get(1).and_then(|v| v.as_u64())) {
            (Some(s), Some(end)) => (s as usize, end as usize),
            _ => bail!("'{name}': bad data_offsets"),
        };
        let raw = self
            .bytes
            .get(self.data_start + s..self.data_start + end)
            .with_context(|| format!("'{name}': data_offsets out of range"))?;
        Ok(Entry { dtype, shape, raw })
    }

    /// Any numeric tensor, widened to `f64`.
    pub fn tensor_f64(&self, name: &str) -> Result<ArrayD<f64>> {
        let Entry { dtype, shape, raw } = self.entry(name)?;
        let vals: Vec<f64> = match dtype {
            "F64" => raw.chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "F32" => raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "I32" => raw.chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "U8" => raw.iter().map(|&b| b as f64).collect(),
            other => bail!("'{name}': unsupported dtype {other}"),
        };
        Array::from_shape_vec(IxDyn(&shape), vals)
            .with_context(|| format!("'{name}': payload does not match shape {shape:?}"))
    }

    pub fn tensor_u8(&self, name: &str) -> Result<ArrayD<u8>> {
        let Entry { dtype, shape, raw } = self.entry(name)?;
        if dtype != "U8" {
            bail!("'{name}': expected U8, found {dtype}");
        }
        Array::from_shape_vec(IxDyn(&shape), raw.to_vec())
            .with_context(|| format!("'{name}': payload does not match shape {shape:?}"))
    }
}

// ── Safetensors writer ───────────────────────────────────────────────────────

/// Safetensors writer for F32, F64 and U8 tensors.
///
/// ```rust,no_run
/// use seeglang::io::StWriter;
/// use ndarray::Array2;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64_array("values", &Array2::<f64>::zeros((3, 5)));
/// w.add_u8("mask", &[1, 0, 1], &[3]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_array<D: Dimension>(&mut self, name: &str, arr: &Array<f64, D>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, arr.shape());
    }

    pub fn add_u8(&mut self, name: &str, data: &[u8], shape: &[usize]) {
        self.entries.push((name.to_string(), data.to_vec(), "U8", shape.to_vec()));
    }

    /// Store a string under `__metadata__`.
    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), serde_json::Value::String(value.into()));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header_map.insert("__metadata__".into(), serde_json::Value::Object(self.metadata.clone()));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let mut hdr = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr.len() % 8) % 8;
        hdr.extend(std::iter::repeat(b' ').take(pad));

        let mut out = Vec::with_capacity(8 + hdr.len() + offset);
        out.extend_from_slice(&(hdr.len() as u64).to_le_bytes());
        out.extend_from_slice(&hdr);
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    /// Write to `path` through a sibling temp file and a rename, so readers
    /// never observe a half-written file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        std::fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} → {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

// ── Numeric inputs ────────────────────────────────────────────────────────────

fn fixed_dim<D: Dimension>(arr: ArrayD<f64>, what: &'static str) -> Result<Array<f64, D>> {
    let got = arr.shape().to_vec();
    let expected = D::NDIM.unwrap_or(got.len());
    Ok(arr
        .into_dimensionality::<D>()
        .map_err(|_| AnalysisError::WrongRank { what, expected, got })?)
}

/// Band envelopes, `[n_samples, n_bands]`, from tensor `envelope`.
pub fn load_envelope(path: &Path) -> Result<Array2<f64>> {
    let st = StFile::open(path)?;
    let arr = st.tensor_f64("envelope").with_context(|| path.display().to_string())?;
    fixed_dim(arr, "envelope").with_context(|| path.display().to_string())
}

/// Word embeddings, `[n_words, n_units, n_layers]`, from tensor `embeddings`.
pub fn load_embeddings(path: &Path) -> Result<Array3<f64>> {
    let st = StFile::open(path)?;
    let arr = st.tensor_f64("embeddings").with_context(|| path.display().to_string())?;
    fixed_dim(arr, "embeddings").with_context(|| path.display().to_string())
}

// ── CSV ──────────────────────────────────────────────────────────────────────

/// A CSV file with a header row.  Fields are split on `,` and surrounding
/// whitespace and double quotes are stripped; quoted commas are not supported.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(text: &str) -> Result<Self> {
        let split = |line: &str| -> Vec<String> {
            line.split(',')
                .map(|f| f.trim().trim_matches('"').to_string())
                .collect()
        };
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = split(lines.next().context("empty CSV")?);
        let rows: Vec<Vec<String>> = lines.map(split).collect();
        for (i, r) in rows.iter().enumerate() {
            if r.len() < header.len() {
                bail!("row {} has {} fields, header has {}", i + 1, r.len(), header.len());
            }
        }
        Ok(Self { header, rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("missing column '{name}'"))
    }
}

fn parse_f64(field: &str, row: usize, col: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .with_context(|| format!("row {row}: '{col}' is not a number: {field:?}"))
}

/// Transcript from a CSV with `start_time`, `end_time` and `sid` columns.
///
/// `sid` may be written as an integer or a float (`1.0`).
pub fn parse_transcript(table: &CsvTable) -> Result<Transcript> {
    let c_start = table.column("start_time")?;
    let c_end = table.column("end_time")?;
    let c_sid = table.column("sid")?;
    let mut words = Vec::with_capacity(table.rows.len());
    for (i, r) in table.rows.iter().enumerate() {
        let row = i + 1;
        let sid = parse_f64(&r[c_sid], row, "sid")?;
        if sid.is_nan() || sid < 0.0 || sid.fract() != 0.0 {
            bail!("row {row}: 'sid' must be a non-negative integer, got {sid}");
        }
        words.push(WordEvent::new(
            parse_f64(&r[c_start], row, "start_time")?,
            parse_f64(&r[c_end], row, "end_time")?,
            sid as u32,
        ));
    }
    Ok(Transcript::new(words))
}

pub fn load_transcript(path: &Path) -> Result<Transcript> {
    let table = CsvTable::load(path)?;
    parse_transcript(&table).with_context(|| format!("parsing {}", path.display()))
}

/// One `(participant, electrode)` unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestEntry {
    pub pid: String,
    pub electrode: String,
}

/// Electrode manifest from a CSV with `pid` and `electrode` columns.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let table = CsvTable::load(path)?;
    let c_pid = table.column("pid").with_context(|| path.display().to_string())?;
    let c_el = table.column("electrode").with_context(|| path.display().to_string())?;
    Ok(table
        .rows
        .iter()
        .map(|r| ManifestEntry { pid: r[c_pid].clone(), electrode: r[c_el].clone() })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn safetensors_in_memory_roundtrip() {
        let arr = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| (a * 100 + b * 10 + c) as f64);
        let mut w = StWriter::new();
        w.add_f64_array("x", &arr);
        w.add_f32("y", &[1.5, -2.0], &[2]);
        w.add_u8("m", &[1, 0, 1], &[3]);
        let st = StFile::from_bytes(w.to_bytes().unwrap()).unwrap();

        assert_eq!(st.names(), vec!["m", "x", "y"]);
        let x = st.tensor_f64("x").unwrap();
        assert_eq!(x.shape(), &[2, 3, 4]);
        assert_eq!(x[[1, 2, 3]], 123.0);
        assert_eq!(st.tensor_f64("y").unwrap().as_slice().unwrap(), &[1.5, -2.0]);
        assert_eq!(st.tensor_u8("m").unwrap().as_slice().unwrap(), &[1, 0, 1]);
        assert!(st.tensor_u8("x").is_err());
        assert!(st.tensor_f64("missing").is_err());
        assert_eq!(st.metadata("anything"), None);
    }

    #[test]
    fn safetensors_metadata_roundtrip() {
        let mut w = StWriter::new();
        w.add_u8("done", &[1, 0], &[2]);
        w.set_metadata("electrodes", r#"[["P01","LA1"],null]"#);
        let st = StFile::from_bytes(w.to_bytes().unwrap()).unwrap();
        assert_eq!(st.metadata("electrodes"), Some(r#"[["P01","LA1"],null]"#));
        // Metadata is not a tensor.
        assert_eq!(st.names(), vec!["done"]);
    }

    #[test]
    fn truncated_file_is_error() {
        assert!(StFile::from_bytes(vec![0, 1, 2]).is_err());
        let mut bytes = 100u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(StFile::from_bytes(bytes).is_err());
    }

    #[test]
    fn transcript_from_csv() {
        let table = CsvTable::parse(
            "word,start_time,end_time,sid\n\
             hello,0.5,0.9,1.0\n\
             \"there\",1.0,1.3,0\n",
        )
        .unwrap();
        let t = parse_transcript(&table).unwrap();
        assert_eq!(t.words(), &[
            WordEvent::new(0.5, 0.9, 1),
            WordEvent::new(1.0, 1.3, 0),
        ]);
    }

    #[test]
    fn transcript_rejects_bad_sid() {
        let table = CsvTable::parse("start_time,end_time,sid\n0,1,-1\n").unwrap();
        assert!(parse_transcript(&table).is_err());
        let table = CsvTable::parse("start_time,end_time,sid\n0,1,x\n").unwrap();
        assert!(parse_transcript(&table).is_err());
        let table = CsvTable::parse("start_time,sid\n0,1\n").unwrap();
        assert!(parse_transcript(&table).is_err());
    }
}
