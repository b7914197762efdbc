/// Shared helpers: synthetic recordings written into a temporary data root.
use ndarray::{Array2, Array3};
use seeglang::{io::StWriter, DataLayout};
use std::fmt::Write as _;
use std::path::Path;

#[allow(unused)]
/// `(start_time, end_time, sid)` rows.
pub type Word = (f64, f64, u32);

#[allow(unused)]
pub fn layout(root: &Path) -> DataLayout {
    DataLayout::new(root.join("data"), root.join("result"))
}

#[allow(unused)]
pub fn write_envelope(layout: &DataLayout, pid: &str, electrode: &str, env: &Array2<f64>) {
    let path = layout.envelope(pid, electrode);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    // Envelopes are usually exported as float32.
    let data: Vec<f32> = env.iter().map(|&v| v as f32).collect();
    let mut w = StWriter::new();
    w.add_f32("envelope", &data, env.shape());
    w.write(&path).unwrap();
}

#[allow(unused)]
pub fn write_embeddings(layout: &DataLayout, pid: &str, emb: &Array3<f64>) {
    let path = layout.embeddings(pid);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut w = StWriter::new();
    w.add_f64_array("embeddings", emb);
    w.write(&path).unwrap();
}

#[allow(unused)]
pub fn write_transcript(layout: &DataLayout, pid: &str, words: &[Word]) {
    let path = layout.transcript(pid);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut csv = String::from("word,start_time,end_time,sid\n");
    for (i, (s, e, sid)) in words.iter().enumerate() {
        writeln!(csv, "w{i},{s},{e},{sid}").unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

#[allow(unused)]
pub fn write_manifest(path: &Path, rows: &[(&str, &str)]) {
    let mut csv = String::from("pid,electrode\n");
    for (pid, el) in rows {
        writeln!(csv, "{pid},{el}").unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

#[allow(unused)]
/// Alternating conversation starting with a listening turn at `t0`.
///
/// Each turn has 5 words of 0.4 s starting every 0.5 s; turns are separated
/// by 0.6 s, so one listen + speak cycle lasts 6 s.
pub fn conversation(t0: f64, cycles: usize) -> Vec<Word> {
    let mut words = Vec::new();
    for c in 0..cycles {
        let base = t0 + 6.0 * c as f64;
        for (offset, sid) in [(0.0, 1u32), (3.0, 0u32)] {
            for j in 0..5 {
                let s = base + offset + 0.5 * j as f64;
                words.push((s, s + 0.4, sid));
            }
        }
    }
    words
}
