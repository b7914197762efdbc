//! Data-quality errors raised by the analysis core.
//!
//! File-level failures are reported through `anyhow` with context; these are
//! the conditions where the inputs load fine but cannot be analysed.

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("series of length {0} is too short to condition (need at least 2)")]
    SeriesTooShort(usize),

    #[error("signal is empty")]
    EmptySignal,

    #[error("column range {start}..{end} does not fit a window of {width} samples")]
    SliceOutOfWindow { start: usize, end: usize, width: usize },

    #[error("embedding has {embedding} word rows but transcript has {transcript} words")]
    EmbeddingRowMismatch { embedding: usize, transcript: usize },

    #[error("{what}: expected a {expected}-d array, got shape {got:?}")]
    WrongRank {
        what: &'static str,
        expected: usize,
        got: Vec<usize>,
    },

    #[error("{what}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}
