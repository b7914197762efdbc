//! Event-locked windowing.
//!
//! Cuts a `[E, 2·half_window]` matrix out of a continuous single-band signal,
//! one row per event time, with the event at column `half_window`.
//!
//! Boundary policy (checked in this order, `idx = floor(t · sfreq)`):
//!   idx > len − half   → row filled with mean(signal[len−half ..])
//!   idx < half         → row filled with mean(signal[.. half])
//!   otherwise          → signal[idx−half .. idx+half]
//!
//! Events near the edges therefore keep their row (row i always belongs to
//! event i) but carry a constant instead of real signal shape.
use std::ops::Range;

use anyhow::Result;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Align `signal` to each time in `event_times` (seconds).
pub fn align_to_events(
    event_times: &[f64],
    signal: ArrayView1<f64>,
    cfg: &AnalysisConfig,
) -> Result<Array2<f64>> {
    let n = signal.len();
    if n == 0 {
        return Err(AnalysisError::EmptySignal.into());
    }
    let half = cfg.half_window;
    let width = cfg.window_len();

    let head = signal.slice(s![..half.min(n)]).mean().unwrap_or(f64::NAN);
    let tail = signal.slice(s![n.saturating_sub(half)..]).mean().unwrap_or(f64::NAN);

    let mut out = Array2::<f64>::zeros((event_times.len(), width));
    for (mut row, &t) in out.rows_mut().into_iter().zip(event_times) {
        let idx = cfg.time_to_index(t);
        if idx > n as i64 - half as i64 {
            row.fill(tail);
        } else if idx < half as i64 {
            row.fill(head);
        } else {
            let start = idx as usize - half;
            row.assign(&signal.slice(s![start..start + width]));
        }
    }
    Ok(out)
}

/// Collapse each window to the mean of its `cols` columns.
///
/// `cols` must lie within the window width.
pub fn slice_means(windows: &Array2<f64>, cols: Range<usize>) -> Result<Array1<f64>, AnalysisError> {
    if cols.start > cols.end || cols.end > windows.ncols() {
        return Err(AnalysisError::SliceOutOfWindow {
            start: cols.start,
            end: cols.end,
            width: windows.ncols(),
        });
    }
    if windows.nrows() == 0 || cols.is_empty() {
        return Ok(Array1::zeros(windows.nrows()));
    }
    Ok(windows
        .slice(s![.., cols])
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(windows.nrows())))
}

/// One amplitude per event: align, then average the `cols` slice.
pub fn event_amplitudes(
    event_times: &[f64],
    signal: ArrayView1<f64>,
    cols: Range<usize>,
    cfg: &AnalysisConfig,
) -> Result<Vec<f64>> {
    let windows = align_to_events(event_times, signal, cfg)?;
    Ok(slice_means(&windows, cols)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn ramp(n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| i as f64)
    }

    #[test]
    fn interior_event_is_exact_slice() {
        let cfg = AnalysisConfig::default();
        let sig = ramp(20_000);
        let w = align_to_events(&[10.0], sig.view(), &cfg).unwrap();
        assert_eq!(w.dim(), (1, 8000));
        assert_eq!(w[[0, 0]], 6000.0);
        assert_eq!(w[[0, 4000]], 10_000.0);
        assert_eq!(w[[0, 7999]], 13_999.0);
    }

    #[test]
    fn boundary_rows_are_constant_means() {
        let cfg = AnalysisConfig::default();
        let sig = ramp(20_000);
        let w = align_to_events(&[1.0, 19.0], sig.view(), &cfg).unwrap();
        let head = (0..4000).map(|i| i as f64).sum::<f64>() / 4000.0;
        let tail = (16_000..20_000).map(|i| i as f64).sum::<f64>() / 4000.0;
        assert!(w.row(0).iter().all(|&v| v == head));
        assert!(w.row(1).iter().all(|&v| v == tail));
    }

    #[test]
    fn last_valid_index_is_not_a_fallback() {
        // idx == len − half is still an interior window.
        let cfg = AnalysisConfig::default();
        let sig = ramp(12_000);
        let w = align_to_events(&[8.0], sig.view(), &cfg).unwrap();
        assert_eq!(w[[0, 0]], 4000.0);
        assert_eq!(w[[0, 7999]], 11_999.0);
    }

    #[test]
    fn short_signal_uses_whole_signal_mean() {
        let cfg = AnalysisConfig::default();
        let sig = ramp(100);
        let w = align_to_events(&[0.05], sig.view(), &cfg).unwrap();
        assert_eq!(w.ncols(), 8000);
        assert!(w.row(0).iter().all(|&v| v == 49.5));
    }

    #[test]
    fn empty_signal_is_error() {
        let cfg = AnalysisConfig::default();
        let sig = Array1::<f64>::zeros(0);
        assert!(align_to_events(&[1.0], sig.view(), &cfg).is_err());
    }

    #[test]
    fn slice_means_of_ramp_window() {
        let cfg = AnalysisConfig::default();
        let sig = ramp(20_000);
        let amps = event_amplitudes(&[10.0], sig.view(), 4000..4500, &cfg).unwrap();
        // mean(10_000 .. 10_500)
        assert_eq!(amps, vec![10_249.5]);
    }

    #[test]
    fn no_events_no_rows() {
        let cfg = AnalysisConfig::default();
        let sig = ramp(20_000);
        let w = align_to_events(&[], sig.view(), &cfg).unwrap();
        assert_eq!(w.dim(), (0, 8000));
        assert_eq!(slice_means(&w, 3500..4000).unwrap().len(), 0);
    }

    #[test]
    fn slice_past_window_is_error() {
        let cfg = AnalysisConfig::default();
        let sig = ramp(20_000);
        let w = align_to_events(&[10.0], sig.view(), &cfg).unwrap();
        assert_eq!(
            slice_means(&w, 7500..8500),
            Err(AnalysisError::SliceOutOfWindow { start: 7500, end: 8500, width: 8000 })
        );
        assert!(slice_means(&w, 7999..8000).is_ok());

        let wide = AnalysisConfig { post_onset: 4000..9000, ..AnalysisConfig::default() };
        assert!(event_amplitudes(&[10.0], sig.view(), wide.post_onset.clone(), &cfg).is_err());
    }
}
