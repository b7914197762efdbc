//! Lag-1 autocorrelation removal followed by IQR clipping.
//!
//! ```text
//! ρ    = pearson(x[1..], x[..n-1])
//! y[i] = x[i+1] − ρ · x[i]            i = 0 .. n-2
//! y    = clip(y, iqr_bounds(y, k))
//! ```
//!
//! The output is always exactly one sample shorter than the input.  When ρ is
//! undefined (a lagged slice has zero variance) the series is passed through
//! with ρ = 0 and [`Conditioned::rho`] is `None`.
use crate::error::AnalysisError;
use crate::outlier::{confine_outliers, ClipCounts, OutlierBounds};
use crate::stats::pearson;

/// A conditioned (de-autocorrelated, clipped) series.
#[derive(Debug, Clone)]
pub struct Conditioned {
    pub values: Vec<f64>,
    /// Lag-1 coefficient that was removed; `None` when it was undefined.
    pub rho: Option<f64>,
    pub bounds: OutlierBounds,
    pub counts: ClipCounts,
}

impl Conditioned {
    pub fn is_degenerate(&self) -> bool {
        self.rho.is_none()
    }
}

/// Pearson correlation between `series[1..]` and `series[..n-1]`.
pub fn lag1_autocorrelation(series: &[f64]) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    pearson(&series[1..], &series[..series.len() - 1])
}

/// `y[i] = x[i+1] − ρ · x[i]`.
pub fn remove_autocorrelation(series: &[f64], rho: f64) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - rho * w[0]).collect()
}

/// De-autocorrelate `series`, then clip it to its own IQR fences.
pub fn condition(series: &[f64], k: f64) -> Result<Conditioned, AnalysisError> {
    if series.len() < 2 {
        return Err(AnalysisError::SeriesTooShort(series.len()));
    }
    let rho = lag1_autocorrelation(series);
    let de = remove_autocorrelation(series, rho.unwrap_or(0.0));
    let clipped = confine_outliers(de, k).ok_or(AnalysisError::SeriesTooShort(series.len()))?;
    Ok(Conditioned {
        values: clipped.values,
        rho,
        bounds: clipped.bounds,
        counts: clipped.counts,
    })
}
