//! IQR outlier bounds and clipping.
//!
//! `iqr_bounds` — quartiles by linear interpolation between order statistics
//! (NumPy's default `percentile` method):
//!   rank = p/100 · (n − 1),   Q = s[⌊rank⌋] + frac · (s[⌊rank⌋+1] − s[⌊rank⌋])
//!   upper = Q3 + k·IQR,  lower = Q1 − k·IQR
//!
//! Clipping caps values at the bounds and never drops samples.

/// Clipping bounds derived from a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

/// How many values a clipping pass capped on each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipCounts {
    pub high: usize,
    pub low: usize,
}

impl ClipCounts {
    pub fn total(&self) -> usize {
        self.high + self.low
    }
}

/// A series after outlier clipping, with the bounds used and the clip counts.
#[derive(Debug, Clone)]
pub struct Clipped {
    pub values: Vec<f64>,
    pub bounds: OutlierBounds,
    pub counts: ClipCounts,
}

/// Linear-interpolation percentile of an already **sorted** slice.
///
/// `p` is in percent (`0.0..=100.0`).  Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Tukey fences `Q1 − k·IQR` / `Q3 + k·IQR` of `sample`.
///
/// Returns `None` for an empty sample.  A constant sample yields
/// `lower == upper == value`.
pub fn iqr_bounds(sample: &[f64], k: f64) -> Option<OutlierBounds> {
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = percentile(&sorted, 25.0)?;
    let q3 = percentile(&sorted, 75.0)?;
    let iqr = q3 - q1;
    Some(OutlierBounds {
        q1,
        q3,
        lower: q1 - k * iqr,
        upper: q3 + k * iqr,
    })
}

/// Cap every value of `series` into `[bounds.lower, bounds.upper]` in-place.
pub fn clip_to_bounds(series: &mut [f64], bounds: &OutlierBounds) -> ClipCounts {
    let mut counts = ClipCounts::default();
    for v in series.iter_mut() {
        if *v > bounds.upper {
            *v = bounds.upper;
            counts.high += 1;
        } else if *v < bounds.lower {
            *v = bounds.lower;
            counts.low += 1;
        }
    }
    counts
}

/// Compute bounds on `series` itself and clip it to them.
///
/// Returns `None` only for an empty series.
pub fn confine_outliers(mut series: Vec<f64>, k: f64) -> Option<Clipped> {
    let bounds = iqr_bounds(&series, k)?;
    let counts = clip_to_bounds(&mut series, &bounds);
    Some(Clipped { values: series, bounds, counts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn percentile_matches_numpy_linear() {
        // np.percentile([1, 2, 3, 4], [25, 75]) == [1.75, 3.25]
        let s = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(percentile(&s, 25.0).unwrap(), 1.75, epsilon = 1e-12);
        assert_abs_diff_eq!(percentile(&s, 75.0).unwrap(), 3.25, epsilon = 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn bounds_unsorted_input() {
        let b = iqr_bounds(&[4.0, 1.0, 3.0, 2.0], 1.5).unwrap();
        assert_abs_diff_eq!(b.q1, 1.75, epsilon = 1e-12);
        assert_abs_diff_eq!(b.q3, 3.25, epsilon = 1e-12);
        assert_abs_diff_eq!(b.upper, 3.25 + 1.5 * 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(b.lower, 1.75 - 1.5 * 1.5, epsilon = 1e-12);
    }

    #[test]
    fn constant_sample_collapses() {
        let b = iqr_bounds(&[2.5; 7], 1.5).unwrap();
        assert_eq!(b.iqr(), 0.0);
        assert_eq!(b.lower, 2.5);
        assert_eq!(b.upper, 2.5);
    }

    #[test]
    fn bounds_ordering_and_linear_in_k() {
        let sample: Vec<f64> = (0..50).map(|i| ((i * 37) % 11) as f64 * 0.3 - 1.0).collect();
        let b1 = iqr_bounds(&sample, 1.0).unwrap();
        let b2 = iqr_bounds(&sample, 2.0).unwrap();
        assert!(b1.upper >= b1.q3 && b1.q3 >= b1.q1 && b1.q1 >= b1.lower);
        // Distance from the quartile doubles with k.
        assert_abs_diff_eq!(b2.upper - b2.q3, 2.0 * (b1.upper - b1.q3), epsilon = 1e-12);
        assert_abs_diff_eq!(b2.q1 - b2.lower, 2.0 * (b1.q1 - b1.lower), epsilon = 1e-12);
    }

    #[test]
    fn clipping_caps_without_dropping() {
        let mut xs = vec![0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 100.0, -100.0];
        let n = xs.len();
        let b = iqr_bounds(&xs, 1.5).unwrap();
        let counts = clip_to_bounds(&mut xs, &b);
        assert_eq!(xs.len(), n);
        assert_eq!(counts, ClipCounts { high: 1, low: 1 });
        assert!(xs.iter().all(|&v| b.contains(v)));
        assert_eq!(xs[7], b.upper);
        assert_eq!(xs[8], b.lower);
    }

    #[test]
    fn confine_empty_is_none() {
        assert!(confine_outliers(vec![], 1.5).is_none());
    }
}
