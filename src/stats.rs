//! Descriptive statistics, OLS simple regression and the two-sample t-test.
//!
//! `linregress` and `ttest_ind` follow SciPy's `stats.linregress` and
//! `stats.ttest_ind(equal_var=True)`, including the small `TINY` guard that
//! keeps the t statistic finite when |r| = 1.
use statrs::distribution::{ContinuousCDF, StudentsT};

const TINY: f64 = 1.0e-20;

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample variance with `ddof` degrees of freedom removed.
pub fn variance(xs: &[f64], ddof: usize) -> Option<f64> {
    if xs.len() <= ddof {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|&v| (v - m) * (v - m)).sum();
    Some(ss / (xs.len() - ddof) as f64)
}

/// Pearson correlation of two equal-length series.
///
/// `None` when the lengths differ, fewer than two points are given, or either
/// series has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * dist.sf(t.abs()),
        Err(_) => f64::NAN,
    }
}

/// Result of an ordinary least-squares fit `y = slope · x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinRegress {
    pub slope: f64,
    pub intercept: f64,
    pub rvalue: f64,
    pub pvalue: f64,
    pub stderr: f64,
}

impl LinRegress {
    /// `[slope, intercept, r, p, stderr]`, the layout of the correlation tensor.
    pub fn to_array(&self) -> [f64; 5] {
        [self.slope, self.intercept, self.rvalue, self.pvalue, self.stderr]
    }

    pub fn nan() -> Self {
        Self {
            slope: f64::NAN,
            intercept: f64::NAN,
            rvalue: f64::NAN,
            pvalue: f64::NAN,
            stderr: f64::NAN,
        }
    }
}

/// Simple linear regression of `y` on `x`.
///
/// `None` when the lengths differ, fewer than two points are given, or all
/// `x` values are identical.
pub fn linregress(x: &[f64], y: &[f64]) -> Option<LinRegress> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }
    if ssxm == 0.0 {
        return None;
    }

    let r = if ssym == 0.0 {
        0.0
    } else {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };
    let slope = ssxym / ssxm;
    let intercept = my - slope * mx;

    let (pvalue, stderr) = if n == 2 {
        // Two points always fit exactly.
        (if y[0] == y[1] { 1.0 } else { 0.0 }, 0.0)
    } else {
        let df = (n - 2) as f64;
        let t = r * (df / ((1.0 - r + TINY) * (1.0 + r + TINY))).sqrt();
        let p = two_sided_p(t, df);
        let se = ((1.0 - r * r).max(0.0) * ssym / ssxm / df).sqrt();
        (p, se)
    };

    Some(LinRegress { slope, intercept, rvalue: r, pvalue, stderr })
}

/// Student's two-sample t-test with pooled variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub statistic: f64,
    pub df: f64,
    pub pvalue: f64,
}

/// `None` when either group has fewer than two values.  Two constant groups
/// with equal means give a NaN statistic, matching SciPy.
pub fn ttest_ind(a: &[f64], b: &[f64]) -> Option<TTest> {
    let (n1, n2) = (a.len(), b.len());
    if n1 < 2 || n2 < 2 {
        return None;
    }
    let (m1, m2) = (mean(a)?, mean(b)?);
    let (v1, v2) = (variance(a, 1)?, variance(b, 1)?);
    let df = (n1 + n2 - 2) as f64;
    let pooled = ((n1 - 1) as f64 * v1 + (n2 - 1) as f64 * v2) / df;
    let denom = (pooled * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    let statistic = (m1 - m2) / denom;
    let pvalue = if statistic.is_infinite() { 0.0 } else { two_sided_p(statistic, df) };
    Some(TTest { statistic, df, pvalue })
}
