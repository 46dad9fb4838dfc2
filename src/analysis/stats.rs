use serde::Serialize;
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

/// Descriptive statistics over a non-empty series of finite values.
pub fn describe(values: &[f64]) -> Option<MetricStats> {
    if values.is_empty() {
        return None;
    }
    Some(MetricStats {
        mean: Statistics::mean(values),
        std: Statistics::population_std_dev(values).max(0.0),
        min: Statistics::min(values),
        max: Statistics::max(values),
        median: percentile(values, 0.5)?,
    })
}

/// Linear-interpolated quantile, matching the usual "linear" percentile definition.
pub fn percentile(values: &[f64], quantile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut ordered = values.to_vec();
    ordered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q = quantile.clamp(0.0, 1.0);
    if ordered.len() == 1 {
        return ordered.first().copied();
    }
    let idx = (ordered.len() - 1) as f64 * q;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return ordered.get(lo).copied();
    }
    let fraction = idx - lo as f64;
    let lower = ordered.get(lo).copied()?;
    let upper = ordered.get(hi).copied()?;
    Some(lower + (upper - lower) * fraction)
}

/// Pearson correlation coefficient, `None` when either series has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_yy = 0.0;
    let mut sum_xy = 0.0;
    for (xv, yv) in x.iter().zip(y.iter()) {
        sum_x += *xv;
        sum_y += *yv;
        sum_xx += xv * xv;
        sum_yy += yv * yv;
        sum_xy += xv * yv;
    }
    let denom_x = n * sum_xx - sum_x * sum_x;
    let denom_y = n * sum_yy - sum_y * sum_y;
    if denom_x <= 0.0 || denom_y <= 0.0 {
        return None;
    }
    let r = (n * sum_xy - sum_x * sum_y) / (denom_x * denom_y).sqrt();
    if !r.is_finite() {
        return None;
    }
    Some(r.clamp(-1.0, 1.0))
}
