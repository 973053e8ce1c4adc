use nalgebra::{storage::Storage, Dyn, Vector};

/// Pearson's r between two equally long vectors.
/// Returns NaN when it is undefined, i.e. fewer than two samples or one of
/// the inputs has zero variance.
pub fn pearson<SA, SB>(a: &Vector<f64, Dyn, SA>, b: &Vector<f64, Dyn, SB>) -> f64
where
    SA: Storage<f64, Dyn>,
    SB: Storage<f64, Dyn>,
{
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean_a = a.sum() / n as f64;
    let mean_b = b.sum() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }

    (cov / denom).clamp(-1.0, 1.0)
}

/// Same as [`pearson`], but an undefined correlation counts as no correlation
#[inline(always)]
pub fn pearson_or_zero<SA, SB>(a: &Vector<f64, Dyn, SA>, b: &Vector<f64, Dyn, SB>) -> f64
where
    SA: Storage<f64, Dyn>,
    SB: Storage<f64, Dyn>,
{
    let r = pearson(a, b);
    if r.is_nan() {
        0.0
    } else {
        r
    }
}
