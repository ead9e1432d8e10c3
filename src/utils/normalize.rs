//! Sample statistics and standardization helpers

/// Mean and unbiased (n - 1) standard deviation of a slice
///
/// Returns `(0.0, 0.0)` for an empty slice; the standard deviation of a
/// single element is `0.0`.
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    if values.len() < 2 {
        return (mean as f32, 0.0);
    }
    let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean as f32, var.sqrt() as f32)
}

/// Standardize in place to zero mean and unit variance
///
/// When the standard deviation is not above `epsilon` the values are only
/// mean-centered.
pub fn standardize(values: &mut [f32], epsilon: f32) {
    let (mean, std) = mean_std(values);
    if std > epsilon {
        let denom = std + epsilon;
        values.iter_mut().for_each(|v| *v = (*v - mean) / denom);
    } else {
        values.iter_mut().for_each(|v| *v -= mean);
    }
}
