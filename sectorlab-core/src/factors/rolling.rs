//! Trailing-window statistics shared by the factors and the regime overlay.
//!
//! A window value is defined only when all `period` inputs are present,
//! otherwise the output is NaN.

/// Trailing simple moving average. First valid value at index `period - 1`.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 1, "rolling period must be >= 1");
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut missing = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            missing += 1;
        } else {
            sum += v;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                missing -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && missing == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

/// Trailing sample standard deviation (n - 1 denominator).
///
/// Each window is evaluated with a two-pass mean/variance so that a constant
/// window yields exactly zero.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    assert!(period >= 2, "rolling std period must be >= 2");
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[(i + 1 - period)..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = sample_std(window);
    }

    result
}

/// Sample standard deviation of a slice with no missing values.
pub(crate) fn sample_std(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}
