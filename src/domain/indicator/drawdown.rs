//! Maximum drawdown against the running peak.

/// Largest `(peak - price) / peak` over the series, in [0, 1].
///
/// Empty input, or input without a positive finite peak, yields 0.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NAN;
    let mut worst: f64 = 0.0;

    for &price in prices {
        if !price.is_finite() {
            continue;
        }
        if peak.is_nan() || price > peak {
            peak = price;
        }
        if peak > 0.0 {
            let dd = (peak - price) / peak;
            worst = worst.max(dd);
        }
    }

    worst.clamp(0.0, 1.0)
}
