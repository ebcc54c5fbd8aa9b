/// ALMA (Arnaud Legoux Moving Average) indicator.
///
/// A moving average over a trailing window whose weights follow a Gaussian
/// kernel centred at `offset * (window - 1)`. Higher offsets push the centre
/// toward the newest price: less lag, less smoothing.
#[derive(Debug, Clone)]
pub struct AlmaIndicator {
    pub window: usize,
    pub offset: f64,
    pub sigma: f64,
    weights: Vec<f64>,
}

impl AlmaIndicator {
    pub fn new(window: usize, offset: f64, sigma: f64) -> Self {
        assert!(window >= 1, "ALMA window must be >= 1");
        assert!(offset > 0.0 && offset < 1.0, "ALMA offset must be in (0, 1)");
        assert!(sigma > 0.0, "ALMA sigma must be > 0");
        Self {
            window,
            offset,
            sigma,
            weights: alma_weights(window, offset, sigma),
        }
    }

    /// Normalized kernel, index 0 applies to the oldest price in the window.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Compute the ALMA series for `closes` (oldest first).
    ///
    /// Output has the same length as the input. Entries before `window - 1`
    /// are NaN.
    pub fn compute(&self, closes: &[f64]) -> Vec<f64> {
        let mut out = vec![f64::NAN; closes.len()];
        if closes.len() < self.window {
            return out;
        }

        for (i, slot) in out.iter_mut().enumerate().skip(self.window - 1) {
            let window = &closes[i + 1 - self.window..=i];
            *slot = window
                .iter()
                .zip(&self.weights)
                .map(|(price, weight)| price * weight)
                .sum();
        }
        out
    }
}

/// Gaussian ALMA weights normalized to sum to 1.
pub fn alma_weights(window: usize, offset: f64, sigma: f64) -> Vec<f64> {
    let m = offset * (window as f64 - 1.0);
    let s = window as f64 / sigma;
    let raw: Vec<f64> = (0..window)
        .map(|k| {
            let d = k as f64 - m;
            (-(d * d) / (2.0 * s * s)).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let alma = AlmaIndicator::new(9, 0.85, 6.0);
        let sum: f64 = alma.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "sum was {sum}");
    }

    #[test]
    fn weights_peak_near_offset() {
        // offset 0.85 over 9 samples centres the kernel at 6.8
        let weights = alma_weights(9, 0.85, 6.0);
        let (argmax, _) = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert_eq!(argmax, 7);
        assert!(weights[0] < weights[8]);
    }

    #[test]
    fn undefined_before_window() {
        let alma = AlmaIndicator::new(9, 0.85, 6.0);
        let closes: Vec<f64> = (1..=12).map(|v| v as f64).collect();
        let series = alma.compute(&closes);
        assert_eq!(series.len(), 12);
        assert!(series[..8].iter().all(|v| v.is_nan()));
        assert!(series[8..].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn short_input_is_all_nan() {
        let alma = AlmaIndicator::new(9, 0.85, 6.0);
        let series = alma.compute(&[1.0, 2.0, 3.0]);
        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn constant_series_converges_to_constant() {
        let alma = AlmaIndicator::new(9, 0.85, 6.0);
        let closes = vec![42.5; 30];
        let series = alma.compute(&closes);
        for v in &series[8..] {
            assert!((v - 42.5).abs() < 1e-9, "expected 42.5, got {v}");
        }
    }

    #[test]
    fn increasing_series_yields_increasing_alma() {
        let alma = AlmaIndicator::new(9, 0.85, 6.0);
        let closes: Vec<f64> = (1..=12).map(|v| v as f64).collect();
        let series = alma.compute(&closes);
        for pair in series[8..].windows(2) {
            assert!(pair[1] > pair[0], "{} !> {}", pair[1], pair[0]);
        }
        // Weighted toward the newest price, so it sits above the simple mean
        // of the window (5.0) but below the latest close (9.0).
        assert!(series[8] > 5.0 && series[8] < 9.0, "got {}", series[8]);
    }

    #[test]
    fn known_value_matches_manual_dot_product() {
        let alma = AlmaIndicator::new(3, 0.5, 1.0);
        // m = 1, s = 3 → symmetric kernel around the middle sample
        let w = alma.weights().to_vec();
        assert!((w[0] - w[2]).abs() < 1e-12);
        let series = alma.compute(&[2.0, 4.0, 9.0]);
        let expected = 2.0 * w[0] + 4.0 * w[1] + 9.0 * w[2];
        assert!((series[2] - expected).abs() < 1e-12);
    }
}
