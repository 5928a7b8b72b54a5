//! Frequency weighting windows shared by the azimuth and range filters

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::types::{SarError, SarResult};

/// Lifecycle of a band-pass filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterState {
    Uninitialized,
    Parameterized,
    FilterDefined,
    Applied,
}

impl FilterState {
    /// Fail unless the filter is in `expected`
    pub(crate) fn require(self, expected: FilterState, operation: &str) -> SarResult<()> {
        if self != expected {
            return Err(SarError::Processing(format!(
                "{} requires filter state {:?}, filter is {:?}",
                operation, expected, self
            )));
        }
        Ok(())
    }
}

/// Alpha at or above which a Hamming window is treated as rectangular
pub const RECT_ALPHA: f64 = 0.9999;

/// Rectangular window: 1 for `|x| <= 0.5`, 0 outside
pub fn rect(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| if v.abs() <= 0.5 { 1.0 } else { 0.0 })
}

fn check_band(bandwidth: f64, sampling_rate: f64) -> SarResult<()> {
    if !(bandwidth > 0.0) || bandwidth > sampling_rate {
        return Err(SarError::InvalidArgument(format!(
            "Bandwidth {} must be positive and not exceed sampling rate {}",
            bandwidth, sampling_rate
        )));
    }
    Ok(())
}

/// Generalized Hamming window `alpha + (1 - alpha) cos(2π f / bw)` on `|f| <= bw/2`
pub fn hamming(freq: &Array1<f64>, bandwidth: f64, sampling_rate: f64, alpha: f64) -> SarResult<Array1<f64>> {
    check_band(bandwidth, sampling_rate)?;
    Ok(freq.mapv(|f| {
        if f.abs() <= bandwidth / 2.0 {
            alpha + (1.0 - alpha) * (2.0 * std::f64::consts::PI * f / bandwidth).cos()
        } else {
            0.0
        }
    }))
}

/// Reciprocal of [`hamming`] inside the band, 0 outside
pub fn inverse_hamming(freq: &Array1<f64>, bandwidth: f64, sampling_rate: f64, alpha: f64) -> SarResult<Array1<f64>> {
    let window = hamming(freq, bandwidth, sampling_rate, alpha)?;
    Ok(window.mapv(|w| if w > 0.0 { 1.0 / w } else { 0.0 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_rect() {
        let x = array![-1.0, -0.5, -0.2, 0.0, 0.49, 0.5, 0.51];
        assert_eq!(rect(&x).to_vec(), vec![0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_hamming_monotonic() {
        let freq = Array1::linspace(0.0, 50.0, 51);
        let w = hamming(&freq, 100.0, 120.0, 0.75).unwrap();
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[50], 0.5, epsilon = 1e-12);
        for k in 1..w.len() {
            assert!(w[k] < w[k - 1]);
        }
        let outside = hamming(&array![51.0], 100.0, 120.0, 0.75).unwrap();
        assert_eq!(outside[0], 0.0);
    }

    #[test]
    fn test_inverse_hamming() {
        let freq = array![-20.0, 0.0, 30.0, 70.0];
        let w = hamming(&freq, 100.0, 200.0, 0.54).unwrap();
        let inv = inverse_hamming(&freq, 100.0, 200.0, 0.54).unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(w[k] * inv[k], 1.0, epsilon = 1e-12);
        }
        assert_eq!(inv[3], 0.0);
    }

    #[test]
    fn test_bandwidth_above_sampling_rate() {
        let freq = array![0.0];
        assert!(matches!(hamming(&freq, 200.0, 100.0, 0.75), Err(SarError::InvalidArgument(_))));
    }
}
