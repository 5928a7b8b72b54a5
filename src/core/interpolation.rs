//! Interpolation kernels and their lookup table
//!
//! Kernels are tabulated at `INTERVAL + 1` sub-sample positions. Row `i`
//! holds the weights for a fractional position of `i / INTERVAL` between the
//! two central taps, normalized to unit sum, together with the tap offsets
//! (`axis`) relative to that position.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::types::{RealMatrix, SarError, SarResult, SlcImage};

/// Number of intervals the unit distance between taps is divided into
pub const INTERVAL: usize = 127;

/// Interpolation kernel family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Nearest neighbour, 2 points
    Rect,
    /// Linear, 2 points
    Tri,
    /// Cubic convolution, 4 points
    Cc4p,
    /// Cubic convolution, 6 points
    Cc6p,
    /// Truncated sinc
    TruncatedSinc { points: usize },
    /// Sinc weighted with the KNAB window for oversampling ratio `chi`
    Knab { points: usize, chi: f64 },
    /// Raised cosine for oversampling ratio `chi`
    RaisedCosine { points: usize, chi: f64 },
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn cubic_convolution_4p(x: f64) -> f64 {
    const ALPHA: f64 = -1.0;
    let a = x.abs();
    if a < 1.0 {
        (ALPHA + 2.0) * a.powi(3) - (ALPHA + 3.0) * a.powi(2) + 1.0
    } else if a < 2.0 {
        ALPHA * a.powi(3) - 5.0 * ALPHA * a.powi(2) + 8.0 * ALPHA * a - 4.0 * ALPHA
    } else {
        0.0
    }
}

fn cubic_convolution_6p(x: f64) -> f64 {
    const ALPHA: f64 = -0.5;
    const BETA: f64 = 0.5;
    let a = x.abs();
    if a < 1.0 {
        (ALPHA - BETA + 2.0) * a.powi(3) - (ALPHA - BETA + 3.0) * a.powi(2) + 1.0
    } else if a < 2.0 {
        ALPHA * a.powi(3) - (5.0 * ALPHA - BETA) * a.powi(2) + (8.0 * ALPHA - 3.0 * BETA) * a
            - (4.0 * ALPHA - 2.0 * BETA)
    } else if a < 3.0 {
        BETA * a.powi(3) - 8.0 * BETA * a.powi(2) + 21.0 * BETA * a - 18.0 * BETA
    } else {
        0.0
    }
}

fn knab(x: f64, points: usize, chi: f64) -> f64 {
    let v = 1.0 - 1.0 / chi;
    let vv = PI * v * points as f64 / 2.0;
    let r = 1.0 - (2.0 * x / points as f64).powi(2);
    sinc(x) * (vv * r.max(0.0).sqrt()).cosh() / vv.cosh()
}

fn raised_cosine(x: f64, chi: f64) -> f64 {
    let v = 1.0 - 1.0 / chi;
    let denom = 1.0 - (2.0 * v * x).powi(2);
    if denom.abs() < 1e-10 {
        sinc(x) * PI / 4.0
    } else {
        sinc(x) * (v * PI * x).cos() / denom
    }
}

impl KernelType {
    pub fn points(&self) -> usize {
        match *self {
            KernelType::Rect | KernelType::Tri => 2,
            KernelType::Cc4p => 4,
            KernelType::Cc6p => 6,
            KernelType::TruncatedSinc { points }
            | KernelType::Knab { points, .. }
            | KernelType::RaisedCosine { points, .. } => points,
        }
    }

    /// Kernel value at distance `x` (in samples) from the interpolation point
    pub fn evaluate(&self, x: f64) -> f64 {
        match *self {
            KernelType::Rect => {
                let a = x.abs();
                if a < 0.5 {
                    1.0
                } else if a == 0.5 {
                    0.5
                } else {
                    0.0
                }
            }
            KernelType::Tri => (1.0 - x.abs()).max(0.0),
            KernelType::Cc4p => cubic_convolution_4p(x),
            KernelType::Cc6p => cubic_convolution_6p(x),
            KernelType::TruncatedSinc { .. } => sinc(x),
            KernelType::Knab { points, chi } => knab(x, points, chi),
            KernelType::RaisedCosine { chi, .. } => raised_cosine(x, chi),
        }
    }

    /// KNAB kernel with the oversampling ratio of an image.
    ///
    /// The ratio is the smaller of PRF/ABW and RSR/RBW.
    pub fn knab_for(points: usize, image: &SlcImage) -> Self {
        let chi = image.oversampling_ratio();
        if chi < 1.1 {
            log::warn!("Oversampling ratio {:.3} is low, KNAB kernel will be poor", chi);
        }
        KernelType::Knab { points, chi }
    }

    fn validate(&self) -> SarResult<()> {
        let points = self.points();
        if points < 2 || points % 2 != 0 {
            return Err(SarError::InvalidArgument(format!(
                "Interpolation kernel needs an even number of points, got {}",
                points
            )));
        }
        match *self {
            KernelType::Knab { chi, .. } | KernelType::RaisedCosine { chi, .. } if !(chi > 1.0) => {
                Err(SarError::InvalidArgument(format!(
                    "Oversampling ratio must exceed 1 for {:?}",
                    self
                )))
            }
            _ => Ok(()),
        }
    }
}

static SHARED_TABLES: OnceLock<Mutex<Vec<Arc<InterpolationLut>>>> = OnceLock::new();

/// Tabulated interpolation kernel
#[derive(Debug, Clone)]
pub struct InterpolationLut {
    kernel_type: KernelType,
    points: usize,
    kernels: RealMatrix,
    axis: RealMatrix,
}

impl InterpolationLut {
    pub fn new(kernel_type: KernelType) -> SarResult<Self> {
        kernel_type.validate()?;
        let points = kernel_type.points();
        let dx = 1.0 / INTERVAL as f64;

        let axis = Array2::from_shape_fn((INTERVAL + 1, points), |(i, k)| {
            (1.0 - (points / 2) as f64 + k as f64) - i as f64 * dx
        });
        let mut kernels = axis.mapv(|x| kernel_type.evaluate(x));
        for (i, mut row) in kernels.rows_mut().into_iter().enumerate() {
            let sum = row.sum();
            if sum.abs() < 1e-12 {
                return Err(SarError::InvalidArgument(format!(
                    "{:?} kernel row {} sums to zero",
                    kernel_type, i
                )));
            }
            row.mapv_inplace(|v| v / sum);
        }

        log::debug!("Built {}-point {:?} interpolation table", points, kernel_type);
        Ok(Self { kernel_type, points, kernels, axis })
    }

    /// Table for `kernel_type`, built on first use and shared afterwards
    pub fn shared(kernel_type: KernelType) -> SarResult<Arc<Self>> {
        let tables = SHARED_TABLES.get_or_init(|| Mutex::new(Vec::new()));
        let mut tables = tables
            .lock()
            .map_err(|_| SarError::Processing("Interpolation table cache poisoned".to_string()))?;
        if let Some(lut) = tables.iter().find(|lut| lut.kernel_type == kernel_type) {
            return Ok(Arc::clone(lut));
        }
        let lut = Arc::new(Self::new(kernel_type)?);
        tables.push(Arc::clone(&lut));
        Ok(lut)
    }

    pub fn kernel_type(&self) -> KernelType {
        self.kernel_type
    }

    pub fn points(&self) -> usize {
        self.points
    }

    /// Table row for a fractional position in `[0, 1)`
    pub fn row_for(&self, fraction: f64) -> usize {
        ((fraction * INTERVAL as f64 + 0.5) as usize).min(INTERVAL)
    }

    pub fn kernel(&self, row: usize) -> ArrayView1<'_, f64> {
        self.kernels.row(row)
    }

    pub fn axis(&self, row: usize) -> ArrayView1<'_, f64> {
        self.axis.row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::types::Window;

    fn all_kernels() -> Vec<KernelType> {
        vec![
            KernelType::Rect,
            KernelType::Tri,
            KernelType::Cc4p,
            KernelType::Cc6p,
            KernelType::TruncatedSinc { points: 6 },
            KernelType::TruncatedSinc { points: 16 },
            KernelType::Knab { points: 4, chi: 1.2 },
            KernelType::Knab { points: 16, chi: 1.25 },
            KernelType::RaisedCosine { points: 6, chi: 1.2 },
            KernelType::RaisedCosine { points: 12, chi: 1.3 },
        ]
    }

    #[test]
    fn test_rows_have_unit_sum() {
        for kernel in all_kernels() {
            let lut = InterpolationLut::new(kernel).unwrap();
            for row in 0..=INTERVAL {
                assert_abs_diff_eq!(lut.kernel(row).sum(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_row_zero_is_impulse() {
        for kernel in all_kernels() {
            let lut = InterpolationLut::new(kernel).unwrap();
            let centre = lut.points() / 2 - 1;
            for (k, &w) in lut.kernel(0).iter().enumerate() {
                let expected = if k == centre { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(w, expected, epsilon = 1e-12);
            }
            assert_eq!(lut.axis(0)[centre], 0.0);
        }
    }

    #[test]
    fn test_half_sample_is_symmetric() {
        let lut = InterpolationLut::new(KernelType::Cc6p).unwrap();
        let row = lut.row_for(0.5);
        assert_eq!(row, 64);
        let tri = InterpolationLut::new(KernelType::Tri).unwrap();
        let w = tri.kernel(tri.row_for(0.25));
        assert_abs_diff_eq!(w[0], 1.0 - 32.0 / 127.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_odd_points() {
        assert!(matches!(
            InterpolationLut::new(KernelType::TruncatedSinc { points: 7 }),
            Err(SarError::InvalidArgument(_))
        ));
        assert!(InterpolationLut::new(KernelType::Knab { points: 8, chi: 0.9 }).is_err());
    }

    #[test]
    fn test_shared_tables_are_built_once() {
        let first = InterpolationLut::shared(KernelType::Knab { points: 10, chi: 1.3 }).unwrap();
        let second = InterpolationLut::shared(KernelType::Knab { points: 10, chi: 1.3 }).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let other = InterpolationLut::shared(KernelType::Knab { points: 10, chi: 1.4 }).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert!(InterpolationLut::shared(KernelType::TruncatedSinc { points: 5 }).is_err());
    }

    #[test]
    fn test_knab_for_image() {
        let slc = SlcImage::new(1679.9, 1378.0, 18.96e6, 14.0e6, Window::from_shape(10, 10));
        match KernelType::knab_for(8, &slc) {
            KernelType::Knab { points, chi } => {
                assert_eq!(points, 8);
                assert_abs_diff_eq!(chi, 1679.9 / 1378.0, epsilon = 1e-12);
            }
            other => panic!("unexpected kernel {:?}", other),
        }
    }
}
