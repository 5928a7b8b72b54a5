//! Azimuth spectrum shifting with a Doppler phase ramp

use std::f64::consts::PI;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::types::{ComplexMatrix, DopplerCentroid, SarComplex};

/// Direction of the azimuth spectrum shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftDirection {
    /// Move the spectrum from the Doppler centroid to zero frequency
    ToZero,
    /// Move a baseband spectrum back to the Doppler centroid
    ToDoppler,
}

impl ShiftDirection {
    fn sign(self) -> f64 {
        match self {
            ShiftDirection::ToZero => -1.0,
            ShiftDirection::ToDoppler => 1.0,
        }
    }
}

/// Multiply a tile by `exp(±j 2π t fdc(pixel) / prf)`.
///
/// Line `t` is counted from the first tile line; `first_pixel` is the 1-based
/// image pixel of the first tile column. A zero Doppler polynomial leaves the
/// data untouched.
pub fn shift_azimuth_spectrum(
    data: &mut ComplexMatrix,
    prf: f64,
    rsr2x: f64,
    doppler: &DopplerCentroid,
    first_pixel: f64,
    direction: ShiftDirection,
) {
    if doppler.is_zero() {
        log::debug!("Zero Doppler centroid, azimuth spectrum not shifted");
        return;
    }
    let sign = direction.sign();
    let fdc = Array1::from_shape_fn(data.ncols(), |c| doppler.pix2fdc(first_pixel + c as f64, rsr2x));
    log::debug!(
        "Shifting azimuth spectrum {:?}: fdc {:.2}..{:.2} Hz",
        direction,
        fdc.first().copied().unwrap_or(0.0),
        fdc.last().copied().unwrap_or(0.0)
    );

    for (t, mut line) in data.rows_mut().into_iter().enumerate() {
        let trend = 2.0 * PI * t as f64 / prf;
        for (v, f) in line.iter_mut().zip(fdc.iter()) {
            *v *= SarComplex::from_polar(1.0, sign * trend * f);
        }
    }
}
