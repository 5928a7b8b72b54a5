//! Bivariate coregistration polynomials
//!
//! Offsets between master and slave are modelled as 2-D polynomials in the
//! master line/pixel, evaluated on coordinates normalized to `[-2, 2]` over
//! the master's original window. Coefficients are ordered by total degree:
//! `c00, c10, c01, c20, c11, c02, ...` where `cpq` multiplies
//! `line^p * pixel^q`.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::linalg::solve_symmetric;
use crate::types::{RealMatrix, SarError, SarResult, SlcImage, Window};

/// Highest polynomial degree accepted
pub const MAX_DEGREE: usize = 5;

/// Map `value` from `[min, max]` onto `[-2, 2]`
pub fn normalize2(value: f64, min: f64, max: f64) -> f64 {
    (value - 0.5 * (min + max)) / (0.25 * (max - min))
}

pub fn number_of_coefficients(degree: usize) -> usize {
    (degree + 1) * (degree + 2) / 2
}

/// Inverse of [`number_of_coefficients`]; `None` when `n` is not a valid count
pub fn degree_from_coefficients(n: usize) -> Option<usize> {
    let degree = (0.5 * (-1.0 + (1.0 + 8.0 * n as f64).sqrt())).floor() as i64 - 1;
    if degree < 0 || number_of_coefficients(degree as usize) != n {
        None
    } else {
        Some(degree as usize)
    }
}

/// Evaluate a bivariate polynomial at (x, y)
pub fn polyval(x: f64, y: f64, coeffs: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut index = 0;
    let mut degree = 0;
    while index < coeffs.len() {
        for q in 0..=degree {
            if index >= coeffs.len() {
                break;
            }
            sum += coeffs[index] * x.powi((degree - q) as i32) * y.powi(q as i32);
            index += 1;
        }
        degree += 1;
    }
    sum
}

/// Row of the design matrix for one observation
fn design_row(x: f64, y: f64, degree: usize) -> Array1<f64> {
    let mut row = Array1::zeros(number_of_coefficients(degree));
    let mut index = 0;
    for p in 0..=degree {
        for q in 0..=p {
            row[index] = x.powi((p - q) as i32) * y.powi(q as i32);
            index += 1;
        }
    }
    row
}

/// One offset measurement at a master position, slave minus master
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetObservation {
    pub line: f64,
    pub pixel: f64,
    pub offset_l: f64,
    pub offset_p: f64,
    pub coherence: f64,
}

/// Coregistration polynomial pair (azimuth and range offsets)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoregPolynomial {
    pub degree: usize,
    pub cpm_l: Vec<f64>,
    pub cpm_p: Vec<f64>,
    /// Master window the coordinates are normalized over
    pub norm_window: Window,
}

impl CoregPolynomial {
    pub fn new(degree: usize, cpm_l: Vec<f64>, cpm_p: Vec<f64>, norm_window: Window) -> SarResult<Self> {
        if degree > MAX_DEGREE {
            return Err(SarError::InvalidArgument(format!(
                "Polynomial degree {} out of range (max {})",
                degree, MAX_DEGREE
            )));
        }
        let expected = number_of_coefficients(degree);
        if cpm_l.len() != expected || cpm_p.len() != expected {
            return Err(SarError::InvalidArgument(format!(
                "Degree {} needs {} coefficients, got {} (lines) and {} (pixels)",
                degree,
                expected,
                cpm_l.len(),
                cpm_p.len()
            )));
        }
        Ok(Self { degree, cpm_l, cpm_p, norm_window })
    }

    /// Constant offset model
    pub fn constant(offset_l: f64, offset_p: f64, norm_window: Window) -> Self {
        Self { degree: 0, cpm_l: vec![offset_l], cpm_p: vec![offset_p], norm_window }
    }

    fn normalized(&self, line: f64, pixel: f64) -> (f64, f64) {
        let w = &self.norm_window;
        (
            normalize2(line, w.line_lo as f64, w.line_hi as f64),
            normalize2(pixel, w.pix_lo as f64, w.pix_hi as f64),
        )
    }

    /// Azimuth and range offsets at a master position
    pub fn offsets(&self, line: f64, pixel: f64) -> (f64, f64) {
        let (x, y) = self.normalized(line, pixel);
        (polyval(x, y, &self.cpm_l), polyval(x, y, &self.cpm_p))
    }

    /// Slave position of a master position
    pub fn slave_position(&self, line: f64, pixel: f64) -> (f64, f64) {
        let (dl, dp) = self.offsets(line, pixel);
        (line + dl, pixel + dp)
    }

    /// Least-squares fit of both offset polynomials to observations.
    ///
    /// Observations are weighted by coherence when `weighted` is set.
    pub fn estimate(
        observations: &[OffsetObservation],
        degree: usize,
        norm_window: Window,
        weighted: bool,
    ) -> SarResult<Self> {
        if degree > MAX_DEGREE {
            return Err(SarError::InvalidArgument(format!(
                "Polynomial degree {} out of range (max {})",
                degree, MAX_DEGREE
            )));
        }
        let unknowns = number_of_coefficients(degree);
        if observations.len() < unknowns {
            return Err(SarError::InvalidArgument(format!(
                "{} observations cannot determine {} coefficients",
                observations.len(),
                unknowns
            )));
        }
        log::info!(
            "Estimating degree {} coregistration polynomial from {} observations",
            degree,
            observations.len()
        );

        let model = Self::constant(0.0, 0.0, norm_window);
        let mut normal = RealMatrix::zeros((unknowns, unknowns));
        let mut rhs_l = Array1::zeros(unknowns);
        let mut rhs_p = Array1::zeros(unknowns);
        for obs in observations {
            let (x, y) = model.normalized(obs.line, obs.pixel);
            let row = design_row(x, y, degree);
            let w = if weighted { obs.coherence.max(0.0) } else { 1.0 };
            for i in 0..unknowns {
                for j in 0..unknowns {
                    normal[[i, j]] += w * row[i] * row[j];
                }
                rhs_l[i] += w * row[i] * obs.offset_l;
                rhs_p[i] += w * row[i] * obs.offset_p;
            }
        }

        let cpm_l = solve_symmetric(&normal, &rhs_l)?.to_vec();
        let cpm_p = solve_symmetric(&normal, &rhs_p)?.to_vec();
        let fitted = Self::new(degree, cpm_l, cpm_p, norm_window)?;

        let rms = observations
            .iter()
            .map(|o| {
                let (dl, dp) = fitted.offsets(o.line, o.pixel);
                (dl - o.offset_l).powi(2) + (dp - o.offset_p).powi(2)
            })
            .sum::<f64>()
            / observations.len() as f64;
        log::debug!("Polynomial fit RMS residual: {:.4} pixels", rms.sqrt());
        Ok(fitted)
    }

    /// Approximate master window that has slave data after resampling.
    ///
    /// The slave's current corners are mapped back into master coordinates
    /// (one fixed-point step on the polynomial) and the inner rectangle is
    /// intersected with the master's current window.
    pub fn overlap(&self, master: &SlcImage, slave: &SlcImage) -> SarResult<Window> {
        let s = &slave.current_window;
        let back = |line: i64, pixel: i64| {
            let (l, p) = (line as f64, pixel as f64);
            let (dl, dp) = self.offsets(l, p);
            let (dl, dp) = self.offsets(l - dl, p - dp);
            (l - dl, p - dp)
        };
        let (l00, p00) = back(s.line_lo, s.pix_lo);
        let (l0n, p0n) = back(s.line_lo, s.pix_hi);
        let (ln0, pn0) = back(s.line_hi, s.pix_lo);
        let (lnn, pnn) = back(s.line_hi, s.pix_hi);

        let approx = Window {
            line_lo: l00.max(l0n).ceil() as i64,
            line_hi: ln0.min(lnn).floor() as i64,
            pix_lo: p00.max(pn0).ceil() as i64,
            pix_hi: p0n.min(pnn).floor() as i64,
        };
        if approx.line_hi < approx.line_lo || approx.pix_hi < approx.pix_lo {
            return Err(SarError::OutOfBounds(format!(
                "Slave {} does not overlap the master after coregistration",
                s
            )));
        }
        let overlap = approx.intersect(&master.current_window).ok_or_else(|| {
            SarError::OutOfBounds(format!(
                "Overlap {} outside master window {}",
                approx, master.current_window
            ))
        })?;
        log::debug!("Master/slave overlap: {}", overlap);
        Ok(overlap)
    }
}
