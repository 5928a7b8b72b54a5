//! Slave resampling onto the master grid
//!
//! Every master pixel is mapped into the slave with the coregistration
//! polynomial and interpolated with a tabulated `points x points` kernel.
//! Azimuth kernels can be modulated to the local Doppler centroid so that
//! band-pass azimuth spectra are interpolated without distortion.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{s, Zip};
use serde::{Deserialize, Serialize};

use super::interpolation::{InterpolationLut, KernelType};
use super::polynomial::CoregPolynomial;
use crate::types::{ComplexMatrix, SarComplex, SarError, SarResult, SlcImage, Window};

/// Extra lines/pixels read around the kernel support of a tile
pub const FORSURE: i64 = 25;

/// Resampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleParams {
    pub kernel: KernelType,
    /// Modulate azimuth kernels to the slave Doppler centroid
    pub shift_azimuth_spectrum: bool,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            kernel: KernelType::Cc6p,
            shift_azimuth_spectrum: true,
        }
    }
}

/// Slave window needed to resample one master tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRequest {
    /// Window to read, inside the slave's current window
    pub window: Window,
    /// Window before clamping
    pub requested: Window,
    pub clamped: bool,
}

/// Resampler for one master/slave pair
pub struct Resampler<'a> {
    lut: &'a InterpolationLut,
    slave: &'a SlcImage,
    cpm: &'a CoregPolynomial,
    shift_azimuth_spectrum: bool,
}

impl<'a> Resampler<'a> {
    pub fn new(
        lut: &'a InterpolationLut,
        master: &SlcImage,
        slave: &'a SlcImage,
        cpm: &'a CoregPolynomial,
        shift_azimuth_spectrum: bool,
    ) -> SarResult<Self> {
        master.validate()?;
        slave.validate()?;
        if cpm.norm_window != master.original_window {
            log::warn!(
                "Polynomial normalized over {}, master original window is {}",
                cpm.norm_window,
                master.original_window
            );
        }
        let shift = shift_azimuth_spectrum && !slave.doppler.is_zero();
        log::debug!(
            "Resampler: {}-point {:?} kernel, degree {} polynomial, azimuth spectrum shift {}",
            lut.points(),
            lut.kernel_type(),
            cpm.degree,
            shift
        );
        Ok(Self { lut, slave, cpm, shift_azimuth_spectrum: shift })
    }

    /// Slave window covering the kernel support of every pixel of `master_tile`
    pub fn slave_tile_window(&self, master_tile: &Window) -> SarResult<TileRequest> {
        let corners = [
            (master_tile.line_lo, master_tile.pix_lo),
            (master_tile.line_lo, master_tile.pix_hi),
            (master_tile.line_hi, master_tile.pix_lo),
            (master_tile.line_hi, master_tile.pix_hi),
        ];
        let positions: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(l, p)| self.cpm.slave_position(l as f64, p as f64))
            .collect();
        let min_l = positions.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_l = positions.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_p = positions.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_p = positions.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let margin = (self.lut.points() / 2) as i64 + FORSURE;
        let requested = Window {
            line_lo: min_l.floor() as i64 - margin,
            line_hi: max_l.ceil() as i64 + margin,
            pix_lo: min_p.floor() as i64 - margin,
            pix_hi: max_p.ceil() as i64 + margin,
        };
        let (window, clamped) = requested.clamp_to(&self.slave.current_window).ok_or_else(|| {
            SarError::OutOfBounds(format!(
                "Master tile {} maps to {}, outside slave window {}",
                master_tile, requested, self.slave.current_window
            ))
        })?;
        if clamped {
            log::debug!("Slave tile window {} clamped to {}", requested, window);
        }
        Ok(TileRequest { window, requested, clamped })
    }

    /// Interpolated slave value at master position (line, pixel).
    ///
    /// `None` when the kernel support is not fully inside the buffer.
    pub fn resample_pixel(
        &self,
        line: f64,
        pixel: f64,
        buffer: &ComplexMatrix,
        buffer_window: &Window,
    ) -> Option<SarComplex> {
        let (interp_l, interp_p) = self.cpm.slave_position(line, pixel);
        let points = self.lut.points();
        let half = (points / 2) as i64;

        let floor_l = interp_l.floor();
        let floor_p = interp_p.floor();
        let first_l = floor_l as i64 - (half - 1) - buffer_window.line_lo;
        let first_p = floor_p as i64 - (half - 1) - buffer_window.pix_lo;
        if first_l < 0
            || first_p < 0
            || first_l as usize + points > buffer.nrows()
            || first_p as usize + points > buffer.ncols()
        {
            return None;
        }

        let row_l = self.lut.row_for(interp_l - floor_l);
        let row_p = self.lut.row_for(interp_p - floor_p);
        let kernel_p = self.lut.kernel(row_p);
        let kernel_l = self.lut.kernel(row_l);

        let window = buffer.slice(s![
            first_l as usize..first_l as usize + points,
            first_p as usize..first_p as usize + points
        ]);

        // phase of the azimuth taps for the local Doppler centroid
        let phase_rate = if self.shift_azimuth_spectrum {
            2.0 * PI * self.slave.window_pix2fdc(interp_p) / self.slave.prf
        } else {
            0.0
        };
        let axis_l = self.lut.axis(row_l);

        let mut sum = SarComplex::new(0.0, 0.0);
        for (i, row) in window.rows().into_iter().enumerate() {
            let mut inner = SarComplex::new(0.0, 0.0);
            for (v, &k) in row.iter().zip(kernel_p.iter()) {
                inner += *v * k;
            }
            let weight = if phase_rate != 0.0 {
                SarComplex::from_polar(kernel_l[i], -axis_l[i] * phase_rate)
            } else {
                SarComplex::new(kernel_l[i], 0.0)
            };
            sum += weight * inner;
        }
        Some(sum)
    }

    /// Resample `master_tile` from a slave buffer holding `buffer_window`.
    ///
    /// Pixels without full kernel support in the buffer are set to zero.
    pub fn resample_tile(
        &self,
        master_tile: &Window,
        slave_buffer: &ComplexMatrix,
        buffer_window: &Window,
    ) -> SarResult<ComplexMatrix> {
        if slave_buffer.dim() != buffer_window.shape() {
            return Err(SarError::InvalidArgument(format!(
                "Slave buffer {:?} does not match window {}",
                slave_buffer.dim(),
                buffer_window
            )));
        }
        log::info!("Resampling master tile {} from slave buffer {}", master_tile, buffer_window);

        let mut output = ComplexMatrix::zeros(master_tile.shape());
        let outside = AtomicUsize::new(0);
        let evaluate = |(i, j): (usize, usize), out: &mut SarComplex| {
            let line = (master_tile.line_lo + i as i64) as f64;
            let pixel = (master_tile.pix_lo + j as i64) as f64;
            match self.resample_pixel(line, pixel, slave_buffer, buffer_window) {
                Some(v) => *out = v,
                None => {
                    outside.fetch_add(1, Ordering::Relaxed);
                }
            }
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut output).par_for_each(evaluate);
        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut output).for_each(evaluate);

        let outside = outside.into_inner();
        if outside > 0 {
            log::warn!(
                "{} of {} pixels lack slave support and were set to zero",
                outside,
                output.len()
            );
        }
        Ok(output)
    }
}

/// Resample one master tile with the shared kernel table for `params.kernel`
pub fn resample(
    params: &ResampleParams,
    master: &SlcImage,
    slave: &SlcImage,
    cpm: &CoregPolynomial,
    master_tile: &Window,
    slave_buffer: &ComplexMatrix,
    buffer_window: &Window,
) -> SarResult<ComplexMatrix> {
    let lut = InterpolationLut::shared(params.kernel)?;
    let resampler = Resampler::new(&lut, master, slave, cpm, params.shift_azimuth_spectrum)?;
    resampler.resample_tile(master_tile, slave_buffer, buffer_window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DopplerCentroid;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn image(lines: usize, pixels: usize) -> SlcImage {
        SlcImage::new(1000.0, 800.0, 1.0e7, 8.0e6, Window::from_shape(lines, pixels))
    }

    fn slave_data(lines: usize, pixels: usize) -> ComplexMatrix {
        Array2::from_shape_fn((lines, pixels), |(i, j)| {
            SarComplex::new((i as f64 * 0.31).sin() + j as f64 * 0.01, (j as f64 * 0.77 - i as f64).cos())
        })
    }

    #[test]
    fn test_tile_window_margins_and_clamping() {
        let master = image(200, 200);
        let slave = image(200, 200);
        let cpm = CoregPolynomial::constant(2.5, -1.5, master.original_window);
        let lut = InterpolationLut::new(KernelType::Cc6p).unwrap();
        let resampler = Resampler::new(&lut, &master, &slave, &cpm, false).unwrap();

        let request = resampler.slave_tile_window(&Window::new(50, 59, 60, 79).unwrap()).unwrap();
        assert!(!request.clamped);
        assert_eq!(request.window, Window::new(52 - 28, 62 + 28, 58 - 28, 78 + 28).unwrap());

        let edge = resampler.slave_tile_window(&Window::new(0, 9, 0, 9).unwrap()).unwrap();
        assert!(edge.clamped);
        assert_eq!(edge.window.line_lo, 0);
        assert_eq!(edge.window.pix_lo, 0);

        let cpm_far = CoregPolynomial::constant(5000.0, 0.0, master.original_window);
        let far = Resampler::new(&lut, &master, &slave, &cpm_far, false).unwrap();
        assert!(matches!(
            far.slave_tile_window(&Window::new(0, 9, 0, 9).unwrap()),
            Err(SarError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_integer_offset_reproduces_slave() {
        let master = image(100, 100);
        let slave = image(100, 100).with_doppler(DopplerCentroid::new(150.0, 1.0e5, 0.0));
        let data = slave_data(100, 100);
        let cpm = CoregPolynomial::constant(3.0, -2.0, master.original_window);
        for kernel in [KernelType::Cc6p, KernelType::Knab { points: 8, chi: 1.25 }] {
            let lut = InterpolationLut::new(kernel).unwrap();
            let resampler = Resampler::new(&lut, &master, &slave, &cpm, true).unwrap();
            let tile = Window::new(20, 39, 30, 45).unwrap();
            let out = resampler.resample_tile(&tile, &data, &slave.current_window).unwrap();
            for ((i, j), v) in out.indexed_iter() {
                let expected = data[[20 + i + 3, 30 + j - 2]];
                assert_abs_diff_eq!(v.re, expected.re, epsilon = 1e-9);
                assert_abs_diff_eq!(v.im, expected.im, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_repeated_calls_share_kernel_table() {
        let master = image(60, 60);
        let slave = image(60, 60);
        let data = slave_data(60, 60);
        let cpm = CoregPolynomial::constant(-1.0, 4.0, master.original_window);
        let params = ResampleParams::default();
        let tile = Window::new(10, 29, 10, 25).unwrap();

        let first = resample(&params, &master, &slave, &cpm, &tile, &data, &slave.current_window).unwrap();
        let second = resample(&params, &master, &slave, &cpm, &tile, &data, &slave.current_window).unwrap();
        assert_eq!(first, second);
        for ((i, j), v) in first.indexed_iter() {
            let expected = data[[10 + i - 1, 10 + j + 4]];
            assert_abs_diff_eq!(v.re, expected.re, epsilon = 1e-9);
            assert_abs_diff_eq!(v.im, expected.im, epsilon = 1e-9);
        }
        let table = InterpolationLut::shared(params.kernel).unwrap();
        assert!(std::sync::Arc::strong_count(&table) >= 2);
    }

    #[test]
    fn test_doppler_modulated_kernel_follows_azimuth_tone() {
        let (prf, fdc) = (1000.0, 300.0);
        let master = image(64, 16);
        let slave = image(64, 16).with_doppler(DopplerCentroid::constant(fdc));
        let data = Array2::from_shape_fn((64, 16), |(i, _)| SarComplex::from_polar(1.0, 2.0 * PI * fdc / prf * i as f64));
        let cpm = CoregPolynomial::constant(0.5, 0.0, master.original_window);
        let lut = InterpolationLut::new(KernelType::Cc6p).unwrap();
        let tile = Window::new(20, 39, 4, 11).unwrap();

        let max_error = |shift: bool| {
            let resampler = Resampler::new(&lut, &master, &slave, &cpm, shift).unwrap();
            let out = resampler.resample_tile(&tile, &data, &slave.current_window).unwrap();
            out.indexed_iter()
                .map(|((i, _), v)| {
                    let expected = SarComplex::from_polar(1.0, 2.0 * PI * fdc / prf * (20.5 + i as f64));
                    (v - expected).norm()
                })
                .fold(0.0_f64, f64::max)
        };
        let shifted = max_error(true);
        let plain = max_error(false);
        assert!(shifted < 0.02, "error with spectrum shift {}", shifted);
        assert!(plain > 2.0 * shifted, "error without shift {} vs {}", plain, shifted);
    }

    #[test]
    fn test_pixels_without_support_are_zero() {
        let master = image(50, 50);
        let slave = image(50, 50);
        let data = slave_data(50, 50);
        let cpm = CoregPolynomial::constant(0.0, 0.0, master.original_window);
        let lut = InterpolationLut::new(KernelType::Cc6p).unwrap();
        let resampler = Resampler::new(&lut, &master, &slave, &cpm, false).unwrap();
        let out = resampler.resample_tile(&Window::from_shape(50, 50), &data, &slave.current_window).unwrap();
        assert_eq!(out[[0, 0]], SarComplex::new(0.0, 0.0));
        assert_abs_diff_eq!(out[[25, 25]].re, data[[25, 25]].re, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[25, 25]].im, data[[25, 25]].im, epsilon = 1e-12);
    }

    #[test]
    fn test_buffer_shape_checked() {
        let master = image(50, 50);
        let cpm = CoregPolynomial::constant(0.0, 0.0, master.original_window);
        let lut = InterpolationLut::new(KernelType::Tri).unwrap();
        let resampler = Resampler::new(&lut, &master, &master, &cpm, false).unwrap();
        let result = resampler.resample_tile(&Window::from_shape(5, 5), &slave_data(10, 10), &Window::from_shape(10, 11));
        assert!(matches!(result, Err(SarError::InvalidArgument(_))));
    }
}
