//! Cross-correlation and coherence estimation between SLC tiles
//!
//! All estimators work on de-meaned magnitudes and report the offset of the
//! slave relative to the master: a feature at master position `x` is found
//! at slave position `x + offset`.

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use super::linalg::{demean, magnitude, set_data};
use super::spectral::{argmax, fft2d, ifft2d, oversample_real};
use crate::types::{ComplexMatrix, RealMatrix, SarComplex, SarError, SarResult, Window};

/// Peak coherence and offset of a correlation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub coherence: f64,
    pub offset_l: f64,
    pub offset_p: f64,
}

/// Parameters shared by the correlation-based estimators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationParams {
    /// Number of correlation windows over the image
    pub n_windows: usize,
    /// Chip size in lines
    pub mask_lines: usize,
    /// Chip size in pixels
    pub mask_pixels: usize,
    /// Search half-width in lines (sub-pixel refinement chip)
    pub acc_l: usize,
    /// Search half-width in pixels
    pub acc_p: usize,
    /// Oversampling factor of the correlation peak
    pub ovs_factor: usize,
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self {
            n_windows: 21,
            mask_lines: 64,
            mask_pixels: 64,
            acc_l: 8,
            acc_p: 8,
            ovs_factor: 16,
        }
    }
}

fn check_ovs(ovs_factor: usize) -> SarResult<()> {
    if ovs_factor < 1 || !ovs_factor.is_power_of_two() {
        return Err(SarError::InvalidArgument(format!(
            "Oversampling factor must be a power of two >= 1, got {}",
            ovs_factor
        )));
    }
    Ok(())
}

fn check_same_shape(master: &ComplexMatrix, slave: &ComplexMatrix) -> SarResult<()> {
    if master.dim() != slave.dim() {
        return Err(SarError::InvalidArgument(format!(
            "Master tile {:?} and slave tile {:?} differ in size",
            master.dim(),
            slave.dim()
        )));
    }
    if master.is_empty() {
        return Err(SarError::InvalidArgument("Empty correlation tiles".to_string()));
    }
    Ok(())
}

fn demeaned_magnitude(data: &ComplexMatrix) -> RealMatrix {
    let mut mag = magnitude(data);
    demean(&mut mag);
    mag
}

fn to_complex(data: &RealMatrix) -> ComplexMatrix {
    data.mapv(|v| SarComplex::new(v, 0.0))
}

/// Sliding normalized correlation of a mask over a real image.
///
/// The output has the shape of `image`; positions where the mask does not
/// fit completely are zero.
pub fn correlate(image: &RealMatrix, mask: &RealMatrix) -> SarResult<RealMatrix> {
    let (rows, cols) = image.dim();
    let (m_rows, m_cols) = mask.dim();
    if m_rows == 0 || m_cols == 0 || m_rows >= rows || m_cols >= cols {
        return Err(SarError::InvalidArgument(format!(
            "Mask {:?} must be smaller than data {:?}",
            mask.dim(),
            image.dim()
        )));
    }

    let mut mask = mask.clone();
    demean(&mut mask);
    let var_mask: f64 = mask.iter().map(|v| v * v).sum();
    if var_mask <= 0.0 {
        return Err(SarError::InvalidArgument("Correlation mask has zero variance".to_string()));
    }

    let begin_l = (m_rows - 1) / 2;
    let begin_p = (m_cols - 1) / 2;
    let mut result = RealMatrix::zeros((rows, cols));
    let mut degenerate = 0usize;
    for i in begin_l..rows - (m_rows - 1 - begin_l) {
        for j in begin_p..cols - (m_cols - 1 - begin_p) {
            let window = image.slice(s![i - begin_l..i - begin_l + m_rows, j - begin_p..j - begin_p + m_cols]);
            let mean = window.mean().unwrap_or(0.0);
            let mut covar = 0.0;
            let mut var_window = 0.0;
            for (&a, &m) in window.iter().zip(mask.iter()) {
                let a = a - mean;
                covar += a * m;
                var_window += a * a;
            }
            if var_window > 0.0 {
                result[[i, j]] = covar / (var_mask * var_window).sqrt();
            } else {
                degenerate += 1;
            }
        }
    }
    if degenerate > 0 {
        log::debug!("{} correlation positions without variance set to 0", degenerate);
    }
    Ok(result)
}

/// Place `values` at `win` in a zero `rows x cols` buffer and transform it
fn padded_spectrum(values: &RealMatrix, win: Window, rows: usize, cols: usize) -> SarResult<ComplexMatrix> {
    let mut buffer = ComplexMatrix::zeros((rows, cols));
    let (l, p) = values.dim();
    set_data(&mut buffer, win, &to_complex(values), Window::from_shape(l, p))?;
    fft2d(&mut buffer);
    Ok(buffer)
}

/// `sum_n a(n) b(n + shift)` for shifts `0..=l, 0..=p`, from spectra of `a` and `b`
fn correlate_spectra(a: &ComplexMatrix, b: &ComplexMatrix, l: usize, p: usize) -> RealMatrix {
    let mut product = Array2::from_shape_fn(a.dim(), |idx| a[idx].conj() * b[idx]);
    ifft2d(&mut product);
    product.slice(s![0..=l, 0..=p]).mapv(|c| c.re)
}

/// Normalized cross-correlation surface for all shifts, computed with FFTs.
///
/// Returns `(l+1) x (p+1)` values; index `(i, j)` is the shift
/// `(i - l/2, j - p/2)` of the slave relative to the master. Each shift is
/// normalized by the energy of both tiles over their overlap.
fn correlation_surface(master: &ComplexMatrix, slave: &ComplexMatrix) -> SarResult<RealMatrix> {
    let (l, p) = master.dim();
    let (rows, cols) = (2 * l, 2 * p);
    let mag_m = demeaned_magnitude(master);
    let mag_s = demeaned_magnitude(slave);
    let ones = RealMatrix::ones((l, p));

    // master at the origin, slave centred
    let win_m = Window::from_shape(l, p);
    let win_s = Window::with_origin((l / 2) as i64, (p / 2) as i64, l, p);

    let cross = correlate_spectra(
        &padded_spectrum(&mag_m, win_m, rows, cols)?,
        &padded_spectrum(&mag_s, win_s, rows, cols)?,
        l,
        p,
    );
    let norm_m = correlate_spectra(
        &padded_spectrum(&mag_m.mapv(|v| v * v), win_m, rows, cols)?,
        &padded_spectrum(&ones, win_s, rows, cols)?,
        l,
        p,
    );
    let norm_s = correlate_spectra(
        &padded_spectrum(&ones, win_m, rows, cols)?,
        &padded_spectrum(&mag_s.mapv(|v| v * v), win_s, rows, cols)?,
        l,
        p,
    );

    Ok(Array2::from_shape_fn(cross.dim(), |idx| {
        let denom = norm_m[idx] * norm_s[idx];
        if denom > 1e-20 {
            cross[idx] / denom.sqrt()
        } else {
            0.0
        }
    }))
}

/// Frequency-domain correlation of two equally sized tiles.
///
/// With `ovs_factor > 1` the `2*acc_l x 2*acc_p` neighbourhood of the pixel
/// peak is oversampled to refine the offset.
pub fn crosscorrelate(
    master: &ComplexMatrix,
    slave: &ComplexMatrix,
    ovs_factor: usize,
    acc_l: usize,
    acc_p: usize,
) -> SarResult<CorrelationResult> {
    check_same_shape(master, slave)?;
    check_ovs(ovs_factor)?;
    let (l, p) = master.dim();
    if ovs_factor > 1 && (acc_l == 0 || acc_p == 0 || 2 * acc_l > l || 2 * acc_p > p) {
        return Err(SarError::InvalidArgument(format!(
            "Accuracy window {}x{} does not fit tile {}x{}",
            acc_l, acc_p, l, p
        )));
    }
    log::debug!("Cross-correlating {}x{} tiles, oversampling {}", l, p, ovs_factor);

    let covar = correlation_surface(master, slave)?;
    let (max_l, max_p, peak) = argmax(&covar);
    let (half_l, half_p) = ((l / 2) as f64, (p / 2) as f64);

    if ovs_factor == 1 {
        return Ok(CorrelationResult {
            coherence: peak.clamp(0.0, 1.0),
            offset_l: max_l as f64 - half_l,
            offset_p: max_p as f64 - half_p,
        });
    }

    // chip around the peak, kept inside the surface
    let lo_l = max_l.clamp(acc_l, l + 1 - acc_l) - acc_l;
    let lo_p = max_p.clamp(acc_p, p + 1 - acc_p) - acc_p;
    let chip = covar.slice(s![lo_l..lo_l + 2 * acc_l, lo_p..lo_p + 2 * acc_p]).to_owned();
    let chip_ovs = oversample_real(&chip, ovs_factor, ovs_factor)?;
    let (off_l, off_p, peak_ovs) = argmax(&chip_ovs);
    let factor = ovs_factor as f64;

    Ok(CorrelationResult {
        coherence: peak_ovs.max(peak).clamp(0.0, 1.0),
        offset_l: lo_l as f64 + off_l as f64 / factor - half_l,
        offset_p: lo_p as f64 + off_p as f64 / factor - half_p,
    })
}

/// Frequency-domain correlation restricted to shifts in `[-acc, acc)`,
/// oversampling the whole restricted surface.
pub fn coherencefft(
    master: &ComplexMatrix,
    slave: &ComplexMatrix,
    ovs_factor: usize,
    acc_l: usize,
    acc_p: usize,
) -> SarResult<CorrelationResult> {
    check_same_shape(master, slave)?;
    check_ovs(ovs_factor)?;
    let (l, p) = master.dim();
    if acc_l == 0 || acc_p == 0 || acc_l > l / 2 || acc_p > p / 2 {
        return Err(SarError::InvalidArgument(format!(
            "Search window {}x{} does not fit tile {}x{}",
            acc_l, acc_p, l, p
        )));
    }

    let covar = correlation_surface(master, slave)?;
    let (half_l, half_p) = (l / 2, p / 2);
    let restricted = covar
        .slice(s![half_l - acc_l..half_l + acc_l, half_p - acc_p..half_p + acc_p])
        .to_owned();
    let surface = oversample_real(&restricted, ovs_factor, ovs_factor)?;
    let (off_l, off_p, peak) = argmax(&surface);
    let factor = ovs_factor as f64;

    Ok(CorrelationResult {
        coherence: peak.clamp(0.0, 1.0),
        offset_l: off_l as f64 / factor - acc_l as f64,
        offset_p: off_p as f64 / factor - acc_p as f64,
    })
}

/// Space-domain coherence of the central slave part slid over the master.
///
/// The mask is the slave without an `acc_l`/`acc_p` border; it is compared
/// against `2*acc_l x 2*acc_p` master positions.
pub fn coherencespace(
    acc_l: usize,
    acc_p: usize,
    ovs_factor: usize,
    master: &ComplexMatrix,
    slave: &ComplexMatrix,
) -> SarResult<CorrelationResult> {
    check_same_shape(master, slave)?;
    check_ovs(ovs_factor)?;
    if !acc_l.is_power_of_two() || !acc_p.is_power_of_two() {
        return Err(SarError::InvalidArgument(format!(
            "Search window {}x{} must be powers of two",
            acc_l, acc_p
        )));
    }
    let (l, p) = master.dim();
    if l < 2 * acc_l + 4 || p < 2 * acc_p + 4 {
        return Err(SarError::InvalidArgument(format!(
            "Tile {}x{} leaves a mask smaller than 4x4 for search window {}x{}",
            l, p, acc_l, acc_p
        )));
    }
    let (mask_l, mask_p) = (l - 2 * acc_l, p - 2 * acc_p);

    let mag_m = demeaned_magnitude(master);
    let mag_s = demeaned_magnitude(slave);
    let mask = mag_s.slice(s![acc_l..acc_l + mask_l, acc_p..acc_p + mask_p]);
    let norm_mask: f64 = mask.iter().map(|v| v * v).sum();
    if norm_mask <= 0.0 {
        return Err(SarError::InvalidArgument("Slave mask has zero variance".to_string()));
    }

    let mut coher = RealMatrix::zeros((2 * acc_l, 2 * acc_p));
    for i in 0..2 * acc_l {
        for j in 0..2 * acc_p {
            let window = mag_m.slice(s![i..i + mask_l, j..j + mask_p]);
            let mut sum = 0.0;
            let mut power = 0.0;
            for (&m, &s) in window.iter().zip(mask.iter()) {
                sum += m * s;
                power += m * m;
            }
            if power > 0.0 {
                coher[[i, j]] = sum / (power * norm_mask).sqrt();
            }
        }
    }

    let surface = oversample_real(&coher, ovs_factor, ovs_factor)?;
    let (off_l, off_p, peak) = argmax(&surface);
    let factor = ovs_factor as f64;
    Ok(CorrelationResult {
        coherence: peak.clamp(0.0, 1.0),
        offset_l: acc_l as f64 - off_l as f64 / factor,
        offset_p: acc_p as f64 - off_p as f64 / factor,
    })
}
