//! Interferometric phase filtering
//!
//! Block-processed frequency-domain filters for complex interferograms:
//! the adaptive Goldstein filter, a fixed spectral filter and a spatial
//! convolution applied through its spectrum. Blocks overlap; only their
//! interiors are written to the output.

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

use super::linalg::{dot_mult_in_place, magnitude};
use super::spectral::{fft2d, frequency_axis, ifft2d, ifftshift};
use super::weight_windows::hamming;
use crate::types::{ComplexMatrix, RealMatrix, SarComplex, SarError, SarResult};

/// Spectral peaks below this are treated as empty blocks
const MIN_PEAK: f64 = 1e-20;

/// Placement of one block along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Input range read into the block
    pub data_lo: usize,
    pub data_hi: usize,
    /// Part of the block that is written
    pub block_lo: usize,
    pub block_hi: usize,
    /// Where that part lands in the output
    pub out_lo: usize,
    pub out_hi: usize,
}

/// Overlapping block layout along an axis of `total` samples.
///
/// Consecutive blocks advance by `block - 2 * overlap`. With `keep_edges`
/// the first and last blocks also write their outer overlap, so the output
/// is covered completely; otherwise a band of `overlap` samples stays
/// unwritten at both ends. The last block is aligned to the end of the
/// axis.
pub fn block_spans(total: usize, block: usize, overlap: usize, keep_edges: bool) -> SarResult<Vec<BlockSpan>> {
    if block == 0 || total < block {
        return Err(SarError::InvalidArgument(format!(
            "Block size {} does not fit {} samples",
            block, total
        )));
    }
    if 2 * overlap >= block {
        return Err(SarError::InvalidArgument(format!(
            "Overlap {} leaves no interior in blocks of {}",
            overlap, block
        )));
    }

    let step = block - 2 * overlap;
    let edge = if keep_edges { 0 } else { overlap };
    let mut spans = Vec::new();
    let mut data_lo = 0;
    let mut out_lo = edge;
    loop {
        let data_hi = data_lo + block - 1;
        if data_hi >= total - 1 {
            let last_lo = total - block;
            spans.push(BlockSpan {
                data_lo: last_lo,
                data_hi: total - 1,
                block_lo: out_lo - last_lo,
                block_hi: block - 1 - edge,
                out_lo,
                out_hi: total - 1 - edge,
            });
            break;
        }
        let out_hi = data_hi - overlap;
        spans.push(BlockSpan {
            data_lo,
            data_hi,
            block_lo: out_lo - data_lo,
            block_hi: block - 1 - overlap,
            out_lo,
            out_hi,
        });
        out_lo = out_hi + 1;
        data_lo += step;
    }
    Ok(spans)
}

fn check_kernel_1d(kernel: &[f64], size: usize) -> SarResult<()> {
    if kernel.is_empty() || kernel.len() % 2 == 0 || kernel.len() > size {
        return Err(SarError::InvalidArgument(format!(
            "Kernel of length {} must be odd and at most {}",
            kernel.len(),
            size
        )));
    }
    Ok(())
}

/// Spatial `size x size` kernel: outer product of `kernel_1d` centred on
/// sample 0 with wraparound
pub fn rect_kernel(size: usize, kernel_1d: &[f64]) -> SarResult<RealMatrix> {
    check_kernel_1d(kernel_1d, size)?;
    let half = (kernel_1d.len() / 2) as i64;
    let mut wrapped = Array1::zeros(size);
    for (k, &v) in kernel_1d.iter().enumerate() {
        let index = (k as i64 - half).rem_euclid(size as i64) as usize;
        wrapped[index] = v;
    }
    Ok(Array2::from_shape_fn((size, size), |(i, j)| wrapped[i] * wrapped[j]))
}

/// Spectrum of [`rect_kernel`], as used to smooth Goldstein amplitudes
pub fn smoothing_kernel(kernel_1d: &[f64], size: usize) -> SarResult<ComplexMatrix> {
    let mut kernel = rect_kernel(size, kernel_1d)?.mapv(|v| SarComplex::new(v, 0.0));
    fft2d(&mut kernel);
    Ok(kernel)
}

/// Separable Hamming x Hamming frequency response, zero frequency at the centre
pub fn hamming_kernel(size: usize, alpha: f64) -> SarResult<RealMatrix> {
    let window = hamming(&frequency_axis(size, 1.0), 1.0, 1.0, alpha)?;
    Ok(Array2::from_shape_fn((size, size), |(i, j)| window[i] * window[j]))
}

/// Centred kernel to FFT order, scaled
pub fn arrange_kernel_2d(kernel: &RealMatrix, scale: f64) -> ComplexMatrix {
    let mut arranged = kernel.mapv(|v| SarComplex::new(v * scale, 0.0));
    ifftshift(&mut arranged);
    arranged
}

/// Goldstein filtering of one block in place; false when the block is empty
fn goldstein_block(block: &mut ComplexMatrix, alpha: f64, smoothing: Option<&ComplexMatrix>) -> bool {
    fft2d(block);
    let amplitude = match smoothing {
        Some(kernel) => {
            let mut amp = magnitude(block).mapv(|v| SarComplex::new(v, 0.0));
            fft2d(&mut amp);
            amp.zip_mut_with(kernel, |a, k| *a *= k.conj());
            ifft2d(&mut amp);
            amp.mapv(|c| c.re)
        }
        None => magnitude(block),
    };

    let peak = amplitude.fold(0.0_f64, |m, &v| m.max(v));
    let filtered = peak > MIN_PEAK;
    if filtered {
        block.zip_mut_with(&amplitude, |v, &a| *v *= (a.max(0.0) / peak).powf(alpha));
    }
    ifft2d(block);
    filtered
}

fn check_alpha(alpha: f64) -> SarResult<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(SarError::InvalidArgument(format!("Goldstein alpha must be in [0, 1], got {}", alpha)));
    }
    Ok(())
}

/// Goldstein adaptive filter with square blocks as tall as the input.
///
/// The spectrum of each block is weighted by its (optionally smoothed)
/// normalized amplitude raised to `alpha`; `alpha = 0` returns the input.
pub fn goldstein(
    data: &ComplexMatrix,
    alpha: f64,
    overlap: usize,
    smooth_kernel: Option<&[f64]>,
) -> SarResult<ComplexMatrix> {
    check_alpha(alpha)?;
    let (size, pixels) = data.dim();
    let spans = block_spans(pixels, size, overlap, true)?;
    let smoothing = smooth_kernel.map(|k| smoothing_kernel(k, size)).transpose()?;
    log::debug!(
        "Goldstein filter: {}x{} input, {} blocks, alpha {}, overlap {}",
        size,
        pixels,
        spans.len(),
        alpha,
        overlap
    );

    let mut output = ComplexMatrix::zeros(data.dim());
    let mut empty = 0;
    for span in &spans {
        let mut block = data.slice(s![.., span.data_lo..=span.data_hi]).to_owned();
        if !goldstein_block(&mut block, alpha, smoothing.as_ref()) {
            empty += 1;
        }
        output
            .slice_mut(s![.., span.out_lo..=span.out_hi])
            .assign(&block.slice(s![.., span.block_lo..=span.block_hi]));
    }
    if empty > 0 {
        log::warn!("{} Goldstein blocks without signal passed through unfiltered", empty);
    }
    Ok(output)
}

/// Goldstein filter with `block_size` square blocks tiled along both axes
pub fn goldstein_2d(
    data: &ComplexMatrix,
    block_size: usize,
    overlap: usize,
    smooth_kernel: Option<&[f64]>,
    alpha: f64,
) -> SarResult<ComplexMatrix> {
    check_alpha(alpha)?;
    let (lines, pixels) = data.dim();
    let line_spans = block_spans(lines, block_size, overlap, true)?;
    let pixel_spans = block_spans(pixels, block_size, overlap, true)?;
    let smoothing = smooth_kernel.map(|k| smoothing_kernel(k, block_size)).transpose()?;
    log::debug!(
        "Goldstein 2-D filter: {}x{} input, {}x{} blocks of {}",
        lines,
        pixels,
        line_spans.len(),
        pixel_spans.len(),
        block_size
    );

    let mut output = ComplexMatrix::zeros(data.dim());
    let mut empty = 0;
    for ls in &line_spans {
        for ps in &pixel_spans {
            let mut block = data
                .slice(s![ls.data_lo..=ls.data_hi, ps.data_lo..=ps.data_hi])
                .to_owned();
            if !goldstein_block(&mut block, alpha, smoothing.as_ref()) {
                empty += 1;
            }
            output
                .slice_mut(s![ls.out_lo..=ls.out_hi, ps.out_lo..=ps.out_hi])
                .assign(&block.slice(s![ls.block_lo..=ls.block_hi, ps.block_lo..=ps.block_hi]));
        }
    }
    if empty > 0 {
        log::warn!("{} Goldstein blocks without signal passed through unfiltered", empty);
    }
    Ok(output)
}

/// Multiply the spectrum of each block by `response` (FFT order)
fn filter_blocks(data: &ComplexMatrix, response: &ComplexMatrix, overlap: usize, keep_edges: bool) -> SarResult<ComplexMatrix> {
    let (size, pixels) = data.dim();
    if response.dim() != (size, size) {
        return Err(SarError::InvalidArgument(format!(
            "Kernel {:?} must be {}x{} to match the input lines",
            response.dim(),
            size,
            size
        )));
    }
    let spans = block_spans(pixels, size, overlap, keep_edges)?;
    let mut output = ComplexMatrix::zeros(data.dim());
    for span in &spans {
        let mut block = data.slice(s![.., span.data_lo..=span.data_hi]).to_owned();
        fft2d(&mut block);
        dot_mult_in_place(&mut block, response)?;
        ifft2d(&mut block);
        output
            .slice_mut(s![.., span.out_lo..=span.out_hi])
            .assign(&block.slice(s![.., span.block_lo..=span.block_hi]));
    }
    Ok(output)
}

/// Fixed spectral filter with a centred frequency response as tall as the input
pub fn spectral_filter(data: &ComplexMatrix, kernel: &RealMatrix, overlap: usize) -> SarResult<ComplexMatrix> {
    log::debug!("Spectral filter with {:?} kernel, overlap {}", kernel.dim(), overlap);
    filter_blocks(data, &arrange_kernel_2d(kernel, 1.0), overlap, true)
}

/// Spatial convolution through a precomputed kernel spectrum.
///
/// Bands of `overlap` pixels at the first and last columns are left zero.
pub fn conv_buffer(data: &ComplexMatrix, kernel2d: &ComplexMatrix, overlap: usize) -> SarResult<ComplexMatrix> {
    log::debug!("Convolution filter with {:?} kernel spectrum, overlap {}", kernel2d.dim(), overlap);
    filter_blocks(data, kernel2d, overlap, false)
}

/// Goldstein filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldsteinParams {
    pub alpha: f64,
    pub overlap: usize,
    /// Block size of the 2-D variant
    pub block_size: usize,
    /// Amplitude smoothing kernel; empty for none
    pub smoothing: Vec<f64>,
}

impl Default for GoldsteinParams {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            overlap: 8,
            block_size: 32,
            smoothing: vec![1.0 / 3.0; 3],
        }
    }
}

/// Phase filter strategy
#[derive(Debug, Clone)]
pub enum PhaseFilterMethod {
    /// Goldstein with blocks as tall as the input
    Goldstein {
        alpha: f64,
        overlap: usize,
        smoothing: Option<Vec<f64>>,
    },
    /// Goldstein with square blocks tiled in both directions
    Goldstein2d {
        alpha: f64,
        block_size: usize,
        overlap: usize,
        smoothing: Option<Vec<f64>>,
    },
    /// Centred frequency response
    Spectral { kernel: RealMatrix, overlap: usize },
    /// Kernel spectrum of a spatial convolution
    Convolution { kernel: ComplexMatrix, overlap: usize },
}

impl PhaseFilterMethod {
    /// 2-D Goldstein from configuration
    pub fn goldstein(params: &GoldsteinParams) -> Self {
        PhaseFilterMethod::Goldstein2d {
            alpha: params.alpha,
            block_size: params.block_size,
            overlap: params.overlap,
            smoothing: if params.smoothing.is_empty() { None } else { Some(params.smoothing.clone()) },
        }
    }
}

/// Phase filter with its strategy fixed at construction
#[derive(Debug, Clone)]
pub struct PhaseFilter {
    method: PhaseFilterMethod,
}

impl PhaseFilter {
    pub fn new(method: PhaseFilterMethod) -> SarResult<Self> {
        match &method {
            PhaseFilterMethod::Goldstein { alpha, smoothing, .. } => {
                check_alpha(*alpha)?;
                if let Some(k) = smoothing {
                    check_kernel_1d(k, usize::MAX)?;
                }
            }
            PhaseFilterMethod::Goldstein2d { alpha, block_size, overlap, smoothing } => {
                check_alpha(*alpha)?;
                if 2 * overlap >= *block_size {
                    return Err(SarError::InvalidArgument(format!(
                        "Overlap {} leaves no interior in blocks of {}",
                        overlap, block_size
                    )));
                }
                if let Some(k) = smoothing {
                    check_kernel_1d(k, *block_size)?;
                }
            }
            PhaseFilterMethod::Spectral { kernel, .. } if kernel.nrows() != kernel.ncols() => {
                return Err(SarError::InvalidArgument("Spectral kernel must be square".to_string()));
            }
            PhaseFilterMethod::Convolution { kernel, .. } if kernel.nrows() != kernel.ncols() => {
                return Err(SarError::InvalidArgument("Convolution kernel must be square".to_string()));
            }
            _ => {}
        }
        Ok(Self { method })
    }

    pub fn method(&self) -> &PhaseFilterMethod {
        &self.method
    }

    pub fn apply(&self, data: &ComplexMatrix) -> SarResult<ComplexMatrix> {
        log::info!("Phase filtering {}x{} interferogram", data.nrows(), data.ncols());
        match &self.method {
            PhaseFilterMethod::Goldstein { alpha, overlap, smoothing } => {
                goldstein(data, *alpha, *overlap, smoothing.as_deref())
            }
            PhaseFilterMethod::Goldstein2d { alpha, block_size, overlap, smoothing } => {
                goldstein_2d(data, *block_size, *overlap, smoothing.as_deref(), *alpha)
            }
            PhaseFilterMethod::Spectral { kernel, overlap } => spectral_filter(data, kernel, *overlap),
            PhaseFilterMethod::Convolution { kernel, overlap } => conv_buffer(data, kernel, *overlap),
        }
    }
}
