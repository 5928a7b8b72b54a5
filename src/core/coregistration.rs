//! Coarse and fine offset estimation over distributed correlation windows

use serde::{Deserialize, Serialize};

use super::correlation::{crosscorrelate, CorrelationParams, CorrelationResult};
use super::linalg::extract;
use super::polynomial::OffsetObservation;
use crate::types::{ComplexMatrix, SarError, SarResult, Window};

/// Combined coarse offset and the per-window estimates it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoarseOffsetEstimate {
    pub offset_l: i64,
    pub offset_p: i64,
    pub windows: Vec<CorrelationResult>,
}

/// Spread `n` points evenly over `window` on a near-square grid.
///
/// Points are (line, pixel) centres, ordered line by line.
pub fn distribute_points(n: usize, window: &Window) -> Vec<(i64, i64)> {
    if n == 0 {
        return Vec::new();
    }
    let lines = window.lines() as f64;
    let pixels = window.pixels() as f64;
    let ratio = lines / pixels;
    let mut n_l = ((n as f64 * ratio).sqrt().round() as usize).clamp(1, n);
    let mut n_p = (n + n_l - 1) / n_l;
    // a thin window can not host more grid lines than it has
    n_l = n_l.min(window.lines());
    n_p = n_p.min(window.pixels());

    let step_l = lines / n_l as f64;
    let step_p = pixels / n_p as f64;
    let mut points = Vec::with_capacity(n_l * n_p);
    for i in 0..n_l {
        for j in 0..n_p {
            if points.len() == n {
                break;
            }
            let line = window.line_lo + (step_l * (i as f64 + 0.5)) as i64;
            let pixel = window.pix_lo + (step_p * (j as f64 + 0.5)) as i64;
            points.push((line, pixel));
        }
    }
    points
}

/// Chip window of `lines x pixels` centred on a point
fn chip_at(center: (i64, i64), lines: usize, pixels: usize) -> Window {
    Window::with_origin(
        center.0 - (lines / 2) as i64,
        center.1 - (pixels / 2) as i64,
        lines,
        pixels,
    )
}

/// Correlate master and slave chips at distributed points.
///
/// `master`/`slave` hold the image data of `master_window`/`slave_window`
/// (image coordinates); the slave chip is displaced by `initial`. Points whose
/// chips are not fully inside both buffers are skipped.
fn correlate_points(
    master: &ComplexMatrix,
    master_window: &Window,
    slave: &ComplexMatrix,
    slave_window: &Window,
    initial: (i64, i64),
    params: &CorrelationParams,
) -> SarResult<Vec<(i64, i64, CorrelationResult)>> {
    if master.dim() != master_window.shape() || slave.dim() != slave_window.shape() {
        return Err(SarError::InvalidArgument(
            "Buffer shapes do not match their image windows".to_string(),
        ));
    }

    let points = distribute_points(params.n_windows, master_window);
    let chips: Vec<(i64, i64, Window, Window)> = points
        .iter()
        .map(|&(line, pixel)| {
            let m_chip = chip_at((line, pixel), params.mask_lines, params.mask_pixels);
            (line, pixel, m_chip, m_chip.translate(initial.0, initial.1))
        })
        .filter(|(_, _, m_chip, s_chip)| master_window.contains(m_chip) && slave_window.contains(s_chip))
        .collect();
    let skipped = points.len() - chips.len();

    let correlate_chip = |&(line, pixel, m_chip, s_chip): &(i64, i64, Window, Window)| -> SarResult<(i64, i64, CorrelationResult)> {
        let m_data = extract(master, m_chip.translate(-master_window.line_lo, -master_window.pix_lo))?;
        let s_data = extract(slave, s_chip.translate(-slave_window.line_lo, -slave_window.pix_lo))?;
        let result = crosscorrelate(&m_data, &s_data, params.ovs_factor, params.acc_l, params.acc_p)?;
        log::trace!(
            "Window at ({}, {}): coherence {:.3}, offset ({:.3}, {:.3})",
            line,
            pixel,
            result.coherence,
            result.offset_l,
            result.offset_p
        );
        Ok((line, pixel, result))
    };

    #[cfg(feature = "parallel")]
    let results: Vec<(i64, i64, CorrelationResult)> = {
        use rayon::prelude::*;
        chips.par_iter().map(correlate_chip).collect::<SarResult<_>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(i64, i64, CorrelationResult)> =
        chips.iter().map(correlate_chip).collect::<SarResult<_>>()?;

    if skipped > 0 {
        log::warn!("{} of {} correlation windows outside the data, skipped", skipped, points.len());
    }
    Ok(results)
}

/// Robust image offset from per-window estimates.
///
/// Windows are ranked by coherence; those at or above the mean coherence
/// vote with their rounded offsets.
pub fn estimate_coarse_offset(results: &[CorrelationResult]) -> SarResult<(i64, i64)> {
    let mut valid: Vec<&CorrelationResult> = results
        .iter()
        .filter(|r| r.coherence.is_finite() && r.offset_l.is_finite() && r.offset_p.is_finite())
        .collect();
    if valid.is_empty() {
        return Err(SarError::InvalidArgument("No valid correlation windows".to_string()));
    }
    valid.sort_by(|a, b| b.coherence.total_cmp(&a.coherence));

    let mean_coherence = valid.iter().map(|r| r.coherence).sum::<f64>() / valid.len() as f64;
    let selected: Vec<&&CorrelationResult> =
        valid.iter().filter(|r| r.coherence >= mean_coherence).collect();

    let n = selected.len() as f64;
    let mean_l = selected.iter().map(|r| r.offset_l.round()).sum::<f64>() / n;
    let mean_p = selected.iter().map(|r| r.offset_p.round()).sum::<f64>() / n;
    let std_l = (selected.iter().map(|r| (r.offset_l.round() - mean_l).powi(2)).sum::<f64>() / n).sqrt();
    let std_p = (selected.iter().map(|r| (r.offset_p.round() - mean_p).powi(2)).sum::<f64>() / n).sqrt();

    log::debug!(
        "Coarse offset from {} of {} windows (coherence threshold {:.3}): ({:.2}, {:.2}), std ({:.2}, {:.2})",
        selected.len(),
        valid.len(),
        mean_coherence,
        mean_l,
        mean_p,
        std_l,
        std_p
    );
    if mean_coherence < 0.2 {
        log::warn!("Mean coherence {:.3} is low, coarse offset may be unreliable", mean_coherence);
    }
    if std_l > 6.0 || std_p > 6.0 {
        log::warn!("Coarse offset spread ({:.2}, {:.2}) exceeds 6 pixels", std_l, std_p);
    }
    if valid.len() < 6 {
        log::warn!("Only {} valid correlation windows", valid.len());
    }

    Ok((mean_l.round() as i64, mean_p.round() as i64))
}

/// Pixel-level offset of the slave from correlation at distributed windows
pub fn coarse_correlate(
    master: &ComplexMatrix,
    master_window: &Window,
    slave: &ComplexMatrix,
    slave_window: &Window,
    initial: (i64, i64),
    params: &CorrelationParams,
) -> SarResult<CoarseOffsetEstimate> {
    log::info!(
        "Coarse correlation with {} windows of {}x{}",
        params.n_windows,
        params.mask_lines,
        params.mask_pixels
    );
    let coarse = CorrelationParams { ovs_factor: 1, ..params.clone() };
    let results = correlate_points(master, master_window, slave, slave_window, initial, &coarse)?;
    let windows: Vec<CorrelationResult> = results
        .into_iter()
        .map(|(_, _, r)| CorrelationResult {
            offset_l: r.offset_l + initial.0 as f64,
            offset_p: r.offset_p + initial.1 as f64,
            ..r
        })
        .collect();
    let (offset_l, offset_p) = estimate_coarse_offset(&windows)?;
    log::info!("Coarse offset: {} lines, {} pixels", offset_l, offset_p);
    Ok(CoarseOffsetEstimate { offset_l, offset_p, windows })
}

/// Sub-pixel offsets at distributed windows, around a known coarse offset
pub fn fine_correlate(
    master: &ComplexMatrix,
    master_window: &Window,
    slave: &ComplexMatrix,
    slave_window: &Window,
    coarse: (i64, i64),
    params: &CorrelationParams,
) -> SarResult<Vec<OffsetObservation>> {
    log::info!(
        "Fine correlation with {} windows, oversampling {}",
        params.n_windows,
        params.ovs_factor
    );
    let results = correlate_points(master, master_window, slave, slave_window, coarse, params)?;
    let observations: Vec<OffsetObservation> = results
        .into_iter()
        .map(|(line, pixel, r)| OffsetObservation {
            line: line as f64,
            pixel: pixel as f64,
            offset_l: r.offset_l + coarse.0 as f64,
            offset_p: r.offset_p + coarse.1 as f64,
            coherence: r.coherence,
        })
        .collect();
    log::info!("Fine correlation produced {} observations", observations.len());
    Ok(observations)
}
