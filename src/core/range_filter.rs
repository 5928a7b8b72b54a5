//! Range spectral filtering
//!
//! Different incidence angles shift the master and slave range spectra
//! relative to each other. The shift shows up as the dominant fringe
//! frequency of the interferogram; each line is filtered to the common band
//! found from a walking mean of the interferogram power spectrum.

use ndarray::{s, Array1, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::linalg::{intensity, mirror};
use super::spectral::{fft_axis, frequency_axis, ifft_axis, ifftshift_vec, oversample};
use super::weight_windows::{hamming, inverse_hamming, rect, FilterState, RECT_ALPHA};
use crate::types::{ComplexMatrix, RealMatrix, SarError, SarResult, SlcImage};

/// Range filter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeFilterParams {
    /// Lines in the walking mean of the power spectrum (odd)
    pub nl_mean: usize,
    /// Lines with a lower spectral peak SNR reuse the previous shift
    pub snr_threshold: f64,
    /// Hamming alpha; values at or above 0.9999 select a rectangular window
    pub alpha_hamming: f64,
    /// Range oversampling before the interferogram is formed (power of two)
    pub ovs_factor: usize,
    /// De-weight the power spectrum by the expected overlap of the bands
    pub do_weight_correl: bool,
}

impl Default for RangeFilterParams {
    fn default() -> Self {
        Self {
            nl_mean: 15,
            snr_threshold: 5.0,
            alpha_hamming: 0.75,
            ovs_factor: 1,
            do_weight_correl: false,
        }
    }
}

/// Summary of a range filter run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFilterStats {
    /// Mean spectral shift in bins
    pub mean_shift: f64,
    /// Mean peak SNR over lines with a finite SNR
    pub mean_snr: f64,
    /// Share of lines (percent) filtered with a previous shift
    pub percent_not_filtered: f64,
}

/// Warn when a master and slave rate differ; the master's is used. Returns
/// whether they differ.
fn warn_on_mismatch(what: &str, master: f64, slave: f64) -> bool {
    let differ = (master - slave).abs() > 1e-6 * master.abs();
    if differ {
        log::warn!("Master and slave {} differ ({} vs {} Hz), using master", what, master, slave);
    }
    differ
}

/// Joint range filter of a master/slave tile pair
pub struct RangeFilter {
    params: RangeFilterParams,
    rsr: f64,
    rbw: f64,
    master: ComplexMatrix,
    slave: ComplexMatrix,
    state: FilterState,
    filter_master: Option<RealMatrix>,
    filter_slave: Option<RealMatrix>,
    stats: Option<RangeFilterStats>,
}

impl RangeFilter {
    /// Filter for a tile pair using the master's range sampling rate and bandwidth
    pub fn new(
        master_image: &SlcImage,
        slave_image: &SlcImage,
        master: ComplexMatrix,
        slave: ComplexMatrix,
        params: RangeFilterParams,
    ) -> SarResult<Self> {
        master_image.validate()?;
        slave_image.validate()?;
        warn_on_mismatch("range sampling rates", master_image.range_sampling_rate, slave_image.range_sampling_rate);
        warn_on_mismatch("range bandwidths", master_image.range_bandwidth, slave_image.range_bandwidth);
        Ok(Self::from_rates(
            master_image.range_sampling_rate,
            master_image.range_bandwidth,
            master,
            slave,
            params,
        ))
    }

    /// Filter for a tile pair with explicit sampling rate and bandwidth [Hz]
    pub fn from_rates(
        rsr: f64,
        rbw: f64,
        master: ComplexMatrix,
        slave: ComplexMatrix,
        params: RangeFilterParams,
    ) -> Self {
        Self {
            params,
            rsr,
            rbw,
            master,
            slave,
            state: FilterState::Uninitialized,
            filter_master: None,
            filter_slave: None,
            stats: None,
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn stats(&self) -> Option<RangeFilterStats> {
        self.stats
    }

    pub fn master(&self) -> &ComplexMatrix {
        &self.master
    }

    pub fn slave(&self) -> &ComplexMatrix {
        &self.slave
    }

    /// Filtered (master, slave)
    pub fn into_data(self) -> (ComplexMatrix, ComplexMatrix) {
        (self.master, self.slave)
    }

    pub fn define_parameters(&mut self) -> SarResult<()> {
        self.state.require(FilterState::Uninitialized, "define_parameters")?;
        let p = &self.params;
        let (lines, pixels) = self.master.dim();

        if self.master.dim() != self.slave.dim() {
            return Err(SarError::InvalidArgument(format!(
                "Master {:?} and slave {:?} tiles differ in size",
                self.master.dim(),
                self.slave.dim()
            )));
        }
        if p.nl_mean % 2 == 0 || p.nl_mean > lines {
            return Err(SarError::InvalidArgument(format!(
                "Walking mean of {} lines must be odd and fit {} lines",
                p.nl_mean, lines
            )));
        }
        if !pixels.is_power_of_two() || pixels < 2 {
            return Err(SarError::InvalidArgument(format!(
                "Range FFT length must be a power of two, tile has {} pixels",
                pixels
            )));
        }
        if p.ovs_factor == 0 || !p.ovs_factor.is_power_of_two() {
            return Err(SarError::InvalidArgument(format!(
                "Oversampling factor must be a power of two >= 1, got {}",
                p.ovs_factor
            )));
        }
        if !(p.alpha_hamming > 0.0 && p.alpha_hamming <= 1.0) {
            return Err(SarError::InvalidArgument(format!(
                "Hamming alpha must be in (0, 1], got {}",
                p.alpha_hamming
            )));
        }
        if !(self.rbw > 0.0 && self.rbw <= self.rsr) {
            return Err(SarError::InvalidArgument(format!(
                "Range bandwidth {} must be positive and not exceed sampling rate {}",
                self.rbw, self.rsr
            )));
        }

        log::debug!(
            "Range filter: RSR {:.0} Hz, RBW {:.0} Hz, alpha {}, walking mean {} lines, oversampling {}",
            self.rsr,
            self.rbw,
            p.alpha_hamming,
            p.nl_mean,
            p.ovs_factor
        );
        self.state = FilterState::Parameterized;
        Ok(())
    }

    /// Power spectrum of the interferogram along range, one row per line
    fn interferogram_power(&self) -> SarResult<RealMatrix> {
        let ovs = self.params.ovs_factor;
        let conj_product = |m: &ComplexMatrix, s: &ComplexMatrix| {
            Zip::from(m).and(s).map_collect(|a, b| a * b.conj())
        };
        let mut ifg = if ovs > 1 {
            conj_product(&oversample(&self.master, 1, ovs)?, &oversample(&self.slave, 1, ovs)?)
        } else {
            conj_product(&self.master, &self.slave)
        };
        fft_axis(&mut ifg, Axis(1));
        let mut power = intensity(&ifg);

        if self.params.do_weight_correl {
            let n = power.ncols();
            let index_no_peak = (1.0 - self.rbw / self.rsr) * n as f64;
            for (j, mut column) in power.columns_mut().into_iter().enumerate() {
                let n_pnts = (n as f64 - j as f64).abs();
                let weight = if n_pnts < index_no_peak { (n * n) as f64 } else { n_pnts * n_pnts };
                column.mapv_inplace(|v| v / weight);
            }
        }
        Ok(power)
    }

    /// Response for a spectral shift of `shift` bins, in FFT order
    fn line_response(&self, freq: &Array1<f64>, shift: usize, inverse: &Array1<f64>) -> SarResult<Array1<f64>> {
        let delta_f = self.rsr / freq.len() as f64;
        let band = self.rbw - shift as f64 * delta_f;
        let centred = freq.mapv(|f| f - 0.5 * shift as f64 * delta_f);
        let mut response = if self.params.alpha_hamming >= RECT_ALPHA {
            rect(&(centred / band))
        } else {
            hamming(&centred, band, self.rsr, self.params.alpha_hamming)? * inverse
        };
        ifftshift_vec(&mut response);
        Ok(response)
    }

    /// Estimate the spectral shift per line and build both filters
    pub fn define_filter(&mut self) -> SarResult<()> {
        self.state.require(FilterState::Parameterized, "define_filter")?;
        let (lines, pixels) = self.master.dim();
        let nl_mean = self.params.nl_mean;
        let alpha = self.params.alpha_hamming;

        let freq = frequency_axis(pixels, self.rsr);
        let delta_f = self.rsr / pixels as f64;
        let inverse = if alpha < RECT_ALPHA {
            inverse_hamming(&freq, self.rbw, self.rsr, alpha)?
        } else {
            Array1::ones(pixels)
        };

        let power = self.interferogram_power()?;
        let fft_length = power.ncols();
        let mut walking_power = power.slice(s![0..nl_mean, ..]).sum_axis(Axis(0));

        let mut filter_master = RealMatrix::ones((lines, pixels));
        let mut filter_slave = RealMatrix::ones((lines, pixels));
        let first_line = (nl_mean - 1) / 2;
        let last_line = first_line + lines - nl_mean;

        let mut last_shift = 0usize;
        let mut last_negative = false;
        let mut not_filtered = 0usize;
        let mut sum_shift = 0.0;
        let mut sum_snr = 0.0;
        let mut n_snr = 0usize;

        for out_line in first_line..=last_line {
            let total: f64 = walking_power.sum();
            let (peak_bin, peak) = walking_power
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
            let snr = if total - peak > 0.0 {
                fft_length as f64 * peak / (total - peak)
            } else {
                f64::INFINITY
            };
            let (mut shift, mut negative) = if peak_bin > fft_length / 2 {
                (fft_length - peak_bin, true)
            } else {
                (peak_bin, false)
            };

            let usable = snr >= self.params.snr_threshold && (shift as f64) * delta_f < self.rbw;
            if usable {
                last_shift = shift;
                last_negative = negative;
            } else {
                shift = last_shift;
                negative = last_negative;
                not_filtered += 1;
            }
            sum_shift += shift as f64;
            if snr.is_finite() {
                sum_snr += snr;
                n_snr += 1;
            }

            let response = self.line_response(&freq, shift, &inverse)?;
            let mirrored = mirror(&response);
            let (for_master, for_slave) = if negative { (mirrored, response) } else { (response, mirrored) };
            filter_master.row_mut(out_line).assign(&for_master);
            filter_slave.row_mut(out_line).assign(&for_slave);

            if out_line < last_line {
                walking_power -= &power.row(out_line - first_line);
                walking_power += &power.row(out_line + first_line + 1);
            }
        }

        let processed = (last_line - first_line + 1) as f64;
        let stats = RangeFilterStats {
            mean_shift: sum_shift / processed,
            mean_snr: if n_snr > 0 { sum_snr / n_snr as f64 } else { f64::INFINITY },
            percent_not_filtered: 100.0 * not_filtered as f64 / processed,
        };
        log::info!(
            "Range filter: mean shift {:.2} bins, mean SNR {:.2}, {:.1}% of lines not filtered",
            stats.mean_shift,
            stats.mean_snr,
            stats.percent_not_filtered
        );
        if stats.percent_not_filtered > 60.0 {
            log::warn!(
                "{:.1}% of lines below SNR threshold {}",
                stats.percent_not_filtered,
                self.params.snr_threshold
            );
        }

        self.filter_master = Some(filter_master);
        self.filter_slave = Some(filter_slave);
        self.stats = Some(stats);
        self.state = FilterState::FilterDefined;
        Ok(())
    }

    /// Apply both filters along range
    pub fn apply_filter(&mut self) -> SarResult<()> {
        self.state.require(FilterState::FilterDefined, "apply_filter")?;
        let (filter_master, filter_slave) = match (&self.filter_master, &self.filter_slave) {
            (Some(m), Some(s)) => (m, s),
            _ => return Err(SarError::Processing("Range filter not defined".to_string())),
        };

        for (data, filter) in [(&mut self.master, filter_master), (&mut self.slave, filter_slave)] {
            fft_axis(data, Axis(1));
            data.zip_mut_with(filter, |v, &w| *v *= w);
            ifft_axis(data, Axis(1));
        }
        self.state = FilterState::Applied;
        Ok(())
    }

    /// Run the whole lifecycle
    pub fn run(&mut self) -> SarResult<RangeFilterStats> {
        self.define_parameters()?;
        self.define_filter()?;
        self.apply_filter()?;
        self.stats
            .ok_or_else(|| SarError::Processing("Range filter statistics missing".to_string()))
    }

    /// Filter a master/slave block pair in place
    #[allow(clippy::too_many_arguments)]
    pub fn filter_block(
        master: &mut ComplexMatrix,
        slave: &mut ComplexMatrix,
        nl_mean: usize,
        snr_threshold: f64,
        rsr: f64,
        rbw: f64,
        alpha_hamming: f64,
        ovs_factor: usize,
        do_weight_correl: bool,
    ) -> SarResult<RangeFilterStats> {
        let params = RangeFilterParams {
            nl_mean,
            snr_threshold,
            alpha_hamming,
            ovs_factor,
            do_weight_correl,
        };
        let mut filter = Self::from_rates(rsr, rbw, std::mem::take(master), std::mem::take(slave), params);
        let outcome = filter.run();
        let (m, s) = filter.into_data();
        *master = m;
        *slave = s;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SarComplex, Window};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn fringe_pair(lines: usize, pixels: usize, fringe_bin: f64) -> (ComplexMatrix, ComplexMatrix) {
        let n = pixels as f64;
        let master = Array2::from_shape_fn((lines, pixels), |(i, j)| {
            let x = j as f64;
            SarComplex::from_polar(1.0, 2.0 * PI * (3.0 + i as f64 % 4.0) * x / n)
                + SarComplex::from_polar(0.5, -2.0 * PI * 7.0 * x / n)
        });
        let slave = Array2::from_shape_fn((lines, pixels), |(i, j)| {
            master[[i, j]] * SarComplex::from_polar(1.0, -2.0 * PI * fringe_bin * j as f64 / n)
        });
        (master, slave)
    }

    #[test]
    fn test_rect_full_band_identity() {
        let (master, slave) = fringe_pair(12, 32, 0.0);
        let (mut m, mut s) = (master.clone(), slave.clone());
        let stats = RangeFilter::filter_block(&mut m, &mut s, 5, 5.0, 1.0e7, 1.0e7, 1.0, 1, false).unwrap();
        assert_eq!(stats.mean_shift, 0.0);
        for (a, b) in m.iter().zip(master.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-10);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-10);
        }
        for (a, b) in s.iter().zip(slave.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_shift_estimate() {
        let (mut m, mut s) = fringe_pair(9, 64, 5.0);
        let stats = RangeFilter::filter_block(&mut m, &mut s, 3, 5.0, 1.6e7, 1.2e7, 0.75, 1, false).unwrap();
        assert_eq!(stats.mean_shift, 5.0);
        assert_eq!(stats.percent_not_filtered, 0.0);
    }

    #[test]
    fn test_weighted_power_spectrum_keeps_peak() {
        let (master, slave) = fringe_pair(9, 64, 5.0);
        let params = |weighted| RangeFilterParams {
            nl_mean: 3,
            snr_threshold: 5.0,
            alpha_hamming: 0.75,
            ovs_factor: 1,
            do_weight_correl: weighted,
        };
        let mut plain = RangeFilter::from_rates(1.6e7, 1.2e7, master.clone(), slave.clone(), params(false));
        plain.define_parameters().unwrap();
        let plain_power = plain.interferogram_power().unwrap();
        plain.define_filter().unwrap();

        let mut weighted = RangeFilter::from_rates(1.6e7, 1.2e7, master, slave, params(true));
        weighted.define_parameters().unwrap();
        let power = weighted.interferogram_power().unwrap();
        // bins with 64 - bin below 16 are divided by 64^2, the others by (64 - bin)^2
        assert_abs_diff_eq!(power[[0, 5]] * 59.0f64.powi(2), plain_power[[0, 5]], epsilon = 1e-9 * plain_power[[0, 5]]);
        assert_abs_diff_eq!(power[[0, 59]] * 64.0f64.powi(2), plain_power[[0, 59]], epsilon = 1e-9 * plain_power[[0, 59]]);

        weighted.define_filter().unwrap();
        let stats = weighted.stats().unwrap();
        assert_eq!(stats.mean_shift, plain.stats().unwrap().mean_shift);
        assert_eq!(stats.mean_shift, 5.0);
        assert_eq!(stats.percent_not_filtered, 0.0);

        let filter_master = weighted.filter_master.clone().unwrap();
        weighted.apply_filter().unwrap();
        let mut spectrum = weighted.master().clone();
        fft_axis(&mut spectrum, Axis(1));
        for line in 1..8 {
            let stop_band: Vec<usize> = (0..64).filter(|&k| filter_master[[line, k]] == 0.0).collect();
            assert!(!stop_band.is_empty());
            for k in stop_band {
                assert!(spectrum[[line, k]].norm() < 1e-9);
            }
        }
    }

    #[test]
    fn test_rate_mismatch_uses_master() {
        assert!(warn_on_mismatch("range sampling rates", 1.6e7, 1.8e7));
        assert!(!warn_on_mismatch("range bandwidths", 1.2e7, 1.2e7));

        let (m, s) = fringe_pair(5, 32, 0.0);
        let master = SlcImage::new(1000.0, 800.0, 1.6e7, 1.2e7, Window::from_shape(5, 32));
        let slave = SlcImage::new(1000.0, 800.0, 1.8e7, 1.2e7, Window::from_shape(5, 32));
        let params = RangeFilterParams { nl_mean: 5, ..Default::default() };
        let filter = RangeFilter::new(&master, &slave, m, s, params).unwrap();
        assert_eq!(filter.rsr, 1.6e7);
        assert_eq!(filter.rbw, 1.2e7);
    }

    #[test]
    fn test_negative_shift_swaps_filters() {
        let (master, slave) = fringe_pair(5, 32, -4.0);
        let mut filter = RangeFilter::from_rates(1.6e7, 1.2e7, master, slave, RangeFilterParams { nl_mean: 5, ..Default::default() });
        filter.define_parameters().unwrap();
        filter.define_filter().unwrap();
        assert_eq!(filter.stats().unwrap().mean_shift, 4.0);
        let fm = filter.filter_master.as_ref().unwrap();
        let fs = filter.filter_slave.as_ref().unwrap();
        // slave keeps the upper part of the band, master the mirrored one
        assert!(fs[[2, 11]] > 0.0);
        assert_eq!(fm[[2, 11]], 0.0);
        for k in 1..32 {
            assert_eq!(fm[[2, k]], fs[[2, 32 - k]]);
        }
    }

    #[test]
    fn test_validation() {
        let (m, s) = fringe_pair(8, 32, 0.0);
        let mut even = RangeFilter::from_rates(1.0e7, 8.0e6, m.clone(), s.clone(), RangeFilterParams { nl_mean: 4, ..Default::default() });
        assert!(matches!(even.run(), Err(SarError::InvalidArgument(_))));

        let (m30, s30) = fringe_pair(8, 30, 0.0);
        let mut not_pow2 = RangeFilter::from_rates(1.0e7, 8.0e6, m30, s30, RangeFilterParams { nl_mean: 5, ..Default::default() });
        assert!(not_pow2.run().is_err());

        let mut ovs3 = RangeFilter::from_rates(1.0e7, 8.0e6, m, s, RangeFilterParams { nl_mean: 5, ovs_factor: 3, ..Default::default() });
        assert!(ovs3.run().is_err());
    }

    #[test]
    fn test_filter_block_restores_data_on_error() {
        let (mut m, mut s) = fringe_pair(4, 32, 0.0);
        let original = m.clone();
        assert!(RangeFilter::filter_block(&mut m, &mut s, 7, 5.0, 1.0e7, 8.0e6, 0.75, 1, false).is_err());
        assert_eq!(m, original);
    }
}
