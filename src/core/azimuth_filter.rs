//! Azimuth common-band filtering
//!
//! Master and slave are acquired with slightly different Doppler centroids,
//! so only part of their azimuth spectra overlap. The filter keeps the common
//! band, centred on the mean centroid, and optionally replaces the processor's
//! Hamming weighting with a new one over the reduced band.

use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};

use super::spectral::{fft_axis, frequency_axis, ifft_axis, ifftshift_vec};
use super::weight_windows::{hamming, inverse_hamming, rect, FilterState, RECT_ALPHA};
use crate::types::{ComplexMatrix, RealMatrix, SarError, SarResult, SlcImage, Window};

/// Azimuth filter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzimuthFilterParams {
    /// Hamming alpha; values at or above 0.9999 select a rectangular window
    pub alpha_hamming: f64,
}

impl Default for AzimuthFilterParams {
    fn default() -> Self {
        Self { alpha_hamming: 0.75 }
    }
}

/// How the filter varies over the tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AzimuthFilterMode {
    /// One response for all columns
    Fixed,
    /// One response per column, following the range-dependent Doppler
    Variable,
}

#[derive(Debug, Clone)]
enum FilterResponse {
    Fixed(Array1<f64>),
    Variable(RealMatrix),
}

/// Azimuth filter for one image of an interferometric pair
pub struct AzimuthFilter {
    params: AzimuthFilterParams,
    image: SlcImage,
    partner: SlcImage,
    tile: Window,
    data: ComplexMatrix,
    state: FilterState,
    mode: Option<AzimuthFilterMode>,
    response: Option<FilterResponse>,
}

impl AzimuthFilter {
    /// Filter `data`, covering `tile` of `image`, against its `partner`
    pub fn new(
        image: SlcImage,
        partner: SlcImage,
        tile: Window,
        data: ComplexMatrix,
        params: AzimuthFilterParams,
    ) -> SarResult<Self> {
        if data.dim() != tile.shape() {
            return Err(SarError::InvalidArgument(format!(
                "Tile {} does not match data shape {:?}",
                tile,
                data.dim()
            )));
        }
        Ok(Self {
            params,
            image,
            partner,
            tile,
            data,
            state: FilterState::Uninitialized,
            mode: None,
            response: None,
        })
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn mode(&self) -> Option<AzimuthFilterMode> {
        self.mode
    }

    pub fn data(&self) -> &ComplexMatrix {
        &self.data
    }

    pub fn into_data(self) -> ComplexMatrix {
        self.data
    }

    /// Validate metadata and fix the filter geometry
    pub fn define_parameters(&mut self) -> SarResult<()> {
        self.state.require(FilterState::Uninitialized, "define_parameters")?;
        self.image.validate()?;
        self.partner.validate()?;

        let alpha = self.params.alpha_hamming;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(SarError::InvalidArgument(format!(
                "Hamming alpha must be in (0, 1], got {}",
                alpha
            )));
        }
        if self.data.nrows() < 2 || self.data.nrows() % 2 != 0 {
            return Err(SarError::InvalidArgument(format!(
                "Azimuth FFT length must be even, tile has {} lines",
                self.data.nrows()
            )));
        }

        let mode = if self.image.coarse_offset.is_some() || self.partner.coarse_offset.is_some() {
            AzimuthFilterMode::Variable
        } else {
            AzimuthFilterMode::Fixed
        };
        log::debug!(
            "Azimuth filter: {} lines FFT, PRF {:.2} Hz, ABW {:.2} Hz, {:?} mode",
            self.data.nrows(),
            self.image.prf,
            self.image.azimuth_bandwidth,
            mode
        );
        self.mode = Some(mode);
        self.state = FilterState::Parameterized;
        Ok(())
    }

    /// Pixel of the partner image seen at `pixel` of the filtered image
    fn partner_pixel(&self, pixel: f64) -> f64 {
        let own = self.image.coarse_offset.map(|o| o.pixels).unwrap_or(0);
        let other = self.partner.coarse_offset.map(|o| o.pixels).unwrap_or(0);
        pixel - own as f64 + other as f64
    }

    /// Response at one 0-based range pixel, in FFT order
    fn column_response(&self, freq: &Array1<f64>, pixel: f64) -> SarResult<Array1<f64>> {
        let prf = self.image.prf;
        let abw = self.image.azimuth_bandwidth;
        let alpha = self.params.alpha_hamming;

        let fdc_own = self.image.window_pix2fdc(pixel);
        let fdc_partner = self.partner.window_pix2fdc(self.partner_pixel(pixel));
        let fdc_mean = 0.5 * (fdc_own + fdc_partner);
        let band = abw - (fdc_own - fdc_partner).abs();
        if band <= 0.0 {
            return Err(SarError::InvalidArgument(format!(
                "No common azimuth band: Doppler difference {:.2} Hz exceeds bandwidth {:.2} Hz",
                (fdc_own - fdc_partner).abs(),
                abw
            )));
        }

        // the azimuth spectrum is periodic in the PRF
        let wrap = |f: f64| (f + 0.5 * prf).rem_euclid(prf) - 0.5 * prf;
        let centred = freq.mapv(|f| wrap(f - fdc_mean));

        let mut response = if alpha >= RECT_ALPHA {
            rect(&(centred / band))
        } else {
            let own = freq.mapv(|f| wrap(f - fdc_own));
            hamming(&centred, band, prf, alpha)? * inverse_hamming(&own, abw, prf, alpha)?
        };
        ifftshift_vec(&mut response);
        Ok(response)
    }

    /// Build the frequency response from the Doppler centroids
    pub fn define_filter(&mut self) -> SarResult<()> {
        self.state.require(FilterState::Parameterized, "define_filter")?;
        let (lines, pixels) = self.data.dim();
        let freq = frequency_axis(lines, self.image.prf);

        let response = match self.mode {
            Some(AzimuthFilterMode::Variable) => {
                let mut matrix = RealMatrix::zeros((lines, pixels));
                for (j, mut column) in matrix.columns_mut().into_iter().enumerate() {
                    let pixel = (self.tile.pix_lo + j as i64) as f64;
                    column.assign(&self.column_response(&freq, pixel)?);
                }
                FilterResponse::Variable(matrix)
            }
            _ => {
                let centre = 0.5 * (self.tile.pix_lo + self.tile.pix_hi) as f64;
                FilterResponse::Fixed(self.column_response(&freq, centre)?)
            }
        };
        log::debug!(
            "Azimuth filter defined, centroid {:.2} Hz (own) / {:.2} Hz (partner) at first pixel",
            self.image.window_pix2fdc(self.tile.pix_lo as f64),
            self.partner.window_pix2fdc(self.partner_pixel(self.tile.pix_lo as f64))
        );
        self.response = Some(response);
        self.state = FilterState::FilterDefined;
        Ok(())
    }

    /// Filter the tile in the azimuth frequency domain
    pub fn apply_filter(&mut self) -> SarResult<()> {
        self.state.require(FilterState::FilterDefined, "apply_filter")?;
        let response = self
            .response
            .as_ref()
            .ok_or_else(|| SarError::Processing("Azimuth filter response missing".to_string()))?;

        log::info!("Applying azimuth filter to {}x{} tile", self.data.nrows(), self.data.ncols());
        fft_axis(&mut self.data, Axis(0));
        match response {
            FilterResponse::Fixed(vector) => {
                for mut column in self.data.columns_mut() {
                    column.zip_mut_with(vector, |v, &w| *v *= w);
                }
            }
            FilterResponse::Variable(matrix) => {
                self.data.zip_mut_with(matrix, |v, &w| *v *= w);
            }
        }
        ifft_axis(&mut self.data, Axis(0));

        self.state = FilterState::Applied;
        Ok(())
    }

    /// Run the whole lifecycle and return the filtered tile
    pub fn run(
        image: SlcImage,
        partner: SlcImage,
        tile: Window,
        data: ComplexMatrix,
        params: AzimuthFilterParams,
    ) -> SarResult<ComplexMatrix> {
        let mut filter = Self::new(image, partner, tile, data, params)?;
        filter.define_parameters()?;
        filter.define_filter()?;
        filter.apply_filter()?;
        Ok(filter.into_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DopplerCentroid, SarComplex};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn image(prf: f64, abw: f64) -> SlcImage {
        SlcImage::new(prf, abw, 1.0e7, 8.0e6, Window::from_shape(1000, 1000))
    }

    fn tile_data(lines: usize, pixels: usize) -> ComplexMatrix {
        Array2::from_shape_fn((lines, pixels), |(i, j)| {
            SarComplex::new((i as f64 * 0.37 + j as f64).sin(), (i as f64 * 1.1 - j as f64 * 0.3).cos())
        })
    }

    #[test]
    fn test_rect_full_band_is_identity() {
        let data = tile_data(32, 8);
        let tile = Window::with_origin(100, 200, 32, 8);
        let params = AzimuthFilterParams { alpha_hamming: 1.0 };
        let filtered = AzimuthFilter::run(image(1000.0, 1000.0), image(1000.0, 1000.0), tile, data.clone(), params).unwrap();
        for (a, b) in filtered.iter().zip(data.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-10);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_lifecycle_order() {
        let tile = Window::from_shape(16, 4);
        let mut filter = AzimuthFilter::new(
            image(1000.0, 800.0),
            image(1000.0, 800.0),
            tile,
            tile_data(16, 4),
            AzimuthFilterParams::default(),
        )
        .unwrap();
        assert_eq!(filter.state(), FilterState::Uninitialized);
        assert!(matches!(filter.define_filter(), Err(SarError::Processing(_))));
        filter.define_parameters().unwrap();
        assert!(matches!(filter.apply_filter(), Err(SarError::Processing(_))));
        filter.define_filter().unwrap();
        filter.apply_filter().unwrap();
        assert_eq!(filter.state(), FilterState::Applied);
        assert!(filter.apply_filter().is_err());
    }

    #[test]
    fn test_mode_selection() {
        let tile = Window::from_shape(16, 4);
        let slave = image(1000.0, 800.0).with_coarse_offset(3, -12);
        let mut filter = AzimuthFilter::new(image(1000.0, 800.0), slave, tile, tile_data(16, 4), AzimuthFilterParams::default()).unwrap();
        filter.define_parameters().unwrap();
        assert_eq!(filter.mode(), Some(AzimuthFilterMode::Variable));

        let mut fixed = AzimuthFilter::new(image(1000.0, 800.0), image(1000.0, 800.0), tile, tile_data(16, 4), AzimuthFilterParams::default()).unwrap();
        fixed.define_parameters().unwrap();
        assert_eq!(fixed.mode(), Some(AzimuthFilterMode::Fixed));
    }

    /// Images whose centroid grows by 10 Hz per range pixel; the partner sits
    /// 20 pixels further in range.
    fn range_varying_pair() -> (SlcImage, SlcImage) {
        let doppler = DopplerCentroid::new(0.0, 1.0e8, 0.0);
        let master = image(1280.0, 1000.0).with_doppler(doppler);
        let slave = image(1280.0, 1000.0).with_doppler(doppler).with_coarse_offset(0, 20);
        (master, slave)
    }

    #[test]
    fn test_variable_response_follows_doppler() {
        let (n, pixels) = (64, 8);
        let (master, slave) = range_varying_pair();
        let tile = Window::with_origin(0, 0, n, pixels);
        let params = AzimuthFilterParams { alpha_hamming: 1.0 };
        let mut filter = AzimuthFilter::new(master, slave, tile, tile_data(n, pixels), params).unwrap();
        filter.define_parameters().unwrap();
        filter.define_filter().unwrap();

        let matrix = match filter.response.as_ref() {
            Some(FilterResponse::Variable(matrix)) => matrix.clone(),
            other => panic!("expected a per-column response, got {:?}", other),
        };
        assert_eq!(matrix.dim(), (n, pixels));

        // FFT order, 20 Hz bins
        let freq = |k: usize| if k < n / 2 { k as f64 * 20.0 } else { (k as f64 - n as f64) * 20.0 };
        let mut centres = Vec::new();
        for (j, column) in matrix.columns().into_iter().enumerate() {
            let pass: Vec<f64> = (0..n).filter(|&k| column[k] > 0.0).map(freq).collect();
            let lo = pass.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = pass.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            // own centroid 10 j Hz, partner 10 (j + 20) Hz
            let expected = 10.0 * j as f64 + 100.0;
            assert!((0.5 * (lo + hi) - expected).abs() <= 10.0, "column {}: {}..{}", j, lo, hi);
            // common band 1000 - 200 Hz
            assert!((hi - lo - 800.0).abs() <= 20.0);
            centres.push(0.5 * (lo + hi));
        }
        assert!(centres[pixels - 1] - centres[0] >= 60.0);
        assert_ne!(matrix.column(0), matrix.column(pixels - 1));
    }

    #[test]
    fn test_variable_rect_keeps_in_band_tone() {
        let (n, pixels) = (64, 8);
        let (master, slave) = range_varying_pair();
        // 100 Hz lies inside the common band of every column
        let data = Array2::from_shape_fn((n, pixels), |(t, _)| {
            SarComplex::from_polar(1.0, 2.0 * std::f64::consts::PI * 5.0 * t as f64 / n as f64)
        });
        let mut filter = AzimuthFilter::new(
            master,
            slave,
            Window::with_origin(0, 0, n, pixels),
            data.clone(),
            AzimuthFilterParams { alpha_hamming: 1.0 },
        )
        .unwrap();
        filter.define_parameters().unwrap();
        assert_eq!(filter.mode(), Some(AzimuthFilterMode::Variable));
        filter.define_filter().unwrap();
        filter.apply_filter().unwrap();
        for (a, b) in filter.data().iter().zip(data.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-10);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_doppler_difference_removes_outer_band() {
        // master at +100 Hz, slave at -100 Hz: common band is 600 Hz around 0
        let (n, prf) = (64, 1280.0);
        let master = image(prf, 800.0).with_doppler(DopplerCentroid::constant(100.0));
        let slave = image(prf, 800.0).with_doppler(DopplerCentroid::constant(-100.0));
        let tone_bin = 20; // 400 Hz, outside the common band
        let data = Array2::from_shape_fn((n, 2), |(t, _)| {
            SarComplex::from_polar(1.0, 2.0 * std::f64::consts::PI * tone_bin as f64 * t as f64 / n as f64)
        });
        let filtered = AzimuthFilter::run(
            master,
            slave,
            Window::from_shape(n, 2),
            data,
            AzimuthFilterParams { alpha_hamming: 1.0 },
        )
        .unwrap();
        for v in filtered.iter() {
            assert!(v.norm() < 1e-9);
        }
    }

    #[test]
    fn test_no_common_band() {
        let master = image(1000.0, 300.0).with_doppler(DopplerCentroid::constant(200.0));
        let slave = image(1000.0, 300.0).with_doppler(DopplerCentroid::constant(-200.0));
        let result = AzimuthFilter::run(master, slave, Window::from_shape(16, 2), tile_data(16, 2), AzimuthFilterParams::default());
        assert!(matches!(result, Err(SarError::InvalidArgument(_))));
    }

    #[test]
    fn test_odd_fft_length_rejected() {
        let result = AzimuthFilter::run(
            image(1000.0, 800.0),
            image(1000.0, 800.0),
            Window::from_shape(15, 2),
            tile_data(15, 2),
            AzimuthFilterParams::default(),
        );
        assert!(result.is_err());
    }
}
