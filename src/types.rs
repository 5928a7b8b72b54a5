use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex-valued SLC sample (I + jQ)
pub type SarComplex = Complex<f64>;

/// Dense complex tile, lines x pixels, row-major
pub type ComplexMatrix = Array2<SarComplex>;

/// Dense real tile, lines x pixels, row-major
pub type RealMatrix = Array2<f64>;

/// Rectangular line/pixel range with inclusive, 0-based bounds.
///
/// Windows are plain values: every operation that "changes" a window returns a
/// new one. Coordinates are signed so that intermediate geometry (margins,
/// polynomial offsets) may fall outside an image before it is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub line_lo: i64,
    pub line_hi: i64,
    pub pix_lo: i64,
    pub pix_hi: i64,
}

impl Window {
    /// Create a window, rejecting inverted bounds
    pub fn new(line_lo: i64, line_hi: i64, pix_lo: i64, pix_hi: i64) -> SarResult<Self> {
        if line_hi < line_lo || pix_hi < pix_lo {
            return Err(SarError::InvalidArgument(format!(
                "Inverted window bounds: lines [{}, {}], pixels [{}, {}]",
                line_lo, line_hi, pix_lo, pix_hi
            )));
        }
        Ok(Self { line_lo, line_hi, pix_lo, pix_hi })
    }

    /// Window covering a whole `lines x pixels` buffer starting at (0, 0)
    pub fn from_shape(lines: usize, pixels: usize) -> Self {
        Self {
            line_lo: 0,
            line_hi: lines as i64 - 1,
            pix_lo: 0,
            pix_hi: pixels as i64 - 1,
        }
    }

    /// Window of `lines x pixels` with its upper-left corner at (line, pixel)
    pub fn with_origin(line: i64, pixel: i64, lines: usize, pixels: usize) -> Self {
        Self {
            line_lo: line,
            line_hi: line + lines as i64 - 1,
            pix_lo: pixel,
            pix_hi: pixel + pixels as i64 - 1,
        }
    }

    pub fn lines(&self) -> usize {
        (self.line_hi - self.line_lo + 1) as usize
    }

    pub fn pixels(&self) -> usize {
        (self.pix_hi - self.pix_lo + 1) as usize
    }

    /// (lines, pixels), ordered like `ndarray` shapes
    pub fn shape(&self) -> (usize, usize) {
        (self.lines(), self.pixels())
    }

    pub fn same_size(&self, other: &Window) -> bool {
        self.shape() == other.shape()
    }

    pub fn contains(&self, other: &Window) -> bool {
        other.line_lo >= self.line_lo
            && other.line_hi <= self.line_hi
            && other.pix_lo >= self.pix_lo
            && other.pix_hi <= self.pix_hi
    }

    pub fn contains_point(&self, line: i64, pixel: i64) -> bool {
        line >= self.line_lo && line <= self.line_hi && pixel >= self.pix_lo && pixel <= self.pix_hi
    }

    /// Common part of two windows, `None` when they do not overlap
    pub fn intersect(&self, other: &Window) -> Option<Window> {
        let line_lo = self.line_lo.max(other.line_lo);
        let line_hi = self.line_hi.min(other.line_hi);
        let pix_lo = self.pix_lo.max(other.pix_lo);
        let pix_hi = self.pix_hi.min(other.pix_hi);
        if line_hi < line_lo || pix_hi < pix_lo {
            None
        } else {
            Some(Window { line_lo, line_hi, pix_lo, pix_hi })
        }
    }

    /// Clamp to `bounds`, reporting whether anything was cut off
    pub fn clamp_to(&self, bounds: &Window) -> Option<(Window, bool)> {
        self.intersect(bounds).map(|w| (w, w != *self))
    }

    pub fn translate(&self, d_line: i64, d_pixel: i64) -> Window {
        Window {
            line_lo: self.line_lo + d_line,
            line_hi: self.line_hi + d_line,
            pix_lo: self.pix_lo + d_pixel,
            pix_hi: self.pix_hi + d_pixel,
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}, {}:{}]",
            self.line_lo, self.line_hi, self.pix_lo, self.pix_hi
        )
    }
}

/// Doppler centroid polynomial in two-way range time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DopplerCentroid {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
}

impl DopplerCentroid {
    pub fn new(a0: f64, a1: f64, a2: f64) -> Self {
        Self { a0, a1, a2 }
    }

    /// Constant centroid
    pub fn constant(fdc: f64) -> Self {
        Self { a0: fdc, a1: 0.0, a2: 0.0 }
    }

    pub fn is_zero(&self) -> bool {
        self.a0 == 0.0 && self.a1 == 0.0 && self.a2 == 0.0
    }

    /// True when the centroid does not vary with range
    pub fn is_constant(&self) -> bool {
        self.a1 == 0.0 && self.a2 == 0.0
    }

    /// Doppler centroid [Hz] at a 1-based range pixel.
    ///
    /// Pixel 1 is the first range sample, where `tau` is zero. [`Window`]
    /// coordinates are 0-based, so callers holding a window pixel pass
    /// `pixel + 1`.
    pub fn pix2fdc(&self, pixel: f64, rsr2x: f64) -> f64 {
        let tau = (pixel - 1.0) / (rsr2x / 2.0);
        self.a0 + self.a1 * tau + self.a2 * tau * tau
    }
}

/// Integer offset of the slave relative to the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoarseOffset {
    pub lines: i64,
    pub pixels: i64,
}

/// Acquisition parameters of one SLC image, as needed by filtering and
/// resampling. Frequencies in Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlcImage {
    /// Pulse repetition frequency
    pub prf: f64,
    /// Processed azimuth bandwidth
    pub azimuth_bandwidth: f64,
    /// Range sampling rate
    pub range_sampling_rate: f64,
    /// Range (chirp) bandwidth
    pub range_bandwidth: f64,
    pub doppler: DopplerCentroid,
    /// Extent of the full image
    pub original_window: Window,
    /// Extent currently available for processing
    pub current_window: Window,
    /// Set once coarse coregistration has run (slave only)
    pub coarse_offset: Option<CoarseOffset>,
}

impl SlcImage {
    pub fn new(
        prf: f64,
        azimuth_bandwidth: f64,
        range_sampling_rate: f64,
        range_bandwidth: f64,
        window: Window,
    ) -> Self {
        Self {
            prf,
            azimuth_bandwidth,
            range_sampling_rate,
            range_bandwidth,
            doppler: DopplerCentroid::default(),
            original_window: window,
            current_window: window,
            coarse_offset: None,
        }
    }

    pub fn with_doppler(mut self, doppler: DopplerCentroid) -> Self {
        self.doppler = doppler;
        self
    }

    pub fn with_coarse_offset(mut self, lines: i64, pixels: i64) -> Self {
        self.coarse_offset = Some(CoarseOffset { lines, pixels });
        self
    }

    /// Twice the range sampling rate
    pub fn rsr2x(&self) -> f64 {
        2.0 * self.range_sampling_rate
    }

    /// Doppler centroid at a 1-based range pixel
    pub fn pix2fdc(&self, pixel: f64) -> f64 {
        self.doppler.pix2fdc(pixel, self.rsr2x())
    }

    /// Doppler centroid at a 0-based window pixel
    pub fn window_pix2fdc(&self, pixel: f64) -> f64 {
        self.pix2fdc(pixel + 1.0)
    }

    /// Ratio of sampling rate to bandwidth, the smaller of azimuth and range
    pub fn oversampling_ratio(&self) -> f64 {
        (self.prf / self.azimuth_bandwidth).min(self.range_sampling_rate / self.range_bandwidth)
    }

    pub fn validate(&self) -> SarResult<()> {
        let rates = [
            ("PRF", self.prf),
            ("azimuth bandwidth", self.azimuth_bandwidth),
            ("range sampling rate", self.range_sampling_rate),
            ("range bandwidth", self.range_bandwidth),
        ];
        for (name, value) in rates {
            if !(value.is_finite() && value > 0.0) {
                return Err(SarError::Metadata(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.azimuth_bandwidth > self.prf {
            return Err(SarError::Metadata(format!(
                "Azimuth bandwidth {} exceeds PRF {}",
                self.azimuth_bandwidth, self.prf
            )));
        }
        if self.range_bandwidth > self.range_sampling_rate {
            return Err(SarError::Metadata(format!(
                "Range bandwidth {} exceeds range sampling rate {}",
                self.range_bandwidth, self.range_sampling_rate
            )));
        }
        if !self.original_window.contains(&self.current_window) {
            return Err(SarError::Metadata(format!(
                "Current window {} outside original window {}",
                self.current_window, self.original_window
            )));
        }
        Ok(())
    }
}

/// Error types for co-registration and filtering
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Numerically degenerate input: {0}")]
    NumericalDegenerate(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(Window::new(0, 9, 0, 9).is_ok());
        assert!(matches!(Window::new(5, 4, 0, 9), Err(SarError::InvalidArgument(_))));
        assert!(matches!(Window::new(0, 9, 3, 2), Err(SarError::InvalidArgument(_))));
    }

    #[test]
    fn test_window_geometry() {
        let w = Window::new(10, 19, 100, 163).unwrap();
        assert_eq!(w.lines(), 10);
        assert_eq!(w.pixels(), 64);
        assert_eq!(w.shape(), (10, 64));

        let inner = Window::new(12, 15, 100, 110).unwrap();
        assert!(w.contains(&inner));
        assert!(!inner.contains(&w));

        let other = Window::new(15, 30, 150, 200).unwrap();
        let common = w.intersect(&other).unwrap();
        assert_eq!(common, Window::new(15, 19, 150, 163).unwrap());

        let far = Window::new(100, 110, 0, 5).unwrap();
        assert!(w.intersect(&far).is_none());

        let (clamped, changed) = other.clamp_to(&w).unwrap();
        assert!(changed);
        assert_eq!(clamped, common);
        let (same, changed) = inner.clamp_to(&w).unwrap();
        assert!(!changed);
        assert_eq!(same, inner);
    }

    #[test]
    fn test_doppler_pix2fdc() {
        let rsr2x = 2.0 * 18.96e6;
        let dc = DopplerCentroid::new(100.0, 2.0e6, 0.0);
        assert_eq!(dc.pix2fdc(1.0, rsr2x), 100.0);
        let tau = 1000.0 / 18.96e6;
        assert!((dc.pix2fdc(1001.0, rsr2x) - (100.0 + 2.0e6 * tau)).abs() < 1e-9);
        let slc = SlcImage::new(1000.0, 800.0, 18.96e6, 14.0e6, Window::from_shape(10, 10))
            .with_doppler(dc);
        assert_eq!(slc.window_pix2fdc(0.0), 100.0);
        assert_eq!(slc.window_pix2fdc(1000.0), slc.pix2fdc(1001.0));
        assert!(DopplerCentroid::default().is_zero());
        assert!(DopplerCentroid::constant(12.0).is_constant());
    }

    #[test]
    fn test_slc_image_validation() {
        let win = Window::from_shape(1000, 2000);
        let slc = SlcImage::new(1679.9, 1378.0, 18.96e6, 15.55e6, win);
        assert!(slc.validate().is_ok());
        assert!((slc.rsr2x() - 37.92e6).abs() < 1e-3);

        let mut bad = slc.clone();
        bad.azimuth_bandwidth = 2000.0;
        assert!(matches!(bad.validate(), Err(SarError::Metadata(_))));

        let mut bad = slc.clone();
        bad.prf = 0.0;
        assert!(matches!(bad.validate(), Err(SarError::Metadata(_))));

        let mut bad = slc;
        bad.current_window = Window::from_shape(1001, 2000);
        assert!(bad.validate().is_err());
    }
}
