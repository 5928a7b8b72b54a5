//! Core coregistration and filtering modules

pub mod linalg;
pub mod spectral;
pub mod polynomial;
pub mod correlation;
pub mod coregistration;
pub mod spectral_shift;
pub mod weight_windows;
pub mod azimuth_filter;
pub mod range_filter;
pub mod phase_filter;
pub mod interpolation;
pub mod resample;

// Re-export main types
pub use polynomial::{CoregPolynomial, OffsetObservation};
pub use correlation::{coherencefft, coherencespace, crosscorrelate, CorrelationParams, CorrelationResult};
pub use coregistration::{coarse_correlate, distribute_points, estimate_coarse_offset, fine_correlate, CoarseOffsetEstimate};
pub use spectral_shift::{shift_azimuth_spectrum, ShiftDirection};
pub use weight_windows::FilterState;
pub use azimuth_filter::{AzimuthFilter, AzimuthFilterMode, AzimuthFilterParams};
pub use range_filter::{RangeFilter, RangeFilterParams, RangeFilterStats};
pub use phase_filter::{conv_buffer, goldstein, goldstein_2d, spectral_filter, GoldsteinParams, PhaseFilter, PhaseFilterMethod};
pub use interpolation::{InterpolationLut, KernelType};
pub use resample::{resample, ResampleParams, Resampler, TileRequest};
