//! sarcoreg: InSAR coregistration and filtering for complex SLC tiles
//!
//! Estimates sub-pixel offsets between a master and a slave image, fits a
//! coregistration polynomial, resamples the slave onto the master grid and
//! applies the azimuth, range and phase filters used before interferogram
//! formation. Reading and writing image files is left to the caller; every
//! operation works on in-memory tiles described by a [`types::Window`].

pub mod types;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    ComplexMatrix, CoarseOffset, DopplerCentroid, RealMatrix, SarComplex, SarError, SarResult,
    SlcImage, Window,
};

pub use crate::core::{
    AzimuthFilter, CoregPolynomial, InterpolationLut, KernelType, PhaseFilter, RangeFilter, Resampler,
};
