//! `mzwavelet` detects isotope pattern features in LC-MS runs using the isotope wavelet,
//! a Mexican hat-like wavelet whose oscillation period matches the spacing of the
//! isotopic peaks of a pattern of a given charge.
//!
//! Each scan is transformed once per charge state, candidate monoisotopic positions
//! are scored against the alternating pattern the transform leaves behind, and the
//! surviving candidates are aggregated across scans by a sweep line into
//! [`IsotopeFeature`]s.
//!
//! ```rust
//! use mzwavelet::{IsotopeWaveletFeatureFinder, IsotopeWaveletParams, Spectrum};
//!
//! let params = IsotopeWaveletParams::default()
//!     .with_max_charge(4)
//!     .with_rt_votes_cutoff(3);
//! let finder = IsotopeWaveletFeatureFinder::new(params).unwrap();
//!
//! let scans = vec![
//!     Spectrum::from_arrays(&[500.0, 500.01, 500.02], &[0.0, 10.0, 0.0], 12.5, 0).unwrap(),
//! ];
//! for feature in finder.find_features(&scans).unwrap() {
//!     println!("{:0.4} {} {}", feature.mz, feature.charge, feature.intensity);
//! }
//! ```
//!
//! # Features
//! - `parallelism`: transform the charge states of a scan and the chunks of a run in parallel with `rayon`
//! - `serde`: serialize parameters and features, and read and write parameters as JSON
//! - `mzdata`: convert spectra read with `mzdata` into [`Spectrum`]s

pub mod averagine;
pub mod boxes;
pub mod detector;
pub mod feature;
pub mod finder;
pub mod params;
pub mod scoring;
pub mod spectrum;
pub mod sweep;
pub mod transform;

#[cfg(feature = "mzdata")]
pub mod convert;

#[cfg(test)]
mod test_data;

pub mod prelude {
    pub use crate::spectrum::{SignalView, SpectrumSource};
    pub use mzpeaks::{CoordinateLike, IntensityMeasurement, KnownCharge};
}

pub use crate::averagine::AveragineModel;
pub use crate::boxes::{BoxElement, BoxPool, IsotopeBox};
pub use crate::detector::{CandidateDetector, ScanWorkspace};
pub use crate::feature::{ConvexHull2D, FeatureMaterializer, IntensityType, IsotopeFeature};
pub use crate::finder::{FeatureFinderError, IsotopeWaveletFeatureFinder};
pub use crate::params::{IsotopeWaveletParams, ParamError};
pub use crate::spectrum::{Spectrum, SpectrumError};
pub use crate::sweep::{ChunkBounds, SweepLine};
pub use crate::transform::{IntegrationRule, ScanWindow, TransformedSpectrum};
