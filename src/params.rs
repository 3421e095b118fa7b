//! Configuration of the isotope wavelet feature finder.
#[cfg(feature = "serde")]
use std::io;

use thiserror::Error;

use crate::feature::IntensityType;
use crate::transform::IntegrationRule;

/// A configuration that cannot be used to build a feature finder
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("The maximum charge must be positive, got {0}")]
    InvalidMaxCharge(i32),
    #[error("The m/z range must be finite, non-negative and increasing, got {0} to {1}")]
    InvalidMZRange(f64, f64),
    #[error("The amplitude cutoff must not be NaN")]
    InvalidAmplitudeCutoff,
    #[error("The minimum number of votes must be at least one")]
    InvalidVotesCutoff,
    #[error("Unknown intensity type: {0}")]
    UnknownIntensityType(String),
}

/**
The recognized options of [`IsotopeWaveletFeatureFinder`](crate::IsotopeWaveletFeatureFinder).

Build one starting from [`IsotopeWaveletParams::default`] and adjust it with the
`with_*` methods. Parameters are checked by [`IsotopeWaveletParams::validate`] when
the finder is constructed.
*/
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IsotopeWaveletParams {
    /// The lower bound of the m/z range the averagine model covers
    pub min_mz: f64,
    /// The upper bound of the m/z range the averagine model covers
    pub max_mz: f64,
    /// The highest charge state to search for
    pub max_charge: i32,
    /// A hint for the largest number of points in a scan, used to pre-size buffers.
    /// Zero means derive it from the data.
    pub max_scan_size: usize,
    /// Use the plain summation transform for high resolution data rather than the
    /// trapezoidal rule
    pub high_resolution_mode: bool,
    /// Only seed from transformed points this many standard deviations above the mean.
    /// Negative values disable the threshold.
    pub amplitude_cutoff: f64,
    /// Check monoisotopic positions against the peptide mass rule
    pub check_ppm: bool,
    /// The number of consecutive scans a pattern may be missing from before its track ends
    pub rt_interleave: usize,
    /// The minimum number of scans a pattern must be observed in
    pub rt_votes_cutoff: usize,
    pub intensity_type: IntensityType,
}

impl Default for IsotopeWaveletParams {
    fn default() -> Self {
        Self {
            min_mz: 150.0,
            max_mz: 2500.0,
            max_charge: 3,
            max_scan_size: 0,
            high_resolution_mode: false,
            amplitude_cutoff: -1.0,
            check_ppm: false,
            rt_interleave: 1,
            rt_votes_cutoff: 5,
            intensity_type: IntensityType::default(),
        }
    }
}

impl IsotopeWaveletParams {
    pub fn with_mz_range(mut self, min_mz: f64, max_mz: f64) -> Self {
        self.min_mz = min_mz;
        self.max_mz = max_mz;
        self
    }

    pub fn with_max_charge(mut self, max_charge: i32) -> Self {
        self.max_charge = max_charge;
        self
    }

    pub fn with_max_scan_size(mut self, max_scan_size: usize) -> Self {
        self.max_scan_size = max_scan_size;
        self
    }

    pub fn with_high_resolution_mode(mut self, high_resolution_mode: bool) -> Self {
        self.high_resolution_mode = high_resolution_mode;
        self
    }

    pub fn with_amplitude_cutoff(mut self, amplitude_cutoff: f64) -> Self {
        self.amplitude_cutoff = amplitude_cutoff;
        self
    }

    pub fn with_check_ppm(mut self, check_ppm: bool) -> Self {
        self.check_ppm = check_ppm;
        self
    }

    pub fn with_rt_interleave(mut self, rt_interleave: usize) -> Self {
        self.rt_interleave = rt_interleave;
        self
    }

    pub fn with_rt_votes_cutoff(mut self, rt_votes_cutoff: usize) -> Self {
        self.rt_votes_cutoff = rt_votes_cutoff;
        self
    }

    pub fn with_intensity_type(mut self, intensity_type: IntensityType) -> Self {
        self.intensity_type = intensity_type;
        self
    }

    pub fn integration_rule(&self) -> IntegrationRule {
        IntegrationRule::from_high_resolution(self.high_resolution_mode)
    }

    /// Check that the parameters are internally consistent
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.max_charge < 1 {
            return Err(ParamError::InvalidMaxCharge(self.max_charge));
        }
        if !(self.min_mz.is_finite() && self.max_mz.is_finite())
            || self.min_mz < 0.0
            || self.min_mz >= self.max_mz
        {
            return Err(ParamError::InvalidMZRange(self.min_mz, self.max_mz));
        }
        if self.amplitude_cutoff.is_nan() {
            return Err(ParamError::InvalidAmplitudeCutoff);
        }
        if self.rt_votes_cutoff == 0 {
            return Err(ParamError::InvalidVotesCutoff);
        }
        Ok(())
    }

    /// Write the parameters as JSON
    #[cfg(feature = "serde")]
    pub fn to_writer<W: io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    /// Read parameters from JSON, filling omitted fields with their defaults
    #[cfg(feature = "serde")]
    pub fn from_reader<R: io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}
