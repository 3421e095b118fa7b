//! Conversions from the spectrum types of [`mzdata`](::mzdata) into [`Spectrum`]s.
use ::mzdata::prelude::*;
use ::mzdata::spectrum::{CentroidSpectrum, RawSpectrum};

use crate::spectrum::{Spectrum, SpectrumError};

impl TryFrom<&RawSpectrum> for Spectrum {
    type Error = SpectrumError;

    fn try_from(value: &RawSpectrum) -> Result<Self, Self::Error> {
        let mzs = value.mzs();
        let intensities = value.intensities();
        Spectrum::from_arrays(&mzs, &intensities, value.start_time(), value.index())
    }
}

impl From<&CentroidSpectrum> for Spectrum {
    fn from(value: &CentroidSpectrum) -> Self {
        Spectrum::new(value.peaks.clone(), value.start_time(), value.index())
    }
}

/// Collect the MS1 scans of `spectra` in order, re-indexing them by their position
/// among the MS1 scans so they can be searched as one run.
pub fn collect_ms1_spectra<I>(spectra: I) -> Result<Vec<Spectrum>, SpectrumError>
where
    I: IntoIterator<Item = RawSpectrum>,
{
    let mut collected = Vec::new();
    for spectrum in spectra {
        if spectrum.ms_level() != 1 {
            continue;
        }
        let mut converted = Spectrum::try_from(&spectrum)?;
        converted.index = collected.len();
        collected.push(converted);
    }
    log::debug!("Collected {} MS1 scans", collected.len());
    Ok(collected)
}
