//! The input data model: a single scan of m/z-sorted peaks and the
//! scan sources the feature finder reads from.
use mzpeaks::prelude::*;
use mzpeaks::{CentroidPeak, PeakSet};
use thiserror::Error;

/// A precondition violation in the spectra handed to the feature finder
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("The m/z and intensity arrays have different lengths ({0} != {1})")]
    ArraySizeMismatch(usize, usize),
    #[error("The m/z array is not sorted at position {index} ({previous} > {current})")]
    Unsorted {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("The m/z array contains a non-finite value at position {0}")]
    NonFiniteMZ(usize),
}

/**
A sequence of positions ordered by m/z, each carrying a value.

This is the common view both raw spectra and their wavelet transforms present
to the scoring and candidate detection algorithms, which are written once against
this trait.
*/
pub trait SignalView {
    /// The number of positions in the signal
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The m/z of position `i`
    fn mz_at(&self, i: usize) -> f64;

    /// The value at position `i`
    fn value_at(&self, i: usize) -> f64;

    /// The first position whose m/z is not less than `mz`, or [`SignalView::len`]
    /// if there is none.
    fn lower_bound(&self, mz: f64) -> usize {
        let mut lo = 0;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.mz_at(mid) < mz {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// The first position whose m/z is greater than `mz`, or [`SignalView::len`]
    /// if there is none.
    fn upper_bound(&self, mz: f64) -> usize {
        let mut lo = 0;
        let mut hi = self.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.mz_at(mid) <= mz {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Linearly interpolate the value at `mz` between positions `i - 1` and `i`
    fn interpolate_at(&self, i: usize, mz: f64) -> f64 {
        let (mz_a, mz_b) = (self.mz_at(i - 1), self.mz_at(i));
        let (val_a, val_b) = (self.value_at(i - 1), self.value_at(i));
        val_a + (val_b - val_a) / (mz_b - mz_a) * (mz - mz_a)
    }
}

/// A single scan of an LC-MS run, its peaks sorted by m/z.
///
/// Peaks may be centroids or profile samples, the algorithms only assume
/// that positions are ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub peaks: PeakSet,
    /// The retention time of the scan
    pub rt: f64,
    /// The position of this scan in its run
    pub index: usize,
}

impl Spectrum {
    /// Wrap an existing [`PeakSet`], which is sorted by construction
    pub fn new(peaks: PeakSet, rt: f64, index: usize) -> Self {
        Self { peaks, rt, index }
    }

    /// Build a spectrum from parallel m/z and intensity arrays, checking that
    /// they are the same size and sorted by m/z.
    pub fn from_arrays(
        mzs: &[f64],
        intensities: &[f32],
        rt: f64,
        index: usize,
    ) -> Result<Self, SpectrumError> {
        if mzs.len() != intensities.len() {
            return Err(SpectrumError::ArraySizeMismatch(
                mzs.len(),
                intensities.len(),
            ));
        }
        let mut peaks = Vec::with_capacity(mzs.len());
        let mut previous = f64::NEG_INFINITY;
        for (i, (mz, inten)) in mzs.iter().copied().zip(intensities.iter().copied()).enumerate() {
            if !mz.is_finite() {
                return Err(SpectrumError::NonFiniteMZ(i));
            }
            if mz < previous {
                return Err(SpectrumError::Unsorted {
                    index: i,
                    previous,
                    current: mz,
                });
            }
            previous = mz;
            peaks.push(CentroidPeak::new(mz, inten, i as u32));
        }
        Ok(Self::new(PeakSet::wrap(peaks), rt, index))
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn mz(&self, i: usize) -> f64 {
        self.peaks[i].mz
    }

    pub fn intensity(&self, i: usize) -> f64 {
        self.peaks[i].intensity as f64
    }

    /// Whether any peak carries a positive intensity
    pub fn has_signal(&self) -> bool {
        self.peaks.iter().any(|p| p.intensity > 0.0)
    }
}

impl SignalView for Spectrum {
    #[inline]
    fn len(&self) -> usize {
        self.peaks.len()
    }

    #[inline]
    fn mz_at(&self, i: usize) -> f64 {
        self.peaks[i].mz
    }

    #[inline]
    fn value_at(&self, i: usize) -> f64 {
        self.peaks[i].intensity as f64
    }
}

/// An ordered, randomly accessible collection of scans, read in scan index order.
pub trait SpectrumSource {
    /// The number of scans in the run
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the scan at `index`, if it exists
    fn get_spectrum_by_index(&self, index: usize) -> Option<&Spectrum>;

    /// Iterate over all scans in order
    fn iter_spectra(&self) -> SpectrumIter<'_, Self>
    where
        Self: Sized,
    {
        SpectrumIter {
            source: self,
            index: 0,
        }
    }
}

/// An iterator over the scans of a [`SpectrumSource`]
pub struct SpectrumIter<'a, S: SpectrumSource> {
    source: &'a S,
    index: usize,
}

impl<'a, S: SpectrumSource> Iterator for SpectrumIter<'a, S> {
    type Item = &'a Spectrum;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.source.len() {
            let i = self.index;
            self.index += 1;
            if let Some(spec) = self.source.get_spectrum_by_index(i) {
                return Some(spec);
            }
        }
        None
    }
}

impl SpectrumSource for [Spectrum] {
    fn len(&self) -> usize {
        <[Spectrum]>::len(self)
    }

    fn get_spectrum_by_index(&self, index: usize) -> Option<&Spectrum> {
        self.get(index)
    }
}

impl SpectrumSource for Vec<Spectrum> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get_spectrum_by_index(&self, index: usize) -> Option<&Spectrum> {
        self.get(index)
    }
}
