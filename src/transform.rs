//! The continuous isotope wavelet transform of a single scan for a single
//! charge hypothesis.
use std::ops::Index;

use crate::averagine::{kernel_value, lambda, mz_cutoff, AveragineModel, IW_QUARTER_NEUTRON_MASS};
use crate::spectrum::{SignalView, Spectrum};

/// How the convolution integral is approximated
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntegrationRule {
    /// The trapezoidal rule, valid for arbitrarily spaced samples
    #[default]
    Trapezoid,
    /// A plain sum over the samples, for near-uniformly spaced high resolution data
    Riemann,
}

impl IntegrationRule {
    pub fn from_high_resolution(high_resolution_mode: bool) -> Self {
        if high_resolution_mode {
            Self::Riemann
        } else {
            Self::Trapezoid
        }
    }
}

/// The smallest positive distance between consecutive m/z values, or infinity if
/// the signal has fewer than two distinct positions.
pub fn compute_min_spacing<S: SignalView + ?Sized>(signal: &S) -> f64 {
    let mut min_spacing = f64::INFINITY;
    for i in 1..signal.len() {
        let delta = signal.mz_at(i) - signal.mz_at(i - 1);
        if delta > 0.0 && delta < min_spacing {
            min_spacing = delta;
        }
    }
    min_spacing
}

/// The mean of the smaller half of the consecutive m/z spacings, a rough
/// estimate of the sampling rate that ignores gaps in the signal.
pub fn average_mz_spacing<S: SignalView + ?Sized>(signal: &S) -> f64 {
    let mut deltas: Vec<f64> = (1..signal.len())
        .map(|i| signal.mz_at(i) - signal.mz_at(i - 1))
        .collect();
    if deltas.is_empty() {
        return f64::INFINITY;
    }
    deltas.sort_by(|a, b| a.total_cmp(b));
    let half = deltas.len().div_ceil(2);
    deltas[..half].iter().sum::<f64>() / half as f64
}

/**
The per-scan geometry of the wavelet convolution.

For every sample this holds the first sample that can fall inside the wavelet's
support, so that the convolution can start its walk there instead of searching
for it. It is only valid for the scan it was last initialized with, and must be
re-initialized with [`ScanWindow::initialize_scan`] before transforming the next
scan.
*/
#[derive(Debug, Clone, Default)]
pub struct ScanWindow {
    pub rule: IntegrationRule,
    min_spacing: f64,
    average_spacing: f64,
    starts: Vec<usize>,
}

impl ScanWindow {
    pub fn new(rule: IntegrationRule) -> Self {
        Self {
            rule,
            min_spacing: f64::INFINITY,
            average_spacing: f64::INFINITY,
            starts: Vec::new(),
        }
    }

    pub fn min_spacing(&self) -> f64 {
        self.min_spacing
    }

    pub fn average_spacing(&self) -> f64 {
        self.average_spacing
    }

    /// The number of samples this window was initialized for
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The first sample considered when convolving around sample `i`
    pub fn start_of(&self, i: usize) -> usize {
        self.starts[i]
    }

    /// Prepare the window for `spectrum`.
    ///
    /// Returns `false` when the scan is degenerate (fewer than two distinct
    /// positions), in which case it must not be transformed.
    pub fn initialize_scan(&mut self, spectrum: &Spectrum, model: &AveragineModel) -> bool {
        self.starts.clear();
        self.min_spacing = compute_min_spacing(spectrum);
        self.average_spacing = average_mz_spacing(spectrum);
        if !self.min_spacing.is_finite() {
            return false;
        }
        let n = spectrum.len();

        let wavelet_length = (model.max_wavelet_width() / self.min_spacing).ceil();
        if wavelet_length > n as f64 {
            log::warn!(
                "The wavelet spans {wavelet_length} samples in scan {} but the scan only has {n} points",
                spectrum.index
            );
        }
        log::debug!(
            "Scan {} has {n} points, minimum spacing {:0.5}, average spacing {:0.5}",
            spectrum.index,
            self.min_spacing,
            self.average_spacing
        );

        self.starts.reserve(n);
        match self.rule {
            IntegrationRule::Trapezoid => {
                let left = (IW_QUARTER_NEUTRON_MASS / self.min_spacing).floor() as usize;
                self.starts.extend((0..n).map(|p| p.saturating_sub(left)));
            }
            IntegrationRule::Riemann => {
                // Large gaps make the min spacing estimate meaningless, so search for each bound.
                self.starts.extend(
                    (0..n).map(|p| spectrum.lower_bound(spectrum.mz(p) - IW_QUARTER_NEUTRON_MASS)),
                );
            }
        }
        true
    }

    /// Transform `spectrum` under the hypothesis that every pattern has charge `charge`,
    /// writing into `buffer` and taking ownership of it.
    ///
    /// The window must have been initialized for `spectrum`.
    pub fn transform_into<'a>(
        &self,
        spectrum: &'a Spectrum,
        charge: i32,
        mut buffer: Vec<f64>,
    ) -> TransformedSpectrum<'a> {
        let n = spectrum.len();
        debug_assert_eq!(n, self.starts.len());
        buffer.clear();
        buffer.resize(n, 0.0);

        let z = charge as f64;
        let min_spacing = self.min_spacing;
        for (p, slot) in buffer.iter_mut().enumerate() {
            let mz_p = spectrum.mz(p);
            let right_bound = mz_cutoff(mz_p, charge) / z;
            let lam = lambda(mz_p * z);
            let origin = -mz_p + IW_QUARTER_NEUTRON_MASS / z;

            let start = self.starts[p];
            let mut old_pos = if start > 0 {
                spectrum.mz(start - 1)
            } else {
                spectrum.mz(0) - min_spacing
            };
            let mut old = 0.0;
            let mut value = 0.0;
            let mut c_diff = 0.0;
            let mut k = start;
            while c_diff < right_bound {
                if k >= n {
                    if self.rule == IntegrationRule::Trapezoid {
                        value += 0.5 * old * min_spacing;
                    }
                    break;
                }
                let c_mz = spectrum.mz(k);
                c_diff = c_mz + origin;
                let current = if c_diff > 0.0 && c_diff <= right_bound {
                    kernel_value(lam, c_diff * z + 1.0) * spectrum.intensity(k)
                } else {
                    0.0
                };
                match self.rule {
                    IntegrationRule::Trapezoid => value += 0.5 * (current + old) * (c_mz - old_pos),
                    IntegrationRule::Riemann => value += current,
                }
                old = current;
                old_pos = c_mz;
                k += 1;
            }
            *slot = value;
        }
        TransformedSpectrum::new(spectrum, buffer)
    }
}

/// Transform `spectrum` for charge `charge` with a freshly initialized window.
///
/// Degenerate scans transform to all zeros.
pub fn transform<'a>(
    spectrum: &'a Spectrum,
    charge: i32,
    rule: IntegrationRule,
    model: &AveragineModel,
) -> TransformedSpectrum<'a> {
    let mut window = ScanWindow::new(rule);
    if window.initialize_scan(spectrum, model) {
        window.transform_into(spectrum, charge, Vec::new())
    } else {
        TransformedSpectrum::new(spectrum, vec![0.0; spectrum.len()])
    }
}

/// The wavelet transform of a scan, one value per peak of the scan it was
/// computed from.
#[derive(Debug, Clone)]
pub struct TransformedSpectrum<'a> {
    reference: &'a Spectrum,
    intensities: Vec<f64>,
}

impl<'a> TransformedSpectrum<'a> {
    pub fn new(reference: &'a Spectrum, intensities: Vec<f64>) -> Self {
        debug_assert_eq!(reference.len(), intensities.len());
        Self {
            reference,
            intensities,
        }
    }

    /// The untransformed scan
    pub fn reference(&self) -> &'a Spectrum {
        self.reference
    }

    pub fn trans_intensity(&self, i: usize) -> f64 {
        self.intensities[i]
    }

    pub fn ref_intensity(&self, i: usize) -> f64 {
        self.reference.intensity(i)
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn rt(&self) -> f64 {
        self.reference.rt
    }

    /// Release the intensity buffer for reuse
    pub fn into_buffer(self) -> Vec<f64> {
        self.intensities
    }
}

impl<'a> Index<usize> for TransformedSpectrum<'a> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.intensities[index]
    }
}

impl SignalView for TransformedSpectrum<'_> {
    #[inline]
    fn len(&self) -> usize {
        self.intensities.len()
    }

    #[inline]
    fn mz_at(&self, i: usize) -> f64 {
        self.reference.mz(i)
    }

    #[inline]
    fn value_at(&self, i: usize) -> f64 {
        self.intensities[i]
    }
}
