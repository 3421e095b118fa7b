//! The feature finder driver, tying per-scan detection, the sweep line and feature
//! materialization together over a whole run.
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::averagine::AveragineModel;
use crate::boxes::BoxElement;
use crate::detector::{CandidateDetector, ScanWorkspace};
use crate::feature::{FeatureMaterializer, IsotopeFeature};
use crate::params::{IsotopeWaveletParams, ParamError};
use crate::spectrum::{Spectrum, SpectrumSource};
use crate::sweep::{ChunkBounds, SweepLine};
use crate::transform::ScanWindow;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureFinderError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(#[from] ParamError),
    #[error("The scan at position {position} has index {index}, scans must be indexed by their position")]
    ScanOutOfOrder { position: usize, index: usize },
}

/**
Detects isotope pattern features in a run of profile scans using the isotope wavelet.

```rust
use mzwavelet::{IsotopeWaveletFeatureFinder, IsotopeWaveletParams, Spectrum};

let params = IsotopeWaveletParams::default().with_max_charge(2).with_rt_votes_cutoff(1);
let finder = IsotopeWaveletFeatureFinder::new(params).unwrap();
let scans: Vec<Spectrum> = Vec::new();
let features = finder.find_features(&scans).unwrap();
assert!(features.is_empty());
```
*/
#[derive(Debug, Clone)]
pub struct IsotopeWaveletFeatureFinder {
    params: IsotopeWaveletParams,
    model: AveragineModel,
    detector: CandidateDetector,
    materializer: FeatureMaterializer,
}

impl IsotopeWaveletFeatureFinder {
    pub fn new(params: IsotopeWaveletParams) -> Result<Self, ParamError> {
        params.validate()?;
        let model = AveragineModel::new(params.min_mz, params.max_mz, params.max_charge);
        let detector = CandidateDetector::new(
            params.max_charge,
            params.amplitude_cutoff,
            params.check_ppm,
            params.integration_rule(),
        );
        let materializer =
            FeatureMaterializer::new(params.max_charge, params.rt_votes_cutoff, params.intensity_type);
        Ok(Self {
            params,
            model,
            detector,
            materializer,
        })
    }

    pub fn params(&self) -> &IsotopeWaveletParams {
        &self.params
    }

    pub fn model(&self) -> &AveragineModel {
        &self.model
    }

    fn new_sweep_line(&self, n_scans: usize) -> SweepLine {
        SweepLine::new(
            self.params.max_charge,
            self.params.rt_interleave,
            self.params.rt_votes_cutoff,
            n_scans,
        )
    }

    fn new_workspaces(&self) -> Vec<ScanWorkspace> {
        (0..self.params.max_charge)
            .map(|_| ScanWorkspace::with_capacity(self.params.max_scan_size))
            .collect()
    }

    /// Detect the candidates of every charge state in a single scan, in charge order.
    ///
    /// Degenerate scans, those with fewer than two points, no distinct positions or
    /// no signal, yield nothing.
    pub fn detect_scan(&self, spectrum: &Spectrum) -> Vec<BoxElement> {
        let mut window = ScanWindow::new(self.params.integration_rule());
        let mut workspaces = self.new_workspaces();
        self.detect_scan_with(spectrum, &mut window, &mut workspaces)
    }

    fn detect_scan_with(
        &self,
        spectrum: &Spectrum,
        window: &mut ScanWindow,
        workspaces: &mut [ScanWorkspace],
    ) -> Vec<BoxElement> {
        if spectrum.len() < 2 || !spectrum.has_signal() {
            log::debug!("Skipping scan {} with no usable signal", spectrum.index);
            return Vec::new();
        }
        if !window.initialize_scan(spectrum, &self.model) {
            log::debug!("Skipping scan {} with no distinct positions", spectrum.index);
            return Vec::new();
        }
        let window = &*window;

        #[cfg(feature = "parallelism")]
        let per_charge: Vec<Vec<BoxElement>> = workspaces
            .par_iter_mut()
            .enumerate()
            .map(|(c, workspace)| self.detector.detect(window, spectrum, c as i32 + 1, workspace))
            .collect();

        #[cfg(not(feature = "parallelism"))]
        let per_charge: Vec<Vec<BoxElement>> = workspaces
            .iter_mut()
            .enumerate()
            .map(|(c, workspace)| self.detector.detect(window, spectrum, c as i32 + 1, workspace))
            .collect();

        per_charge.into_iter().flatten().collect()
    }

    /// Feed the scans at positions `front..=end` of `source` through `sweep`
    fn sweep_scans<S: SpectrumSource + ?Sized>(
        &self,
        source: &S,
        front: usize,
        end: usize,
        mut sweep: SweepLine,
    ) -> Result<SweepLine, FeatureFinderError> {
        let mut window = ScanWindow::new(self.params.integration_rule());
        let mut workspaces = self.new_workspaces();
        for position in front..=end {
            let elements = match source.get_spectrum_by_index(position) {
                Some(spectrum) => {
                    if spectrum.index != position {
                        return Err(FeatureFinderError::ScanOutOfOrder {
                            position,
                            index: spectrum.index,
                        });
                    }
                    self.detect_scan_with(spectrum, &mut window, &mut workspaces)
                }
                None => {
                    log::warn!("No scan found at position {position}");
                    Vec::new()
                }
            };
            sweep.advance(position, elements);
        }
        Ok(sweep)
    }

    /// Find all features in `source`, processing its scans in order.
    pub fn find_features<S: SpectrumSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Vec<IsotopeFeature>, FeatureFinderError> {
        let n_scans = source.len();
        if n_scans == 0 {
            return Ok(Vec::new());
        }
        log::info!(
            "Searching {n_scans} scans for charges 1 to {}",
            self.params.max_charge
        );
        let sweep = self.sweep_scans(source, 0, n_scans - 1, self.new_sweep_line(n_scans))?;
        Ok(sweep.finalize(&self.materializer, source))
    }

    /// Find all features in `source`, splitting its scans into `n_chunks` contiguous
    /// chunks that are swept independently and then stitched back together.
    pub fn find_features_chunked<S: SpectrumSource + Sync + ?Sized>(
        &self,
        source: &S,
        n_chunks: usize,
    ) -> Result<Vec<IsotopeFeature>, FeatureFinderError> {
        let n_scans = source.len();
        let chunks = ChunkBounds::split(n_scans, n_chunks);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        log::info!("Searching {n_scans} scans in {} chunks", chunks.len());

        let sweep_chunk = |bounds: ChunkBounds| {
            let sweep = self.new_sweep_line(n_scans).with_bounds(bounds);
            self.sweep_scans(source, bounds.front, bounds.end, sweep)
        };

        #[cfg(feature = "parallelism")]
        let sweeps: Result<Vec<SweepLine>, FeatureFinderError> =
            chunks.into_par_iter().map(sweep_chunk).collect();

        #[cfg(not(feature = "parallelism"))]
        let sweeps: Result<Vec<SweepLine>, FeatureFinderError> =
            chunks.into_iter().map(sweep_chunk).collect();

        let combined = sweeps?.into_iter().reduce(SweepLine::stitch);
        Ok(combined
            .map(|sweep| sweep.finalize(&self.materializer, source))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::{eluting_run, eluting_triply_charged_run, isotopic_profile_scan, overlapping_species_run};

    fn params() -> IsotopeWaveletParams {
        IsotopeWaveletParams::default()
            .with_mz_range(400.0, 2000.0)
            .with_max_charge(5)
            .with_rt_interleave(1)
            .with_rt_votes_cutoff(3)
    }

    fn finder() -> IsotopeWaveletFeatureFinder {
        IsotopeWaveletFeatureFinder::new(params()).unwrap()
    }

    fn assert_single_triply_charged(features: &[IsotopeFeature], mono: f64) -> &IsotopeFeature {
        assert_eq!(features.len(), 1, "{features:?}");
        let feature = &features[0];
        assert_eq!(feature.charge, 3);
        assert!((feature.mz - mono).abs() < 0.01, "{}", feature.mz);
        assert_eq!(feature.observations, 4);
        feature
    }

    #[test]
    fn test_invalid_params() {
        let params = IsotopeWaveletParams::default().with_max_charge(0);
        assert!(matches!(
            IsotopeWaveletFeatureFinder::new(params),
            Err(ParamError::InvalidMaxCharge(0))
        ));
    }

    #[test_log::test]
    fn test_find_features() {
        let scans = eluting_triply_charged_run();
        let features = finder().find_features(&scans).unwrap();
        assert_eq!(features.len(), 1, "{features:?}");
        let feature = &features[0];
        assert_eq!(feature.charge, 3);
        assert!((feature.mz - 500.0).abs() < 0.01, "{}", feature.mz);
        assert_eq!(feature.observations, 4);
        assert!(feature.intensity > 0.0);
        assert!(feature.score > 0.0);
        assert!(feature.rt > 10.5 && feature.rt < 12.0);
        let ((rt_lo, mz_lo), (rt_hi, mz_hi)) = feature.hull.bounding_box().unwrap();
        assert_eq!(rt_lo, 10.5);
        assert_eq!(rt_hi, 12.0);
        assert!(mz_lo < 500.0 && mz_hi > 500.0);
    }

    #[test_log::test]
    fn test_high_resolution_mode() {
        let scans = eluting_triply_charged_run();
        let low_res = finder().find_features(&scans).unwrap();
        let low_res = assert_single_triply_charged(&low_res, 500.0);

        let finder = IsotopeWaveletFeatureFinder::new(params().with_high_resolution_mode(true)).unwrap();
        let high_res = finder.find_features(&scans).unwrap();
        let high_res = assert_single_triply_charged(&high_res, 500.0);
        // The plain sum is not scaled by the 0.01 sampling step
        let ratio = high_res.intensity / low_res.intensity;
        assert!(ratio > 50.0 && ratio < 200.0, "{ratio}");
    }

    #[test_log::test]
    fn test_amplitude_cutoff() {
        let scans = eluting_triply_charged_run();
        let reference = finder().find_features(&scans).unwrap();
        let reference = assert_single_triply_charged(&reference, 500.0);
        for cutoff in [0.0, 2.0] {
            let finder = IsotopeWaveletFeatureFinder::new(params().with_amplitude_cutoff(cutoff)).unwrap();
            let features = finder.find_features(&scans).unwrap();
            let feature = assert_single_triply_charged(&features, 500.0);
            assert!((feature.mz - reference.mz).abs() < 1e-4, "{cutoff}");
            assert!((feature.intensity / reference.intensity - 1.0).abs() < 1e-3, "{cutoff}");
        }
    }

    #[test_log::test]
    fn test_check_ppm() {
        let checked = IsotopeWaveletFeatureFinder::new(params().with_check_ppm(true)).unwrap();
        let features = checked.find_features(&eluting_triply_charged_run()).unwrap();
        assert_single_triply_charged(&features, 500.0);

        // A singly charged mass near 1499.19 lies off the peptide mass rule
        assert!(!crate::averagine::passes_mass_rule(500.4, 3));
        let scans = eluting_run(500.4, 3);
        let features = finder().find_features(&scans).unwrap();
        assert_single_triply_charged(&features, 500.4);
        assert!(checked.find_features(&scans).unwrap().is_empty());
    }

    #[test_log::test]
    fn test_only_matching_charge_detected() {
        let finder = finder();
        let scan = isotopic_profile_scan(500.0, 3, 1000.0, 0.01, 0.01, 0, 0.0);
        let found = finder.detect_scan(&scan);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].charge(), 3);
    }

    #[test_log::test]
    fn test_find_features_chunked() {
        let scans = eluting_triply_charged_run();
        let finder = finder();
        let serial = finder.find_features(&scans).unwrap();
        for n_chunks in [1, 2, 3] {
            let chunked = finder.find_features_chunked(&scans, n_chunks).unwrap();
            assert_eq!(chunked.len(), serial.len(), "{n_chunks} chunks: {chunked:?}");
            assert_eq!(chunked[0].charge, serial[0].charge);
            assert_eq!(chunked[0].observations, serial[0].observations);
            assert!((chunked[0].mz - serial[0].mz).abs() < 1e-9);
            assert!((chunked[0].intensity - serial[0].intensity).abs() < 1e-6);
        }
    }

    #[test_log::test]
    fn test_find_features_chunked_overlapping_species() {
        let scans = overlapping_species_run();
        let key = |f: &IsotopeFeature| ((f.mz * 1e4).round() as i64, f.charge, f.observations);
        for rt_interleave in [0, 1, 2] {
            let finder = IsotopeWaveletFeatureFinder::new(params().with_rt_interleave(rt_interleave)).unwrap();
            let serial = finder.find_features(&scans).unwrap();
            assert!(serial.len() >= 3, "{serial:?}");
            for (mono, charge) in [(500.0, 3), (520.0, 2)] {
                assert!(
                    serial.iter().any(|f| f.charge == charge && (f.mz - mono).abs() < 0.02),
                    "{mono} {charge} {serial:?}"
                );
            }
            assert!(serial.windows(2).all(|w| w[0] <= w[1]));
            let expected: Vec<_> = serial.iter().map(key).collect();
            for n_chunks in 2..=7 {
                let chunked = finder.find_features_chunked(&scans, n_chunks).unwrap();
                let found: Vec<_> = chunked.iter().map(key).collect();
                assert_eq!(found, expected, "interleave {rt_interleave}, {n_chunks} chunks");
            }
        }
    }

    #[test]
    fn test_degenerate_scans_skipped() {
        let finder = finder();
        let single = Spectrum::from_arrays(&[500.0], &[100.0], 0.0, 0).unwrap();
        assert!(finder.detect_scan(&single).is_empty());
        let silent = Spectrum::from_arrays(&[500.0, 500.1, 500.2], &[0.0, 0.0, 0.0], 0.0, 0).unwrap();
        assert!(finder.detect_scan(&silent).is_empty());
        let repeated = Spectrum::from_arrays(&[500.0, 500.0], &[10.0, 10.0], 0.0, 0).unwrap();
        assert!(finder.detect_scan(&repeated).is_empty());

        let scans = vec![single, Spectrum::default()];
        let scans: Vec<Spectrum> = scans
            .into_iter()
            .enumerate()
            .map(|(i, mut s)| {
                s.index = i;
                s
            })
            .collect();
        assert!(finder.find_features(&scans).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut scans = eluting_triply_charged_run();
        scans.swap(1, 2);
        let err = finder().find_features(&scans).unwrap_err();
        assert_eq!(err, FeatureFinderError::ScanOutOfOrder { position: 1, index: 2 });
    }
}
