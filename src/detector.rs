//! Per-scan, per-charge detection of candidate isotope patterns.
use std::mem;

use crate::averagine::{mz_cutoff, peak_cutoff, IW_HALF_NEUTRON_MASS, IW_NEUTRON_MASS, IW_QUARTER_NEUTRON_MASS};
use crate::boxes::{BoxElement, BoxPool};
use crate::scoring::{check_position_for_plausibility, score_pattern};
use crate::spectrum::{SignalView, Spectrum};
use crate::transform::{IntegrationRule, ScanWindow, TransformedSpectrum};

/// Scratch buffers for detecting candidates in one scan for one charge at a time.
///
/// A workspace is owned by a single worker and reused from one (scan, charge) pair
/// to the next so that its buffers are only grown, never reallocated per scan.
#[derive(Debug, Default, Clone)]
pub struct ScanWorkspace {
    transform_buffer: Vec<f64>,
    diffed: Vec<f64>,
    order: Vec<usize>,
    processed: Vec<bool>,
    tmp_boxes: BoxPool,
}

impl ScanWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a workspace whose buffers can hold scans of up to `size` points without growing
    pub fn with_capacity(size: usize) -> Self {
        Self {
            transform_buffer: Vec::with_capacity(size),
            diffed: Vec::with_capacity(size),
            order: Vec::with_capacity(size),
            processed: Vec::with_capacity(size),
            tmp_boxes: BoxPool::new(),
        }
    }

    /// The seed clusters pushed since the last call to [`CandidateDetector::cluster_seeds`]
    pub fn pending_seeds(&self) -> &BoxPool {
        &self.tmp_boxes
    }
}

/// The averaged m/z, intensity and score of one cluster of seeds
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeedCluster {
    mz: f64,
    intensity: f64,
    score: f64,
}

/**
Finds the monoisotopic positions of isotope patterns of a given charge in a single
scan.

Detection proceeds in stages:
1. The wavelet transform is suppressed everywhere except at local maxima (and in
   low resolution mode, wherever it exceeds the raw signal).
2. Maxima are visited in decreasing order of transformed intensity and scored,
   masking out the extent of each visited pattern so it is not visited again.
   Accepted seeds are pooled along with helper points one isotope spacing to
   either side of them.
3. The pooled points are clustered by m/z and the cluster profile is searched for
   local maxima, which are checked for plausibility against the raw scan.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateDetector {
    pub max_charge: i32,
    /// Multiplier of the standard deviation of the transform used as a seeding threshold,
    /// or a negative value to seed from every positive maximum
    pub amplitude_cutoff: f64,
    pub check_ppm: bool,
    pub rule: IntegrationRule,
}

impl CandidateDetector {
    pub fn new(max_charge: i32, amplitude_cutoff: f64, check_ppm: bool, rule: IntegrationRule) -> Self {
        Self {
            max_charge,
            amplitude_cutoff,
            check_ppm,
            rule,
        }
    }

    /// The largest m/z difference at which two seeds are pooled together
    #[inline]
    pub fn seed_distance(&self) -> f64 {
        IW_HALF_NEUTRON_MASS / self.max_charge as f64
    }

    /// Transform `spectrum` for charge `charge` and detect candidates in it.
    ///
    /// `window` must have been initialized for `spectrum`.
    pub fn detect(
        &self,
        window: &ScanWindow,
        spectrum: &Spectrum,
        charge: i32,
        workspace: &mut ScanWorkspace,
    ) -> Vec<BoxElement> {
        let buffer = mem::take(&mut workspace.transform_buffer);
        let transformed = window.transform_into(spectrum, charge, buffer);
        self.identify_charge(&transformed, charge, workspace);
        let found = self.cluster_seeds(&transformed, charge, workspace);
        workspace.transform_buffer = transformed.into_buffer();
        log::trace!(
            "Found {} candidates with charge {charge} in scan {}",
            found.len(),
            spectrum.index
        );
        found
    }

    /// The seeding threshold for a transformed scan, the mean plus `amplitude_cutoff`
    /// standard deviations of its non-negative values.
    pub fn seeding_threshold(&self, transformed: &TransformedSpectrum<'_>) -> f64 {
        if self.amplitude_cutoff < 0.0 {
            return 0.0;
        }
        let values = transformed.intensities();
        let n = values.len() as f64;
        let mean = values.iter().filter(|v| **v >= 0.0).sum::<f64>() / n;
        let var = values
            .iter()
            .filter(|v| **v >= 0.0)
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        self.amplitude_cutoff * var.sqrt() + mean
    }

    fn suppress_non_maxima(&self, transformed: &TransformedSpectrum<'_>, diffed: &mut Vec<f64>) {
        let n = transformed.len();
        diffed.clear();
        diffed.extend_from_slice(transformed.intensities());
        diffed[0] = 0.0;
        diffed[n - 1] = 0.0;
        let low_res = self.rule == IntegrationRule::Trapezoid;
        for i in 0..n - 2 {
            let share = transformed[i + 1];
            let bwd = (share - transformed[i]) / (transformed.mz_at(i + 1) - transformed.mz_at(i));
            let fwd = (transformed[i + 2] - share) / (transformed.mz_at(i + 2) - transformed.mz_at(i + 1));
            if !(bwd >= 0.0 && fwd <= 0.0) || (low_res && share > transformed.ref_intensity(i + 1)) {
                diffed[i + 1] = 0.0;
            }
        }
    }

    /// Score the local maxima of `transformed` and pool the accepted seeds and
    /// their helper points in `workspace` for [`CandidateDetector::cluster_seeds`].
    pub fn identify_charge(
        &self,
        transformed: &TransformedSpectrum<'_>,
        charge: i32,
        workspace: &mut ScanWorkspace,
    ) {
        let n = transformed.len();
        if n < 3 {
            return;
        }
        let z = charge as f64;
        let c = (charge - 1) as usize;
        let reference = transformed.reference();
        let seed_distance = self.seed_distance();

        self.suppress_non_maxima(transformed, &mut workspace.diffed);
        let diffed = &workspace.diffed;

        workspace.order.clear();
        workspace.order.extend(0..n);
        workspace
            .order
            .sort_by(|a, b| diffed[*b].total_cmp(&diffed[*a]));

        let threshold = self.seeding_threshold(transformed);

        workspace.processed.clear();
        workspace.processed.resize(n, false);

        for &i in workspace.order.iter() {
            let seed_intensity = diffed[i];
            if seed_intensity <= 0.0 || (self.amplitude_cutoff >= 0.0 && seed_intensity < threshold) {
                break;
            }
            let seed_mz = transformed.mz_at(i);
            let seed_index = transformed.lower_bound(seed_mz);
            if seed_index == n || workspace.processed[seed_index] {
                continue;
            }

            let cutoff = mz_cutoff(seed_mz, charge);
            let start = transformed.lower_bound(seed_mz - IW_QUARTER_NEUTRON_MASS / z);
            let mut end = transformed.upper_bound(seed_mz + cutoff / z);
            if end == n {
                end -= 1;
            }
            workspace.processed[start..=end].fill(true);

            let score = score_pattern(transformed, peak_cutoff(seed_mz, charge), seed_mz, charge, threshold);
            if score <= 0.0 {
                continue;
            }

            let template = BoxElement {
                mz: seed_mz,
                c,
                score,
                intensity: seed_intensity,
                ref_intensity: reference.intensity(i),
                rt: reference.rt,
                rt_index: reference.index,
                mz_begin: start,
                mz_end: end,
            };
            workspace.tmp_boxes.insert_or_merge(template, seed_distance);

            for direction in [-1.0, 1.0] {
                let help_mz = seed_mz + direction * IW_NEUTRON_MASS / z;
                let j = transformed.lower_bound(help_mz);
                if j == n || j == 0 {
                    break;
                }
                let found_mz = transformed.mz_at(j);
                if (found_mz - seed_mz).abs() > 0.5 * IW_NEUTRON_MASS / z {
                    let helper = BoxElement {
                        mz: found_mz,
                        score: 0.0,
                        intensity: transformed.interpolate_at(j, help_mz),
                        ref_intensity: reference.intensity(j),
                        ..template
                    };
                    workspace.tmp_boxes.insert_or_merge(helper, seed_distance);
                }
            }
        }
    }

    /// Collapse each pooled cluster of seeds and helpers to a single point, find the
    /// local maxima of the resulting profile, and keep those that pass the
    /// plausibility check.
    ///
    /// The pooled seeds are consumed, so calling this again without identifying
    /// new seeds yields nothing.
    pub fn cluster_seeds(
        &self,
        transformed: &TransformedSpectrum<'_>,
        charge: i32,
        workspace: &mut ScanWorkspace,
    ) -> Vec<BoxElement> {
        let pool = mem::take(&mut workspace.tmp_boxes);
        let clusters: Vec<SeedCluster> = pool.iter().map(|(_, b)| summarize_cluster(b.as_slice())).collect();
        let mut accepted = Vec::new();

        let n = clusters.len();
        if n == 0 {
            return accepted;
        }

        let mut bwd = vec![0.0; n];
        for i in 1..n {
            bwd[i] = (clusters[i].intensity - clusters[i - 1].intensity)
                / (clusters[i].mz - clusters[i - 1].mz);
        }

        let mut i = 0;
        while i + 1 < n {
            while i + 1 < n && clusters[i].score <= 0.0 {
                i += 1;
            }
            if i + 1 >= n {
                break;
            }
            if bwd[i] > 0.0 && bwd[i + 1] < 0.0 {
                let cluster = &clusters[i];
                if let Some(element) = check_position_for_plausibility(
                    transformed,
                    cluster.mz,
                    charge,
                    self.check_ppm,
                    cluster.intensity,
                ) {
                    accepted.push(element);
                }
            }
            i += 1;
        }
        accepted
    }
}

/// Average a cluster over its scored points if it has any, and over its helper
/// points otherwise. m/z is weighted by absolute intensity.
fn summarize_cluster(elements: &[BoxElement]) -> SeedCluster {
    let scored = elements.iter().filter(|e| e.is_scored()).count();
    let use_scored = scored > 0;
    let members = || elements.iter().filter(move |e| e.is_scored() == use_scored);
    let count = members().count() as f64;

    let intensity = members().map(|e| e.intensity).sum::<f64>() / count;
    let score = if use_scored {
        members().map(|e| e.score).sum::<f64>() / count
    } else {
        0.0
    };
    let weight: f64 = members().map(|e| e.intensity.abs()).sum();
    let mz = if weight > 0.0 {
        members().map(|e| e.mz * e.intensity.abs()).sum::<f64>() / weight
    } else {
        members().map(|e| e.mz).sum::<f64>() / count
    };
    SeedCluster { mz, intensity, score }
}
