//! Conversion of closed isotope pattern tracks into reported features.
use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;

use mzpeaks::{CoordinateLike, IntensityMeasurement, KnownCharge, Time, MZ};

use crate::averagine::{lambda, mz_cutoff, peak_cutoff, skellam_correction, IW_NEUTRON_MASS, IW_QUARTER_NEUTRON_MASS};
use crate::boxes::{BoxElement, BoxPool, IsotopeBox};
use crate::params::ParamError;
use crate::spectrum::{SignalView, Spectrum, SpectrumSource};

/// How the intensity of a feature is reported
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntensityType {
    /// The mean transformed intensity, divided by the expected ratio between the transform
    /// and the raw signal for a pattern of that mass and charge
    #[default]
    Corrected,
    /// The summed raw intensity of every isotopic peak of every observation
    Reference,
    /// The mean transformed intensity
    Transformed,
}

impl Display for IntensityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntensityType::Corrected => "corrected",
            IntensityType::Reference => "ref",
            IntensityType::Transformed => "trans",
        };
        f.write_str(s)
    }
}

impl FromStr for IntensityType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corrected" => Ok(Self::Corrected),
            "ref" | "reference" => Ok(Self::Reference),
            "trans" | "transformed" => Ok(Self::Transformed),
            _ => Err(ParamError::UnknownIntensityType(s.to_string())),
        }
    }
}

/// A convex polygon in the (retention time, m/z) plane, vertices in counter-clockwise order.
///
/// Degenerate hulls are kept as they are: a single point, or a two point segment.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexHull2D {
    pub points: Vec<(f64, f64)>,
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

impl ConvexHull2D {
    /// Compute the hull of `points` with the monotone chain algorithm. Collinear points
    /// along an edge are dropped.
    pub fn from_points(mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        points.dedup();
        if points.len() < 3 {
            return Self { points };
        }

        let mut lower: Vec<(f64, f64)> = Vec::with_capacity(points.len());
        for p in points.iter().copied() {
            while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
                lower.pop();
            }
            lower.push(p);
        }
        let mut upper: Vec<(f64, f64)> = Vec::with_capacity(points.len());
        for p in points.iter().rev().copied() {
            while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
                upper.pop();
            }
            upper.push(p);
        }
        lower.pop();
        upper.pop();
        lower.extend(upper);
        Self { points: lower }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The smallest (retention time, m/z) rectangle enclosing the hull
    pub fn bounding_box(&self) -> Option<((f64, f64), (f64, f64))> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), p| {
            ((lo.0.min(p.0), lo.1.min(p.1)), (hi.0.max(p.0), hi.1.max(p.1)))
        }))
    }
}

/// A charge-resolved isotope pattern persisting over consecutive scans
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopeFeature {
    /// The monoisotopic m/z
    pub mz: f64,
    pub intensity: f64,
    pub rt: f64,
    pub charge: i32,
    /// The mean pattern score
    pub score: f64,
    pub hull: ConvexHull2D,
    /// The number of observations of the pattern, across all charges
    pub observations: usize,
}

impl PartialOrd for IsotopeFeature {
    /// Features are ordered by m/z, then by retention time
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.mz.partial_cmp(&other.mz)? {
            Ordering::Equal => self.rt.partial_cmp(&other.rt),
            ord => Some(ord),
        }
    }
}

impl CoordinateLike<MZ> for IsotopeFeature {
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl CoordinateLike<Time> for IsotopeFeature {
    fn coordinate(&self) -> f64 {
        self.rt
    }
}

impl IntensityMeasurement for IsotopeFeature {
    fn intensity(&self) -> f32 {
        self.intensity as f32
    }
}

impl KnownCharge for IsotopeFeature {
    fn charge(&self) -> i32 {
        self.charge
    }
}

/// Tally the votes for each zero-based charge in `elements`, returning the
/// intensity-weighted votes and the observation counts.
pub fn charge_votes(elements: &[BoxElement], max_charge: usize) -> (Vec<f64>, Vec<usize>) {
    let mut votes = vec![0.0; max_charge];
    let mut counts = vec![0usize; max_charge];
    for e in elements {
        if let (Some(v), Some(c)) = (votes.get_mut(e.c), counts.get_mut(e.c)) {
            *v += e.intensity;
            *c += 1;
        }
    }
    (votes, counts)
}

/// The zero-based charge with the strictly largest positive intensity-weighted vote,
/// the lowest charge winning ties.
pub fn winning_charge(votes: &[f64]) -> usize {
    let mut best = 0;
    let mut best_score = 0.0;
    for (i, v) in votes.iter().copied().enumerate() {
        if v > best_score {
            best = i;
            best_score = v;
        }
    }
    best
}

/// Sum the raw intensity of each expected isotopic peak of a pattern at `mz`, snapping
/// each expected position to the most intense raw point within a quarter isotope
/// spacing of it.
pub fn reference_pattern_intensity(spectrum: &Spectrum, mz: f64, charge: i32) -> f64 {
    let z = charge as f64;
    let window = IW_QUARTER_NEUTRON_MASS / z;
    let n = spectrum.len();
    let mut total = 0.0;
    for i in 0..peak_cutoff(mz, charge) {
        let position = mz + i as f64 * IW_NEUTRON_MASS / z;
        let mut best = spectrum.lower_bound(position);
        if best == n {
            continue;
        }
        let mut h = spectrum.lower_bound(position + window);
        while h > 0 {
            h -= 1;
            let (val_h, val_best) = (spectrum.intensity(h), spectrum.intensity(best));
            if val_h > val_best || (val_h == val_best && val_best == 0.0) {
                best = h;
            }
            if position - spectrum.mz(h) > window {
                break;
            }
        }
        total += spectrum.intensity(best);
    }
    total
}

/// Turns closed isotope pattern tracks into [`IsotopeFeature`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMaterializer {
    pub max_charge: i32,
    pub rt_votes_cutoff: usize,
    pub intensity_type: IntensityType,
}

impl FeatureMaterializer {
    pub fn new(max_charge: i32, rt_votes_cutoff: usize, intensity_type: IntensityType) -> Self {
        Self {
            max_charge,
            rt_votes_cutoff,
            intensity_type,
        }
    }

    /// Build a feature from every box in `closed`, sorted by m/z then retention time,
    /// skipping boxes whose winning charge was observed in fewer than `rt_votes_cutoff`
    /// scans. The cutoff is only applied when `source` has at least that many scans.
    pub fn materialize<S: SpectrumSource + ?Sized>(&self, closed: &BoxPool, source: &S) -> Vec<IsotopeFeature> {
        let n_scans = source.len();
        let mut features: Vec<_> = closed
            .iter()
            .filter_map(|(_, b)| self.materialize_box(b, n_scans, source))
            .collect();
        log::debug!(
            "Materialized {} features from {} closed boxes",
            features.len(),
            closed.len()
        );
        features.sort_by(|a, b| a.mz.total_cmp(&b.mz).then(a.rt.total_cmp(&b.rt)));
        features
    }

    /// Build a feature from a single box, or [`None`] if its winning charge has too few votes
    pub fn materialize_box<S: SpectrumSource + ?Sized>(
        &self,
        isotope_box: &IsotopeBox,
        n_scans: usize,
        source: &S,
    ) -> Option<IsotopeFeature> {
        if isotope_box.is_empty() {
            return None;
        }
        let elements = isotope_box.as_slice();
        let (votes, counts) = charge_votes(elements, self.max_charge.max(1) as usize);
        let best = winning_charge(&votes);
        if counts[best] == 0 {
            log::trace!("Rejecting box without a positive charge vote");
            return None;
        }
        if counts[best] < self.rt_votes_cutoff && self.rt_votes_cutoff <= n_scans {
            log::trace!(
                "Rejecting box with {} votes for charge {}",
                counts[best],
                best + 1
            );
            return None;
        }
        let charge = best as i32 + 1;
        let z = charge as f64;

        let winners = || elements.iter().filter(|e| e.c == best);
        let n_winners = counts[best] as f64;
        let intensity_sum: f64 = winners().map(|e| e.intensity).sum();
        let mz = if intensity_sum != 0.0 {
            winners().map(|e| e.mz * e.intensity).sum::<f64>() / intensity_sum
        } else {
            winners().map(|e| e.mz).sum::<f64>() / n_winners
        };
        let score = winners().map(|e| e.score).sum::<f64>() / n_winners;
        let rt = elements.iter().map(|e| e.rt).sum::<f64>() / elements.len() as f64;

        let mut points = Vec::with_capacity(elements.len() * 2);
        for e in elements {
            points.push((e.rt, e.mz - IW_QUARTER_NEUTRON_MASS / z));
            points.push((e.rt, e.mz + mz_cutoff(e.mz, charge) / z));
        }
        let hull = ConvexHull2D::from_points(points);

        let mean_intensity = intensity_sum / n_winners;
        let intensity = match self.intensity_type {
            IntensityType::Corrected => mean_intensity / skellam_correction(lambda(mz * z)),
            IntensityType::Transformed => mean_intensity,
            IntensityType::Reference => winners()
                .filter_map(|e| {
                    source
                        .get_spectrum_by_index(e.rt_index)
                        .map(|spec| reference_pattern_intensity(spec, e.mz, charge))
                })
                .sum(),
        };

        Some(IsotopeFeature {
            mz,
            intensity,
            rt,
            charge,
            score,
            hull,
            observations: elements.len(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::isotopic_profile_scan;

    fn element(mz: f64, c: usize, rt_index: usize, intensity: f64) -> BoxElement {
        BoxElement {
            mz,
            c,
            score: 2.0,
            intensity,
            ref_intensity: intensity,
            rt: 10.0 + rt_index as f64,
            rt_index,
            ..Default::default()
        }
    }

    #[test]
    fn test_charge_vote() {
        let elements = [
            element(500.0, 0, 0, 10.0),
            element(500.0, 1, 1, 7.0),
            element(500.0, 1, 2, 7.0),
        ];
        let (votes, counts) = charge_votes(&elements, 3);
        assert_eq!(votes, vec![10.0, 14.0, 0.0]);
        assert_eq!(counts, vec![1, 2, 0]);
        assert_eq!(winning_charge(&votes), 1);

        let b: IsotopeBox = elements.into_iter().collect();
        let materializer = FeatureMaterializer::new(3, 2, IntensityType::Transformed);
        let spectra: Vec<Spectrum> = Vec::new();
        let feature = materializer.materialize_box(&b, 10, &spectra).unwrap();
        assert_eq!(feature.charge, 2);
        assert_eq!(feature.intensity, 7.0);
        assert_eq!(feature.rt, 11.0);
        assert_eq!(feature.observations, 3);

        let strict = FeatureMaterializer::new(3, 3, IntensityType::Transformed);
        assert!(strict.materialize_box(&b, 10, &spectra).is_none());
        assert!(strict.materialize_box(&b, 2, &spectra).is_some());
    }

    #[test]
    fn test_no_positive_vote() {
        // Only charge 2 was observed, with a negative transformed intensity, so the
        // default winner, charge 1, has no observations behind it
        let mut b = IsotopeBox::from_element(element(500.0, 1, 0, -4.0));
        b.push(element(500.001, 1, 1, -2.0));
        let materializer = FeatureMaterializer::new(3, 5, IntensityType::Corrected);
        let spectra: Vec<Spectrum> = Vec::new();
        assert!(materializer.materialize_box(&b, 2, &spectra).is_none());

        let mut closed = BoxPool::default();
        closed.insert(500.0, b);
        assert!(materializer.materialize(&closed, &spectra).is_empty());
    }

    #[test]
    fn test_feature_ordering() {
        let at = |mz: f64, rt: f64| IsotopeFeature {
            mz,
            rt,
            charge: 2,
            ..Default::default()
        };
        let mut features = vec![at(600.0, 12.0), at(500.0, 15.0), at(600.0, 11.0), at(450.0, 20.0)];
        features.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let order: Vec<(f64, f64)> = features.iter().map(|f| (f.mz, f.rt)).collect();
        assert_eq!(order, vec![(450.0, 20.0), (500.0, 15.0), (600.0, 11.0), (600.0, 12.0)]);
        assert_eq!(CoordinateLike::<MZ>::coordinate(&features[0]), 450.0);
        assert_eq!(CoordinateLike::<Time>::coordinate(&features[0]), 20.0);
        assert!(at(500.0, 1.0) < at(500.0, 2.0));
        assert!(at(f64::NAN, 1.0).partial_cmp(&at(500.0, 1.0)).is_none());
    }

    #[test]
    fn test_single_scan_hull() {
        let e = element(500.0, 2, 4, 20.0);
        let b = IsotopeBox::from_element(e);
        let materializer = FeatureMaterializer::new(5, 1, IntensityType::Corrected);
        let spectra: Vec<Spectrum> = Vec::new();
        let feature = materializer.materialize_box(&b, 10, &spectra).unwrap();
        assert_eq!(feature.charge, 3);
        let expected = vec![
            (e.rt, 500.0 - IW_QUARTER_NEUTRON_MASS / 3.0),
            (e.rt, 500.0 + mz_cutoff(500.0, 3) / 3.0),
        ];
        assert_eq!(feature.hull.points, expected);
        let correction = skellam_correction(lambda(1500.0));
        assert!((feature.intensity - 20.0 / correction).abs() < 1e-9);
        assert!(feature.intensity > 20.0);
    }

    #[test]
    fn test_hull() {
        let hull = ConvexHull2D::from_points(vec![
            (0.0, 0.0),
            (1.0, 1.0),
            (2.0, 0.0),
            (1.0, 0.5),
            (2.0, 2.0),
            (0.0, 2.0),
            (1.0, 0.0),
        ]);
        assert_eq!(hull.points, vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        assert_eq!(hull.bounding_box(), Some(((0.0, 0.0), (2.0, 2.0))));

        let collinear = ConvexHull2D::from_points(vec![(1.0, 3.0), (1.0, 1.0), (1.0, 2.0)]);
        assert_eq!(collinear.points, vec![(1.0, 1.0), (1.0, 3.0)]);
        assert!(ConvexHull2D::default().bounding_box().is_none());
    }

    #[test]
    fn test_reference_intensity() {
        let scan = isotopic_profile_scan(500.0, 3, 1000.0, 0.01, 0.01, 0, 0.0);
        let total = reference_pattern_intensity(&scan, 500.0, 3);
        let lam = lambda(1500.0);
        let expected = 1000.0 * (1.0 + lam + lam.powi(2) / 2.0 + lam.powi(3) / 6.0);
        // The sampling grid misses the peak apices slightly
        assert!(total < expected && total / expected > 0.9, "{total} {expected}");
    }

    #[test]
    fn test_intensity_type_names() {
        for t in [IntensityType::Corrected, IntensityType::Reference, IntensityType::Transformed] {
            assert_eq!(t.to_string().parse::<IntensityType>().unwrap(), t);
        }
        assert_eq!(
            "bogus".parse::<IntensityType>(),
            Err(ParamError::UnknownIntensityType("bogus".to_string()))
        );
    }
}
