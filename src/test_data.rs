//! Synthetic scans shared by the unit tests
use crate::averagine::{lambda, IW_NEUTRON_MASS};
use crate::spectrum::Spectrum;

/// A profile scan with evenly spaced points from `lo` to `hi`, all at `intensity`
pub fn uniform_scan(lo: f64, hi: f64, step: f64, intensity: f32, index: usize) -> Spectrum {
    let mzs = grid(lo, hi, step);
    let intensities = vec![intensity; mzs.len()];
    Spectrum::from_arrays(&mzs, &intensities, index as f64, index).unwrap()
}

fn add_isotopic_pattern(mzs: &[f64], intensities: &mut [f64], mono: f64, charge: i32, height: f64, sigma: f64) {
    let lam = lambda(mono * charge as f64);
    let mut relative = 1.0;
    for k in 0..4 {
        if k > 0 {
            relative *= lam / k as f64;
        }
        let center = mono + k as f64 * IW_NEUTRON_MASS / charge as f64;
        let peak_height = height * relative;
        for (mz, inten) in mzs.iter().zip(intensities.iter_mut()) {
            *inten += peak_height * (-0.5 * ((mz - center) / sigma).powi(2)).exp();
        }
    }
}

fn grid(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    let n = ((hi - lo) / step).round() as usize + 1;
    (0..n).map(|i| lo + i as f64 * step).collect()
}

/// A profile scan spanning three m/z units either side of `mono` holding a
/// Gaussian-shaped, four peak averagine isotope pattern whose monoisotopic peak
/// is `height` tall.
pub fn isotopic_profile_scan(
    mono: f64,
    charge: i32,
    height: f64,
    step: f64,
    sigma: f64,
    index: usize,
    rt: f64,
) -> Spectrum {
    let mzs = grid(mono - 3.0, mono + 3.0, step);
    let mut intensities = vec![0.0f64; mzs.len()];
    add_isotopic_pattern(&mzs, &mut intensities, mono, charge, height, sigma);
    let intensities: Vec<f32> = intensities.into_iter().map(|i| i as f32).collect();
    Spectrum::from_arrays(&mzs, &intensities, rt, index).unwrap()
}

/// Five scans of a pattern at `mono` and `charge` that is absent from the first
/// scan, then rises and falls.
pub fn eluting_run(mono: f64, charge: i32) -> Vec<Spectrum> {
    [0.0, 0.5, 1.0, 0.8, 0.4]
        .into_iter()
        .enumerate()
        .map(|(i, scale)| {
            isotopic_profile_scan(mono, charge, 1000.0 * scale, 0.01, 0.01, i, 10.0 + 0.5 * i as f64)
        })
        .collect()
}

/// Five scans of a triply charged pattern at m/z 500 that is absent from the
/// first scan, then rises and falls.
pub fn eluting_triply_charged_run() -> Vec<Spectrum> {
    eluting_run(500.0, 3)
}

/// Fourteen scans over m/z 497 to 550 in which three patterns elute with
/// overlapping profiles: a triply charged one at 500 in scans 1 to 9, a doubly
/// charged one at 520 in scans 4 to 12 that drops out of scan 7, and a singly
/// charged one at 545 in scans 10 to 13.
pub fn overlapping_species_run() -> Vec<Spectrum> {
    const SPECIES: [(f64, i32, [f64; 14]); 3] = [
        (500.0, 3, [0.0, 0.3, 0.6, 0.9, 1.0, 1.0, 0.9, 0.7, 0.5, 0.3, 0.0, 0.0, 0.0, 0.0]),
        (520.0, 2, [0.0, 0.0, 0.0, 0.0, 0.4, 0.8, 1.0, 0.0, 0.9, 0.8, 0.6, 0.4, 0.3, 0.0]),
        (545.0, 1, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5, 1.0, 0.7, 0.4]),
    ];
    let mzs = grid(497.0, 550.0, 0.01);
    (0..14)
        .map(|i| {
            let mut intensities = vec![0.0f64; mzs.len()];
            for (mono, charge, profile) in SPECIES.iter() {
                if profile[i] > 0.0 {
                    add_isotopic_pattern(&mzs, &mut intensities, *mono, *charge, 1000.0 * profile[i], 0.01);
                }
            }
            let intensities: Vec<f32> = intensities.into_iter().map(|v| v as f32).collect();
            Spectrum::from_arrays(&mzs, &intensities, 10.0 + 0.5 * i as f64, i).unwrap()
        })
        .collect()
}
