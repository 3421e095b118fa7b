//! Scoring of candidate monoisotopic positions against the alternating
//! peak/valley pattern an isotope envelope leaves in the wavelet transform.
use crate::averagine::{
    mz_cutoff, passes_mass_rule, peak_cutoff, IW_HALF_NEUTRON_MASS, IW_NEUTRON_MASS,
    IW_QUARTER_NEUTRON_MASS,
};
use crate::boxes::BoxElement;
use crate::spectrum::SignalView;
use crate::transform::TransformedSpectrum;

/// The number of sampled positions used to score a pattern with `peak_cutoff` isotopic peaks
#[inline]
pub fn num_score_positions(peak_cutoff: usize) -> usize {
    (4 * (peak_cutoff.max(1) - 1)).saturating_sub(1)
}

/**
Score the isotope pattern of charge `charge` whose monoisotopic peak would lie at `seed_mz`.

The transformed signal is sampled every half isotope spacing across the expected
envelope, alternating between positions where the transform of a real pattern has
a valley and where it has a peak. Valleys are subtracted and peaks added.

A pattern is rejected, scoring zero, unless
1. the sum over the first half of the positions is positive,
2. the second half alone, excluding the midpoint, is positive, and
3. the total without the midpoint exceeds `threshold`.

Positions that cannot be interpolated because they fall at the edge of the signal
are skipped.
*/
pub fn score_pattern<S: SignalView + ?Sized>(
    signal: &S,
    peak_cutoff: usize,
    seed_mz: f64,
    charge: i32,
    threshold: f64,
) -> f64 {
    let n = signal.len() as isize;
    let end = num_score_positions(peak_cutoff);
    if n < 3 || end == 0 {
        return 0.0;
    }
    let z = charge as f64;
    let span = (peak_cutoff - 1) as f64 * IW_NEUTRON_MASS;
    let position = |i: usize| seed_mz - (span - (i + 1) as f64 * IW_HALF_NEUTRON_MASS) / z;

    let mid = end.div_ceil(2);
    let mut c_score = 0.0;
    let mut l_score = 0.0;
    let mut mid_val = 0.0;
    let mut cursor = signal.lower_bound(position(0)) as isize - 1;

    for v in 1..=end {
        let target = position(v - 1);
        loop {
            if cursor < n - 1 {
                cursor += 1;
            } else {
                break;
            }
            if signal.mz_at(cursor as usize) >= target {
                break;
            }
        }
        if cursor <= 0 || cursor >= n - 1 {
            continue;
        }
        let right = cursor as usize;
        let val = signal.interpolate_at(right, target);
        if v == mid {
            l_score = c_score;
            mid_val = val;
        }
        if v % 2 == 1 {
            c_score -= val;
        } else {
            c_score += val;
        }
        cursor -= 1;
    }

    if l_score <= 0.0 || c_score - l_score - mid_val <= 0.0 || c_score - mid_val <= threshold {
        0.0
    } else {
        c_score
    }
}

/// Walk down from position `index` of `signal` towards smaller m/z while the values keep rising
/// (or stay at zero), returning the local maximum reached.
///
/// Returns [`None`] if the climb leaves the window of a quarter isotope spacing
/// below `seed_mz`.
pub fn walk_to_local_maximum<S: SignalView + ?Sized>(
    signal: &S,
    index: usize,
    seed_mz: f64,
    charge: i32,
) -> Option<usize> {
    let window = IW_QUARTER_NEUTRON_MASS / charge as f64;
    let mut h = index;
    let mut best = index;
    while h > 0 {
        h -= 1;
        let (val_h, val_best) = (signal.value_at(h), signal.value_at(best));
        if val_h > val_best || (val_h == val_best && val_best == 0.0) {
            best = h;
        } else {
            break;
        }
        if seed_mz - signal.mz_at(h) > window {
            return None;
        }
    }
    Some(best)
}

/// The first and last positions of `signal` covered by a pattern at `mz` with charge `charge`
pub fn pattern_extent<S: SignalView + ?Sized>(signal: &S, mz: f64, charge: i32) -> (usize, usize) {
    let z = charge as f64;
    let begin = signal.lower_bound(mz - IW_QUARTER_NEUTRON_MASS / z);
    let end = signal
        .upper_bound(mz + mz_cutoff(mz, charge) / z)
        .min(signal.len().saturating_sub(1));
    (begin, end)
}

/**
Verify that the scored position `seed_mz` is backed by a real monoisotopic peak in
the raw scan, and re-score it there.

When `check_ppm` is set, the first raw point at or after `seed_mz` must satisfy the
peptide mass rule. If it doesn't, the nearest raw local maximum below it is tried
instead. Otherwise the seed position is kept, using the raw intensity of the next
point, falling back to the nearest raw local maximum when that intensity is zero.

Returns the accepted observation, carrying `trans_intensity` as its intensity.
*/
pub fn check_position_for_plausibility(
    transformed: &TransformedSpectrum<'_>,
    seed_mz: f64,
    charge: i32,
    check_ppm: bool,
    trans_intensity: f64,
) -> Option<BoxElement> {
    let reference = transformed.reference();
    let n = reference.len();
    let idx = reference.lower_bound(seed_mz);
    if idx == 0 || idx == n {
        return None;
    }

    let (real_mz, real_intensity) = if check_ppm {
        if passes_mass_rule(reference.mz(idx), charge) {
            (reference.mz(idx), reference.intensity(idx))
        } else {
            let h = walk_to_local_maximum(reference, idx, seed_mz, charge)?;
            if !passes_mass_rule(reference.mz(h), charge) {
                log::trace!("{seed_mz:0.4} ({charge}) failed the mass rule check");
                return None;
            }
            (reference.mz(h), reference.intensity(h))
        }
    } else if reference.intensity(idx) > 0.0 {
        (seed_mz, reference.intensity(idx))
    } else {
        let h = walk_to_local_maximum(reference, idx, seed_mz, charge)?;
        let inten = reference.intensity(h);
        if inten <= 0.0 {
            return None;
        }
        (reference.mz(h), inten)
    };

    let score = score_pattern(
        transformed,
        peak_cutoff(seed_mz, charge),
        real_mz,
        charge,
        0.0,
    );
    if score <= 0.0 {
        log::trace!("{seed_mz:0.4} ({charge}) was rejected on re-scoring at {real_mz:0.4}");
        return None;
    }

    let (mz_begin, mz_end) = pattern_extent(reference, real_mz, charge);
    Some(BoxElement {
        mz: real_mz,
        c: (charge - 1) as usize,
        score,
        intensity: trans_intensity,
        ref_intensity: real_intensity,
        rt: reference.rt,
        rt_index: reference.index,
        mz_begin,
        mz_end,
    })
}
