//! The averagine isotope model backing the isotope wavelet.
//!
//! All quantities here are pure functions of mass and charge. [`AveragineModel`]
//! only carries the mass range it was built for and the extremal window sizes
//! derived from it, so it can be shared freely between threads.
use std::f64::consts::PI;

/// The mass difference between consecutive isotopic peaks used by the wavelet, in Daltons
pub const IW_NEUTRON_MASS: f64 = 1.00235;
pub const IW_HALF_NEUTRON_MASS: f64 = IW_NEUTRON_MASS / 2.0;
pub const IW_QUARTER_NEUTRON_MASS: f64 = IW_NEUTRON_MASS / 4.0;

pub const IW_PROTON_MASS: f64 = 1.00727646677;

/// The expected mass defect per Dalton of an averagine peptide
pub const PEPTIDE_MASS_RULE_FACTOR: f64 = 0.000507;
pub const PEPTIDE_MASS_RULE_BOUND: f64 = 1.0 / PEPTIDE_MASS_RULE_FACTOR;
/// The largest PPM deviation from the peptide mass rule a monoisotopic peak may have
pub const PEPTIDE_MASS_RULE_THEO_PPM_BOUND: f64 = 200.0;

/// Intercept and slope of the linear fit of the Poisson isotope parameter against mass
pub const LAMBDA_Q_0: f64 = -0.03091;
pub const LAMBDA_Q_1: f64 = 0.000594;
/// The smallest shape parameter used, keeps `ln(lambda)` finite for tiny masses
pub const MIN_LAMBDA: f64 = 0.01;

pub const MIN_NUM_PEAKS_PER_PATTERN: usize = 3;
/// How many standard deviations of the isotope distribution a pattern spans
pub const PEAK_CUTOFF_SIGMAS: f64 = 2.0;

/// The averagine shape parameter (the mean of the Poisson isotope distribution)
/// for a given mass.
#[inline]
pub fn lambda(mass: f64) -> f64 {
    (LAMBDA_Q_0 + LAMBDA_Q_1 * mass).max(MIN_LAMBDA)
}

/// The number of isotopic peaks expected for a species of mass `mass`
pub fn peak_cutoff_for_mass(mass: f64) -> usize {
    let lam = lambda(mass);
    let cutoff = (lam + PEAK_CUTOFF_SIGMAS * lam.sqrt()).ceil() as usize + 1;
    cutoff.max(MIN_NUM_PEAKS_PER_PATTERN)
}

/// The number of isotopic peaks expected for a pattern whose monoisotopic peak
/// lies at `mz` with charge `charge`.
#[inline]
pub fn peak_cutoff(mz: f64, charge: i32) -> usize {
    peak_cutoff_for_mass(mz * charge as f64)
}

/// The span of the isotopic pattern in charge-scaled units, from the monoisotopic
/// peak to three quarters of a spacing past the last expected peak.
///
/// Divide by the charge to get the m/z width.
pub fn mz_cutoff(mz: f64, charge: i32) -> f64 {
    let n_peaks = peak_cutoff(mz, charge);
    ((n_peaks - 1) as f64 * IW_NEUTRON_MASS + IW_HALF_NEUTRON_MASS + IW_QUARTER_NEUTRON_MASS).ceil()
}

/// Evaluate the isotope wavelet with shape parameter `lam` at the charge-scaled
/// offset `t`, where `t == 1` is the monoisotopic position.
///
/// This is a sine carrier with the isotope spacing as its period, modulated by the
/// continuous Poisson density `exp(-lam) * lam^(t-1) / Gamma(t)`.
#[inline]
pub fn kernel_value(lam: f64, t: f64) -> f64 {
    let x = t - 1.0;
    (2.0 * PI * x / IW_NEUTRON_MASS).sin() * (-lam + x * lam.ln() - ln_gamma(t)).exp()
}

/// The expected intensity ratio between a wavelet-transformed pattern and its
/// raw monoisotopic intensity, `exp(-2 lam) * I0(2 lam)`, the Skellam probability
/// of a zero difference for two Poisson variables with mean `lam`.
#[inline]
pub fn skellam_correction(lam: f64) -> f64 {
    (-2.0 * lam).exp() * bessel_i0(2.0 * lam)
}

/// Modified Bessel function of the first kind, order zero
/// (Abramowitz and Stegun 9.8.1 and 9.8.2).
pub fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let t = (x / 3.75).powi(2);
        1.0 + t
            * (3.5156229
                + t * (3.0899424
                    + t * (1.2067492 + t * (0.2659732 + t * (0.0360768 + t * 0.0045813)))))
    } else {
        let t = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + t * (0.01328592
                    + t * (0.00225319
                        + t * (-0.00157565
                            + t * (0.00916281
                                + t * (-0.02057706
                                    + t * (0.02635537 + t * (-0.01647633 + t * 0.00392377))))))))
    }
}

/// Natural log of the gamma function using the Lanczos approximation. Returns
/// infinity for non-positive arguments.
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.001_208_650_973_866_179,
        -5.395_239_384_953e-6,
    ];

    if x <= 0.0 {
        return f64::INFINITY;
    }

    let z = x - 1.0;
    let mut sum = 0.999_999_999_999_997_1_f64;
    for (i, c) in COEFFS.iter().enumerate() {
        sum += c / (z + 1.0 + i as f64);
    }

    let t = z + 5.5;
    0.5f64.mul_add((2.0 * PI).ln(), (z + 0.5) * t.ln()) - t + sum.ln()
}

/// The monoisotopic mass an averagine peptide with the same nominal mass as
/// `mass` is expected to have.
///
/// The result stays within half a Dalton of the input, undoing the nominal mass
/// shift the mass defect would otherwise introduce at large masses.
pub fn peptide_mass_rule(mass: f64) -> f64 {
    let correction_fac = mass / PEPTIDE_MASS_RULE_BOUND;
    let nominal = mass.trunc();
    let old_frac_mass = mass - nominal;
    let mut new_mass = nominal * (1.0 + PEPTIDE_MASS_RULE_FACTOR) - correction_fac.trunc();
    let new_frac_mass = new_mass - new_mass.trunc();

    if new_frac_mass - old_frac_mass > 0.5 {
        new_mass -= 1.0;
    }
    if new_frac_mass - old_frac_mass < -0.5 {
        new_mass += 1.0;
    }
    new_mass
}

/// The symmetric relative deviation between two masses in parts-per-million
#[inline]
pub fn ppm_deviation(a: f64, b: f64) -> f64 {
    (a - b).abs() / (0.5 * (a + b)) * 1e6
}

/// The mass of the singly protonated species observed at `mz` with charge `charge`
#[inline]
pub fn singly_charged_mass(mz: f64, charge: i32) -> f64 {
    mz * charge as f64 - IW_PROTON_MASS * (charge - 1) as f64
}

/// Whether a peak at `mz` with charge `charge` is within [`PEPTIDE_MASS_RULE_THEO_PPM_BOUND`]
/// of the peptide mass rule.
pub fn passes_mass_rule(mz: f64, charge: i32) -> bool {
    let mass = singly_charged_mass(mz, charge);
    let expected = peptide_mass_rule(mass);
    ppm_deviation(expected, mass) < PEPTIDE_MASS_RULE_THEO_PPM_BOUND
}

/// The averagine model for a bounded m/z range and charge range.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragineModel {
    pub min_mz: f64,
    pub max_mz: f64,
    pub max_charge: i32,
    max_peak_cutoff: usize,
    max_mz_cutoff: f64,
}

impl AveragineModel {
    pub fn new(min_mz: f64, max_mz: f64, max_charge: i32) -> Self {
        let max_peak_cutoff = peak_cutoff(max_mz, max_charge);
        let max_mz_cutoff = mz_cutoff(max_mz, max_charge);
        Self {
            min_mz,
            max_mz,
            max_charge,
            max_peak_cutoff,
            max_mz_cutoff,
        }
    }

    #[inline]
    pub fn peak_cutoff(&self, mz: f64, charge: i32) -> usize {
        peak_cutoff(mz, charge)
    }

    #[inline]
    pub fn mz_cutoff(&self, mz: f64, charge: i32) -> f64 {
        mz_cutoff(mz, charge)
    }

    #[inline]
    pub fn lambda(&self, mz: f64, charge: i32) -> f64 {
        lambda(mz * charge as f64)
    }

    /// The most isotopic peaks any pattern in range can have
    pub fn max_peak_cutoff(&self) -> usize {
        self.max_peak_cutoff
    }

    /// The widest charge-scaled pattern span in range
    pub fn max_mz_cutoff(&self) -> f64 {
        self.max_mz_cutoff
    }

    /// The widest singly charged wavelet support, in m/z
    pub fn max_wavelet_width(&self) -> f64 {
        mz_cutoff(self.max_mz, 1) + IW_QUARTER_NEUTRON_MASS
    }

    /// The range of charge states considered, starting from one
    pub fn charges(&self) -> std::ops::RangeInclusive<i32> {
        1..=self.max_charge
    }
}
