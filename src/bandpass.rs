//! Photometric filter response curves.
//!
//! A [`Bandpass`] stores a normalized response `phi(λ)` on a uniform wavelength
//! grid. Normalization is such that `Σ phi · Δλ = 1`, so integrating an SED
//! against it yields a flux density in the SED's own units.

use std::collections::BTreeMap;

use crate::error::{Result, TrainError};
use crate::numeric::{arange, interp, interp_many};

/// Grid step (Å) used when resampling raw filter throughput curves.
pub const RESAMPLE_STEP_ANGSTROM: f64 = 20.0;

/// Filter id → bandpass. Ordered so iteration is deterministic.
pub type BandpassSet = BTreeMap<String, Bandpass>;

#[derive(Debug, Clone, PartialEq)]
pub struct Bandpass {
    /// Uniform wavelength grid (Å).
    pub wavelen: Vec<f64>,
    /// Normalized photon-weighted response on `wavelen`.
    pub phi: Vec<f64>,
    /// Response-weighted mean wavelength (Å).
    pub eff_wavelen: f64,
}

impl Bandpass {
    /// Build a bandpass from a raw throughput curve, resampled onto a 20 Å grid.
    pub fn from_throughput(wavelen: &[f64], throughput: &[f64]) -> Result<Self> {
        Self::from_throughput_with_step(wavelen, throughput, RESAMPLE_STEP_ANGSTROM)
    }

    /// Build a bandpass from a raw throughput curve, resampled onto a grid of `step` Å.
    ///
    /// `phi = S(λ) / λ`, normalized to unit integral over the resampled grid.
    pub fn from_throughput_with_step(
        wavelen: &[f64],
        throughput: &[f64],
        step: f64,
    ) -> Result<Self> {
        if wavelen.len() != throughput.len() {
            return Err(TrainError::data(format!(
                "bandpass wavelength ({}) and throughput ({}) lengths differ",
                wavelen.len(),
                throughput.len()
            )));
        }
        if wavelen.len() < 2 {
            return Err(TrainError::data("bandpass needs at least two samples"));
        }
        if !(step > 0.0) {
            return Err(TrainError::data("bandpass resample step must be positive"));
        }
        if wavelen.windows(2).any(|w| w[1] <= w[0]) {
            return Err(TrainError::data(
                "bandpass wavelength grid must be strictly increasing",
            ));
        }

        let grid = arange(wavelen[0], wavelen[wavelen.len() - 1], step);
        if grid.len() < 2 {
            return Err(TrainError::data(format!(
                "bandpass spans less than two {step} Å steps"
            )));
        }
        let sb = interp_many(&grid, wavelen, throughput);
        let mut phi: Vec<f64> = sb.iter().zip(&grid).map(|(s, l)| s / l).collect();

        let norm: f64 = phi.iter().sum::<f64>() * step;
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(TrainError::data("bandpass throughput integrates to zero"));
        }
        phi.iter_mut().for_each(|p| *p /= norm);

        let eff_wavelen = effective_wavelength(&grid, &phi);
        Ok(Self {
            wavelen: grid,
            phi,
            eff_wavelen,
        })
    }

    /// Top-hat filter between `lo` and `hi` Å, handy for synthetic photometry.
    ///
    /// The curve is padded past `hi` so the resampled grid, which stops short
    /// of the last raw sample, still ends on zero throughput.
    pub fn top_hat(lo: f64, hi: f64) -> Result<Self> {
        let step = RESAMPLE_STEP_ANGSTROM;
        let wavelen = [lo - step, lo, hi, hi + step, hi + 2.0 * step];
        let throughput = [0.0, 1.0, 1.0, 0.0, 0.0];
        Self::from_throughput(&wavelen, &throughput)
    }

    /// Normalized response at `lambda`; zero outside the filter's grid.
    pub fn response(&self, lambda: f64) -> f64 {
        match (self.wavelen.first(), self.wavelen.last()) {
            (Some(&lo), Some(&hi)) if lambda >= lo && lambda <= hi => {
                interp(lambda, &self.wavelen, &self.phi)
            }
            _ => 0.0,
        }
    }

    /// Spacing of the (uniform) wavelength grid.
    pub fn step(&self) -> f64 {
        match self.wavelen.as_slice() {
            [a, b, ..] => b - a,
            _ => 0.0,
        }
    }
}

fn effective_wavelength(wavelen: &[f64], phi: &[f64]) -> f64 {
    let num: f64 = wavelen.iter().zip(phi).map(|(l, p)| l * p).sum();
    let den: f64 = phi.iter().sum();
    num / den
}

/// Effective wavelengths of the requested filters, in order.
pub fn eff_wavelengths(bandpasses: &BandpassSet, filters: &[String]) -> Result<Vec<f64>> {
    filters
        .iter()
        .map(|name| {
            bandpasses
                .get(name)
                .map(|b| b.eff_wavelen)
                .ok_or_else(|| TrainError::data(format!("unknown filter '{name}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phi_is_normalized() {
        let bp = Bandpass::top_hat(4000.0, 5000.0).unwrap();
        let integral: f64 = bp.phi.iter().sum::<f64>() * bp.step();
        assert!((integral - 1.0).abs() < 1e-12);
        assert!((bp.step() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_eff_wavelen_inside_top_hat() {
        let bp = Bandpass::top_hat(4000.0, 5000.0).unwrap();
        // phi ∝ 1/λ biases the mean slightly blueward of the midpoint
        assert!(bp.eff_wavelen > 4400.0 && bp.eff_wavelen < 4500.0);
    }

    #[test]
    fn test_top_hat_returns_to_zero_at_both_ends() {
        let bp = Bandpass::top_hat(4000.0, 5000.0).unwrap();
        assert_eq!(bp.phi[0], 0.0);
        assert_eq!(bp.phi[bp.phi.len() - 1], 0.0);
        assert!(bp.wavelen[bp.wavelen.len() - 1] > 5000.0);
        assert!(bp.response(4500.0) > 0.0);
        assert_eq!(bp.response(3000.0), 0.0);
        assert_eq!(bp.response(8000.0), 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Bandpass::from_throughput(&[1.0, 2.0], &[1.0]).is_err());
        assert!(Bandpass::from_throughput(&[1.0], &[1.0]).is_err());
        assert!(Bandpass::from_throughput(&[4000.0, 5000.0], &[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_eff_wavelengths_unknown_filter() {
        let mut set = BandpassSet::new();
        set.insert("g".to_string(), Bandpass::top_hat(4000.0, 5000.0).unwrap());
        assert!(eff_wavelengths(&set, &["g".to_string()]).is_ok());
        assert!(eff_wavelengths(&set, &["r".to_string()]).is_err());
    }
}
