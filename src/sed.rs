//! Spectral energy distributions and synthetic photometry.

use rkyv::{Archive, Deserialize, Serialize};

use crate::bandpass::{Bandpass, BandpassSet};
use crate::error::{Result, TrainError};
use crate::numeric::interp;

/// A rest-frame SED: flux density `flambda` sampled on a strictly increasing
/// wavelength grid (Å).
///
/// The grid is fixed once the SED is built; training only ever mutates the
/// flux values.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Sed {
    wavelen: Vec<f64>,
    flambda: Vec<f64>,
}

impl Sed {
    pub fn new(wavelen: Vec<f64>, flambda: Vec<f64>) -> Result<Self> {
        check_grid(&wavelen, &flambda)?;
        Ok(Self { wavelen, flambda })
    }

    /// Re-run the constructor checks on an SED built some other way
    /// (e.g. deserialized).
    pub(crate) fn validated(self) -> Result<Self> {
        check_grid(&self.wavelen, &self.flambda)?;
        Ok(self)
    }

    #[cfg(test)]
    pub(crate) fn from_raw_parts(wavelen: Vec<f64>, flambda: Vec<f64>) -> Self {
        Self { wavelen, flambda }
    }

    /// Rest-frame wavelength grid.
    pub fn wavelen(&self) -> &[f64] {
        &self.wavelen
    }

    /// Flux density on [`Sed::wavelen`].
    pub fn flambda(&self) -> &[f64] {
        &self.flambda
    }

    /// Mutable flux values. The grid length cannot change through this.
    pub fn flambda_mut(&mut self) -> &mut [f64] {
        &mut self.flambda
    }

    pub fn len(&self) -> usize {
        self.wavelen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelen.is_empty()
    }

    /// View of this SED observed at redshift `z`.
    pub fn redshifted(&self, z: f64) -> RedshiftedSed<'_> {
        let factor = 1.0 + z;
        RedshiftedSed {
            wavelen: self.wavelen.iter().map(|l| l * factor).collect(),
            flambda: &self.flambda,
        }
    }

    /// Rest-frame flux through a bandpass.
    pub fn flux(&self, bandpass: &Bandpass) -> f64 {
        integrate(&self.wavelen, &self.flambda, bandpass)
    }

    /// Add `delta` to the flux curve and clip negative values to zero.
    pub(crate) fn apply_perturbation(&mut self, delta: &[f64]) {
        debug_assert_eq!(delta.len(), self.flambda.len());
        for (f, d) in self.flambda.iter_mut().zip(delta) {
            *f = (*f + d).max(0.0);
        }
    }
}

fn check_grid(wavelen: &[f64], flambda: &[f64]) -> Result<()> {
    if wavelen.len() != flambda.len() {
        return Err(TrainError::data(format!(
            "SED wavelength ({}) and flux ({}) lengths differ",
            wavelen.len(),
            flambda.len()
        )));
    }
    if wavelen.len() < 2 {
        return Err(TrainError::data("SED needs at least two wavelength samples"));
    }
    if wavelen.windows(2).any(|w| w[1] <= w[0]) {
        return Err(TrainError::data(
            "SED wavelength grid must be strictly increasing",
        ));
    }
    Ok(())
}

/// An SED with its wavelength grid stretched by `1 + z`.
///
/// Built once per (template, redshift) pair so every filter of an observation
/// reuses the same scaled grid.
#[derive(Debug, Clone)]
pub struct RedshiftedSed<'a> {
    wavelen: Vec<f64>,
    flambda: &'a [f64],
}

impl RedshiftedSed<'_> {
    /// Observed-frame wavelength grid.
    pub fn wavelen(&self) -> &[f64] {
        &self.wavelen
    }

    /// Observed-frame flux through a bandpass.
    pub fn flux(&self, bandpass: &Bandpass) -> f64 {
        integrate(&self.wavelen, self.flambda, bandpass)
    }

    /// Fluxes through each named filter, in order.
    pub fn flux_list(&self, bandpasses: &BandpassSet, filters: &[String]) -> Result<Vec<f64>> {
        filters
            .iter()
            .map(|name| {
                bandpasses
                    .get(name)
                    .map(|bp| self.flux(bp))
                    .ok_or_else(|| TrainError::data(format!("unknown filter '{name}'")))
            })
            .collect()
    }
}

/// `Σ interp(λ_bp; sed) · phi · Δλ` over the bandpass grid.
fn integrate(wavelen: &[f64], flambda: &[f64], bandpass: &Bandpass) -> f64 {
    let sum: f64 = bandpass
        .wavelen
        .iter()
        .zip(&bandpass.phi)
        .map(|(&l, &p)| interp(l, wavelen, flambda) * p)
        .sum();
    sum * bandpass.step()
}
