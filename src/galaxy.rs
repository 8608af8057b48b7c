//! Galaxy photometry: one redshift and per-filter flux measurements.

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, PartialEq)]
pub struct Galaxy {
    /// Spectroscopic or photometric redshift.
    pub redshift: f64,
    /// Filter ids, parallel to `fluxes` and `flux_err`.
    pub filters: Vec<String>,
    /// Observed flux per filter.
    pub fluxes: Vec<f64>,
    /// One-sigma flux uncertainty per filter.
    pub flux_err: Vec<f64>,
    /// Optional survey / catalog label.
    pub source: Option<String>,
}

impl Galaxy {
    pub fn new(
        redshift: f64,
        filters: Vec<String>,
        fluxes: Vec<f64>,
        flux_err: Vec<f64>,
    ) -> Self {
        Self {
            redshift,
            filters,
            fluxes,
            flux_err,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Number of filter observations.
    pub fn len(&self) -> usize {
        self.fluxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fluxes.is_empty()
    }

    /// Check the observation is usable for matching and training.
    ///
    /// Zero fluxes are rejected because every weight in the engine is built
    /// from the relative error `flux_err / flux`. Negative fluxes are allowed.
    pub fn validate(&self) -> Result<()> {
        let n = self.filters.len();
        if self.fluxes.len() != n || self.flux_err.len() != n {
            return Err(TrainError::data(format!(
                "galaxy arrays differ in length: {} filters, {} fluxes, {} errors",
                n,
                self.fluxes.len(),
                self.flux_err.len()
            )));
        }
        if !self.redshift.is_finite() || self.redshift < 0.0 {
            return Err(TrainError::data(format!(
                "invalid galaxy redshift {}",
                self.redshift
            )));
        }
        for (i, (&f, &e)) in self.fluxes.iter().zip(&self.flux_err).enumerate() {
            if !f.is_finite() || f == 0.0 {
                return Err(TrainError::data(format!(
                    "flux in filter '{}' must be finite and non-zero, got {}",
                    self.filters[i], f
                )));
            }
            if !e.is_finite() || e <= 0.0 {
                return Err(TrainError::data(format!(
                    "flux error in filter '{}' must be positive, got {}",
                    self.filters[i], e
                )));
            }
        }
        Ok(())
    }

    /// Relative flux uncertainty `flux_err / flux` per filter.
    pub fn relative_errors(&self) -> Vec<f64> {
        self.flux_err
            .iter()
            .zip(&self.fluxes)
            .map(|(e, f)| e / f)
            .collect()
    }

    /// Sub-observation holding only the given filter indices.
    pub fn select(&self, indices: &[usize]) -> Galaxy {
        Galaxy {
            redshift: self.redshift,
            filters: indices.iter().map(|&i| self.filters[i].clone()).collect(),
            fluxes: indices.iter().map(|&i| self.fluxes[i]).collect(),
            flux_err: indices.iter().map(|&i| self.flux_err[i]).collect(),
            source: self.source.clone(),
        }
    }
}
