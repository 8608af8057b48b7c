//! Regularized least-squares perturbation of a template's flux curve.
//!
//! Each observation `n` constrains the template through its filter:
//!
//! ```text
//! g_n = f_obs,n − f_syn,n ≈ Σ_k r_n(λ_k(1+z)) · Δλ_k(1+z) · x_k
//! ```
//!
//! where `x` is the flux correction on the template grid. Weighting each row by
//! `1/σ_n²` (σ = relative flux error) and adding a Tikhonov term `|x|²/Δ²`
//! gives the normal equations
//!
//! ```text
//! (Σ_n r̃_n r̃_nᵀ / σ_n² + I/Δ²) x = Σ_n g_n r̃_n / σ_n²,     r̃_n = r_n · Δλ(1+z)
//! ```
//!
//! The identity term is added after all observations are accumulated.

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::bandpass::BandpassSet;
use crate::error::{Result, TrainError};
use crate::sed::Sed;

use super::sets::TrainingGalaxy;

/// Upper bound on the regularization scale `Δ`.
pub const MAX_DELTA: f64 = 0.05;

/// Width of the wavelength bin around each grid point.
///
/// Interior points span half the distance between their neighbours; the two
/// end points take the distance to their single neighbour.
pub fn bin_widths(wavelen: &[f64]) -> Vec<f64> {
    let n = wavelen.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    wavelen[1] - wavelen[0]
                } else if i == n - 1 {
                    wavelen[n - 1] - wavelen[n - 2]
                } else {
                    0.5 * (wavelen[i + 1] - wavelen[i - 1])
                }
            })
            .collect(),
    }
}

/// Regularization scale from the data:
/// `mean(σ) · sqrt(nbins / (w · n_obs))`, clipped to `[0, MAX_DELTA]`.
///
/// With no observations the cap is returned.
pub fn regularization_delta(rel_errors: &[f64], nbins: usize, w: f64) -> f64 {
    if rel_errors.is_empty() {
        return MAX_DELTA;
    }
    let n = rel_errors.len() as f64;
    let mean = rel_errors.iter().sum::<f64>() / n;
    let delta = mean * (nbins as f64 / (w * n)).sqrt();
    if delta.is_nan() {
        return MAX_DELTA;
    }
    delta.clamp(0.0, MAX_DELTA)
}

/// Compute the flux correction for `template` from its training set.
///
/// Does not modify the template. `delta = None` derives the regularization
/// scale from the data (see [`regularization_delta`]); a non-positive `Δ`
/// disables regularization, in which case the system may be singular.
pub fn perturb_template(
    training_set: &[TrainingGalaxy],
    template: &Sed,
    bandpasses: &BandpassSet,
    w: f64,
    delta: Option<f64>,
) -> Result<Vec<f64>> {
    let nbins = template.len();
    let widths = bin_widths(template.wavelen());

    let mut m = DMatrix::<f64>::zeros(nbins, nbins);
    let mut nu = DVector::<f64>::zeros(nbins);
    let mut sigmas = Vec::new();
    let mut rn_dlambda = DVector::<f64>::zeros(nbins);

    for tg in training_set {
        let galaxy = &tg.galaxy;
        let z = galaxy.redshift;
        let view = template.redshifted(z);
        let synthetic = view.flux_list(bandpasses, &galaxy.filters)?;
        let fluxes = tg.scaled_fluxes();
        let errors = tg.scaled_errors();

        for (j, name) in galaxy.filters.iter().enumerate() {
            let bp = bandpasses
                .get(name)
                .ok_or_else(|| TrainError::data(format!("unknown filter '{name}'")))?;

            for (k, (&lz, &width)) in view.wavelen().iter().zip(&widths).enumerate() {
                rn_dlambda[k] = bp.response(lz) * width * (1.0 + z);
            }

            let sigma = errors[j] / fluxes[j];
            let weight = 1.0 / (sigma * sigma);
            let residual = fluxes[j] - synthetic[j];

            m.ger(weight, &rn_dlambda, &rn_dlambda, 1.0);
            nu.axpy(weight * residual, &rn_dlambda, 1.0);
            sigmas.push(sigma.abs());
        }
    }

    let delta = delta.unwrap_or_else(|| regularization_delta(&sigmas, nbins, w));
    if delta > 0.0 && delta.is_finite() {
        let reg = 1.0 / (delta * delta);
        for i in 0..nbins {
            m[(i, i)] += reg;
        }
    }
    trace!(
        "perturb: {} observations, {} bins, delta={:.4}",
        sigmas.len(),
        nbins,
        delta
    );

    let solution = solve_normal_equations(m, &nu)?;
    Ok(solution.iter().copied().collect())
}

/// Solve `M x = nu`, Cholesky first (M is SPD when regularized), LU otherwise.
fn solve_normal_equations(m: DMatrix<f64>, nu: &DVector<f64>) -> Result<DVector<f64>> {
    let x = match m.clone().cholesky() {
        Some(chol) => chol.solve(nu),
        None => m
            .lu()
            .solve(nu)
            .ok_or_else(|| TrainError::numerical("normal equations are singular"))?,
    };
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(TrainError::numerical(
            "normal equations are ill-conditioned (non-finite solution)",
        ))
    }
}
