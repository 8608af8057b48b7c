//! Per-template convergence loop.
//!
//! A template is perturbed repeatedly until the fractional change of its
//! weighted MSE drops to `dmse_stop` or the perturbation cap is hit.
//!
//! Clipping negative flux to zero after a step can raise the MSE slightly, so
//! the MSE sequence is not strictly monotonic; the stopping rule uses the
//! absolute fractional change for that reason.

use tracing::debug;

use crate::bandpass::BandpassSet;
use crate::error::Result;
use crate::sed::Sed;

use super::perturb::perturb_template;
use super::sets::TrainingGalaxy;
use super::{ConvergenceStatus, ConvergenceTrace, TrainConfig};

/// Weighted mean squared error of a template over its training set.
///
/// `Σ (f/σ_f)² (f − f_syn)² / N` over every filter observation, with the
/// photometry taken on the template's normalization. Zero for an empty set.
pub fn calc_mse(
    training_set: &[TrainingGalaxy],
    template: &Sed,
    bandpasses: &BandpassSet,
) -> Result<f64> {
    let mut se = 0.0;
    let mut n = 0usize;

    for tg in training_set {
        let synthetic = template
            .redshifted(tg.galaxy.redshift)
            .flux_list(bandpasses, &tg.galaxy.filters)?;
        let fluxes = tg.scaled_fluxes();
        let errors = tg.scaled_errors();

        n += fluxes.len();
        se += fluxes
            .iter()
            .zip(&errors)
            .zip(&synthetic)
            .map(|((f, e), s)| {
                let snr = f / e;
                let d = f - s;
                snr * snr * d * d
            })
            .sum::<f64>();
    }

    if n == 0 {
        return Ok(0.0);
    }
    Ok(se / n as f64)
}

/// `(mse − mse0) / mse0`, with a zero baseline giving 0 (no change) or +∞.
pub fn fractional_change(mse: f64, mse0: f64) -> f64 {
    if mse0 == 0.0 {
        if mse == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (mse - mse0) / mse0
    }
}

/// Run the convergence loop for one template.
///
/// `mse0` is the template's MSE at the end of the previous round; if the
/// current MSE is already within `dmse_stop` of it no perturbation is made.
/// The returned trace starts with an unchanged copy of `template`.
///
/// A failed solve is returned as an error and the partial trace discarded.
pub fn perturbation_round(
    training_set: &[TrainingGalaxy],
    template: &Sed,
    bandpasses: &BandpassSet,
    mse0: f64,
    config: &TrainConfig,
) -> Result<ConvergenceTrace> {
    if training_set.is_empty() {
        return Ok(ConvergenceTrace::unchanged(
            template,
            0.0,
            ConvergenceStatus::EmptyTrainingSet,
        ));
    }

    let mut current = template.clone();
    let mut mse = calc_mse(training_set, &current, bandpasses)?;
    let mut dmse = fractional_change(mse, mse0);
    let mut prev = mse;

    let mut templates = vec![current.clone()];
    let mut mse_list = vec![mse];
    let mut n_perts = 0u32;

    while dmse.abs() > config.dmse_stop {
        if config.max_perturbations.is_some_and(|max| n_perts >= max) {
            break;
        }
        n_perts += 1;

        let sol = perturb_template(training_set, &current, bandpasses, config.w, config.delta)?;
        current.apply_perturbation(&sol);

        mse = calc_mse(training_set, &current, bandpasses)?;
        dmse = fractional_change(mse, prev);
        prev = mse;
        debug!("  perturbation {}: mse {:.3} (dmse {:+.4})", n_perts, mse, dmse);

        templates.push(current.clone());
        mse_list.push(mse);
    }

    let status = if dmse.abs() <= config.dmse_stop {
        ConvergenceStatus::Converged
    } else {
        ConvergenceStatus::MaxPerturbations
    };

    Ok(ConvergenceTrace {
        templates,
        mse: mse_list,
        status,
    })
}
