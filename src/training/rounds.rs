//! Round orchestration: rebuild training sets, perturb every template in
//! parallel, merge, repeat.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::bandpass::BandpassSet;
use crate::error::Result;
use crate::galaxy::Galaxy;
use crate::numeric::{arange, idx_closest, interp_many, median_filter};
use crate::sed::Sed;
use crate::store::TemplateStore;

use super::convergence::perturbation_round;
use super::outliers::reject_outliers;
use super::sets::{create_training_sets, TrainingSet};
use super::{
    ConvergenceStatus, ConvergenceTrace, RenormConfig, RoundRecord, TrainConfig, TrainResult,
    INITIAL_MSE,
};

/// Train `templates` against `galaxies`.
///
/// The input store is left untouched; the result holds trained copies,
/// the training sets rebuilt against them, and (optionally) the per-round
/// history. Rounds run until a round applies no perturbation or
/// `max_rounds` is reached.
///
/// Galaxies that cannot be matched are skipped with a warning each round. A
/// template whose solve fails is carried over unchanged for that round.
/// Worker panics propagate and abort training.
pub fn train_templates(
    templates: &TemplateStore,
    galaxies: &[Galaxy],
    bandpasses: &BandpassSet,
    config: &TrainConfig,
) -> Result<TrainResult> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.n_threads.unwrap_or(0))
        .build()?;
    info!(
        "Training {} templates on {} galaxies with {} threads",
        templates.len(),
        galaxies.len(),
        pool.current_num_threads()
    );

    let mut templates = templates.clone();
    let mut mse0: BTreeMap<String, f64> =
        templates.keys().map(|k| (k.clone(), INITIAL_MSE)).collect();
    let mut history = Vec::new();
    let mut round = 0u32;

    loop {
        round += 1;
        info!("Round {}", round);

        let training_sets = pool.install(|| {
            create_training_sets(&templates, galaxies, bandpasses, &config.excluded_filters)
        });

        // Every task reads the round-start store; merging waits for all of them.
        let results: Vec<(String, ConvergenceTrace)> = pool.install(|| {
            templates
                .par_iter()
                .map(|(id, template)| {
                    let empty = TrainingSet::new();
                    let set = training_sets.get(id).unwrap_or(&empty);
                    let baseline = mse0.get(id).copied().unwrap_or(INITIAL_MSE);
                    let trace = train_one(id, set, template, bandpasses, baseline, config);
                    (id.clone(), trace)
                })
                .collect()
        });

        info!("Columns: template, perturbations, initial/final weighted MSE");
        let mut total_perts = 0usize;
        let mut traces = BTreeMap::new();
        for (id, trace) in results {
            let n = trace.n_perturbations();
            total_perts += n;
            info!(
                "{:<8} {:>2} {:>10.1} {:>10.1}",
                id,
                n,
                trace.mse[0],
                trace.final_mse()
            );
            if trace.status == ConvergenceStatus::MaxPerturbations {
                warn!(
                    "Template {} hit the perturbation cap without converging",
                    id
                );
            }

            templates.insert(id.clone(), trace.final_template().clone());
            mse0.insert(id.clone(), trace.final_mse());
            if config.record_history {
                traces.insert(id, trace);
            }
        }

        if config.record_history {
            history.push(RoundRecord {
                round,
                traces,
                n_perturbations: total_perts,
            });
        }

        if total_perts == 0 || config.max_rounds == Some(round) {
            break;
        }
    }

    if let Some(renorm) = &config.renorm {
        info!("Renormalizing templates at {} Å", renorm.wavelength);
        for (id, template) in templates.iter_mut() {
            if !renormalize(template, renorm) {
                warn!("Template {} left unnormalized (no positive flux near reference)", id);
            }
        }
    }

    info!("Generating final training sets");
    let training_sets = pool.install(|| {
        create_training_sets(&templates, galaxies, bandpasses, &config.excluded_filters)
    });
    info!("Training done after {} rounds", round);

    Ok(TrainResult {
        templates,
        training_sets,
        history,
        rounds: round,
    })
}

/// One template's share of a round: optional outlier rejection, then the
/// convergence loop. Failures leave the template as it was.
fn train_one(
    id: &str,
    training_set: &TrainingSet,
    template: &Sed,
    bandpasses: &BandpassSet,
    mse0: f64,
    config: &TrainConfig,
) -> ConvergenceTrace {
    let filtered;
    let set = match &config.outlier_rejection {
        Some(forest) => match reject_outliers(training_set, bandpasses, forest) {
            Ok((kept, removed)) => {
                if removed > 0 {
                    debug!("Template {}: rejected {} outlying observations", id, removed);
                }
                filtered = kept;
                &filtered
            }
            Err(e) => {
                warn!("Template {}: outlier rejection failed ({}), using full set", id, e);
                training_set
            }
        },
        None => training_set,
    };

    match perturbation_round(set, template, bandpasses, mse0, config) {
        Ok(trace) => trace,
        Err(e) => {
            warn!("Template {} skipped this round: {}", id, e);
            ConvergenceTrace::unchanged(template, mse0, ConvergenceStatus::NumericalFailure)
        }
    }
}

/// Smoothed version of a template: resampled on a coarse uniform grid and
/// median filtered. Returns `(grid, smoothed flux)`.
pub fn smoothed_flux(template: &Sed, config: &RenormConfig) -> (Vec<f64>, Vec<f64>) {
    let wavelen = template.wavelen();
    let grid = arange(wavelen[0], wavelen[wavelen.len() - 1], config.grid_step);
    let coarse = interp_many(&grid, wavelen, template.flambda());
    let smoothed = median_filter(&coarse, config.kernel_size);
    (grid, smoothed)
}

/// Scale a template so its smoothed flux is 1 at the reference wavelength.
///
/// Returns `false` (template unchanged) if the smoothed reference value is
/// not positive.
pub fn renormalize(template: &mut Sed, config: &RenormConfig) -> bool {
    let (grid, smoothed) = smoothed_flux(template, config);
    let Some(idx) = idx_closest(config.wavelength, &grid) else {
        return false;
    };
    let scale = smoothed[idx];
    if !(scale > 0.0) || !scale.is_finite() {
        return false;
    }
    template.flambda_mut().iter_mut().for_each(|f| *f /= scale);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renormalize_sets_reference_to_one() {
        let wavelen: Vec<f64> = (0..200).map(|i| 1000.0 + 50.0 * i as f64).collect();
        let flux: Vec<f64> = wavelen.iter().map(|l| 3.0 + (l / 1500.0).sin()).collect();
        let mut sed = Sed::new(wavelen, flux).unwrap();
        let config = RenormConfig::default();

        assert!(renormalize(&mut sed, &config));
        let (grid, smoothed) = smoothed_flux(&sed, &config);
        let idx = idx_closest(config.wavelength, &grid).unwrap();
        assert!((smoothed[idx] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_renormalize_skips_zero_template() {
        let wavelen: Vec<f64> = (0..100).map(|i| 1000.0 + 100.0 * i as f64).collect();
        let mut sed = Sed::new(wavelen, vec![0.0; 100]).unwrap();
        assert!(!renormalize(&mut sed, &RenormConfig::default()));
        assert!(sed.flambda().iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_even_kernel_is_rounded_up() {
        let wavelen: Vec<f64> = (0..100).map(|i| 1000.0 + 100.0 * i as f64).collect();
        let sed = Sed::new(wavelen, vec![2.0; 100]).unwrap();
        let config = RenormConfig {
            kernel_size: 4,
            ..Default::default()
        };
        let (_, smoothed) = smoothed_flux(&sed, &config);
        assert_eq!(smoothed[50], 2.0);
    }
}
