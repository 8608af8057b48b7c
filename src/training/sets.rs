//! Grouping galaxies into per-template training sets.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::bandpass::BandpassSet;
use crate::galaxy::Galaxy;
use crate::store::TemplateStore;

use super::matching::match_photometry;

/// A galaxy assigned to a template, with the scale factor from its match.
///
/// The solver and the MSE work on the galaxy's photometry multiplied by
/// `scale`, i.e. brought onto the template's normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingGalaxy {
    pub galaxy: Galaxy,
    pub scale: f64,
}

impl TrainingGalaxy {
    pub fn new(galaxy: Galaxy, scale: f64) -> Self {
        Self { galaxy, scale }
    }

    /// Observed fluxes on the template's normalization.
    pub fn scaled_fluxes(&self) -> Vec<f64> {
        self.galaxy.fluxes.iter().map(|f| f * self.scale).collect()
    }

    /// Flux errors on the template's normalization.
    pub fn scaled_errors(&self) -> Vec<f64> {
        self.galaxy.flux_err.iter().map(|e| e * self.scale).collect()
    }
}

pub type TrainingSet = Vec<TrainingGalaxy>;

/// Template id → galaxies matched to it.
pub type TrainingSets = BTreeMap<String, TrainingSet>;

/// Match every galaxy and group the matches by template.
///
/// Every template in `templates` gets an entry, possibly empty. Galaxies
/// that cannot be matched are logged and left out. Matching runs on the
/// current rayon pool; galaxy order within each set follows input order.
pub fn create_training_sets(
    templates: &TemplateStore,
    galaxies: &[Galaxy],
    bandpasses: &BandpassSet,
    excluded_filters: &[String],
) -> TrainingSets {
    let matches: Vec<_> = galaxies
        .par_iter()
        .map(|g| match_photometry(g, templates, bandpasses, excluded_filters))
        .collect();

    let mut sets: TrainingSets = templates
        .keys()
        .map(|k| (k.clone(), TrainingSet::new()))
        .collect();

    let mut skipped = 0usize;
    for (i, (galaxy, result)) in galaxies.iter().zip(matches).enumerate() {
        match result {
            Ok(m) => {
                if let Some(set) = sets.get_mut(&m.template_id) {
                    set.push(TrainingGalaxy::new(galaxy.clone(), m.scale));
                }
            }
            Err(e) => {
                skipped += 1;
                warn!("Skipping galaxy {} ({:?}): {}", i, galaxy.source, e);
            }
        }
    }

    debug!(
        "Training sets: {} galaxies matched, {} skipped, sizes {:?}",
        galaxies.len() - skipped,
        skipped,
        sets.iter().map(|(k, v)| (k.as_str(), v.len())).collect::<Vec<_>>()
    );
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandpass::Bandpass;
    use crate::sed::Sed;

    #[test]
    fn test_every_template_has_a_set() {
        let mut bp = BandpassSet::new();
        bp.insert("v".into(), Bandpass::top_hat(4500.0, 5500.0).unwrap());
        bp.insert("r".into(), Bandpass::top_hat(5500.0, 6500.0).unwrap());

        let wavelen: Vec<f64> = (0..60).map(|i| 3000.0 + 100.0 * i as f64).collect();
        let n = wavelen.len();
        let mut store = TemplateStore::new();
        store.insert("a".into(), Sed::new(wavelen.clone(), vec![1.0; n]).unwrap());
        store.insert("b".into(), Sed::new(wavelen, vec![2.0; n]).unwrap());

        let good = Galaxy::new(
            0.0,
            vec!["v".into(), "r".into()],
            vec![4.0, 4.0],
            vec![0.1, 0.1],
        );
        let bad = Galaxy::new(0.0, vec!["v".into()], vec![0.0], vec![0.1]);

        let sets = create_training_sets(&store, &[good, bad], &bp, &[]);
        assert_eq!(sets.len(), 2);
        let total: usize = sets.values().map(|s| s.len()).sum();
        assert_eq!(total, 1);
        // both templates fit a flat galaxy equally well; ties go to the first id
        assert_eq!(sets["a"].len(), 1);
        let tg = &sets["a"][0];
        assert!((tg.scale - 0.25).abs() < 1e-9);
        assert!(tg.scaled_fluxes().iter().all(|f| (f - 1.0).abs() < 1e-9));
    }
}
