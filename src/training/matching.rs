//! Photometric matching of a galaxy to its best-fit template.
//!
//! For every candidate template the redshifted synthetic fluxes are compared
//! to the observed ones after anchoring both vectors at the filter whose
//! template/observed ratio sits closest to the median ratio. The comparison
//! is therefore independent of overall normalization; the median ratio itself
//! is returned as the galaxy's scale factor.

use tracing::trace;

use crate::bandpass::BandpassSet;
use crate::error::{Result, TrainError};
use crate::galaxy::Galaxy;
use crate::numeric::{argmin, median};
use crate::sed::Sed;
use crate::store::TemplateStore;

/// Filters left out of matching by default (near-IR bands with poor template coverage).
pub const DEFAULT_EXCLUDED_FILTERS: [&str; 2] = ["Ks", "Kvideo"];

/// Outcome of matching one galaxy.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoMatch {
    /// Id of the best-fit template.
    pub template_id: String,
    /// `median(template_flux / observed_flux)` for that template.
    pub scale: f64,
    /// Anchored, relative-error-weighted MSE of the best fit.
    pub mse: f64,
}

/// Find the template that best reproduces a galaxy's photometry.
///
/// Filters named in `excluded_filters` take no part in the comparison.
/// Fails with [`TrainError::Data`] if the galaxy is malformed, references an
/// unknown filter, has no usable filters, or no template yields a finite fit.
pub fn match_photometry(
    galaxy: &Galaxy,
    templates: &TemplateStore,
    bandpasses: &BandpassSet,
    excluded_filters: &[String],
) -> Result<PhotoMatch> {
    galaxy.validate()?;
    if let Some(name) = galaxy.filters.iter().find(|f| !bandpasses.contains_key(*f)) {
        return Err(TrainError::data(format!("unknown filter '{name}'")));
    }

    let usable: Vec<usize> = (0..galaxy.len())
        .filter(|&i| !excluded_filters.contains(&galaxy.filters[i]))
        .collect();
    if usable.is_empty() {
        return Err(TrainError::data(
            "galaxy has no usable filters after exclusion",
        ));
    }
    let observed = galaxy.select(&usable);

    let mut best: Option<PhotoMatch> = None;
    for (id, sed) in templates {
        let Some((mse, scale)) = anchored_mse(sed, &observed, bandpasses)? else {
            trace!("template {} gives no finite fit", id);
            continue;
        };
        if best.as_ref().map_or(true, |b| mse < b.mse) {
            best = Some(PhotoMatch {
                template_id: id.clone(),
                scale,
                mse,
            });
        }
    }

    best.ok_or_else(|| TrainError::data("no template produced a finite photometric match"))
}

/// Weighted MSE and scale of one template against the usable photometry.
///
/// `None` when the fit is undefined (e.g. the template has zero flux at the
/// anchor filter).
fn anchored_mse(
    sed: &Sed,
    galaxy: &Galaxy,
    bandpasses: &BandpassSet,
) -> Result<Option<(f64, f64)>> {
    let synthetic = sed.redshifted(galaxy.redshift).flux_list(bandpasses, &galaxy.filters)?;

    let ratios: Vec<f64> = synthetic
        .iter()
        .zip(&galaxy.fluxes)
        .map(|(t, f)| t / f)
        .collect();
    let Some(scale) = median(&ratios) else {
        return Ok(None);
    };
    let dists: Vec<f64> = ratios.iter().map(|r| (r - scale).abs()).collect();
    let Some(anchor) = argmin(&dists) else {
        return Ok(None);
    };

    let t0 = synthetic[anchor];
    let f0 = galaxy.fluxes[anchor];
    if t0 == 0.0 {
        return Ok(None);
    }

    let rel_err = galaxy.relative_errors();
    let mse = synthetic
        .iter()
        .zip(&galaxy.fluxes)
        .zip(&rel_err)
        .map(|((t, f), s)| {
            let d = t / t0 - f / f0;
            d * d / (s * s)
        })
        .sum::<f64>()
        / synthetic.len() as f64;

    Ok(mse.is_finite().then_some((mse, scale)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandpass::Bandpass;

    fn bandpasses() -> BandpassSet {
        let mut set = BandpassSet::new();
        set.insert("b".into(), Bandpass::top_hat(3500.0, 4500.0).unwrap());
        set.insert("v".into(), Bandpass::top_hat(4500.0, 5500.0).unwrap());
        set.insert("r".into(), Bandpass::top_hat(5500.0, 6500.0).unwrap());
        set.insert("Ks".into(), Bandpass::top_hat(6500.0, 7500.0).unwrap());
        set
    }

    fn templates() -> TemplateStore {
        let wavelen: Vec<f64> = (0..80).map(|i| 2000.0 + 100.0 * i as f64).collect();
        let blue: Vec<f64> = wavelen.iter().map(|l| 8000.0 / l).collect();
        let red: Vec<f64> = wavelen.iter().map(|l| l / 4000.0).collect();
        let mut store = TemplateStore::new();
        store.insert("blue".into(), Sed::new(wavelen.clone(), blue).unwrap());
        store.insert("red".into(), Sed::new(wavelen, red).unwrap());
        store
    }

    fn observe(sed: &Sed, z: f64, filters: &[&str], scale: f64) -> Galaxy {
        let filters: Vec<String> = filters.iter().map(|s| s.to_string()).collect();
        let fluxes: Vec<f64> = sed
            .redshifted(z)
            .flux_list(&bandpasses(), &filters)
            .unwrap()
            .into_iter()
            .map(|f| f * scale)
            .collect();
        let errs = fluxes.iter().map(|f| 0.05 * f).collect();
        Galaxy::new(z, filters, fluxes, errs)
    }

    fn excluded() -> Vec<String> {
        DEFAULT_EXCLUDED_FILTERS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matches_generating_template() {
        let store = templates();
        let g = observe(&store["red"], 0.1, &["b", "v", "r"], 3.0);
        let m = match_photometry(&g, &store, &bandpasses(), &excluded()).unwrap();
        assert_eq!(m.template_id, "red");
        assert!(m.mse < 1e-12);
        // observed = 3 × synthetic, so synthetic / observed = 1/3
        assert!((m.scale - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaling_photometry_keeps_match() {
        let store = templates();
        let g = observe(&store["blue"], 0.2, &["b", "v", "r"], 1.0);
        let mut g2 = g.clone();
        g2.fluxes.iter_mut().for_each(|f| *f *= 7.0);
        g2.flux_err.iter_mut().for_each(|e| *e *= 7.0);

        let bp = bandpasses();
        let m1 = match_photometry(&g, &store, &bp, &excluded()).unwrap();
        let m2 = match_photometry(&g2, &store, &bp, &excluded()).unwrap();
        assert_eq!(m1.template_id, m2.template_id);
        assert!((m1.scale / m2.scale - 7.0).abs() < 1e-9);
        assert!((m1.mse - m2.mse).abs() < 1e-9);
    }

    #[test]
    fn test_only_excluded_filters_is_data_error() {
        let store = templates();
        let g = observe(&store["red"], 0.0, &["Ks"], 1.0);
        let err = match_photometry(&g, &store, &bandpasses(), &excluded()).unwrap_err();
        assert!(matches!(err, TrainError::Data(_)));
    }

    #[test]
    fn test_excluded_filter_does_not_affect_choice() {
        let store = templates();
        let mut g = observe(&store["red"], 0.1, &["b", "v", "r", "Ks"], 1.0);
        // wildly wrong Ks flux would favour the other template if it were used
        g.fluxes[3] *= 50.0;
        g.flux_err[3] *= 50.0;
        let m = match_photometry(&g, &store, &bandpasses(), &excluded()).unwrap();
        assert_eq!(m.template_id, "red");
    }

    #[test]
    fn test_unknown_filter_is_data_error() {
        let store = templates();
        let mut g = observe(&store["red"], 0.1, &["b", "v"], 1.0);
        g.filters[1] = "u".into();
        assert!(match_photometry(&g, &store, &bandpasses(), &excluded()).is_err());
    }
}
