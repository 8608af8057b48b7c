//! Naive starting templates.
//!
//! Training needs an initial guess; a ladder of log-normal curves, from red
//! (late mode, narrow) to blue (early mode, broad), is a serviceable one.

use crate::numeric::arange;
use crate::sed::Sed;
use crate::store::TemplateStore;

/// Parameters for [`naive_templates`].
#[derive(Debug, Clone)]
pub struct NaiveTemplateConfig {
    /// Grid resolution (Å). Default 100.
    pub res: f64,
    /// Grid start (Å). Default 10.
    pub x_min: f64,
    /// Grid end, exclusive (Å). Default 15000.
    pub x_max: f64,
    /// Bluest mode (Å). Default 1000.
    pub mode_min: f64,
    /// Reddest mode (Å). Default 5500.
    pub mode_max: f64,
    /// Narrowest log-width. Default 0.35.
    pub sigma_min: f64,
    /// Broadest log-width. Default 0.9.
    pub sigma_max: f64,
    /// Wavelength (Å) at which every template equals 1. Default 5000.
    pub norm: f64,
}

impl Default for NaiveTemplateConfig {
    fn default() -> Self {
        Self {
            res: 100.0,
            x_min: 10.0,
            x_max: 15000.0,
            mode_min: 1000.0,
            mode_max: 5500.0,
            sigma_min: 0.35,
            sigma_max: 0.9,
            norm: 5000.0,
        }
    }
}

/// Log-normal density with the given mode, normalized to 1 at `norm`.
pub fn log_norm(x: f64, mode: f64, sigma: f64, norm: f64) -> f64 {
    let mu = mode.ln() + sigma * sigma;
    let f = |x: f64| {
        let d = x.ln() - mu;
        (-d * d / (2.0 * sigma * sigma)).exp()
            / (x * sigma * (2.0 * std::f64::consts::PI).sqrt())
    };
    f(x) / f(norm)
}

fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Build `n` log-normal templates keyed `N{n}-1` .. `N{n}-{n}`.
pub fn naive_templates(n: usize, config: &NaiveTemplateConfig) -> TemplateStore {
    let modes = linspace(config.mode_max, config.mode_min, n);
    let sigmas = linspace(config.sigma_min, config.sigma_max, n);
    let wavelen = arange(config.x_min, config.x_max, config.res);

    let mut store = TemplateStore::new();
    for i in 0..n {
        let flambda = wavelen
            .iter()
            .map(|&x| log_norm(x, modes[i], sigmas[i], config.norm))
            .collect();
        // arange output is strictly increasing and shares the flux length,
        // so construction cannot fail for a positive resolution.
        if let Ok(sed) = Sed::new(wavelen.clone(), flambda) {
            store.insert(format!("N{}-{}", n, i + 1), sed);
        }
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::{argmin, idx_closest};

    #[test]
    fn test_naive_template_ids_and_normalization() {
        let config = NaiveTemplateConfig::default();
        let store = naive_templates(4, &config);
        let ids: Vec<&str> = store.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["N4-1", "N4-2", "N4-3", "N4-4"]);

        for sed in store.values() {
            let idx = idx_closest(config.norm, sed.wavelen()).unwrap();
            // grid is 10, 110, ..., so 5010 is the closest point to 5000
            assert!((sed.flambda()[idx] - 1.0).abs() < 0.05);
            assert!(sed.flambda().iter().all(|&f| f >= 0.0));
        }
    }

    #[test]
    fn test_first_template_peaks_reddest() {
        let store = naive_templates(3, &NaiveTemplateConfig::default());
        let peak = |id: &str| {
            let sed = &store[id];
            let neg: Vec<f64> = sed.flambda().iter().map(|f| -f).collect();
            sed.wavelen()[argmin(&neg).unwrap()]
        };
        assert!(peak("N3-1") > peak("N3-3"));
    }
}
