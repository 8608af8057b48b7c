//! Iterative SED template training.
//!
//! Templates are refined against a catalog of galaxy photometry in rounds:
//!
//! 1. **Matching**: every galaxy is assigned to the template that best
//!    reproduces its (normalization-free) photometry, giving per-template
//!    training sets ([`sets::create_training_sets`]).
//! 2. **Perturbation**: each template is corrected by a regularized
//!    least-squares solve against its training set, repeatedly, until its
//!    weighted MSE stops changing ([`convergence::perturbation_round`]).
//!    Templates are independent within a round and are processed in parallel.
//! 3. **Repeat** until a round makes no perturbation at all, then optionally
//!    renormalize every template at a reference wavelength
//!    ([`rounds::train_templates`]).
//!
//! An optional isolation-forest pass ([`outliers`]) drops outlying photometry
//! from each training set before it is used.

pub mod convergence;
pub mod matching;
pub mod outliers;
pub mod perturb;
pub mod rounds;
pub mod sets;

use std::collections::BTreeMap;

use crate::sed::Sed;
use crate::store::TemplateStore;

pub use convergence::{calc_mse, perturbation_round};
pub use matching::{match_photometry, PhotoMatch, DEFAULT_EXCLUDED_FILTERS};
pub use outliers::{reject_outliers, IsolationForest, IsolationForestConfig};
pub use perturb::perturb_template;
pub use rounds::{renormalize, train_templates};
pub use sets::{create_training_sets, TrainingGalaxy, TrainingSet, TrainingSets};

/// Baseline MSE before a template's first round; large enough that the
/// first round always perturbs a template with data.
pub const INITIAL_MSE: f64 = 1e9;

// ── Configuration ───────────────────────────────────────────────────────────

/// Template renormalization after training.
#[derive(Debug, Clone)]
pub struct RenormConfig {
    /// Reference wavelength (Å) at which templates are set to 1. Default 5000.
    pub wavelength: f64,
    /// Coarse grid step (Å) for the smoothed curve. Default 100.
    pub grid_step: f64,
    /// Median-filter kernel; rounded up to odd. Default 9.
    pub kernel_size: usize,
}

impl Default for RenormConfig {
    fn default() -> Self {
        Self {
            wavelength: 5000.0,
            grid_step: 100.0,
            kernel_size: 9,
        }
    }
}

/// Parameters controlling template training.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Regularization weight factor in `Δ = mean(σ)·sqrt(nbins / (w·N))`. Default 0.5.
    pub w: f64,
    /// Fixed regularization scale. None = derive from the data. Default None.
    pub delta: Option<f64>,
    /// Stop perturbing once `|ΔMSE / MSE| ≤ dmse_stop`. Default 0.05.
    pub dmse_stop: f64,
    /// Maximum number of rounds. None = until no template changes. Default None.
    pub max_rounds: Option<u32>,
    /// Maximum perturbations per template per round. None = unbounded. Default None.
    pub max_perturbations: Option<u32>,
    /// Renormalization after training. None = leave templates as trained.
    pub renorm: Option<RenormConfig>,
    /// Worker threads. None = one per available CPU.
    pub n_threads: Option<usize>,
    /// Filters ignored when matching galaxies to templates. Default `["Ks", "Kvideo"]`.
    pub excluded_filters: Vec<String>,
    /// Isolation-forest pre-filter on each training set. None = disabled.
    pub outlier_rejection: Option<IsolationForestConfig>,
    /// Keep every intermediate template in the returned history. Default true.
    pub record_history: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            w: 0.5,
            delta: None,
            dmse_stop: 0.05,
            max_rounds: None,
            max_perturbations: None,
            renorm: Some(RenormConfig::default()),
            n_threads: None,
            excluded_filters: DEFAULT_EXCLUDED_FILTERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            outlier_rejection: None,
            record_history: true,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// How a template's convergence loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The fractional MSE change fell to `dmse_stop`.
    Converged,
    /// `max_perturbations` was reached first. Not fatal; training continues.
    MaxPerturbations,
    /// No galaxy matched the template this round.
    EmptyTrainingSet,
    /// The solve failed; the template kept its state from the start of the round.
    NumericalFailure,
}

/// Template snapshots and MSE values from one convergence loop.
#[derive(Debug, Clone)]
pub struct ConvergenceTrace {
    /// `templates[0]` is the input; one more entry per perturbation.
    pub templates: Vec<Sed>,
    /// MSE of each snapshot, parallel to `templates`.
    pub mse: Vec<f64>,
    pub status: ConvergenceStatus,
}

impl ConvergenceTrace {
    /// Trace for a template left untouched this round.
    pub fn unchanged(template: &Sed, mse: f64, status: ConvergenceStatus) -> Self {
        Self {
            templates: vec![template.clone()],
            mse: vec![mse],
            status,
        }
    }

    pub fn n_perturbations(&self) -> usize {
        self.templates.len().saturating_sub(1)
    }

    pub fn final_template(&self) -> &Sed {
        // Every constructor pushes the input template first.
        &self.templates[self.templates.len() - 1]
    }

    pub fn final_mse(&self) -> f64 {
        self.mse.last().copied().unwrap_or(0.0)
    }
}

/// Everything that happened to every template in one round.
#[derive(Debug, Clone)]
pub struct RoundRecord {
    /// 1-based round number.
    pub round: u32,
    pub traces: BTreeMap<String, ConvergenceTrace>,
    /// Sum of perturbations over all templates.
    pub n_perturbations: usize,
}

/// Per-round diagnostics, in round order.
pub type RoundHistory = Vec<RoundRecord>;

/// Output of [`train_templates`].
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Trained (and optionally renormalized) templates.
    pub templates: TemplateStore,
    /// Training sets rebuilt against the final templates.
    pub training_sets: TrainingSets,
    /// Round diagnostics; empty unless `record_history` is set.
    pub history: RoundHistory,
    /// Number of rounds run.
    pub rounds: u32,
}
