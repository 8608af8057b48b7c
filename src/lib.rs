//! # sedtrain
//!
//! Iterative training of galaxy **spectral energy distribution (SED) templates**
//! against observed broadband photometry.
//!
//! Starting from a set of guess templates, `sedtrain` repeatedly assigns each
//! galaxy to the template that best reproduces its photometry, then corrects
//! every template's flux curve with a regularized least-squares solve so that,
//! once redshifted and integrated through the survey filters, it reproduces the
//! fluxes of the galaxies assigned to it. The trained templates are used to
//! build realistic synthetic catalogs.
//!
//! ## Example
//!
//! ```no_run
//! use sedtrain::{
//!     naive_templates, train_templates, Bandpass, BandpassSet, Galaxy,
//!     NaiveTemplateConfig, TrainConfig,
//! };
//!
//! let mut bandpasses = BandpassSet::new();
//! bandpasses.insert("g".into(), Bandpass::top_hat(4000.0, 5500.0).unwrap());
//! bandpasses.insert("r".into(), Bandpass::top_hat(5500.0, 7000.0).unwrap());
//! bandpasses.insert("i".into(), Bandpass::top_hat(7000.0, 8500.0).unwrap());
//!
//! let galaxies = vec![
//!     Galaxy::new(0.4, vec!["g".into(), "r".into(), "i".into()],
//!                 vec![1.2, 2.0, 2.6], vec![0.05, 0.06, 0.08]),
//!     // ... more galaxies ...
//! ];
//!
//! let templates = naive_templates(8, &NaiveTemplateConfig::default());
//! let config = TrainConfig {
//!     max_rounds: Some(10),
//!     ..Default::default()
//! };
//! let result = train_templates(&templates, &galaxies, &bandpasses, &config).unwrap();
//! for (id, set) in &result.training_sets {
//!     println!("{id}: {} galaxies", set.len());
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Matching**: redshift each template to the galaxy, compute synthetic fluxes,
//!    anchor both flux vectors at the filter closest to the median flux ratio, and
//!    pick the template with the smallest relative-error-weighted MSE
//! 2. **Training sets**: group galaxies by matched template, carrying the median
//!    ratio as a scale onto the template's normalization
//! 3. **Perturbation**: accumulate the filter-response normal equations over the
//!    training set, add a Tikhonov term `I/Δ²`, and solve for a flux correction;
//!    negative fluxes are clipped to zero
//! 4. **Convergence**: repeat (3) until the fractional MSE change is below
//!    `dmse_stop`; templates run in parallel
//! 5. **Rounds**: rebuild training sets and repeat until no template changes, then
//!    renormalize at a reference wavelength

pub mod bandpass;
pub mod error;
pub mod galaxy;
pub mod naive;
pub mod numeric;
pub mod sed;
pub mod store;
pub mod training;

pub use bandpass::{Bandpass, BandpassSet};
pub use error::{Result, TrainError};
pub use galaxy::Galaxy;
pub use naive::{naive_templates, NaiveTemplateConfig};
pub use sed::{RedshiftedSed, Sed};
pub use store::TemplateStore;
pub use training::{
    create_training_sets, match_photometry, perturb_template, train_templates,
    ConvergenceStatus, ConvergenceTrace, IsolationForestConfig, PhotoMatch, RenormConfig,
    RoundHistory, RoundRecord, TrainConfig, TrainResult, TrainingGalaxy, TrainingSet,
    TrainingSets,
};
