//! Hierarchical (population-level) likelihood for a catalog of events.
//!
//! Each event enters through posterior samples drawn under a known
//! sampling prior. For candidate hyper-parameters `Λ` the samples are
//! re-weighted by `p(θ | Λ) / π(θ)`, averaged per event, and combined
//! across the catalog with a selection-effect correction:
//!
//! ```text
//! ln L(Λ) = Σ_i ln[ (1/S) Σ_s p(θ_is | Λ) / π(θ_is) ] - N ln α(Λ)
//! ```
//!
//! The result feeds an external sampler, either as a ratio against the
//! noise hypothesis or, with per-event noise evidences, as an absolute
//! log-likelihood. [`rate::RateLikelihood`] adds an overall event rate
//! with a Poisson normalization.
//!
//! Population models, selection functions and conversion functions are
//! supplied by the caller through the traits in [`traits`].

#![deny(missing_docs)]

/// Error kinds carried inside `anyhow::Error`
pub mod error;

/// Numerical and down-sampling options
pub mod options;

/// Per-event posterior sample tables
pub mod posterior;

/// Uniform event-by-sample grid and sampling-prior densities
pub mod sample_store;

/// Hooks: population model, conversion, selection, likelihood
pub mod traits;

/// Importance ratios, expectations, variances and effective sample sizes
pub mod weights;

/// Population likelihood estimator and its builder
pub mod estimator;

/// Estimator with a Poisson event rate
pub mod rate;

/// Population-weighted resampling of event posteriors
pub mod resample;


pub use error::LikelihoodError;
pub use estimator::{Evaluation, HyperparameterLikelihood, LikelihoodBuilder};
pub use options::LikelihoodOptions;
pub use posterior::PosteriorSamples;
pub use rate::RateLikelihood;
pub use sample_store::{SampleGrid, SampleStore, SamplingPrior};
pub use traits::{HyperParameters, Likelihood};
