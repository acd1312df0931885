//! Population likelihood with an overall event rate.
//!
//! ```text
//! ln L(Λ, R) = Σ_i ln(R Ê_i(Λ)) - R α(Λ)
//!            = Σ_i ln Ê_i(Λ) + N ln R - R α(Λ)
//! ```
//!
//! `R` is the expected number of events, read from the `rate`
//! hyper-parameter.

use crate::error::LikelihoodError;
use crate::estimator::{Evaluation, HyperparameterLikelihood, Normalization};
use crate::traits::*;

use ndarray::Array1;

/// Name of the rate hyper-parameter
pub const RATE: &str = "rate";

/// [`HyperparameterLikelihood`] with a Poisson rate term
pub struct RateLikelihood {
    inner: HyperparameterLikelihood,
}

impl RateLikelihood {
    /// Wrap a plain estimator; `rate` must be set before evaluation
    pub fn new(inner: HyperparameterLikelihood) -> Self {
        Self { inner }
    }

    /// The wrapped estimator
    pub fn inner(&self) -> &HyperparameterLikelihood {
        &self.inner
    }

    /// Unwrap into the plain estimator
    pub fn into_inner(self) -> HyperparameterLikelihood {
        self.inner
    }

    fn normalization(params: &HyperParameters) -> anyhow::Result<Normalization> {
        let rate = *params
            .get(RATE)
            .ok_or_else(|| LikelihoodError::MissingParameter(RATE.into()))?;
        Ok(Normalization::Rate(rate))
    }

    /// Per-event `ln Ê_i`; they do not depend on the rate
    pub fn ln_bayes_factors(&mut self) -> anyhow::Result<Array1<f64>> {
        self.inner.ln_bayes_factors()
    }

    /// Full evaluation with the Poisson normalization
    ///
    /// The total variance is `Σ var_i + R² var(α)`.
    pub fn evaluate(&mut self) -> anyhow::Result<Evaluation> {
        self.inner.with_converted(|like, params| {
            like.combine(params, Self::normalization(params)?, true)
        })
    }

    /// Augmented hyper-parameters (including `rate`) plus `ln_bf_{i}`,
    /// `var_{i}`, `selection`, `selection_variance` and `variance`
    pub fn generate_extra_statistics(&mut self) -> anyhow::Result<HyperParameters> {
        Ok(self.evaluate()?.to_statistics())
    }
}

impl Likelihood for RateLikelihood {
    fn parameters(&self) -> &HyperParameters {
        self.inner.parameters()
    }

    fn parameters_mut(&mut self) -> &mut HyperParameters {
        self.inner.parameters_mut()
    }

    fn log_likelihood_ratio(&mut self) -> anyhow::Result<f64> {
        self.inner.with_converted(|like, params| {
            like.cut_log_likelihood_ratio(params, Self::normalization(params)?)
        })
    }

    fn noise_log_likelihood(&self) -> f64 {
        self.inner.noise_log_likelihood()
    }
}
