//! Monte-Carlo estimate of the population likelihood.
//!
//! ```text
//! ln L(Λ) = Σ_i ln Ê_i(Λ) - N ln α(Λ)
//! ```
//!
//! where `Ê_i` is the mean importance ratio of event `i` (see
//! [`crate::weights`]) and `α` the detectable fraction.

use crate::error::LikelihoodError;
use crate::options::LikelihoodOptions;
use crate::posterior::PosteriorSamples;
use crate::rate::RateLikelihood;
use crate::resample::resample_by_weight;
use crate::sample_store::{SampleGrid, SampleStore, SamplingPrior};
use crate::traits::*;
use crate::weights::ImportanceWeights;

use log::{debug, info};
use ndarray::{Array1, Array2};
use rand::Rng;
use std::sync::Arc;

/// Per-event and combined quantities of one evaluation
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Hyper-parameters after the conversion function
    pub parameters: HyperParameters,
    /// `ln Ê_i`, clipped at the expectation floor
    pub ln_bayes_factors: Array1<f64>,
    /// Monte-Carlo variance of each `ln Ê_i`
    pub variances: Array1<f64>,
    /// Effective sample size of each event
    pub effective_sample_sizes: Array1<f64>,
    /// Detectable fraction `α`
    pub selection: f64,
    /// Monte-Carlo variance of `α`
    pub selection_variance: f64,
    /// Log-likelihood ratio (before any uncertainty cut)
    pub log_likelihood_ratio: f64,
    /// Total Monte-Carlo variance of `log_likelihood_ratio`
    pub variance: f64,
}

impl Evaluation {
    /// Extra columns to store next to each posterior draw of `Λ`
    pub fn to_statistics(&self) -> HyperParameters {
        let mut ret = self.parameters.clone();
        for (i, (&ln_bf, &var)) in self
            .ln_bayes_factors
            .iter()
            .zip(self.variances.iter())
            .enumerate()
        {
            ret.insert(format!("ln_bf_{}", i).into(), ln_bf);
            ret.insert(format!("var_{}", i).into(), var);
        }
        ret.insert("selection".into(), self.selection);
        ret.insert("selection_variance".into(), self.selection_variance);
        ret.insert("variance".into(), self.variance);
        ret
    }
}

/// Per-event quantities of one evaluation
pub(crate) struct EventTerms {
    pub(crate) ln_bayes_factors: Array1<f64>,
    pub(crate) variances: Option<Array1<f64>>,
    pub(crate) effective_sample_sizes: Option<Array1<f64>>,
}

/// How the event sum is normalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Normalization {
    /// `- N ln α`
    Fraction,
    /// `N ln R - R α` with the given rate `R`
    Rate(f64),
}

impl Normalization {
    fn ln_term(&self, n_events: f64, selection: f64) -> f64 {
        match *self {
            Normalization::Fraction => -n_events * selection.ln(),
            Normalization::Rate(rate) => n_events * rate.ln() - rate * selection,
        }
    }

    fn variance_term(&self, n_events: f64, selection: f64, selection_variance: f64) -> f64 {
        match *self {
            Normalization::Fraction => {
                n_events * n_events * selection_variance / (selection * selection)
            }
            Normalization::Rate(rate) => rate * rate * selection_variance,
        }
    }
}

/// Builder of [`HyperparameterLikelihood`] and [`RateLikelihood`]
///
/// Posteriors (or a prebuilt store), a population model and a sampling
/// prior are mandatory.
///
/// ```ignore
/// let mut like = HyperparameterLikelihood::builder()
///     .posteriors(posteriors)
///     .population_model(model)
///     .sampling_prior(SamplingPrior::Constant(1.0))
///     .noise_evidences(ln_evidences)
///     .max_samples(1000)
///     .build()?;
/// ```
#[derive(Default)]
pub struct LikelihoodBuilder {
    posteriors: Option<Vec<PosteriorSamples>>,
    store: Option<Arc<SampleStore>>,
    model: Option<Box<dyn PopulationModel>>,
    sampling_prior: Option<SamplingPrior>,
    noise_evidences: Option<Vec<f64>>,
    conversion: Option<Box<dyn ConversionFunction>>,
    selection: Option<Box<dyn SelectionFunction>>,
    options: LikelihoodOptions,
}

impl LikelihoodBuilder {
    /// One posterior table per event
    pub fn posteriors(mut self, posteriors: Vec<PosteriorSamples>) -> Self {
        self.posteriors = Some(posteriors);
        self
    }

    /// Reuse an existing store instead of building one from posteriors.
    /// Cannot be combined with posteriors, a sampling prior or
    /// `max_samples`.
    pub fn sample_store(mut self, store: Arc<SampleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Population density `p(θ | Λ)` (mandatory)
    pub fn population_model(mut self, model: impl PopulationModel + 'static) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    /// Densities the posterior samples were drawn under
    pub fn sampling_prior(mut self, prior: SamplingPrior) -> Self {
        self.sampling_prior = Some(prior);
        self
    }

    /// Log-evidences of the noise hypothesis, one per event
    pub fn noise_evidences(mut self, ln_evidences: Vec<f64>) -> Self {
        self.noise_evidences = Some(ln_evidences);
        self
    }

    /// Derive extra hyper-parameters before each evaluation
    pub fn conversion_function(mut self, conversion: impl ConversionFunction + 'static) -> Self {
        self.conversion = Some(Box::new(conversion));
        self
    }

    /// Detectable fraction `α(Λ)`; 1 when not given
    pub fn selection_function(mut self, selection: impl SelectionFunction + 'static) -> Self {
        self.selection = Some(Box::new(selection));
        self
    }

    /// Keep at most `max_samples` posterior samples per event
    pub fn max_samples(mut self, max_samples: usize) -> Self {
        self.options.max_samples = Some(max_samples);
        self
    }

    /// Replace all numerical options, including `max_samples`
    pub fn options(mut self, options: LikelihoodOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the plain estimator
    pub fn build(self) -> anyhow::Result<HyperparameterLikelihood> {
        self.options.validate()?;

        let model = self
            .model
            .ok_or(LikelihoodError::MissingArgument("population_model"))?;

        let store = match (self.store, self.posteriors) {
            (Some(_), Some(_)) => {
                return Err(LikelihoodError::ConflictingArgument("posteriors").into());
            }
            (Some(_), None) if self.sampling_prior.is_some() => {
                return Err(LikelihoodError::ConflictingArgument("sampling_prior").into());
            }
            (Some(_), None) if self.options.max_samples.is_some() => {
                return Err(LikelihoodError::ConflictingArgument("max_samples").into());
            }
            (Some(store), None) => store,
            (None, Some(posteriors)) => {
                let prior = self
                    .sampling_prior
                    .ok_or(LikelihoodError::MissingArgument("sampling_prior"))?;
                Arc::new(SampleStore::new(
                    &posteriors,
                    &prior,
                    self.options.max_samples,
                    self.options.seed,
                )?)
            }
            (None, None) => return Err(LikelihoodError::MissingArgument("posteriors").into()),
        };

        let n_events = store.n_events();

        let noise_evidences = match self.noise_evidences {
            Some(ln_ev) if ln_ev.len() != n_events => {
                return Err(LikelihoodError::ShapeMismatch(format!(
                    "{} noise evidences for {} events",
                    ln_ev.len(),
                    n_events
                ))
                .into());
            }
            Some(ln_ev) => Some(Array1::from(ln_ev)),
            None => None,
        };

        let total_noise_evidence = noise_evidences
            .as_ref()
            .map(|x| x.sum())
            .unwrap_or(f64::NAN);

        info!(
            "hyper-parameter likelihood: {} events x {} samples",
            n_events,
            store.samples_per_event()
        );

        Ok(HyperparameterLikelihood {
            parameters: HyperParameters::new(),
            store,
            model,
            conversion: self.conversion.unwrap_or_else(|| Box::new(IdentityConversion)),
            selection: self.selection.unwrap_or_else(|| Box::new(NoSelection)),
            noise_evidences,
            total_noise_evidence,
            options: self.options,
        })
    }

    /// Build the estimator with a Poisson rate term
    pub fn build_rate(self) -> anyhow::Result<RateLikelihood> {
        Ok(RateLikelihood::new(self.build()?))
    }
}

/// Population likelihood estimated from per-event posterior samples
pub struct HyperparameterLikelihood {
    parameters: HyperParameters,
    store: Arc<SampleStore>,
    model: Box<dyn PopulationModel>,
    conversion: Box<dyn ConversionFunction>,
    selection: Box<dyn SelectionFunction>,
    noise_evidences: Option<Array1<f64>>,
    total_noise_evidence: f64,
    options: LikelihoodOptions,
}

impl HyperparameterLikelihood {
    /// Start an empty [`LikelihoodBuilder`]
    pub fn builder() -> LikelihoodBuilder {
        LikelihoodBuilder::default()
    }

    /// Down-sampled posterior samples, `(n_events, n_samples)` per column
    pub fn data(&self) -> &SampleGrid {
        self.store.data()
    }

    /// Sampling-prior densities on the same grid as [`Self::data`]
    pub fn sampling_prior(&self) -> &Array2<f64> {
        self.store.sampling_prior()
    }

    /// The shared store, for building further estimators
    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    /// Number of events in the catalog
    pub fn n_events(&self) -> usize {
        self.store.n_events()
    }

    /// Samples kept per event after down-sampling
    pub fn samples_per_event(&self) -> usize {
        self.store.samples_per_event()
    }

    /// Numerical options in use
    pub fn options(&self) -> &LikelihoodOptions {
        &self.options
    }

    /// Per-event noise log-evidences, if given
    pub fn noise_evidences(&self) -> Option<&Array1<f64>> {
        self.noise_evidences.as_ref()
    }

    /// NaN when no noise evidences were given
    pub fn total_noise_evidence(&self) -> f64 {
        self.total_noise_evidence
    }

    /// Set a single hyper-parameter
    pub fn set_parameter(&mut self, name: impl Into<Box<str>>, value: f64) {
        self.parameters.insert(name.into(), value);
    }

    /// Apply the conversion function, run `f` on the augmented mapping,
    /// then drop the names the conversion added from `self.parameters`
    /// whether or not `f` succeeded.
    pub(crate) fn with_converted<T, F>(&mut self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Self, &HyperParameters) -> anyhow::Result<T>,
    {
        let (augmented, added) = self.conversion.convert(&self.parameters)?;
        let ret = f(self, &augmented);
        for name in added.iter() {
            self.parameters.remove(name);
        }
        ret
    }

    pub(crate) fn importance_weights(
        &self,
        params: &HyperParameters,
    ) -> anyhow::Result<ImportanceWeights> {
        let density = self.model.density(self.store.data(), params)?;
        ImportanceWeights::new(
            &density,
            self.store.sampling_prior(),
            self.options.zero_density_floor,
        )
    }

    /// Per-event `ln Ê_i` and, on request, their variances and
    /// effective sample sizes
    pub(crate) fn per_event_terms(
        &self,
        params: &HyperParameters,
        with_variance: bool,
    ) -> anyhow::Result<EventTerms> {
        let weights = self.importance_weights(params)?;
        let ln_bayes_factors = weights.ln_expectation(self.options.min_expectation);

        let n_floored = ln_bayes_factors
            .iter()
            .filter(|&&x| x <= self.options.min_expectation.ln())
            .count();
        if n_floored > 0 {
            debug!("{} event(s) clipped at the expectation floor", n_floored);
        }

        Ok(EventTerms {
            ln_bayes_factors,
            variances: with_variance.then(|| weights.ln_expectation_variance()),
            effective_sample_sizes: with_variance.then(|| weights.effective_sample_size()),
        })
    }

    /// Turn an estimate into `-inf` if its variance is above the
    /// configured maximum
    pub(crate) fn apply_uncertainty_cut(&self, ln_l: f64, variance: Option<f64>) -> f64 {
        match (self.options.maximum_uncertainty, variance) {
            (Some(max_unc), Some(var)) if var > max_unc => {
                debug!("variance {} above maximum {}; rejecting", var, max_unc);
                f64::NEG_INFINITY
            }
            _ => ln_l,
        }
    }

    /// Sum the per-event terms and add the normalization.
    ///
    /// Without `with_variance` the variance, selection variance and
    /// effective sample sizes are left as NaN.
    pub(crate) fn combine(
        &self,
        params: &HyperParameters,
        normalization: Normalization,
        with_variance: bool,
    ) -> anyhow::Result<Evaluation> {
        let n_events = self.n_events();
        let nn = n_events as f64;

        let terms = self.per_event_terms(params, with_variance)?;
        let selection = self.selection.detectable_fraction(params)?;
        let ln_l = terms.ln_bayes_factors.sum() + normalization.ln_term(nn, selection);

        let selection_variance = if with_variance {
            self.selection.detectable_fraction_variance(params)?
        } else {
            f64::NAN
        };

        let variance = match &terms.variances {
            Some(var) => var.sum() + normalization.variance_term(nn, selection, selection_variance),
            None => f64::NAN,
        };

        let not_computed = || Array1::from_elem(n_events, f64::NAN);

        Ok(Evaluation {
            parameters: params.clone(),
            ln_bayes_factors: terms.ln_bayes_factors,
            variances: terms.variances.unwrap_or_else(not_computed),
            effective_sample_sizes: terms.effective_sample_sizes.unwrap_or_else(not_computed),
            selection,
            selection_variance,
            log_likelihood_ratio: ln_l,
            variance,
        })
    }

    /// `log_likelihood_ratio` under `normalization`, with the
    /// uncertainty cut applied
    pub(crate) fn cut_log_likelihood_ratio(
        &self,
        params: &HyperParameters,
        normalization: Normalization,
    ) -> anyhow::Result<f64> {
        let with_variance = self.options.maximum_uncertainty.is_some();
        let eval = self.combine(params, normalization, with_variance)?;
        Ok(self.apply_uncertainty_cut(
            eval.log_likelihood_ratio,
            with_variance.then_some(eval.variance),
        ))
    }

    /// Per-event `ln Ê_i` under the current hyper-parameters
    pub fn ln_bayes_factors(&mut self) -> anyhow::Result<Array1<f64>> {
        self.with_converted(|this, params| {
            Ok(this.per_event_terms(params, false)?.ln_bayes_factors)
        })
    }

    /// Full evaluation with variance and effective sample sizes
    pub fn evaluate(&mut self) -> anyhow::Result<Evaluation> {
        self.with_converted(|this, params| this.combine(params, Normalization::Fraction, true))
    }

    /// Augmented hyper-parameters plus `ln_bf_{i}`, `var_{i}`,
    /// `selection`, `selection_variance` and `variance`
    pub fn generate_extra_statistics(&mut self) -> anyhow::Result<HyperParameters> {
        Ok(self.evaluate()?.to_statistics())
    }

    /// Draw `n_draws` samples per event from the population-weighted
    /// posteriors under the current hyper-parameters
    pub fn posterior_predictive_resample<R: Rng + ?Sized>(
        &mut self,
        n_draws: usize,
        rng: &mut R,
    ) -> anyhow::Result<SampleGrid> {
        self.with_converted(|this, params| {
            let weights = this.importance_weights(params)?;
            resample_by_weight(this.data(), &weights, n_draws, rng)
        })
    }
}

impl Likelihood for HyperparameterLikelihood {
    fn parameters(&self) -> &HyperParameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut HyperParameters {
        &mut self.parameters
    }

    fn log_likelihood_ratio(&mut self) -> anyhow::Result<f64> {
        self.with_converted(|this, params| {
            this.cut_log_likelihood_ratio(params, Normalization::Fraction)
        })
    }

    fn noise_log_likelihood(&self) -> f64 {
        self.total_noise_evidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn constant_posteriors(n_events: usize, n_samples: usize) -> Vec<PosteriorSamples> {
        (0..n_events)
            .map(|_| {
                PosteriorSamples::from_columns(vec![("x", vec![1.0; n_samples])]).unwrap()
            })
            .collect()
    }

    fn column_model(data: &SampleGrid, _: &HyperParameters) -> anyhow::Result<Array2<f64>> {
        Ok(data.column("x")?.to_owned())
    }

    #[test]
    fn missing_model_is_reported_by_name() {
        let err = HyperparameterLikelihood::builder()
            .posteriors(constant_posteriors(2, 3))
            .sampling_prior(SamplingPrior::Constant(1.0))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<LikelihoodError>(),
            Some(&LikelihoodError::MissingArgument("population_model"))
        );
    }

    #[test]
    fn model_with_wrong_shape_fails() {
        let mut like = HyperparameterLikelihood::builder()
            .posteriors(constant_posteriors(2, 3))
            .population_model(|_: &SampleGrid, _: &HyperParameters| -> anyhow::Result<Array2<f64>> {
                Ok(Array2::ones((2, 4)))
            })
            .sampling_prior(SamplingPrior::Constant(1.0))
            .build()
            .unwrap();
        let err = like.log_likelihood_ratio().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LikelihoodError>(),
            Some(LikelihoodError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn selection_variance_enters_total_variance() {
        struct NoisySelection;
        impl SelectionFunction for NoisySelection {
            fn detectable_fraction(&self, _: &HyperParameters) -> anyhow::Result<f64> {
                Ok(0.5)
            }
            fn detectable_fraction_variance(&self, _: &HyperParameters) -> anyhow::Result<f64> {
                Ok(0.01)
            }
        }

        let mut like = HyperparameterLikelihood::builder()
            .posteriors(constant_posteriors(3, 10))
            .population_model(column_model)
            .sampling_prior(SamplingPrior::Constant(1.0))
            .selection_function(NoisySelection)
            .build()
            .unwrap();

        let eval = like.evaluate().unwrap();
        assert_abs_diff_eq!(eval.log_likelihood_ratio, 3.0 * 2.0_f64.ln(), epsilon = 1e-12);
        // 3^2 * 0.01 / 0.5^2
        assert_abs_diff_eq!(eval.variance, 0.36, epsilon = 1e-12);
    }

    #[test]
    fn uncertainty_cut_rejects_noisy_estimates() {
        let posts: Vec<PosteriorSamples> = (0..2)
            .map(|_| {
                PosteriorSamples::from_columns(vec![("x", vec![0.0, 0.0, 0.0, 1.0])]).unwrap()
            })
            .collect();

        let build = |max_unc: Option<f64>| {
            HyperparameterLikelihood::builder()
                .posteriors(posts.clone())
                .population_model(column_model)
                .sampling_prior(SamplingPrior::Constant(1.0))
                .options(LikelihoodOptions {
                    maximum_uncertainty: max_unc,
                    ..Default::default()
                })
                .build()
                .unwrap()
        };

        // per event: E[w] = 1/4, E[w²] = 1/4 -> var = (1/4 - 1/16) / (4/16) = 3/4
        let mut loose = build(Some(10.0));
        assert!(loose.log_likelihood_ratio().unwrap().is_finite());

        let mut strict = build(Some(1.0));
        assert_eq!(strict.log_likelihood_ratio().unwrap(), f64::NEG_INFINITY);

        let mut unset = build(None);
        assert_abs_diff_eq!(
            unset.log_likelihood_ratio().unwrap(),
            2.0 * 0.25_f64.ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn plain_ratio_skips_the_diagnostics() {
        let like = HyperparameterLikelihood::builder()
            .posteriors(constant_posteriors(3, 10))
            .population_model(column_model)
            .sampling_prior(SamplingPrior::Constant(1.0))
            .build()
            .unwrap();
        let params = HyperParameters::new();

        let fast = like.combine(&params, Normalization::Fraction, false).unwrap();
        assert!(fast.variance.is_nan());
        assert!(fast.variances.iter().all(|x| x.is_nan()));
        assert!(fast.effective_sample_sizes.iter().all(|x| x.is_nan()));

        let full = like.combine(&params, Normalization::Fraction, true).unwrap();
        assert_eq!(full.ln_bayes_factors, fast.ln_bayes_factors);
        assert_eq!(full.log_likelihood_ratio, fast.log_likelihood_ratio);
        assert!(full.effective_sample_sizes.iter().all(|&n| n == 10.0));
        assert_eq!(full.variance, 0.0);
    }
}
