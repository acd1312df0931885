use crate::sample_store::SampleGrid;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Named hyper-parameter values of the population model
pub type HyperParameters = BTreeMap<Box<str>, f64>;

/// Population density `p(θ | Λ)` evaluated on posterior samples
///
/// Must be deterministic, return an array of the grid's shape, and
/// return exactly zero outside its support.
pub trait PopulationModel: Send + Sync {
    /// Density of every grid entry under `params`, shaped like `data`
    fn density(&self, data: &SampleGrid, params: &HyperParameters)
        -> anyhow::Result<Array2<f64>>;
}

impl<F> PopulationModel for F
where
    F: Fn(&SampleGrid, &HyperParameters) -> anyhow::Result<Array2<f64>> + Send + Sync,
{
    fn density(
        &self,
        data: &SampleGrid,
        params: &HyperParameters,
    ) -> anyhow::Result<Array2<f64>> {
        self(data, params)
    }
}

/// Derive dependent hyper-parameters before the population model sees
/// them. Returns the augmented mapping and the names it added.
pub trait ConversionFunction: Send + Sync {
    /// Augmented mapping and the names it added
    fn convert(
        &self,
        params: &HyperParameters,
    ) -> anyhow::Result<(HyperParameters, Vec<Box<str>>)>;
}

impl<F> ConversionFunction for F
where
    F: Fn(&HyperParameters) -> anyhow::Result<(HyperParameters, Vec<Box<str>>)> + Send + Sync,
{
    fn convert(
        &self,
        params: &HyperParameters,
    ) -> anyhow::Result<(HyperParameters, Vec<Box<str>>)> {
        self(params)
    }
}

/// Hands the mapping through and adds nothing
pub struct IdentityConversion;

impl ConversionFunction for IdentityConversion {
    fn convert(
        &self,
        params: &HyperParameters,
    ) -> anyhow::Result<(HyperParameters, Vec<Box<str>>)> {
        Ok((params.clone(), vec![]))
    }
}

/// Fraction of the population that would be detected
pub trait SelectionFunction: Send + Sync {
    /// `α(Λ)`
    fn detectable_fraction(&self, params: &HyperParameters) -> anyhow::Result<f64>;

    /// Monte-Carlo variance of [`SelectionFunction::detectable_fraction`],
    /// zero for an exact selection function
    fn detectable_fraction_variance(&self, _params: &HyperParameters) -> anyhow::Result<f64> {
        Ok(0.0)
    }
}

impl<F> SelectionFunction for F
where
    F: Fn(&HyperParameters) -> anyhow::Result<f64> + Send + Sync,
{
    fn detectable_fraction(&self, params: &HyperParameters) -> anyhow::Result<f64> {
        self(params)
    }
}

/// Everything is detected
pub struct NoSelection;

impl SelectionFunction for NoSelection {
    fn detectable_fraction(&self, _params: &HyperParameters) -> anyhow::Result<f64> {
        Ok(1.0)
    }
}

/// What an outer sampler needs from a likelihood
pub trait Likelihood {
    /// Current hyper-parameters
    fn parameters(&self) -> &HyperParameters;

    /// Mutable access for the outer sampler
    fn parameters_mut(&mut self) -> &mut HyperParameters;

    /// Log-likelihood ratio against the noise hypothesis
    fn log_likelihood_ratio(&mut self) -> anyhow::Result<f64>;

    /// Sum of the noise log-evidences, NaN if none were given
    fn noise_log_likelihood(&self) -> f64;

    /// `log_likelihood_ratio() + noise_log_likelihood()`
    fn log_likelihood(&mut self) -> anyhow::Result<f64> {
        Ok(self.log_likelihood_ratio()? + self.noise_log_likelihood())
    }

    /// Overwrite (or add) hyper-parameter values
    fn update_parameters<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<Box<str>>,
        Self: Sized,
    {
        let params = self.parameters_mut();
        for (name, value) in values {
            params.insert(name.into(), value);
        }
    }
}
