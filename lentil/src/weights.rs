//! Importance-sampling ratios on the event-by-sample grid.
//!
//! ```text
//! w[i,s] = p(θ[i,s] | Λ) / π(θ[i,s])
//! Ê[i]   = (1/S) Σ_s w[i,s]
//! ```
//!
//! `Ê[i]` estimates the marginal likelihood of event `i` under the
//! population `Λ`, up to the event's noise evidence.

use crate::error::LikelihoodError;
use ndarray::{Array1, Array2, Axis, Zip};

/// Population-to-sampling-prior ratios, `(n_events, n_samples)`
#[derive(Debug, Clone)]
pub struct ImportanceWeights {
    ratios: Array2<f64>,
}

impl ImportanceWeights {
    /// Divide population densities by sampling-prior densities
    ///
    /// A non-finite ratio (zero sampling prior) is replaced by zero
    /// when the population density does not exceed `zero_density_floor`;
    /// otherwise it is kept and will surface in the final estimate.
    ///
    /// * `density` - population densities, non-negative
    /// * `sampling_prior` - sampling-prior densities, same shape
    /// * `zero_density_floor` - largest density treated as zero
    pub fn new(
        density: &Array2<f64>,
        sampling_prior: &Array2<f64>,
        zero_density_floor: f64,
    ) -> anyhow::Result<Self> {
        if density.dim() != sampling_prior.dim() {
            return Err(LikelihoodError::ShapeMismatch(format!(
                "population density has shape {:?}, data grid has {:?}",
                density.dim(),
                sampling_prior.dim()
            ))
            .into());
        }

        if let Some(((i, s), &value)) = density
            .indexed_iter()
            .find(|(_, x)| x.is_nan() || **x < 0.0)
        {
            return Err(LikelihoodError::InvalidDensity {
                event: i,
                sample: s,
                value,
            }
            .into());
        }

        let ratios = Zip::from(density)
            .and(sampling_prior)
            .map_collect(|&p, &q| {
                let w = p / q;
                if !w.is_finite() && p <= zero_density_floor {
                    0.0
                } else {
                    w
                }
            });

        Ok(Self { ratios })
    }

    /// Wrap precomputed ratios
    pub fn from_ratios(ratios: Array2<f64>) -> Self {
        Self { ratios }
    }

    /// `(n_events, n_samples)` ratios
    pub fn ratios(&self) -> &Array2<f64> {
        &self.ratios
    }

    /// Number of events
    pub fn n_events(&self) -> usize {
        self.ratios.nrows()
    }

    /// Samples per event
    pub fn n_samples(&self) -> usize {
        self.ratios.ncols()
    }

    /// `Ê[i]`, the per-event mean of the ratios
    pub fn expectation(&self) -> Array1<f64> {
        self.ratios.sum_axis(Axis(1)) / self.n_samples() as f64
    }

    /// `ln max(Ê[i], min_expectation)`
    ///
    /// An event whose samples all sit outside the population support
    /// gets a large finite penalty instead of `-inf`. NaN and `+inf`
    /// pass through unchanged.
    pub fn ln_expectation(&self, min_expectation: f64) -> Array1<f64> {
        self.expectation().mapv(|e| {
            if e.is_nan() {
                e
            } else {
                e.max(min_expectation).ln()
            }
        })
    }

    /// Monte-Carlo variance of `ln Ê[i]`
    ///
    /// ```text
    /// var[i] = (E[w²] - E[w]²) / (S E[w]²)
    /// ```
    ///
    /// Infinite for an event with `Ê[i] = 0`.
    pub fn ln_expectation_variance(&self) -> Array1<f64> {
        let nn = self.n_samples() as f64;
        let mean = self.expectation();
        let mean_sq = self.ratios.mapv(|w| w * w).sum_axis(Axis(1)) / nn;

        Zip::from(&mean)
            .and(&mean_sq)
            .map_collect(|&m, &m2| {
                if m > 0.0 {
                    ((m2 - m * m) / (nn * m * m)).max(0.0)
                } else if m == 0.0 {
                    f64::INFINITY
                } else {
                    f64::NAN
                }
            })
    }

    /// Kish effective sample size `(Σ w)² / Σ w²` of each event
    pub fn effective_sample_size(&self) -> Array1<f64> {
        let s1 = self.ratios.sum_axis(Axis(1));
        let s2 = self.ratios.mapv(|w| w * w).sum_axis(Axis(1));
        Zip::from(&s1)
            .and(&s2)
            .map_collect(|&a, &b| if b > 0.0 { a * a / b } else { 0.0 })
    }
}
