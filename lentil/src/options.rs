use serde::{Deserialize, Serialize};

/// Numerical and down-sampling options of a hyper-parameter likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LikelihoodOptions {
    /// Keep at most this many posterior samples per event. Default: all
    /// samples of the shortest event
    pub max_samples: Option<usize>,
    /// Random seed of the down-sampling draw. Default: 42
    pub seed: u64,
    /// Lower bound on an event's mean importance ratio before taking
    /// the log. Default: 1e-300
    pub min_expectation: f64,
    /// Population densities at or below this value count as zero when
    /// the sampling prior is also zero. Default: 0.0
    pub zero_density_floor: f64,
    /// Reject (return `-inf`) when the Monte-Carlo variance of the
    /// log-likelihood exceeds this. Default: never
    pub maximum_uncertainty: Option<f64>,
}

impl Default for LikelihoodOptions {
    fn default() -> Self {
        LikelihoodOptions {
            max_samples: None,
            seed: 42,
            min_expectation: 1e-300,
            zero_density_floor: 0.0,
            maximum_uncertainty: None,
        }
    }
}

impl LikelihoodOptions {
    /// Parse and validate options from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let ret: Self = serde_json::from_str(json)?;
        ret.validate()?;
        Ok(ret)
    }

    /// Pretty-printed JSON
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that floors are positive and finite and counts are non-zero
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.min_expectation > 0.0 && self.min_expectation.is_finite()) {
            anyhow::bail!(
                "min_expectation must be positive and finite, got {}",
                self.min_expectation
            );
        }
        if !(self.zero_density_floor >= 0.0 && self.zero_density_floor.is_finite()) {
            anyhow::bail!(
                "zero_density_floor must be non-negative and finite, got {}",
                self.zero_density_floor
            );
        }
        if let Some(0) = self.max_samples {
            anyhow::bail!("max_samples must be positive");
        }
        if let Some(max_unc) = self.maximum_uncertainty {
            if max_unc.is_nan() || max_unc < 0.0 {
                anyhow::bail!("maximum_uncertainty must be non-negative, got {}", max_unc);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let opts = LikelihoodOptions::from_json_str(r#"{ "max_samples": 100 }"#).unwrap();
        assert_eq!(opts.max_samples, Some(100));
        assert_eq!(opts.seed, 42);
        assert_eq!(opts.min_expectation, 1e-300);
        assert_eq!(opts.maximum_uncertainty, None);
    }

    #[test]
    fn json_round_trip() {
        let opts = LikelihoodOptions {
            max_samples: Some(10),
            seed: 7,
            maximum_uncertainty: Some(1.0),
            ..Default::default()
        };
        let back = LikelihoodOptions::from_json_str(&opts.to_json_string().unwrap()).unwrap();
        assert_eq!(opts, back);
    }

    #[test]
    fn bad_floor_is_rejected() {
        assert!(LikelihoodOptions::from_json_str(r#"{ "min_expectation": 0.0 }"#).is_err());
        assert!(LikelihoodOptions::from_json_str(r#"{ "max_samples": 0 }"#).is_err());
    }
}
