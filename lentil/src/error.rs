//! Error kinds raised while building or evaluating a likelihood.
//!
//! Every fallible function in the crate returns `anyhow::Result`; the
//! variants below travel inside `anyhow::Error` and can be recovered
//! with `err.downcast_ref::<LikelihoodError>()`.

use thiserror::Error;

/// Errors raised while building or evaluating a likelihood
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LikelihoodError {
    /// A mandatory collaborator was not given to the builder
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Two builder arguments that cannot be used together
    #[error("{0} cannot be combined with a prebuilt sample store")]
    ConflictingArgument(&'static str),

    /// A hyper-parameter needed at evaluation time is absent
    #[error("missing hyper-parameter: {0}")]
    MissingParameter(Box<str>),

    /// A posterior column requested by a hook is absent
    #[error("missing posterior column: {0}")]
    MissingColumn(Box<str>),

    /// No events, or an event with no samples
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Columns or densities that do not line up
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Sampling-prior densities must not be negative or NaN
    #[error("invalid sampling prior density {value} (event {event}, sample {sample})")]
    InvalidSamplingPrior {
        /// Event index
        event: usize,
        /// Sample index within the event
        sample: usize,
        /// Offending density
        value: f64,
    },

    /// Population densities must be non-negative (NaN is rejected too)
    #[error("population model returned {value} (event {event}, sample {sample})")]
    InvalidDensity {
        /// Event index
        event: usize,
        /// Sample index within the event
        sample: usize,
        /// Offending density
        value: f64,
    },
}
