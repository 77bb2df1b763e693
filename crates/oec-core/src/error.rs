//! Error types for model construction and configuration
//!
//! Construction errors are not recoverable: a model whose derivative vector
//! does not match its declared state dimension, or a discretizer asked for zero
//! steps, must abort startup. They surface as [`ModelError`] at build time so
//! nothing downstream ever sees a malformed dynamics model.
//!
//! # Example
//!
//! ```ignore
//! use oec_core::{DynamicsSpec, ModelResult};
//!
//! fn build() -> ModelResult<()> {
//!     let spec = DynamicsSpec::new(my_model)?;
//!     let model = DiscretizedModel::new(spec, 10.0, 20, 4)?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while constructing dynamics models and discretizations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A vector produced or consumed by a model has the wrong length.
    #[error("{model}: {what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        model: String,
        what: String,
        expected: usize,
        actual: usize,
    },

    /// Step size, step count or finite-element count is unusable.
    #[error("invalid discretization: {0}")]
    InvalidDiscretization(String),

    /// A model evaluation produced NaN or infinity.
    #[error("{model}: non-finite value in {what}")]
    NonFinite { model: String, what: String },
}

/// Convenience alias for model construction results.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while loading or validating a [`ClusterConfig`](crate::ClusterConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field holds a physically meaningless value.
    #[error("invalid configuration field `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
