#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Inference seams for the pre-fitted demand models.
//!
//! The query pipeline only ever talks to the four traits defined here. The
//! concrete types in the submodules read the JSON artifacts produced by the
//! offline training job; nothing in this crate fits or updates a model.
//!
//! | Artifact | Trait | Implementation |
//! |---|---|---|
//! | `scaler` | [`Scaler`] | [`scaler::StandardScaler`] |
//! | `kmeans` | [`ClusterModel`] | [`kmeans::KMeansModel`] |
//! | `encoder` | [`Encoder`] | [`encoder::OneHotEncoder`] |
//! | `model` | [`Regressor`] | [`linear::LinearRegressor`] |

pub mod encoder;
pub mod kmeans;
pub mod linear;
pub mod scaler;

/// Errors raised by the inference seams.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// An input vector had the wrong length.
    #[error("{what}: expected {expected} values, got {actual}")]
    DimensionMismatch {
        /// What was being checked.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A column the encoder needs is absent from the input.
    #[error("missing column '{column}'")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The artifact content is structurally invalid.
    #[error("invalid artifact: {message}")]
    Invalid {
        /// What is wrong with it.
        message: String,
    },

    /// The artifact is not valid JSON for its format.
    #[error("malformed artifact: {0}")]
    Json(#[from] serde_json::Error),
}

/// Maps raw numeric features onto the scale the cluster model was fitted on.
pub trait Scaler: Send + Sync {
    /// Transforms one sample.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DimensionMismatch`] if `features` has the wrong
    /// length.
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ModelError>;
}

/// A fitted partition of space into clusters.
pub trait ClusterModel: Send + Sync {
    /// Number of clusters.
    fn n_clusters(&self) -> usize;

    /// Distance from `point` to every cluster center, indexed by cluster.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DimensionMismatch`] if `point` has the wrong
    /// dimensionality.
    fn distances(&self, point: &[f64]) -> Result<Vec<f64>, ModelError>;
}

/// Turns a row of named raw values into the numeric vector the regressor
/// expects.
pub trait Encoder: Send + Sync {
    /// Length of every encoded vector.
    fn output_width(&self) -> usize;

    /// Encodes one row. `values` is aligned with `columns`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingColumn`] if a column the encoder was
    /// fitted on is not present.
    fn encode(&self, columns: &[String], values: &[f64]) -> Result<Vec<f64>, ModelError>;
}

/// Produces one demand estimate per encoded row.
pub trait Regressor: Send + Sync {
    /// Number of features expected per row.
    fn n_features(&self) -> usize;

    /// Predicts a single row.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DimensionMismatch`] if `features` has the wrong
    /// length.
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

/// Fails with [`ModelError::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn check_len(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), ModelError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
