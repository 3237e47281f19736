#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Nearest-zone taxi demand queries.
//!
//! Given a date, a time and a sampled pickup location, a query:
//!
//! 1. turns the date/time into a [`TimeBucket`](taxi_demand_models::TimeBucket)
//!    key ([`bucket::bucket`]),
//! 2. optionally narrows the city to the regions nearest the location
//!    ([`zones::ZoneSelector`]),
//! 3. fetches that bucket's feature rows ([`store::DemandFeatureStore`]),
//! 4. runs them through the encoder and regressor
//!    ([`pipeline::PredictionPipeline`]),
//! 5. and renders a region-sorted, color-coded legend ([`legend::render`]).
//!
//! [`service::DemandService`] wires the steps together. Every handle it
//! holds is read-only after construction, so one service can answer queries
//! from many threads at once.

pub mod bucket;
pub mod colors;
pub mod legend;
pub mod pipeline;
pub mod reference;
pub mod service;
pub mod store;
pub mod zones;

use std::path::PathBuf;

use taxi_demand_model::ModelError;
use taxi_demand_models::TimeBucket;

/// Errors that can occur while answering a demand query.
#[derive(Debug, thiserror::Error)]
pub enum DemandError {
    /// A required user input was not supplied or is out of range.
    #[error("Invalid input: {field}")]
    InvalidInput {
        /// Which input is missing or invalid.
        field: String,
    },

    /// A model or data artifact could not be loaded.
    #[error("Failed to load artifact '{name}': {message}")]
    ArtifactLoad {
        /// Artifact name (`scaler`, `encoder`, `kmeans`, `model`, ...).
        name: String,
        /// What went wrong.
        message: String,
    },

    /// The feature table has no rows for the requested bucket.
    #[error("No data for the selected date & time ({bucket})")]
    BucketNotFound {
        /// The bucket that was looked up.
        bucket: TimeBucket,
    },

    /// Zone selection was requested without a loaded scaler or cluster
    /// model.
    #[error("Model not loaded: {model}")]
    ModelNotLoaded {
        /// Which model is missing.
        model: &'static str,
    },

    /// The columns handed to the model do not match the feature schema.
    #[error("Invalid feature set: {message}")]
    InvalidFeatureSet {
        /// Description of the mismatch.
        message: String,
    },

    /// Rows and predictions disagree. Indicates an integration bug.
    #[error("Invariant violated: {message}")]
    InvariantViolation {
        /// Description of the violation.
        message: String,
    },

    /// An inference seam rejected its input.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// A feature or reference dataset could not be read.
    #[error("Failed to read dataset {}: {message}", path.display())]
    Dataset {
        /// Dataset path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
}

impl DemandError {
    /// Whether the caller should report this to the user and carry on,
    /// rather than treat it as fatal.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::BucketNotFound { .. })
    }
}
