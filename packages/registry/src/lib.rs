#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client for an MLflow-compatible model registry.
//!
//! Covers the two registry chores around the demand model: promoting the
//! newest staged version to production, and checking that a registered
//! model URI actually resolves to downloadable artifacts.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |---|---|
//! | `MLFLOW_TRACKING_URI` | Registry base URL |
//! | `MLFLOW_TRACKING_USERNAME` | Basic-auth user (optional) |
//! | `MLFLOW_TRACKING_PASSWORD` | Basic-auth password (optional) |

pub mod client;
pub mod uri;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use client::RegistryClient;
pub use uri::{ModelReference, ModelUri};

/// Errors that can occur while talking to the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("Registry returned HTTP {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// No version of the model is in the requested stage.
    #[error("No model versions found for {name} in {stage} stage")]
    NoVersionInStage {
        /// Registered model name.
        name: String,
        /// Stage that was searched.
        stage: String,
    },

    /// A model URI could not be parsed.
    #[error("Invalid model URI '{uri}': {reason}")]
    InvalidModelUri {
        /// The offending URI.
        uri: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading a local file failed.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A response or file was not the expected JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lifecycle stage of a model version.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ModelStage {
    /// Registered but not staged.
    None,
    /// Candidate for production.
    Staging,
    /// Serving.
    Production,
    /// Retired.
    Archived,
}

/// One registered model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name.
    pub name: String,
    /// Version number. The registry sends it as a string.
    pub version: String,
    /// Stage the version is in.
    pub current_stage: ModelStage,
    /// Run that produced the version.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Artifact location recorded at registration.
    #[serde(default)]
    pub source: Option<String>,
    /// Registration status (`READY`, ...).
    #[serde(default)]
    pub status: Option<String>,
}

impl ModelVersion {
    /// Numeric version, if the registry sent a number.
    #[must_use]
    pub fn number(&self) -> Option<u64> {
        self.version.parse().ok()
    }
}

/// Contents of the `run_information.json` file written at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInformation {
    /// Run that trained the model.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Registered model name.
    #[serde(default)]
    pub model_name: Option<String>,
    /// URI the model can be loaded from.
    pub model_uri: String,
}

impl RunInformation {
    /// Parses [`Self::model_uri`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidModelUri`] if it is malformed.
    pub fn parsed_uri(&self) -> Result<ModelUri, RegistryError> {
        self.model_uri.parse()
    }
}

/// Reads a `run_information.json` file.
///
/// # Errors
///
/// Returns [`RegistryError::Io`] if the file cannot be read, or
/// [`RegistryError::Json`] if it lacks a `model_uri`.
pub fn load_run_information(path: &Path) -> Result<RunInformation, RegistryError> {
    let json = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn stage_parses_case_insensitively() {
        assert_eq!(ModelStage::from_str("staging").unwrap(), ModelStage::Staging);
        assert_eq!(ModelStage::Production.to_string(), "Production");
    }

    #[test]
    fn model_version_tolerates_missing_optional_fields() {
        let version: ModelVersion = serde_json::from_str(
            r#"{"name": "uber_demand_prediction_model", "version": "7", "current_stage": "Staging"}"#,
        )
        .unwrap();
        assert_eq!(version.number(), Some(7));
        assert_eq!(version.current_stage, ModelStage::Staging);
        assert!(version.run_id.is_none());
    }

    #[test]
    fn run_information_needs_model_uri() {
        let info: RunInformation = serde_json::from_str(
            r#"{"run_id": "abc", "model_name": "m", "model_uri": "models:/m/Production"}"#,
        )
        .unwrap();
        assert!(matches!(info.parsed_uri().unwrap(), ModelUri::Registered { .. }));

        assert!(serde_json::from_str::<RunInformation>(r#"{"run_id": "abc"}"#).is_err());
    }

    #[test]
    fn missing_run_information_file_is_io_error() {
        assert!(matches!(
            load_run_information(Path::new("/nonexistent/run_information.json")),
            Err(RegistryError::Io { .. })
        ));
    }
}
