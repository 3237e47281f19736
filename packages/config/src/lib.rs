#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration for the taxi demand service.
//!
//! Built in three layers, later ones winning:
//!
//! 1. defaults embedded from `config/default.toml`,
//! 2. an optional TOML file (any subset of keys),
//! 3. environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |---|---|
//! | `SCALER_KEY`, `ENCODER_KEY`, `KMEANS_KEY`, `MODEL_KEY` | `artifacts.<name>.remote_id` |
//! | `ARTIFACT_BASE_URL` | `artifacts.url_template` |
//! | `MLFLOW_TRACKING_URI` | `registry.tracking_uri` |
//! | `MLFLOW_TRACKING_USERNAME` | `registry.username` |
//! | `MLFLOW_TRACKING_PASSWORD` | `registry.password` |
//! | `BIND_ADDR` | `server.bind_addr` |
//! | `PORT` | `server.port` |

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use taxi_demand_models::FeatureSchema;

/// Defaults compiled into the binary.
const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors that can occur while building the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A config layer is not valid TOML or has the wrong shape.
    #[error("Failed to parse config from {origin}: {message}")]
    Parse {
        /// Which layer failed (`defaults`, a file path, or `merged`).
        origin: String,
        /// Parser message.
        message: String,
    },

    /// The merged configuration is inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Where one artifact lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Local file path.
    pub path: PathBuf,
    /// Remote id used to download the file when it is missing.
    #[serde(default)]
    pub remote_id: Option<String>,
    /// Expected MD5 of the file.
    #[serde(default)]
    pub md5: Option<String>,
}

/// `[artifacts]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Download URL with an `{id}` placeholder.
    pub url_template: String,
    /// Attempts per download, including the first.
    pub download_attempts: u32,
    /// Coordinate scaler.
    pub scaler: ArtifactEntry,
    /// Feature encoder.
    pub encoder: ArtifactEntry,
    /// Region cluster model.
    pub kmeans: ArtifactEntry,
    /// Demand regressor.
    pub model: ArtifactEntry,
}

impl ArtifactsConfig {
    /// Every artifact with its name.
    #[must_use]
    pub const fn entries(&self) -> [(&'static str, &ArtifactEntry); 4] {
        [
            ("scaler", &self.scaler),
            ("encoder", &self.encoder),
            ("kmeans", &self.kmeans),
            ("model", &self.model),
        ]
    }
}

/// `[data]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Feature table CSV.
    pub features: PathBuf,
    /// Reference pickup locations CSV.
    pub reference: PathBuf,
}

/// `[query]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Regions covered by a neighbourhood query.
    pub neighbor_count: usize,
    /// Earliest selectable date.
    pub min_date: NaiveDate,
    /// Latest selectable date.
    pub max_date: NaiveDate,
    /// Date preselected by front ends.
    pub default_date: NaiveDate,
    /// Map dot radius.
    pub map_radius: f64,
}

/// `[registry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry base URL.
    #[serde(default)]
    pub tracking_uri: Option<String>,
    /// Basic-auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Registered model name.
    pub model_name: String,
    /// Stage the served model is taken from.
    pub serving_stage: String,
    /// Stage promotion candidates come from.
    pub staging_stage: String,
    /// File holding the trained model's URI.
    pub run_information: PathBuf,
}

impl RegistryConfig {
    /// Username and password, if both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(String, String)> {
        Some((self.username.clone()?, self.password.clone()?))
    }
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
}

/// The complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandConfig {
    /// Pre-fitted artifacts.
    pub artifacts: ArtifactsConfig,
    /// Datasets.
    pub data: DataConfig,
    /// Feature table layout.
    pub schema: FeatureSchema,
    /// Query behaviour.
    pub query: QueryConfig,
    /// Model registry.
    pub registry: RegistryConfig,
    /// HTTP server.
    pub server: ServerConfig,
}

impl DemandConfig {
    /// The embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded file is malformed.
    pub fn defaults() -> Result<Self, ConfigError> {
        parse_table(DEFAULT_TOML, "defaults")?
            .try_into()
            .map_err(|e| parse_error("defaults", &e))
    }

    /// Defaults, overlaid with `file` if given, then with the process
    /// environment. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any layer fails to read or parse, or
    /// the result does not validate.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let overlay = file
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            })
            .transpose()?;

        let origin = file.map_or_else(String::new, |p| p.display().to_string());
        let mut config = Self::from_layers(overlay.as_deref(), &origin)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        log::debug!(
            "Loaded configuration: features {}, reference {}",
            config.data.features.display(),
            config.data.reference.display()
        );

        Ok(config)
    }

    /// Defaults overlaid with the TOML text `overlay`. Tables merge key by
    /// key; any other value replaces the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if either layer is malformed.
    pub fn from_layers(overlay: Option<&str>, origin: &str) -> Result<Self, ConfigError> {
        let mut merged = parse_table(DEFAULT_TOML, "defaults")?;
        if let Some(text) = overlay {
            merge(&mut merged, parse_table(text, origin)?);
        }
        merged.try_into().map_err(|e| parse_error("merged", &e))
    }

    /// Applies environment overrides. `lookup` returns a variable's value;
    /// empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `PORT` is not a port number.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for (key, entry) in [
            ("SCALER_KEY", &mut self.artifacts.scaler),
            ("ENCODER_KEY", &mut self.artifacts.encoder),
            ("KMEANS_KEY", &mut self.artifacts.kmeans),
            ("MODEL_KEY", &mut self.artifacts.model),
        ] {
            if let Some(id) = get(key) {
                entry.remote_id = Some(id);
            }
        }

        if let Some(url) = get("ARTIFACT_BASE_URL") {
            self.artifacts.url_template = url;
        }
        if let Some(uri) = get("MLFLOW_TRACKING_URI") {
            self.registry.tracking_uri = Some(uri);
        }
        if let Some(user) = get("MLFLOW_TRACKING_USERNAME") {
            self.registry.username = Some(user);
        }
        if let Some(password) = get("MLFLOW_TRACKING_PASSWORD") {
            self.registry.password = Some(password);
        }
        if let Some(addr) = get("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                message: format!("PORT '{port}' is not a valid port number"),
            })?;
        }

        Ok(())
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        let schema = &self.schema;
        if schema.required_columns().next().is_none() {
            return invalid("schema has no feature columns".to_string());
        }
        if !schema.categorical.contains(&schema.region_column) {
            return invalid(format!(
                "region column '{}' must be listed in schema.categorical",
                schema.region_column
            ));
        }
        if self.query.neighbor_count == 0 {
            return invalid("query.neighbor_count must be at least 1".to_string());
        }
        if self.query.min_date > self.query.max_date {
            return invalid(format!(
                "query.min_date {} is after query.max_date {}",
                self.query.min_date, self.query.max_date
            ));
        }
        if !(self.query.min_date..=self.query.max_date).contains(&self.query.default_date) {
            return invalid(format!(
                "query.default_date {} is outside {}..={}",
                self.query.default_date, self.query.min_date, self.query.max_date
            ));
        }
        if !(self.query.map_radius.is_finite() && self.query.map_radius > 0.0) {
            return invalid("query.map_radius must be positive".to_string());
        }
        if self.artifacts.download_attempts == 0 {
            return invalid("artifacts.download_attempts must be at least 1".to_string());
        }
        if !self.artifacts.url_template.contains("{id}") {
            return invalid("artifacts.url_template must contain '{id}'".to_string());
        }

        Ok(())
    }
}

fn parse_table(text: &str, origin: &str) -> Result<toml::Value, ConfigError> {
    toml::de::from_str::<toml::Table>(text)
        .map(toml::Value::Table)
        .map_err(|e| parse_error(origin, &e))
}

fn parse_error(origin: &str, e: &impl std::fmt::Display) -> ConfigError {
    ConfigError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    }
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn embedded_defaults_are_valid() {
        let config = DemandConfig::defaults().unwrap();
        config.validate().unwrap();

        assert_eq!(config.query.neighbor_count, 9);
        assert_eq!(config.query.min_date, NaiveDate::from_ymd_opt(2016, 3, 1).unwrap());
        assert_eq!(config.query.max_date, NaiveDate::from_ymd_opt(2016, 3, 31).unwrap());
        assert_eq!(config.schema.timestamp_column, "tpep_pickup_datetime");
        assert_eq!(config.schema.labels, vec!["total_pickups"]);
        assert_eq!(config.registry.serving_stage, "Production");
        assert_eq!(config.server.port, 8080);
        assert!(config.artifacts.scaler.remote_id.is_none());
    }

    #[test]
    fn file_overlay_merges_tables() {
        let config = DemandConfig::from_layers(
            Some(
                r#"
                [query]
                neighbor_count = 5

                [artifacts.model]
                path = "elsewhere/model.json"
                md5 = "abc"
                "#,
            ),
            "test.toml",
        )
        .unwrap();

        assert_eq!(config.query.neighbor_count, 5);
        assert!((config.query.map_radius - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.artifacts.model.path, PathBuf::from("elsewhere/model.json"));
        assert_eq!(config.artifacts.model.md5.as_deref(), Some("abc"));
        assert_eq!(config.artifacts.scaler.path, PathBuf::from("models/scaler.json"));
    }

    #[test]
    fn malformed_overlay_names_its_origin() {
        assert!(matches!(
            DemandConfig::from_layers(Some("[query\n"), "broken.toml"),
            Err(ConfigError::Parse { origin, .. }) if origin == "broken.toml"
        ));
        assert!(matches!(
            DemandConfig::from_layers(Some("[query]\nneighbor_count = \"nine\""), "typed.toml"),
            Err(ConfigError::Parse { origin, .. }) if origin == "merged"
        ));
    }

    #[test]
    fn environment_overrides_apply() {
        let mut config = DemandConfig::defaults().unwrap();
        config
            .apply_env(env(&[
                ("SCALER_KEY", "scaler-id"),
                ("MODEL_KEY", "model-id"),
                ("ENCODER_KEY", ""),
                ("MLFLOW_TRACKING_URI", "https://registry.example"),
                ("MLFLOW_TRACKING_USERNAME", "user"),
                ("MLFLOW_TRACKING_PASSWORD", "secret"),
                ("BIND_ADDR", "0.0.0.0"),
                ("PORT", "9000"),
            ]))
            .unwrap();

        assert_eq!(config.artifacts.scaler.remote_id.as_deref(), Some("scaler-id"));
        assert_eq!(config.artifacts.model.remote_id.as_deref(), Some("model-id"));
        assert!(config.artifacts.encoder.remote_id.is_none());
        assert_eq!(
            config.registry.credentials(),
            Some(("user".to_string(), "secret".to_string()))
        );
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn bad_port_is_invalid() {
        let mut config = DemandConfig::defaults().unwrap();
        assert!(matches!(
            config.apply_env(env(&[("PORT", "eighty")])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn validation_rejects_inconsistent_settings() {
        let base = DemandConfig::defaults().unwrap();

        let mut config = base.clone();
        config.query.neighbor_count = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.query.min_date = NaiveDate::from_ymd_opt(2016, 4, 1).unwrap();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.schema.categorical.clear();
        config.schema.numeric.clear();
        assert!(config.validate().is_err());

        let mut config = base;
        config.schema.categorical.retain(|c| c != "region");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { message }) if message.contains("region")
        ));
    }
}
