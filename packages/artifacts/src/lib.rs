#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The four pre-fitted artifacts a demand query needs, and how they get
//! from a remote store onto disk and into memory.
//!
//! | Artifact | Model type |
//! |---|---|
//! | `scaler` | [`StandardScaler`](taxi_demand_model::scaler::StandardScaler) |
//! | `encoder` | [`OneHotEncoder`](taxi_demand_model::encoder::OneHotEncoder) |
//! | `kmeans` | [`KMeansModel`](taxi_demand_model::kmeans::KMeansModel) |
//! | `model` | [`LinearRegressor`](taxi_demand_model::linear::LinearRegressor) |
//!
//! Files already present locally are used as-is; missing ones are
//! downloaded once (see [`download::Downloader`]). An optional MD5 per
//! artifact guards against stale or truncated files.

pub mod download;
pub mod load;

use std::path::PathBuf;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use taxi_demand::DemandError;
use taxi_demand_model::ModelError;

/// Named artifacts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArtifactKind {
    /// Coordinate standardiser.
    Scaler,
    /// Categorical feature encoder.
    Encoder,
    /// Region cluster model.
    Kmeans,
    /// Demand regressor.
    Model,
}

impl ArtifactKind {
    /// Every artifact, in load order.
    pub const ALL: [Self; 4] = [Self::Scaler, Self::Encoder, Self::Kmeans, Self::Model];
}

/// Where one artifact lives locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSource {
    /// Which artifact this is.
    pub kind: ArtifactKind,
    /// Path the artifact is read from, and downloaded to if missing.
    pub local_path: PathBuf,
    /// Remote id substituted into the download URL template.
    pub remote_id: Option<String>,
    /// Expected lowercase hex MD5 of the file contents.
    pub md5: Option<String>,
}

/// Sources for the full artifact set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactManifest {
    sources: Vec<ArtifactSource>,
}

impl ArtifactManifest {
    /// Builds a manifest. A later source for the same kind replaces an
    /// earlier one.
    #[must_use]
    pub fn new(sources: impl IntoIterator<Item = ArtifactSource>) -> Self {
        let mut manifest = Self::default();
        for source in sources {
            manifest.insert(source);
        }
        manifest
    }

    /// Adds or replaces the source for `source.kind`.
    pub fn insert(&mut self, source: ArtifactSource) {
        if let Some(existing) = self.sources.iter_mut().find(|s| s.kind == source.kind) {
            *existing = source;
        } else {
            self.sources.push(source);
        }
    }

    /// Source for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::NotConfigured`] if the manifest has no
    /// entry for `kind`.
    pub fn get(&self, kind: ArtifactKind) -> Result<&ArtifactSource, ArtifactError> {
        self.sources
            .iter()
            .find(|s| s.kind == kind)
            .ok_or_else(|| ArtifactError::NotConfigured {
                name: kind.to_string(),
            })
    }

    /// All configured sources.
    #[must_use]
    pub fn sources(&self) -> &[ArtifactSource] {
        &self.sources
    }
}

/// Errors that can occur while fetching or loading an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The manifest has no entry for the artifact.
    #[error("Artifact '{name}' is not configured")]
    NotConfigured {
        /// Artifact name.
        name: String,
    },

    /// The artifact is not on disk and has no remote id to fetch it from.
    #[error("Artifact '{name}' not found at {} and no remote id is configured", path.display())]
    Missing {
        /// Artifact name.
        name: String,
        /// Where it was expected.
        path: PathBuf,
    },

    /// Downloading the artifact failed.
    #[error("Failed to download artifact '{name}' from {url}: {message}")]
    Download {
        /// Artifact name.
        name: String,
        /// Requested URL.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// The artifact's contents do not match the configured MD5.
    #[error("Checksum mismatch for artifact '{name}': expected {expected}, got {actual}")]
    Checksum {
        /// Artifact name.
        name: String,
        /// Configured digest.
        expected: String,
        /// Digest of the file on disk.
        actual: String,
    },

    /// The artifact file does not parse as the expected model.
    #[error("Artifact '{name}' is corrupt: {source}")]
    Corrupt {
        /// Artifact name.
        name: String,
        /// Parse or validation error.
        source: ModelError,
    },

    /// Local file I/O failed.
    #[error("I/O error on artifact '{name}': {source}")]
    Io {
        /// Artifact name.
        name: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
}

impl ArtifactError {
    /// Name of the artifact the error is about, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::NotConfigured { name }
            | Self::Missing { name, .. }
            | Self::Download { name, .. }
            | Self::Checksum { name, .. }
            | Self::Corrupt { name, .. }
            | Self::Io { name, .. } => Some(name),
            Self::Client(_) => None,
        }
    }
}

impl From<ArtifactError> for DemandError {
    fn from(e: ArtifactError) -> Self {
        Self::ArtifactLoad {
            name: e.name().unwrap_or("artifacts").to_string(),
            message: e.to_string(),
        }
    }
}
