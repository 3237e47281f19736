//! Reading artifact files into the model types.

use std::path::Path;
use std::sync::Arc;

use taxi_demand_model::encoder::OneHotEncoder;
use taxi_demand_model::kmeans::KMeansModel;
use taxi_demand_model::linear::LinearRegressor;
use taxi_demand_model::scaler::StandardScaler;
use taxi_demand_model::{ClusterModel, Encoder, ModelError, Regressor, Scaler};

use crate::{ArtifactError, ArtifactKind, ArtifactManifest};

/// The loaded models, shared read-only.
#[derive(Clone)]
pub struct ArtifactSet {
    /// Coordinate standardiser.
    pub scaler: Arc<dyn Scaler>,
    /// Categorical feature encoder.
    pub encoder: Arc<dyn Encoder>,
    /// Region cluster model.
    pub clusters: Arc<dyn ClusterModel>,
    /// Demand regressor.
    pub regressor: Arc<dyn Regressor>,
}

impl std::fmt::Debug for ArtifactSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSet")
            .field("clusters", &self.clusters.n_clusters())
            .field("encoded_width", &self.encoder.output_width())
            .field("regressor_features", &self.regressor.n_features())
            .finish_non_exhaustive()
    }
}

/// Loads all four artifacts named in `manifest` from disk.
///
/// Does not download anything; run
/// [`Downloader::ensure_all`](crate::download::Downloader::ensure_all)
/// first if files may be missing.
///
/// # Errors
///
/// Returns an [`ArtifactError`] naming the first artifact that is not
/// configured, cannot be read, or does not parse.
pub fn load_artifacts(manifest: &ArtifactManifest) -> Result<ArtifactSet, ArtifactError> {
    let scaler = load(manifest, ArtifactKind::Scaler, StandardScaler::from_json)?;
    let encoder = load(manifest, ArtifactKind::Encoder, OneHotEncoder::from_json)?;
    let clusters = load(manifest, ArtifactKind::Kmeans, KMeansModel::from_json)?;
    let regressor = load(manifest, ArtifactKind::Model, LinearRegressor::from_json)?;

    log::info!(
        "Loaded artifacts: {} clusters, {} encoded features",
        clusters.n_clusters(),
        encoder.output_width()
    );

    Ok(ArtifactSet {
        scaler: Arc::new(scaler),
        encoder: Arc::new(encoder),
        clusters: Arc::new(clusters),
        regressor: Arc::new(regressor),
    })
}

fn load<T>(
    manifest: &ArtifactManifest,
    kind: ArtifactKind,
    parse: fn(&str) -> Result<T, ModelError>,
) -> Result<T, ArtifactError> {
    let source = manifest.get(kind)?;
    let json = read(kind, &source.local_path)?;
    let model = parse(&json).map_err(|e| ArtifactError::Corrupt {
        name: kind.to_string(),
        source: e,
    })?;
    log::debug!("Loaded artifact '{kind}' from {}", source.local_path.display());
    Ok(model)
}

fn read(kind: ArtifactKind, path: &Path) -> Result<String, ArtifactError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArtifactError::Missing {
                name: kind.to_string(),
                path: path.to_path_buf(),
            }
        } else {
            ArtifactError::Io {
                name: kind.to_string(),
                source: e,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactSource;
    use std::path::PathBuf;

    const SCALER: &str = r#"{"mean": [-73.9, 40.7], "scale": [0.1, 0.1]}"#;
    const ENCODER: &str = r#"{
        "categorical": [{"column": "region", "categories": [0, 1], "drop_first": false}],
        "passthrough": ["lag_1"]
    }"#;
    const KMEANS: &str = r#"{"cluster_centers": [[0.0, 0.0], [1.0, 1.0]]}"#;
    const MODEL: &str = r#"{"coefficients": [1.0, 2.0, 0.5], "intercept": 0.0}"#;

    fn write_set(test: &str, model: &str) -> ArtifactManifest {
        let dir = std::env::temp_dir().join(format!(
            "taxi_demand_load_{test}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        ArtifactManifest::new(
            [
                (ArtifactKind::Scaler, SCALER),
                (ArtifactKind::Encoder, ENCODER),
                (ArtifactKind::Kmeans, KMEANS),
                (ArtifactKind::Model, model),
            ]
            .into_iter()
            .map(|(kind, json)| {
                let path = dir.join(format!("{kind}.json"));
                std::fs::write(&path, json).unwrap();
                ArtifactSource {
                    kind,
                    local_path: path,
                    remote_id: None,
                    md5: None,
                }
            }),
        )
    }

    #[test]
    fn loads_all_four_artifacts() {
        let set = load_artifacts(&write_set("ok", MODEL)).unwrap();

        assert_eq!(set.clusters.n_clusters(), 2);
        assert_eq!(set.encoder.output_width(), 3);
        assert_eq!(set.regressor.n_features(), 3);
        assert_eq!(set.scaler.transform(&[-73.9, 40.7]).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn corrupt_artifact_is_named() {
        let err = load_artifacts(&write_set("corrupt", "{\"coefficients\": ")).unwrap_err();
        assert!(matches!(err, ArtifactError::Corrupt { name, .. } if name == "model"));
    }

    #[test]
    fn missing_file_is_named() {
        let mut manifest = write_set("missing", MODEL);
        manifest.insert(ArtifactSource {
            kind: ArtifactKind::Kmeans,
            local_path: PathBuf::from("/nonexistent/kmeans.json"),
            remote_id: None,
            md5: None,
        });

        assert!(matches!(
            load_artifacts(&manifest),
            Err(ArtifactError::Missing { name, .. }) if name == "kmeans"
        ));
    }
}
