//! Turning a [`DemandConfig`] into a ready [`DemandService`].

use std::sync::Arc;

use taxi_demand::DemandError;
use taxi_demand::pipeline::PredictionPipeline;
use taxi_demand::reference::ReferenceLocations;
use taxi_demand::service::{DemandService, QuerySettings};
use taxi_demand::store::DemandFeatureStore;
use taxi_demand::zones::ZoneSelector;
use taxi_demand_artifacts::download::{DownloadProgress, Downloader, FetchOutcome};
use taxi_demand_artifacts::load::load_artifacts;
use taxi_demand_artifacts::{ArtifactError, ArtifactKind, ArtifactManifest, ArtifactSource};
use taxi_demand_config::{ArtifactsConfig, DemandConfig, QueryConfig, RegistryConfig};
use taxi_demand_registry::{ModelStage, RegistryClient};

/// Artifact sources described by the `[artifacts]` section.
///
/// # Errors
///
/// Returns [`ArtifactError::NotConfigured`] if an entry name is not a
/// known artifact.
pub fn artifact_manifest(config: &ArtifactsConfig) -> Result<ArtifactManifest, ArtifactError> {
    config
        .entries()
        .into_iter()
        .map(|(name, entry)| {
            let kind: ArtifactKind = name.parse().map_err(|_| ArtifactError::NotConfigured {
                name: name.to_string(),
            })?;
            Ok(ArtifactSource {
                kind,
                local_path: entry.path.clone(),
                remote_id: entry.remote_id.clone(),
                md5: entry.md5.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ArtifactManifest::new)
}

/// Downloads whichever artifacts are missing locally.
///
/// # Errors
///
/// Returns the first [`ArtifactError`] encountered.
pub async fn fetch_artifacts(
    config: &ArtifactsConfig,
    progress: &dyn DownloadProgress,
) -> Result<Vec<(ArtifactSource, FetchOutcome)>, ArtifactError> {
    let manifest = artifact_manifest(config)?;
    let downloader = Downloader::new(config.url_template.clone(), config.download_attempts)?;
    downloader.ensure_all(&manifest, progress).await
}

/// Query settings from the `[query]` section.
#[must_use]
pub const fn query_settings(config: &QueryConfig) -> QuerySettings {
    QuerySettings {
        neighbor_count: config.neighbor_count,
        min_date: Some(config.min_date),
        max_date: Some(config.max_date),
        default_date: Some(config.default_date),
        map_radius: config.map_radius,
    }
}

/// Loads artifacts and datasets from disk and wires up the service.
///
/// Does not download anything; see [`prepare_service`].
///
/// # Errors
///
/// Returns [`DemandError::ArtifactLoad`] if an artifact cannot be loaded,
/// or another [`DemandError`] if a dataset is malformed or the pieces do
/// not fit together.
pub fn load_service(config: &DemandConfig) -> Result<DemandService, DemandError> {
    let artifacts = load_artifacts(&artifact_manifest(&config.artifacts)?)?;

    log::info!("Loading feature table from {}...", config.data.features.display());
    let store = DemandFeatureStore::from_path(&config.data.features, config.schema.clone())?;

    log::info!("Loading reference locations from {}...", config.data.reference.display());
    let locations = ReferenceLocations::from_path(&config.data.reference)?;

    let clusters = artifacts.clusters.n_clusters();
    let unknown = locations
        .regions()
        .into_iter()
        .filter(|r| !usize::try_from(r.value()).is_ok_and(|v| v < clusters))
        .count();
    if unknown > 0 {
        log::warn!(
            "{unknown} reference regions have no matching cluster ({clusters} clusters loaded)"
        );
    }

    let pipeline = PredictionPipeline::new(
        config.schema.clone(),
        artifacts.encoder.clone(),
        artifacts.regressor.clone(),
    )?;
    let zones = ZoneSelector::new(artifacts.scaler.clone(), artifacts.clusters.clone());

    DemandService::new(
        Arc::new(store),
        pipeline,
        zones,
        Arc::new(locations),
        query_settings(&config.query),
    )
}

/// Fetches missing artifacts, then [`load_service`].
///
/// # Errors
///
/// See [`fetch_artifacts`] and [`load_service`].
pub async fn prepare_service(
    config: &DemandConfig,
    progress: &dyn DownloadProgress,
) -> Result<DemandService, DemandError> {
    fetch_artifacts(&config.artifacts, progress).await?;
    load_service(config)
}

/// Version of the registered model in the serving stage, if a registry is
/// configured and reachable. Failures are logged, never fatal.
pub async fn serving_model_version(config: &RegistryConfig) -> Option<String> {
    let uri = config.tracking_uri.as_deref()?;

    let stage: ModelStage = match config.serving_stage.parse() {
        Ok(stage) => stage,
        Err(_) => {
            log::warn!("Unknown serving stage '{}'", config.serving_stage);
            return None;
        }
    };

    let result = match RegistryClient::new(uri, config.credentials()) {
        Ok(client) => client.latest_version(&config.model_name, stage).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(version) => {
            log::info!(
                "Serving {} version {} ({stage})",
                config.model_name,
                version.version
            );
            Some(version.version)
        }
        Err(e) => {
            log::warn!("Could not resolve {stage} model version: {e}");
            None
        }
    }
}
