//! REST calls against the registry's `api/2.0/mlflow` endpoints.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::uri::{ModelReference, ModelUri};
use crate::{ModelStage, ModelVersion, RegistryError};

/// A registry endpoint plus optional basic-auth credentials.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

/// Where a checked model's artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Registered version, for `models:/` URIs.
    pub version: Option<ModelVersion>,
    /// Artifact location the model would be loaded from.
    pub artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    model_version: ModelVersion,
}

#[derive(Debug, Deserialize)]
struct DownloadUriResponse {
    artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: Run,
}

#[derive(Debug, Deserialize)]
struct Run {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    artifact_uri: String,
}

#[derive(Serialize)]
struct TransitionRequest<'a> {
    name: &'a str,
    version: &'a str,
    stage: ModelStage,
    archive_existing_versions: bool,
}

impl RegistryClient {
    /// Creates a client for the registry at `tracking_uri`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Http`] if the HTTP client cannot be built.
    pub fn new(
        tracking_uri: &str,
        credentials: Option<(String, String)>,
    ) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .user_agent("taxi-demand-registry/0.1")
            .build()?;

        Ok(Self {
            client,
            base_url: tracking_uri.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Full URL of a registry API path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base_url)
    }

    /// Newest version of `name` currently in `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoVersionInStage`] if there is none, or
    /// another [`RegistryError`] if the request fails.
    pub async fn latest_version(
        &self,
        name: &str,
        stage: ModelStage,
    ) -> Result<ModelVersion, RegistryError> {
        self.search_latest(&search_filter(name, Some(stage)))
            .await?
            .ok_or_else(|| RegistryError::NoVersionInStage {
                name: name.to_string(),
                stage: stage.to_string(),
            })
    }

    /// Looks up one version.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the request fails or the version
    /// does not exist.
    pub async fn get_version(&self, name: &str, version: &str) -> Result<ModelVersion, RegistryError> {
        let response: VersionResponse = self
            .get(
                "model-versions/get",
                &[("name", name.to_string()), ("version", version.to_string())],
            )
            .await?;
        Ok(response.model_version)
    }

    /// Moves a version to `stage`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the request fails.
    pub async fn transition_stage(
        &self,
        name: &str,
        version: &str,
        stage: ModelStage,
        archive_existing_versions: bool,
    ) -> Result<ModelVersion, RegistryError> {
        let body = TransitionRequest {
            name,
            version,
            stage,
            archive_existing_versions,
        };
        let response: VersionResponse = self
            .post("model-versions/transition-stage", &body)
            .await?;
        Ok(response.model_version)
    }

    /// Moves the newest `from` version of `name` to `to`, archiving
    /// whatever was in `to` before.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NoVersionInStage`] if nothing is in `from`,
    /// or another [`RegistryError`] if a request fails.
    pub async fn promote(
        &self,
        name: &str,
        from: ModelStage,
        to: ModelStage,
    ) -> Result<ModelVersion, RegistryError> {
        let candidate = self.latest_version(name, from).await?;
        log::debug!("Promoting {name} version {} from {from}", candidate.version);

        let promoted = self
            .transition_stage(name, &candidate.version, to, true)
            .await?;

        log::info!(
            "The model is moved to the {} stage having version number {}",
            promoted.current_stage,
            promoted.version
        );

        Ok(promoted)
    }

    /// Resolves `uri` to concrete artifacts. Success means the model can be
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the URI does not resolve.
    pub async fn check_model_loadable(&self, uri: &ModelUri) -> Result<ResolvedModel, RegistryError> {
        let resolved = match uri {
            ModelUri::Registered { name, reference } => {
                let version = match reference {
                    ModelReference::Stage(stage) => self.latest_version(name, *stage).await?,
                    ModelReference::Version(v) => self.get_version(name, &v.to_string()).await?,
                    ModelReference::Latest => self
                        .search_latest(&search_filter(name, None))
                        .await?
                        .ok_or_else(|| RegistryError::NoVersionInStage {
                            name: name.clone(),
                            stage: "any".to_string(),
                        })?,
                };

                let response: DownloadUriResponse = self
                    .get(
                        "model-versions/get-download-uri",
                        &[("name", name.clone()), ("version", version.version.clone())],
                    )
                    .await?;

                ResolvedModel {
                    version: Some(version),
                    artifact_uri: response.artifact_uri,
                }
            }
            ModelUri::Run { run_id, path } => {
                let response: RunResponse =
                    self.get("runs/get", &[("run_id", run_id.clone())]).await?;
                ResolvedModel {
                    version: None,
                    artifact_uri: join_artifact_path(&response.run.info.artifact_uri, path),
                }
            }
        };

        log::info!("{uri} resolves to {}", resolved.artifact_uri);

        Ok(resolved)
    }

    async fn search_latest(&self, filter: &str) -> Result<Option<ModelVersion>, RegistryError> {
        let response: SearchResponse = self
            .get(
                "model-versions/search",
                &[
                    ("filter", filter.to_string()),
                    ("max_results", "1".to_string()),
                    ("order_by", "version_number DESC".to_string()),
                ],
            )
            .await?;
        Ok(newest(response.model_versions))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RegistryError> {
        let request = self.client.get(self.endpoint(path)).query(query);
        self.send(request).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RegistryError> {
        let request = self.client.post(self.endpoint(path)).json(body);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RegistryError> {
        let request = match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_response(status.as_u16(), &body)
    }
}

/// Filter expression selecting versions of `name`, optionally in `stage`.
#[must_use]
pub fn search_filter(name: &str, stage: Option<ModelStage>) -> String {
    match stage {
        Some(stage) => format!("name='{name}' and current_stage='{stage}'"),
        None => format!("name='{name}'"),
    }
}

fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, RegistryError> {
    if !(200..300).contains(&status) {
        log::error!("Registry request failed with HTTP {status}");
        return Err(RegistryError::Api {
            status,
            body: body.to_string(),
        });
    }
    Ok(serde_json::from_str(body)?)
}

fn newest(versions: Vec<ModelVersion>) -> Option<ModelVersion> {
    versions
        .into_iter()
        .max_by_key(|v| v.number().unwrap_or_default())
}

fn join_artifact_path(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoint_urls() {
        let client = RegistryClient::new("https://dagshub.com/org/repo.mlflow/", None).unwrap();
        assert_eq!(
            client.endpoint("model-versions/search"),
            "https://dagshub.com/org/repo.mlflow/api/2.0/mlflow/model-versions/search"
        );
    }

    #[test]
    fn search_filter_matches_registry_syntax() {
        assert_eq!(
            search_filter("uber_demand_prediction_model", Some(ModelStage::Staging)),
            "name='uber_demand_prediction_model' and current_stage='Staging'"
        );
        assert_eq!(search_filter("m", None), "name='m'");
    }

    #[test]
    fn transition_body_uses_registry_field_names() {
        let body = serde_json::to_value(TransitionRequest {
            name: "m",
            version: "4",
            stage: ModelStage::Production,
            archive_existing_versions: true,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "name": "m",
                "version": "4",
                "stage": "Production",
                "archive_existing_versions": true,
            })
        );
    }

    #[test]
    fn parses_search_results_and_picks_newest() {
        let response: SearchResponse = parse_response(
            200,
            r#"{"model_versions": [
                {"name": "m", "version": "2", "current_stage": "Staging"},
                {"name": "m", "version": "10", "current_stage": "Staging", "run_id": "r"}
            ]}"#,
        )
        .unwrap();
        let version = newest(response.model_versions).unwrap();
        assert_eq!(version.version, "10");
        assert_eq!(version.run_id.as_deref(), Some("r"));
    }

    #[test]
    fn empty_search_has_no_newest() {
        let response: SearchResponse = parse_response(200, "{}").unwrap();
        assert!(newest(response.model_versions).is_none());
    }

    #[test]
    fn error_status_keeps_body() {
        let err = parse_response::<SearchResponse>(
            404,
            r#"{"error_code": "RESOURCE_DOES_NOT_EXIST"}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Api { status: 404, body } if body.contains("RESOURCE_DOES_NOT_EXIST")
        ));
    }

    #[test]
    fn malformed_success_body_is_a_json_error() {
        let err = parse_response::<VersionResponse>(200, r#"{"model_version": 7}"#).unwrap_err();
        assert!(matches!(err, RegistryError::Json(_)));

        let err = parse_response::<DownloadUriResponse>(200, "not json").unwrap_err();
        assert!(matches!(err, RegistryError::Json(_)));
    }

    #[test]
    fn parses_run_artifact_location() {
        let response: RunResponse = parse_response(
            200,
            r#"{"run": {"info": {"run_id": "abc", "artifact_uri": "s3://bucket/1/abc/artifacts/"}, "data": {}}}"#,
        )
        .unwrap();
        assert_eq!(
            join_artifact_path(&response.run.info.artifact_uri, "model"),
            "s3://bucket/1/abc/artifacts/model"
        );
    }
}
