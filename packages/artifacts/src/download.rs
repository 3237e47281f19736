//! Fetching artifacts that are not on disk yet.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

use crate::{ArtifactError, ArtifactManifest, ArtifactSource};

/// Default download URL template. `{id}` is replaced with the artifact's
/// remote id.
pub const DEFAULT_URL_TEMPLATE: &str = "https://drive.google.com/uc?id={id}";

/// Maximum number of download attempts (initial + retries).
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;

/// Base delay between download retries (doubles each attempt).
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Receives download progress. Implementations must be cheap; they are
/// called once per received chunk.
pub trait DownloadProgress: Send + Sync {
    /// A download of `name` is starting. `total` is the content length if
    /// the server sent one.
    fn start(&self, name: &str, total: Option<u64>);

    /// `bytes` more bytes arrived.
    fn advance(&self, bytes: u64);

    /// The download of `name` completed.
    fn finish(&self, name: &str);

    /// The current attempt failed; progress for it should be discarded.
    fn abandon(&self, name: &str);
}

/// Ignores all progress updates.
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn start(&self, _name: &str, _total: Option<u64>) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self, _name: &str) {}
    fn abandon(&self, _name: &str) {}
}

/// What [`Downloader::ensure_local`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file was already on disk.
    Cached,
    /// The file was downloaded.
    Downloaded {
        /// Size of the downloaded file.
        bytes: u64,
    },
}

/// Downloads artifacts over HTTP.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    url_template: String,
    attempts: u32,
    retry_delay: Duration,
}

impl Downloader {
    /// Creates a downloader for `url_template` that tries each download
    /// up to `attempts` times.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Client`] if the HTTP client cannot be
    /// built.
    pub fn new(url_template: impl Into<String>, attempts: u32) -> Result<Self, ArtifactError> {
        let client = reqwest::Client::builder()
            .user_agent("taxi-demand-artifacts/0.1")
            .build()
            .map_err(ArtifactError::Client)?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            attempts: attempts.max(1),
            retry_delay: RETRY_BASE_DELAY,
        })
    }

    /// Overrides the base retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Download URL for a remote id.
    #[must_use]
    pub fn url_for(&self, remote_id: &str) -> String {
        self.url_template.replace("{id}", remote_id)
    }

    /// Makes sure every artifact in `manifest` is on disk.
    ///
    /// # Errors
    ///
    /// Stops at the first artifact that fails; see [`Self::ensure_local`].
    pub async fn ensure_all(
        &self,
        manifest: &ArtifactManifest,
        progress: &dyn DownloadProgress,
    ) -> Result<Vec<(ArtifactSource, FetchOutcome)>, ArtifactError> {
        let mut outcomes = Vec::with_capacity(manifest.sources().len());
        for source in manifest.sources() {
            let outcome = self.ensure_local(source, progress).await?;
            outcomes.push((source.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Makes sure `source` is on disk, downloading it if it is missing.
    ///
    /// A present file is never re-downloaded. If an MD5 is configured, it
    /// is checked against the cached or freshly downloaded file. Downloads
    /// go to a temporary sibling file that is renamed into place only after
    /// it has been fully written and verified.
    ///
    /// # Errors
    ///
    /// - [`ArtifactError::Missing`] if the file is absent and there is no
    ///   remote id.
    /// - [`ArtifactError::Download`] once all attempts are exhausted.
    /// - [`ArtifactError::Checksum`] on a digest mismatch.
    /// - [`ArtifactError::Io`] on local filesystem errors.
    pub async fn ensure_local(
        &self,
        source: &ArtifactSource,
        progress: &dyn DownloadProgress,
    ) -> Result<FetchOutcome, ArtifactError> {
        let name = source.kind.to_string();
        let path = &source.local_path;

        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| io_error(&name, e))?
        {
            log::debug!("Artifact '{name}' present at {}", path.display());
            if let Some(expected) = &source.md5 {
                verify_md5(&name, path, expected).await?;
            }
            return Ok(FetchOutcome::Cached);
        }

        let Some(remote_id) = &source.remote_id else {
            return Err(ArtifactError::Missing {
                name,
                path: path.clone(),
            });
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&name, e))?;
        }

        let url = self.url_for(remote_id);
        let partial = partial_path(path);

        log::info!("Downloading artifact '{name}' -> {}", path.display());

        let bytes = match self.download_with_retry(&name, &url, &partial, progress).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_partial(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = &source.md5 {
            if let Err(e) = verify_md5(&name, &partial, expected).await {
                remove_partial(&partial).await;
                return Err(e);
            }
        }

        tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| io_error(&name, e))?;

        #[allow(clippy::cast_precision_loss)] // display-only MB value
        let mb = bytes as f64 / 1_048_576.0;
        log::info!("  downloaded '{name}' ({mb:.1} MB)");

        Ok(FetchOutcome::Downloaded { bytes })
    }

    async fn download_with_retry(
        &self,
        name: &str,
        url: &str,
        dest: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<u64, ArtifactError> {
        let mut last_err: Option<ArtifactError> = None;

        for attempt in 1..=self.attempts {
            match self.download_once(name, url, dest, progress).await {
                Ok(bytes) => {
                    progress.finish(name);
                    return Ok(bytes);
                }
                Err(e @ ArtifactError::Download { .. }) if attempt < self.attempts => {
                    progress.abandon(name);
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt - 1);
                    log::warn!(
                        "  download attempt {attempt}/{} for '{name}' failed ({e}), \
                         retrying in {delay:.1?}...",
                        self.attempts
                    );
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    progress.abandon(name);
                    log::error!("Download of '{name}' failed: {e}");
                    return Err(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ArtifactError::Download {
            name: name.to_string(),
            url: url.to_string(),
            message: "all download attempts exhausted".to_string(),
        }))
    }

    async fn download_once(
        &self,
        name: &str,
        url: &str,
        dest: &Path,
        progress: &dyn DownloadProgress,
    ) -> Result<u64, ArtifactError> {
        let download_error = |message: String| ArtifactError::Download {
            name: name.to_string(),
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if is_html(content_type) {
            return Err(download_error(format!(
                "server sent an HTML page ({content_type}) instead of the artifact"
            )));
        }

        progress.start(name, response.content_length());

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_error(name, e))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut leading: Option<u8> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(e.to_string()))?;
            if leading.is_none() {
                leading = chunk.iter().copied().find(|b| !b.is_ascii_whitespace());
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(name, e))?;
            downloaded += chunk.len() as u64;
            progress.advance(chunk.len() as u64);
        }

        file.flush().await.map_err(|e| io_error(name, e))?;

        // Artifacts are JSON; markup here is an interstitial page served
        // with a generic content type.
        if leading == Some(b'<') {
            return Err(download_error(
                "body is markup, not an artifact (confirmation or error page?)".to_string(),
            ));
        }

        Ok(downloaded)
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml")
}

/// Temporary sibling a download is written to before being renamed into
/// place.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            log::warn!("Could not remove partial download {}: {e}", path.display());
        }
        _ => {}
    }
}

async fn verify_md5(name: &str, path: &Path, expected: &str) -> Result<(), ArtifactError> {
    let actual = compute_md5(path).await.map_err(|e| io_error(name, e))?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ArtifactError::Checksum {
            name: name.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// MD5 hex digest of a local file.
async fn compute_md5(path: &Path) -> Result<String, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_md5_sync(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn compute_md5_sync(path: &Path) -> Result<String, std::io::Error> {
    use std::io::Read as _;

    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.finalize()))
}

fn io_error(name: &str, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        name: name.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactKind;

    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "taxi_demand_artifacts_{test}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn source(path: PathBuf, remote_id: Option<&str>, md5: Option<&str>) -> ArtifactSource {
        ArtifactSource {
            kind: ArtifactKind::Scaler,
            local_path: path,
            remote_id: remote_id.map(str::to_string),
            md5: md5.map(str::to_string),
        }
    }

    #[test]
    fn substitutes_remote_id_into_template() {
        let downloader = Downloader::new(DEFAULT_URL_TEMPLATE, 3).unwrap();
        assert_eq!(
            downloader.url_for("abc123"),
            "https://drive.google.com/uc?id=abc123"
        );
    }

    #[test]
    fn partial_file_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("models/scaler.json")),
            PathBuf::from("models/scaler.json.part")
        );
    }

    #[tokio::test]
    async fn present_file_is_not_downloaded() {
        let dir = scratch_dir("cached");
        let path = dir.join("scaler.json");
        std::fs::write(&path, "hello").unwrap();

        // md5("hello")
        let src = source(
            path,
            Some("never-fetched"),
            Some("5d41402abc4b2a76b9719d911017c592"),
        );
        let downloader = Downloader::new("http://127.0.0.1:9/{id}", 1).unwrap();

        assert_eq!(
            downloader.ensure_local(&src, &NoProgress).await.unwrap(),
            FetchOutcome::Cached
        );
    }

    #[tokio::test]
    async fn cached_file_with_wrong_digest_is_rejected() {
        let dir = scratch_dir("checksum");
        let path = dir.join("scaler.json");
        std::fs::write(&path, "hello").unwrap();

        let src = source(path, None, Some("00000000000000000000000000000000"));
        let downloader = Downloader::new(DEFAULT_URL_TEMPLATE, 1).unwrap();

        assert!(matches!(
            downloader.ensure_local(&src, &NoProgress).await,
            Err(ArtifactError::Checksum { actual, .. })
                if actual == "5d41402abc4b2a76b9719d911017c592"
        ));
    }

    #[tokio::test]
    async fn missing_file_without_remote_id_is_an_error() {
        let dir = scratch_dir("missing");
        let src = source(dir.join("scaler.json"), None, None);
        let downloader = Downloader::new(DEFAULT_URL_TEMPLATE, 1).unwrap();

        assert!(matches!(
            downloader.ensure_local(&src, &NoProgress).await,
            Err(ArtifactError::Missing { name, .. }) if name == "scaler"
        ));
    }

    /// Serves `body` with `content_type` to every connection and returns
    /// a URL template pointing at it.
    async fn serve(content_type: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}/uc?id={{id}}")
    }

    const CONFIRM_PAGE: &str =
        "<!DOCTYPE html><html><body>Google Drive can't scan this file for viruses.</body></html>";

    #[tokio::test]
    async fn html_confirmation_page_is_not_saved_as_artifact() {
        let dir = scratch_dir("html_page");
        let path = dir.join("scaler.json");
        let src = source(path.clone(), Some("abc"), None);
        let downloader = Downloader::new(serve("text/html; charset=utf-8", CONFIRM_PAGE).await, 1)
            .unwrap()
            .with_retry_delay(Duration::ZERO);

        assert!(matches!(
            downloader.ensure_local(&src, &NoProgress).await,
            Err(ArtifactError::Download { message, .. }) if message.contains("HTML")
        ));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn markup_body_with_generic_content_type_is_rejected() {
        let dir = scratch_dir("html_body");
        let path = dir.join("scaler.json");
        let src = source(path.clone(), Some("abc"), None);
        let downloader = Downloader::new(
            serve("application/octet-stream", CONFIRM_PAGE).await,
            2,
        )
        .unwrap()
        .with_retry_delay(Duration::ZERO);

        assert!(matches!(
            downloader.ensure_local(&src, &NoProgress).await,
            Err(ArtifactError::Download { message, .. }) if message.contains("markup")
        ));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());

        // A real artifact from the same kind of server goes through.
        let ok_path = dir.join("kmeans.json");
        let ok = source(ok_path.clone(), Some("def"), None);
        let downloader = Downloader::new(
            serve("application/octet-stream", "{\"cluster_centers\": [[0.0, 0.0]]}").await,
            1,
        )
        .unwrap();
        assert!(matches!(
            downloader.ensure_local(&ok, &NoProgress).await,
            Ok(FetchOutcome::Downloaded { .. })
        ));
        assert!(ok_path.exists());
    }

    #[test]
    fn recognizes_html_content_types() {
        assert!(is_html("text/html"));
        assert!(is_html("Text/HTML; charset=utf-8"));
        assert!(!is_html("application/json"));
        assert!(!is_html(""));
    }

    #[tokio::test]
    async fn failed_download_leaves_nothing_behind() {
        let dir = scratch_dir("failed");
        let path = dir.join("nested").join("scaler.json");
        let src = source(path.clone(), Some("abc"), None);
        let downloader = Downloader::new("http://127.0.0.1:9/{id}", 2)
            .unwrap()
            .with_retry_delay(Duration::ZERO);

        assert!(matches!(
            downloader.ensure_local(&src, &NoProgress).await,
            Err(ArtifactError::Download { name, url, .. })
                if name == "scaler" && url == "http://127.0.0.1:9/abc"
        ));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }
}
