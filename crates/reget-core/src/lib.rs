//! reget core - resumable download engine
//!
//! Downloads a single HTTP resource per task into a private temp file and
//! renames it onto the destination once complete. Tasks can be paused,
//! resumed with conditional range requests, restarted, cancelled and
//! persisted across process restarts. A shared coordinator caps how many
//! tasks transfer at once.

mod engine;
mod error;
mod storage;

pub use engine::*;
pub use error::*;
pub use storage::*;

use reget_types::{ResumeRecord, Settings, TaskStatus, Validator};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;
use uuid::Uuid;

/// Per-download overrides of the configured defaults
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub priority: Option<i32>,
    pub buffer_size: Option<usize>,
    /// Defaults to `<destination>.part`
    pub temp_path: Option<PathBuf>,
}

/// Entry point: owns the HTTP client and the queue coordinator that every
/// task created through it shares
pub struct Downloader {
    client: Client,
    coordinator: Arc<QueueCoordinator>,
    settings: Settings,
}

impl Downloader {
    /// Build a downloader with its own HTTP client.
    ///
    /// Only connection establishment is bounded by a timeout; a slow transfer
    /// is never cut off.
    pub fn new(settings: Settings) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: Settings) -> Self {
        let coordinator = Arc::new(QueueCoordinator::new(settings.max_concurrent_downloads));
        Self {
            client,
            coordinator,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<QueueCoordinator> {
        &self.coordinator
    }

    /// Create a `Pending` task without starting it
    pub fn create_task(
        &self,
        destination: impl Into<PathBuf>,
        uri: &str,
        options: DownloadOptions,
    ) -> Result<DownloadTask, DownloadError> {
        let source_uri = parse_source(uri)?;
        let destination_path = destination.into();
        let temp_path = match options.temp_path {
            Some(path) => path,
            None => default_temp_path(&destination_path).ok_or_else(|| {
                DownloadError::InvalidOperation(format!(
                    "destination {} has no file name",
                    destination_path.display()
                ))
            })?,
        };

        let parts = TaskParts {
            id: Uuid::new_v4(),
            source_uri,
            destination_path,
            temp_path,
            buffer_size: options.buffer_size.unwrap_or(self.settings.buffer_size),
            priority: options.priority.unwrap_or(self.settings.default_priority),
            status: TaskStatus::Pending,
            bytes_downloaded: 0,
            total_length: None,
            validator: Validator::default(),
            resumable: false,
        };
        Ok(DownloadTask::from_parts(
            parts,
            self.client.clone(),
            Arc::clone(&self.coordinator),
        ))
    }

    /// Create a task and start it
    pub async fn begin_download(
        &self,
        destination: impl Into<PathBuf>,
        uri: &str,
    ) -> Result<DownloadTask, DownloadError> {
        self.begin_download_with(destination, uri, DownloadOptions::default())
            .await
    }

    pub async fn begin_download_with(
        &self,
        destination: impl Into<PathBuf>,
        uri: &str,
        options: DownloadOptions,
    ) -> Result<DownloadTask, DownloadError> {
        let task = self.create_task(destination, uri, options)?;
        info!(
            "Starting download {} of {} -> {}",
            task.id(),
            task.source_uri(),
            task.destination_path().display()
        );
        task.start().await?;
        Ok(task)
    }

    /// Rebuild a task from a serialized [`ResumeRecord`]. The task comes back
    /// idle; call `resume()` to continue it.
    pub async fn restore_task(&self, blob: &str) -> Result<DownloadTask, DownloadError> {
        let record = ResumeCodec::deserialize(blob)?;
        self.restore_record(record).await
    }

    pub async fn restore_record(&self, record: ResumeRecord) -> Result<DownloadTask, DownloadError> {
        ResumeCodec::restore(record, self.client.clone(), Arc::clone(&self.coordinator)).await
    }

    /// 0 means unlimited. Raising the limit promotes queued tasks right away.
    pub fn set_max_concurrent_downloads(&self, max: usize) {
        self.coordinator.set_max_concurrent(max);
    }

    /// Move every queued task to `Paused`
    pub fn clear_queue(&self) {
        self.coordinator.clear_queue();
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("coordinator", &self.coordinator)
            .field("settings", &self.settings)
            .finish()
    }
}

fn parse_source(uri: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(uri).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", uri, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DownloadError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            other, uri
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloader() -> Downloader {
        Downloader::new(Settings::default()).unwrap()
    }

    #[test]
    fn test_create_task_is_pending_with_defaults() {
        let dl = downloader();
        let task = dl
            .create_task("/tmp/out/file.zip", "https://example.com/file.zip", DownloadOptions::default())
            .unwrap();

        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.temp_path(), std::path::Path::new("/tmp/out/file.zip.part"));
        assert_eq!(task.buffer_size(), 64 * 1024);
        assert_eq!(task.priority(), 0);
        assert_eq!(task.bytes_downloaded(), 0);
    }

    #[test]
    fn test_options_override_defaults() {
        let dl = downloader();
        let options = DownloadOptions {
            priority: Some(7),
            buffer_size: Some(1024),
            temp_path: Some(PathBuf::from("/var/tmp/x")),
        };
        let task = dl
            .create_task("/tmp/file.zip", "http://example.com/file.zip", options)
            .unwrap();

        assert_eq!(task.priority(), 7);
        assert_eq!(task.buffer_size(), 1024);
        assert_eq!(task.temp_path(), std::path::Path::new("/var/tmp/x"));
    }

    #[test]
    fn test_rejects_bad_sources() {
        let dl = downloader();
        for uri in ["not a url", "ftp://example.com/file", "file:///etc/passwd"] {
            let err = dl
                .create_task("/tmp/file", uri, DownloadOptions::default())
                .unwrap_err();
            assert!(matches!(err, DownloadError::InvalidUrl(_)), "{}", uri);
            assert!(err.is_precondition());
        }
    }

    #[tokio::test]
    async fn test_existing_destination_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("already.bin");
        tokio::fs::write(&dest, b"data").await.unwrap();

        // Nothing listens on this port; a request would surface as a network error
        let err = downloader()
            .begin_download(&dest, "http://127.0.0.1:9/already.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::DestinationExists(_)));
    }

    #[test]
    fn test_max_concurrent_from_settings() {
        let settings = Settings {
            max_concurrent_downloads: 2,
            ..Settings::default()
        };
        let dl = Downloader::new(settings).unwrap();
        assert_eq!(dl.coordinator().max_concurrent(), 2);

        dl.set_max_concurrent_downloads(0);
        assert_eq!(dl.coordinator().max_concurrent(), 0);
    }
}
