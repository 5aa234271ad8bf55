//! Resume codec - durable form of a task
//!
//! Only identity and resumption metadata are written. Everything transient
//! (byte count, sessions, sampler) is rebuilt on restore, with the temp file
//! on disk as the source of truth for how much has been received.

use crate::engine::coordinator::QueueCoordinator;
use crate::engine::task::{DownloadTask, TaskParts};
use crate::error::DownloadError;
use reget_types::{ResumeRecord, TaskStatus};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct ResumeCodec;

impl ResumeCodec {
    pub fn serialize(task: &DownloadTask) -> Result<String, DownloadError> {
        Ok(serde_json::to_string(&task.record())?)
    }

    pub fn deserialize(blob: &str) -> Result<ResumeRecord, DownloadError> {
        Ok(serde_json::from_str(blob)?)
    }

    /// Rebuild a task from its record.
    ///
    /// A task recorded while it was running (or waiting to run) comes back
    /// `Paused`; no session is started.
    pub async fn restore(
        record: ResumeRecord,
        client: Client,
        coordinator: Arc<QueueCoordinator>,
    ) -> Result<DownloadTask, DownloadError> {
        let status = match record.status {
            s if s.is_in_flight() => TaskStatus::Paused,
            s => s,
        };
        let bytes_downloaded = temp_file_len(&record.temp_path).await;
        let validator = record.validator();
        let resumable = !validator.is_empty();

        debug!(
            "Restoring task {} as {} with {} bytes on disk",
            record.id, status, bytes_downloaded
        );

        let parts = TaskParts {
            id: record.id,
            source_uri: record.source_uri,
            destination_path: record.destination_path,
            temp_path: record.temp_path,
            buffer_size: record.buffer_size,
            priority: record.priority,
            status,
            bytes_downloaded,
            total_length: record.total_length,
            validator,
            resumable,
        };
        Ok(DownloadTask::from_parts(parts, client, coordinator))
    }

    pub async fn restore_blob(
        blob: &str,
        client: Client,
        coordinator: Arc<QueueCoordinator>,
    ) -> Result<DownloadTask, DownloadError> {
        let record = Self::deserialize(blob)?;
        Self::restore(record, client, coordinator).await
    }
}

async fn temp_file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use url::Url;
    use uuid::Uuid;

    fn record(dir: &Path, status: TaskStatus, etag: Option<&str>) -> ResumeRecord {
        ResumeRecord {
            id: Uuid::new_v4(),
            source_uri: Url::parse("http://example.com/file.bin").unwrap(),
            destination_path: dir.join("file.bin"),
            temp_path: dir.join("file.bin.part"),
            buffer_size: 64 * 1024,
            priority: 2,
            status,
            etag: etag.map(String::from),
            last_modified: None,
            total_length: Some(1_000_000),
        }
    }

    async fn restore(record: ResumeRecord) -> DownloadTask {
        ResumeCodec::restore(record, Client::new(), Arc::new(QueueCoordinator::new(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_in_flight_status_restores_as_paused() {
        let dir = tempfile::tempdir().unwrap();
        for status in [
            TaskStatus::Pending,
            TaskStatus::Queued,
            TaskStatus::Starting,
            TaskStatus::Downloading,
            TaskStatus::Resuming,
        ] {
            let task = restore(record(dir.path(), status, Some("\"v1\""))).await;
            assert_eq!(task.status(), TaskStatus::Paused, "from {}", status);
        }

        let task = restore(record(dir.path(), TaskStatus::Error, None)).await;
        assert_eq!(task.status(), TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_bytes_come_from_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record(dir.path(), TaskStatus::Downloading, Some("\"v1\""));
        tokio::fs::write(&rec.temp_path, vec![7u8; 12_345]).await.unwrap();

        let task = restore(rec).await;
        assert_eq!(task.bytes_downloaded(), 12_345);
        assert_eq!(task.total_length(), Some(1_000_000));
        assert!(task.is_resumable());
        assert_eq!(task.priority(), 2);
    }

    #[tokio::test]
    async fn test_missing_temp_file_means_zero_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let task = restore(record(dir.path(), TaskStatus::Paused, None)).await;
        assert_eq!(task.bytes_downloaded(), 0);
        assert!(!task.is_resumable());
    }

    #[tokio::test]
    async fn test_serialize_round_trip_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = record(dir.path(), TaskStatus::Paused, None);
        rec.last_modified = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let task = restore(rec.clone()).await;

        let blob = ResumeCodec::serialize(&task).unwrap();
        let decoded = ResumeCodec::deserialize(&blob).unwrap();
        assert_eq!(decoded.id, rec.id);
        assert_eq!(decoded.source_uri, rec.source_uri);
        assert_eq!(decoded.temp_path, rec.temp_path);
        assert_eq!(decoded.last_modified, rec.last_modified);
        assert!(ResumeCodec::restore_blob(&blob, Client::new(), Arc::default())
            .await
            .unwrap()
            .is_resumable());
    }

    #[test]
    fn test_malformed_blob_is_serialization_error() {
        let err = ResumeCodec::deserialize("{not json").unwrap_err();
        assert!(matches!(err, DownloadError::Serialization(_)));

        let err = ResumeCodec::deserialize(r#"{"id":"nope"}"#).unwrap_err();
        assert!(matches!(err, DownloadError::Serialization(_)));
    }
}
