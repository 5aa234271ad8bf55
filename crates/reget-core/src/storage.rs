//! Settings storage (JSON file in the data directory)

use crate::error::DownloadError;
use reget_types::Settings;
use std::path::{Path, PathBuf};
use tokio::fs;

const SETTINGS_FILE: &str = "settings.json";

/// Reads and writes `settings.json` under a data directory
#[derive(Clone, Debug)]
pub struct SettingsStore {
    data_dir: PathBuf,
}

impl SettingsStore {
    /// Create the store, creating the data directory if needed
    pub async fn new(data_dir: PathBuf) -> Result<Self, DownloadError> {
        fs::create_dir_all(&data_dir).await?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(&self) -> Result<Settings, DownloadError> {
        let content = match fs::read_to_string(self.path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default())
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), DownloadError> {
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(self.path(), content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("data")).await.unwrap();
        assert!(store.data_dir().is_dir());
        assert_eq!(store.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().to_path_buf()).await.unwrap();

        let settings = Settings {
            max_concurrent_downloads: 1,
            buffer_size: 8192,
            ..Settings::default()
        };
        store.save(&settings).await.unwrap();

        assert_eq!(store.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().to_path_buf()).await.unwrap();
        tokio::fs::write(store.path(), r#"{"buffer_size": 1024}"#)
            .await
            .unwrap();

        let settings = store.load().await.unwrap();
        assert_eq!(settings.buffer_size, 1024);
        assert_eq!(settings.max_concurrent_downloads, 4);
    }

    #[tokio::test]
    async fn test_garbage_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().to_path_buf()).await.unwrap();
        tokio::fs::write(store.path(), "max_concurrent = 3").await.unwrap();

        assert!(matches!(
            store.load().await,
            Err(DownloadError::Serialization(_))
        ));
    }
}
