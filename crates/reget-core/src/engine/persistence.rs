//! SQLite-based persistence for resume records
//!
//! One row per task, so a command-line session can pick up downloads that an
//! earlier process paused or lost.

use crate::error::DownloadError;
use chrono::{DateTime, Utc};
use reget_types::{ResumeRecord, TaskStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// Database connection pool for task records
#[derive(Clone, Debug)]
pub struct TaskDatabase {
    pool: SqlitePool,
}

impl TaskDatabase {
    /// Open (creating if needed) the database at `db_path`
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, DownloadError> {
        let path = db_path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                source_uri TEXT NOT NULL,
                destination_path TEXT NOT NULL,
                temp_path TEXT NOT NULL,
                buffer_size INTEGER NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                etag TEXT,
                last_modified TEXT,
                total_length INTEGER,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Save or update a record
    pub async fn upsert(&self, record: &ResumeRecord) -> Result<(), DownloadError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, source_uri, destination_path, temp_path, buffer_size, priority,
                status, etag, last_modified, total_length, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_uri = excluded.source_uri,
                destination_path = excluded.destination_path,
                temp_path = excluded.temp_path,
                buffer_size = excluded.buffer_size,
                priority = excluded.priority,
                status = excluded.status,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                total_length = excluded.total_length,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.source_uri.as_str())
        .bind(record.destination_path.to_string_lossy().to_string())
        .bind(record.temp_path.to_string_lossy().to_string())
        .bind(record.buffer_size as i64)
        .bind(record.priority)
        .bind(record.status.as_str())
        .bind(record.etag.as_ref())
        .bind(record.last_modified.map(|d| d.to_rfc3339()))
        .bind(record.total_length.map(|t| t as i64))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load a record by ID
    pub async fn load(&self, id: Uuid) -> Result<Option<ResumeRecord>, DownloadError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_record).transpose()
    }

    /// Every record, most recently touched first
    pub async fn load_all(&self) -> Result<Vec<ResumeRecord>, DownloadError> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Returns whether a row was removed
    pub async fn delete(&self, id: Uuid) -> Result<bool, DownloadError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_record(row: SqliteRow) -> Result<ResumeRecord, DownloadError> {
    let corrupt = |what: &str, e: String| {
        DownloadError::Serialization(format!("stored task has invalid {}: {}", what, e))
    };

    let id = Uuid::parse_str(row.get::<String, _>("id").as_str())
        .map_err(|e| corrupt("id", e.to_string()))?;
    let source_uri = Url::parse(row.get::<String, _>("source_uri").as_str())
        .map_err(|e| corrupt("source_uri", e.to_string()))?;
    let status = row
        .get::<String, _>("status")
        .parse::<TaskStatus>()
        .map_err(|e| corrupt("status", e))?;
    let last_modified = row
        .get::<Option<String>, _>("last_modified")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(ResumeRecord {
        id,
        source_uri,
        destination_path: PathBuf::from(row.get::<String, _>("destination_path")),
        temp_path: PathBuf::from(row.get::<String, _>("temp_path")),
        buffer_size: row.get::<i64, _>("buffer_size").max(1) as usize,
        priority: row.get::<i64, _>("priority") as i32,
        status,
        etag: row.get("etag"),
        last_modified,
        total_length: row.get::<Option<i64>, _>("total_length").map(|t| t as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(status: TaskStatus) -> ResumeRecord {
        ResumeRecord {
            id: Uuid::new_v4(),
            source_uri: Url::parse("https://example.com/a/b.iso").unwrap(),
            destination_path: PathBuf::from("/tmp/b.iso"),
            temp_path: PathBuf::from("/tmp/b.iso.part"),
            buffer_size: 65536,
            priority: 3,
            status,
            etag: Some("\"abc\"".to_string()),
            last_modified: Some(Utc.with_ymd_and_hms(2023, 11, 5, 8, 30, 0).unwrap()),
            total_length: Some(4_000_000_000),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let db = TaskDatabase::open(dir.path().join("nested").join("tasks.db"))
            .await
            .unwrap();

        let record = sample(TaskStatus::Paused);
        db.upsert(&record).await.unwrap();

        let loaded = db.load(record.id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(db.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_existing_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = TaskDatabase::open(dir.path().join("tasks.db")).await.unwrap();

        let mut record = sample(TaskStatus::Downloading);
        db.upsert(&record).await.unwrap();
        record.status = TaskStatus::Completed;
        record.etag = None;
        db.upsert(&record).await.unwrap();

        let all = db.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TaskStatus::Completed);
        assert_eq!(all[0].etag, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = TaskDatabase::open(dir.path().join("tasks.db")).await.unwrap();

        let keep = sample(TaskStatus::Paused);
        let gone = sample(TaskStatus::Error);
        db.upsert(&keep).await.unwrap();
        db.upsert(&gone).await.unwrap();

        assert!(db.delete(gone.id).await.unwrap());
        assert!(!db.delete(gone.id).await.unwrap());

        let ids: Vec<Uuid> = db.load_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![keep.id]);
    }
}
