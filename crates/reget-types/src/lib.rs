//! Shared types for reget
//!
//! This crate contains the data structures shared between the download
//! engine and its front ends: task status, resumption metadata, the
//! persisted resume record, task events and settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

// ============================================================================
// Task Types
// ============================================================================

/// Status of a download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created but never started
    Pending,
    Queued,
    Starting,
    Downloading,
    Resuming,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    /// A session is issuing a request or streaming a body
    pub fn is_transferring(self) -> bool {
        matches!(
            self,
            TaskStatus::Starting | TaskStatus::Downloading | TaskStatus::Resuming
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Statuses that cannot survive a process boundary
    pub fn is_in_flight(self) -> bool {
        self.is_transferring() || matches!(self, TaskStatus::Queued | TaskStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Starting => "starting",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Resuming => "resuming",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "queued" => Ok(TaskStatus::Queued),
            "starting" => Ok(TaskStatus::Starting),
            "downloading" => Ok(TaskStatus::Downloading),
            "resuming" => Ok(TaskStatus::Resuming),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            "error" => Ok(TaskStatus::Error),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("Invalid task status: {}", other)),
        }
    }
}

/// Entity tag and/or last-modified timestamp guarding a resumed range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Validator {
    pub fn new(etag: Option<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self { etag, last_modified }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Value for an `If-Range` header: the entity tag when known,
    /// otherwise the HTTP-date of the last-modified timestamp
    pub fn if_range(&self) -> Option<String> {
        if let Some(ref etag) = self.etag {
            return Some(etag.clone());
        }
        self.last_modified
            .map(|ts| ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }
}

/// The persisted representation of a download task.
///
/// This is the only artifact a caller needs to keep between process
/// lifetimes to make resumption possible. Transient state (open streams,
/// cancellation signals, sampler state, byte counts) is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub id: Uuid,
    pub source_uri: Url,
    pub destination_path: PathBuf,
    pub temp_path: PathBuf,
    pub buffer_size: usize,
    #[serde(default)]
    pub priority: i32,
    pub status: TaskStatus,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_length: Option<u64>,
}

impl ResumeRecord {
    pub fn validator(&self) -> Validator {
        Validator::new(self.etag.clone(), self.last_modified)
    }
}

/// Point-in-time view of a task, for display and export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub source_uri: Url,
    pub destination_path: PathBuf,
    pub status: TaskStatus,
    pub bytes_downloaded: u64,
    pub total_length: Option<u64>,
    pub resumable: bool,
    pub priority: i32,
    pub last_error: Option<String>,
}

impl TaskSnapshot {
    pub fn progress(&self) -> f64 {
        match self.total_length {
            Some(total) if total > 0 => (self.bytes_downloaded as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }

    pub fn filename(&self) -> String {
        self.destination_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.destination_path.display().to_string())
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Notifications raised by a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TaskEvent {
    StatusChanged {
        id: Uuid,
        status: TaskStatus,
    },
    Progress {
        id: Uuid,
        downloaded: u64,
        total: Option<u64>,
        /// Bytes per second
        speed: u64,
    },
    Completed {
        id: Uuid,
    },
    Error {
        id: Uuid,
        message: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            TaskEvent::StatusChanged { id, .. }
            | TaskEvent::Progress { id, .. }
            | TaskEvent::Completed { id }
            | TaskEvent::Error { id, .. } => *id,
        }
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub download_dir: PathBuf,
    /// 0 means unlimited
    pub max_concurrent_downloads: usize,
    pub buffer_size: usize,
    pub default_priority: i32,
    /// Request-establishment timeout; streaming itself never times out
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            max_concurrent_downloads: 4,
            buffer_size: 64 * 1024,
            default_priority: 0,
            connect_timeout_secs: 30,
            user_agent: format!("reget/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
