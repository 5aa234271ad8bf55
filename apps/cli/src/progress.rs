//! Progress bar utilities for CLI downloads

use crate::output::format_speed;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use reget_types::{TaskEvent, TaskSnapshot, TaskStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Manages progress bars for several downloads
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: RwLock<HashMap<Uuid, ProgressBar>>,
}

impl DownloadProgress {
    /// A hidden instance still tracks bars but draws nothing
    pub fn new(visible: bool) -> Self {
        let multi = if visible {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            multi,
            bars: RwLock::new(HashMap::new()),
        }
    }

    /// Create a progress bar for a task
    pub async fn add_task(&self, task: &TaskSnapshot) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(task.total_length.unwrap_or(0)));

        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );

        pb.set_prefix(task.filename());
        pb.set_position(task.bytes_downloaded);
        pb.set_message(status_message(task.status));

        self.bars.write().await.insert(task.id, pb.clone());
        pb
    }

    /// Update a progress bar from an event
    pub async fn handle_event(&self, event: &TaskEvent) {
        let bars = self.bars.read().await;
        let Some(pb) = bars.get(&event.task_id()) else {
            return;
        };

        match event {
            TaskEvent::Progress {
                downloaded,
                total,
                speed,
                ..
            } => {
                if let Some(total) = total {
                    pb.set_length(*total);
                }
                pb.set_position(*downloaded);
                pb.set_message(format_speed(*speed));
            }

            TaskEvent::StatusChanged { status, .. } => match status {
                TaskStatus::Completed => {
                    pb.finish_with_message(format!("{} Done", style("✓").green().bold()));
                }
                TaskStatus::Cancelled => {
                    pb.abandon_with_message(format!("{} Cancelled", style("○").dim()));
                }
                TaskStatus::Starting => {
                    // Fresh start from byte 0
                    pb.set_position(0);
                    pb.set_message(status_message(*status));
                }
                TaskStatus::Error | TaskStatus::Downloading => {}
                other => pb.set_message(status_message(*other)),
            },

            TaskEvent::Error { message, .. } => {
                pb.abandon_with_message(format!("{} {}", style("✗").red().bold(), message));
            }

            TaskEvent::Completed { .. } => {}
        }
    }

    /// Bring a bar in line with the task's final state
    pub async fn finish(&self, task: &TaskSnapshot) {
        let bars = self.bars.read().await;
        let Some(pb) = bars.get(&task.id) else {
            return;
        };
        if pb.is_finished() {
            return;
        }

        if let Some(total) = task.total_length {
            pb.set_length(total);
        }
        pb.set_position(task.bytes_downloaded);
        match task.status {
            TaskStatus::Completed => {
                pb.finish_with_message(format!("{} Done", style("✓").green().bold()))
            }
            TaskStatus::Error => pb.abandon_with_message(format!(
                "{} {}",
                style("✗").red().bold(),
                task.last_error.as_deref().unwrap_or("Unknown error")
            )),
            status => pb.abandon_with_message(status_message(status)),
        }
    }

    /// Clear all progress bars
    pub async fn clear(&self) {
        for (_, pb) in self.bars.write().await.drain() {
            pb.finish_and_clear();
        }
    }
}

fn status_message(status: TaskStatus) -> String {
    match status {
        TaskStatus::Queued => format!("{} Waiting for a slot", style("…").blue()),
        TaskStatus::Starting | TaskStatus::Resuming => style("Connecting").dim().to_string(),
        TaskStatus::Paused => format!("{} Paused", style("⏸").yellow()),
        TaskStatus::Cancelled => format!("{} Cancelled", style("○").dim()),
        other => style(other).dim().to_string(),
    }
}
