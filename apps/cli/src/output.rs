//! Output formatting utilities

use console::{style, StyledObject};
use reget_types::TaskStatus;
use serde::Serialize;
use uuid::Uuid;

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format speed as human-readable
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", human_bytes::human_bytes(bytes_per_sec as f64))
}

/// First 8 hex digits, enough to address a task on the command line
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

pub fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let kept: String = name.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

pub fn status_icon(status: TaskStatus) -> StyledObject<&'static str> {
    match status {
        TaskStatus::Completed => style("✓").green(),
        TaskStatus::Downloading | TaskStatus::Starting | TaskStatus::Resuming => style("↓").cyan(),
        TaskStatus::Paused => style("⏸").yellow(),
        TaskStatus::Queued => style("…").blue(),
        TaskStatus::Error => style("✗").red(),
        TaskStatus::Cancelled => style("○").dim(),
        TaskStatus::Pending => style("·").dim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.txt", 30), "short.txt");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_short_id_is_a_prefix() {
        let id = Uuid::new_v4();
        assert!(id.to_string().starts_with(&short_id(id)));
        assert_eq!(short_id(id).len(), 8);
    }
}
