//! CLI command implementations

use crate::output::{format_bytes, print_json, short_id, status_icon, truncate};
use crate::progress::DownloadProgress;
use crate::{ConfigAction, OutputFormat};
use anyhow::{anyhow, bail, Result};
use console::style;
use reget_core::{DownloadOptions, DownloadTask, Downloader, SettingsStore, TaskDatabase};
use reget_types::{ResumeRecord, Settings, TaskEvent, TaskSnapshot, TaskStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Everything a command needs: the engine, the task store and the settings
pub struct App {
    pub downloader: Downloader,
    pub db: TaskDatabase,
    pub store: SettingsStore,
}

impl App {
    pub async fn open(data_dir: PathBuf, max_concurrent: Option<usize>) -> Result<Self> {
        let store = SettingsStore::new(data_dir.clone()).await?;
        let mut settings = store.load().await?;
        if let Some(max) = max_concurrent {
            settings.max_concurrent_downloads = max;
        }

        let downloader = Downloader::new(settings)?;
        let db = TaskDatabase::open(data_dir.join("tasks.db")).await?;
        debug!("Using data directory {}", data_dir.display());

        Ok(Self {
            downloader,
            db,
            store,
        })
    }

    /// Look a record up by full ID or unique prefix
    async fn find(&self, id: &str) -> Result<ResumeRecord> {
        if let Ok(uuid) = Uuid::parse_str(id) {
            return self
                .db
                .load(uuid)
                .await?
                .ok_or_else(|| anyhow!("No download with ID {}", id));
        }

        let mut matches: Vec<ResumeRecord> = self
            .db
            .load_all()
            .await?
            .into_iter()
            .filter(|r| r.id.to_string().starts_with(id))
            .collect();

        match matches.len() {
            0 => bail!("No download with ID {}", id),
            1 => Ok(matches.remove(0)),
            n => bail!("ID prefix {} is ambiguous ({} matches)", id, n),
        }
    }

    async fn save(&self, task: &DownloadTask) -> Result<()> {
        self.db.upsert(&task.record()).await?;
        Ok(())
    }
}

// ============================================================================
// Download Commands
// ============================================================================

#[derive(Clone, Copy)]
enum Action {
    Start,
    Resume,
    Restart,
}

pub async fn get(
    app: &App,
    url: &str,
    output: Option<PathBuf>,
    priority: Option<i32>,
    buffer_size: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let destination = resolve_destination(app.downloader.settings(), url, output);
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = DownloadOptions {
        priority,
        buffer_size,
        temp_path: None,
    };
    let task = app.downloader.create_task(&destination, url, options)?;
    run_foreground(app, vec![task], Action::Start, format).await
}

pub async fn resume(app: &App, id: Option<&str>, all: bool, format: OutputFormat) -> Result<()> {
    let records = match id {
        Some(id) if !all => vec![app.find(id).await?],
        _ => app
            .db
            .load_all()
            .await?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .collect(),
    };

    if records.is_empty() {
        println!("{}", style("Nothing to resume").dim());
        return Ok(());
    }

    let mut tasks = Vec::with_capacity(records.len());
    for record in records {
        if record.status.is_terminal() {
            bail!("Download {} is {}", short_id(record.id), record.status);
        }
        tasks.push(app.downloader.restore_record(record).await?);
    }
    run_foreground(app, tasks, Action::Resume, format).await
}

pub async fn restart(app: &App, id: &str, format: OutputFormat) -> Result<()> {
    let record = app.find(id).await?;
    let task = app.downloader.restore_record(record).await?;
    run_foreground(app, vec![task], Action::Restart, format).await
}

pub async fn cancel(app: &App, id: &str, format: OutputFormat) -> Result<()> {
    let record = app.find(id).await?;
    let task = app.downloader.restore_record(record).await?;
    task.cancel().await?;
    app.save(&task).await?;

    match format {
        OutputFormat::Json => print_json(&task.snapshot())?,
        _ => println!("{} Download cancelled", style("✓").green().bold()),
    }
    Ok(())
}

pub async fn forget(app: &App, id: &str, with_file: bool, format: OutputFormat) -> Result<()> {
    let record = app.find(id).await?;
    app.db.delete(record.id).await?;

    let file_removed = if with_file {
        match tokio::fs::remove_file(&record.temp_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        }
    } else {
        false
    };

    match format {
        OutputFormat::Json => print_json(&forget_summary(record.id, file_removed))?,
        _ => println!("{} Download forgotten", style("✓").green().bold()),
    }
    Ok(())
}

fn forget_summary(id: Uuid, file_removed: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "forgotten": true,
        "file_removed": file_removed,
    })
}

pub async fn list(
    app: &App,
    status_filter: Option<String>,
    show_all: bool,
    format: OutputFormat,
) -> Result<()> {
    let status_filter = status_filter
        .map(|s| s.parse::<TaskStatus>())
        .transpose()
        .map_err(|e| anyhow!(e))?;

    let mut snapshots = Vec::new();
    for record in app.db.load_all().await? {
        let task = app.downloader.restore_record(record).await?;
        let snapshot = task.snapshot();
        if status_filter.map_or(true, |s| s == snapshot.status) {
            snapshots.push(snapshot);
        }
    }

    match format {
        OutputFormat::Json => print_json(&snapshots)?,
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct TaskRow {
                id: String,
                filename: String,
                size: String,
                progress: String,
                status: String,
            }

            let rows: Vec<TaskRow> = snapshots
                .iter()
                .map(|t| TaskRow {
                    id: short_id(t.id),
                    filename: truncate(&t.filename(), 30),
                    size: t
                        .total_length
                        .map(format_bytes)
                        .unwrap_or_else(|| "?".to_string()),
                    progress: format!("{:.1}%", t.progress()),
                    status: t.status.to_string(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            if snapshots.is_empty() {
                println!("{}", style("No downloads found").dim());
                return Ok(());
            }

            for snapshot in &snapshots {
                print_task_summary(snapshot, show_all);
            }
            println!();
            println!("{} download(s) total", style(snapshots.len()).bold());
        }
    }

    Ok(())
}

fn print_task_summary(task: &TaskSnapshot, detailed: bool) {
    println!(
        "{} {} {} {} [{}]",
        status_icon(task.status),
        style(short_id(task.id)).dim(),
        style(task.filename()).bold(),
        style(format!("{:.1}%", task.progress())).dim(),
        style(task.status).dim()
    );

    if detailed {
        println!("    ID: {}", task.id);
        println!("    URL: {}", task.source_uri);
        println!("    Destination: {}", task.destination_path.display());
        println!(
            "    Received: {} / {}",
            format_bytes(task.bytes_downloaded),
            task.total_length
                .map(format_bytes)
                .unwrap_or_else(|| "?".to_string())
        );
        println!(
            "    Resumable: {}",
            if task.resumable {
                style("Yes").green()
            } else {
                style("No").yellow()
            }
        );
        if task.priority != 0 {
            println!("    Priority: {}", task.priority);
        }
        if let Some(ref error) = task.last_error {
            println!("    Error: {}", style(error).red());
        }
        println!();
    }
}

/// Run tasks with progress bars until they settle. Ctrl-C pauses them all.
async fn run_foreground(
    app: &App,
    tasks: Vec<DownloadTask>,
    action: Action,
    format: OutputFormat,
) -> Result<()> {
    let progress = Arc::new(DownloadProgress::new(!matches!(format, OutputFormat::Json)));
    let mut forwarders = Vec::with_capacity(tasks.len());

    for task in &tasks {
        app.save(task).await?;
        progress.add_task(&task.snapshot()).await;
        forwarders.push(tokio::spawn(forward_events(
            task.clone(),
            app.db.clone(),
            Arc::clone(&progress),
        )));
    }

    for task in &tasks {
        let started = match action {
            Action::Start => task.start().await,
            Action::Resume => task.resume().await,
            Action::Restart => task.restart().await,
        };
        if let Err(e) = started {
            if e.is_precondition() || tasks.len() == 1 {
                progress.clear().await;
                for forwarder in &forwarders {
                    forwarder.abort();
                }
                // A destination that already exists is not worth keeping a record for
                if e.is_precondition() {
                    app.db.delete(task.id()).await?;
                }
                return Err(e.into());
            }
            warn!("Could not start {}: {}", task.id(), e);
        }
    }

    let settled = futures::future::join_all(tasks.iter().map(|t| t.wait()));
    let interrupted = tokio::select! {
        _ = settled => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        for task in &tasks {
            task.pause().await?;
        }
    }

    for forwarder in forwarders {
        forwarder.abort();
    }

    let snapshots: Vec<TaskSnapshot> = tasks.iter().map(|t| t.snapshot()).collect();
    for (task, snapshot) in tasks.iter().zip(&snapshots) {
        app.save(task).await?;
        progress.finish(snapshot).await;
    }

    match format {
        OutputFormat::Json => print_json(&snapshots)?,
        _ => {
            if interrupted {
                println!(
                    "{} Paused. Continue with: reget resume {}",
                    style("⏸").yellow(),
                    if tasks.len() == 1 {
                        short_id(tasks[0].id())
                    } else {
                        "--all".to_string()
                    }
                );
            }
        }
    }

    let failed = snapshots
        .iter()
        .filter(|s| s.status == TaskStatus::Error)
        .count();
    if failed > 0 {
        bail!("{} download(s) failed", failed);
    }
    Ok(())
}

/// Feed a task's events to its progress bar and keep its stored record
/// current whenever the status changes
async fn forward_events(task: DownloadTask, db: TaskDatabase, progress: Arc<DownloadProgress>) {
    let mut events = task.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                if let TaskEvent::StatusChanged { .. } = event {
                    if let Err(e) = db.upsert(&task.record()).await {
                        warn!("Could not record task {}: {}", task.id(), e);
                    }
                }
                progress.handle_event(&event).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!("Progress display skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn resolve_destination(settings: &Settings, url: &str, output: Option<PathBuf>) -> PathBuf {
    let name = filename_from_url(url);
    match output {
        Some(path) if path.is_dir() => path.join(name),
        Some(path) => path,
        None => settings.download_dir.join(name),
    }
}

fn filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(String::from))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn config_action(
    app: &App,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        None | Some(ConfigAction::Show) => {
            let settings = app.store.load().await?;

            match format {
                OutputFormat::Json => print_json(&settings)?,
                _ => {
                    println!("reget configuration ({}):", app.store.path().display());
                    println!();
                    println!("  Download directory: {}", settings.download_dir.display());
                    println!(
                        "  Max concurrent downloads: {}",
                        match settings.max_concurrent_downloads {
                            0 => "Unlimited".to_string(),
                            n => n.to_string(),
                        }
                    );
                    println!("  Buffer size: {}", format_bytes(settings.buffer_size as u64));
                    println!("  Default priority: {}", settings.default_priority);
                    println!("  Connect timeout: {}s", settings.connect_timeout_secs);
                    println!("  User agent: {}", settings.user_agent);
                }
            }
        }

        Some(ConfigAction::Get { key }) => {
            let settings = app.store.load().await?;
            println!("{}", get_setting(&settings, &key)?);
        }

        Some(ConfigAction::Set { key, value }) => {
            let mut settings = app.store.load().await?;
            set_setting(&mut settings, &key, &value)?;
            app.store.save(&settings).await?;
            println!("{} Config updated", style("✓").green().bold());
        }

        Some(ConfigAction::Reset { yes }) => {
            use dialoguer::Confirm;

            let confirmed = yes
                || Confirm::new()
                    .with_prompt("Reset all settings to defaults?")
                    .default(false)
                    .interact()?;

            if confirmed {
                app.store.save(&Settings::default()).await?;
                println!("{} Settings reset to defaults", style("✓").green().bold());
            }
        }
    }

    Ok(())
}

fn get_setting(settings: &Settings, key: &str) -> Result<String> {
    Ok(match key {
        "download_dir" => settings.download_dir.display().to_string(),
        "max_concurrent_downloads" => settings.max_concurrent_downloads.to_string(),
        "buffer_size" => settings.buffer_size.to_string(),
        "default_priority" => settings.default_priority.to_string(),
        "connect_timeout_secs" => settings.connect_timeout_secs.to_string(),
        "user_agent" => settings.user_agent.clone(),
        _ => bail!("Unknown config key: {}", key),
    })
}

fn set_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "download_dir" => settings.download_dir = PathBuf::from(value),
        "max_concurrent_downloads" => settings.max_concurrent_downloads = value.parse()?,
        "buffer_size" => {
            let size: usize = value.parse()?;
            if size == 0 {
                bail!("buffer_size must be at least 1");
            }
            settings.buffer_size = size;
        }
        "default_priority" => settings.default_priority = value.parse()?,
        "connect_timeout_secs" => settings.connect_timeout_secs = value.parse()?,
        "user_agent" => settings.user_agent = value.to_string(),
        _ => bail!("Unknown config key: {}", key),
    }
    Ok(())
}
