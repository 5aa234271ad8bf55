//! Download task - the state machine for a single download
//!
//! A `DownloadTask` owns the identity and resumption metadata of one download
//! and is the only place where its status changes. Transfers are delegated to
//! a [`TransferSession`] that runs on its own Tokio task; admission goes
//! through the shared [`QueueCoordinator`].
//!
//! Locking: the per-task state mutex may be held while calling into the
//! coordinator, never the other way round, and it is never held across an
//! `.await`.

use crate::engine::coordinator::{Admissible, Admission, QueueCoordinator};
use crate::engine::session::{
    ResponseMeta, SessionOutcome, SessionPlan, TransferSession, TransferSink,
};
use crate::engine::speed::SpeedSampler;
use crate::error::DownloadError;
use parking_lot::Mutex;
use reget_types::{ResumeRecord, TaskEvent, TaskSnapshot, TaskStatus, Validator};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Events buffered per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 1024;

/// Where the next session starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Launch {
    /// Offset 0, accumulated bytes discarded
    Fresh,
    /// One buffer before the recorded offset
    Resume,
}

struct ActiveSession {
    generation: u64,
    token: CancellationToken,
}

struct TaskState {
    status: TaskStatus,
    bytes_downloaded: u64,
    total_length: Option<u64>,
    resumable: bool,
    validator: Validator,
    buffer_size: usize,
    last_error: Option<String>,
    /// Launch to perform once a queued task is promoted
    pending: Option<Launch>,
    active: Option<ActiveSession>,
    /// An operation owns the task while it does filesystem work before
    /// launching or finalizing
    reserved: bool,
    /// Set by pause/cancel while reserved: the owner must not launch
    reservation_revoked: bool,
    generation: u64,
    sampler: SpeedSampler,
    /// Highest byte count announced in a progress event
    last_reported: u64,
}

/// Fields a task is built from, fresh or restored
pub(crate) struct TaskParts {
    pub id: Uuid,
    pub source_uri: Url,
    pub destination_path: PathBuf,
    pub temp_path: PathBuf,
    pub buffer_size: usize,
    pub priority: i32,
    pub status: TaskStatus,
    pub bytes_downloaded: u64,
    pub total_length: Option<u64>,
    pub validator: Validator,
    pub resumable: bool,
}

struct TaskInner {
    id: Uuid,
    source_uri: Url,
    destination_path: PathBuf,
    temp_path: PathBuf,
    /// Read by the coordinator while the state lock may be held
    priority: AtomicI32,
    client: Client,
    coordinator: Arc<QueueCoordinator>,
    state: Mutex<TaskState>,
    events: broadcast::Sender<TaskEvent>,
    status_tx: watch::Sender<TaskStatus>,
    /// True while a session is running or the task is reserved
    busy: watch::Sender<bool>,
}

/// Handle to one download. Cloning shares the same task.
#[derive(Clone)]
pub struct DownloadTask {
    inner: Arc<TaskInner>,
}

/// `<destination>.part`, next to the destination
pub fn default_temp_path(destination: &Path) -> Option<PathBuf> {
    let mut name = destination.file_name()?.to_os_string();
    name.push(".part");
    Some(destination.with_file_name(name))
}

impl DownloadTask {
    pub(crate) fn from_parts(
        parts: TaskParts,
        client: Client,
        coordinator: Arc<QueueCoordinator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, _) = watch::channel(parts.status);
        let (busy, _) = watch::channel(false);

        Self {
            inner: Arc::new(TaskInner {
                id: parts.id,
                source_uri: parts.source_uri,
                destination_path: parts.destination_path,
                temp_path: parts.temp_path,
                priority: AtomicI32::new(parts.priority),
                client,
                coordinator,
                state: Mutex::new(TaskState {
                    status: parts.status,
                    bytes_downloaded: parts.bytes_downloaded,
                    total_length: parts.total_length,
                    resumable: parts.resumable,
                    validator: parts.validator,
                    buffer_size: parts.buffer_size.max(1),
                    last_error: None,
                    pending: None,
                    active: None,
                    reserved: false,
                    reservation_revoked: false,
                    generation: 0,
                    sampler: SpeedSampler::new(),
                    last_reported: parts.bytes_downloaded,
                }),
                events,
                status_tx,
                busy,
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn source_uri(&self) -> &Url {
        &self.inner.source_uri
    }

    pub fn destination_path(&self) -> &Path {
        &self.inner.destination_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.inner.temp_path
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.state.lock().status
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.inner.state.lock().bytes_downloaded
    }

    pub fn total_length(&self) -> Option<u64> {
        self.inner.state.lock().total_length
    }

    pub fn is_resumable(&self) -> bool {
        self.inner.state.lock().resumable
    }

    pub fn validator(&self) -> Validator {
        self.inner.state.lock().validator.clone()
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.state.lock().buffer_size
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority.load(Ordering::Acquire)
    }

    /// Takes effect the next time the task asks for admission
    pub fn set_priority(&self, priority: i32) {
        self.inner.priority.store(priority, Ordering::Release);
    }

    /// Current transfer rate in bytes per second, 0 unless downloading
    pub fn speed(&self) -> u64 {
        let state = self.inner.state.lock();
        if state.status == TaskStatus::Downloading {
            state.sampler.current_rate()
        } else {
            0
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.inner.state.lock();
        TaskSnapshot {
            id: self.inner.id,
            source_uri: self.inner.source_uri.clone(),
            destination_path: self.inner.destination_path.clone(),
            status: state.status,
            bytes_downloaded: state.bytes_downloaded,
            total_length: state.total_length,
            resumable: state.resumable,
            priority: self.priority(),
            last_error: state.last_error.clone(),
        }
    }

    /// Durable fields only; see [`crate::ResumeCodec`]
    pub fn record(&self) -> ResumeRecord {
        let state = self.inner.state.lock();
        ResumeRecord {
            id: self.inner.id,
            source_uri: self.inner.source_uri.clone(),
            destination_path: self.inner.destination_path.clone(),
            temp_path: self.inner.temp_path.clone(),
            buffer_size: state.buffer_size,
            priority: self.priority(),
            status: state.status,
            etag: state.validator.etag.clone(),
            last_modified: state.validator.last_modified,
            total_length: state.total_length,
        }
    }

    pub fn serialize(&self) -> Result<String, DownloadError> {
        crate::ResumeCodec::serialize(self)
    }

    /// Subscribe to this task's notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until the status satisfies `predicate`
    pub async fn wait_until(&self, mut predicate: impl FnMut(TaskStatus) -> bool) -> TaskStatus {
        let mut rx = self.inner.status_tx.subscribe();
        let reached = rx.wait_for(|status| predicate(*status)).await.map(|s| *s);
        reached.unwrap_or_else(|_| self.status())
    }

    /// Wait until the task is neither queued nor transferring and its last
    /// session has fully unwound
    pub async fn wait(&self) -> TaskStatus {
        self.wait_until(|s| !s.is_transferring() && s != TaskStatus::Queued)
            .await;
        self.inner.wait_idle().await;
        self.status()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Begin a fresh transfer from offset 0.
    ///
    /// Fails if the destination already exists. Does nothing if the task is
    /// already transferring or waiting for a slot.
    pub async fn start(&self) -> Result<(), DownloadError> {
        let _reservation = {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return Err(DownloadError::InvalidOperation(format!(
                    "cannot start a {} download",
                    state.status
                )));
            }
            if state.status.is_transferring() || state.status == TaskStatus::Queued {
                debug!("Task {} already running, ignoring start", self.inner.id);
                return Ok(());
            }
            match self.inner.reserve(&mut state) {
                Some(reservation) => reservation,
                None => {
                    debug!("Task {} busy, ignoring start", self.inner.id);
                    return Ok(());
                }
            }
        };

        if tokio::fs::try_exists(&self.inner.destination_path).await? {
            return Err(DownloadError::DestinationExists(
                self.inner.destination_path.clone(),
            ));
        }

        self.inner.discard_partial().await?;
        self.launch(Launch::Fresh);
        Ok(())
    }

    /// Stop the transfer and keep the partial data.
    ///
    /// Returns once the in-flight I/O has unwound and the task is `Paused`.
    /// Pausing a queued task takes it out of the queue.
    pub async fn pause(&self) -> Result<(), DownloadError> {
        let in_flight = {
            let mut state = self.inner.state.lock();
            let status = state.status;
            match status {
                TaskStatus::Queued => {
                    self.inner.coordinator.withdraw(self.inner.id);
                    state.pending = None;
                    self.inner.transition(&mut state, TaskStatus::Paused);
                    false
                }
                s if s.is_transferring() => {
                    if let Some(active) = &state.active {
                        active.token.cancel();
                    }
                    true
                }
                _ => {
                    if state.reserved {
                        state.reservation_revoked = true;
                    }
                    false
                }
            }
        };

        if in_flight {
            self.inner.wait_idle().await;
            let mut state = self.inner.state.lock();
            if state.status.is_transferring() && state.active.is_none() {
                info!(
                    "Paused task {} at {} bytes",
                    self.inner.id, state.bytes_downloaded
                );
                self.inner.transition(&mut state, TaskStatus::Paused);
            }
        }
        Ok(())
    }

    /// Continue from the recorded offset, or start over if the server never
    /// demonstrated range support with a validator.
    pub async fn resume(&self) -> Result<(), DownloadError> {
        enum Next<'a> {
            Nothing,
            Start,
            Restart,
            Finalize(Reservation<'a>),
        }

        let next = {
            let mut state = self.inner.state.lock();
            let status = state.status;
            if status.is_terminal() {
                return Err(DownloadError::InvalidOperation(format!(
                    "cannot resume a {} download",
                    status
                )));
            }

            if status.is_transferring() || state.active.is_some() || state.reserved {
                Next::Nothing
            } else if status == TaskStatus::Pending {
                Next::Start
            } else if status == TaskStatus::Queued {
                // Still waiting for a slot; only the launch kind changes
                state.pending = Some(if state.resumable {
                    Launch::Resume
                } else {
                    Launch::Fresh
                });
                Next::Nothing
            } else if !state.resumable {
                Next::Restart
            } else if matches!(state.total_length, Some(total) if total > 0 && total == state.bytes_downloaded)
            {
                match self.inner.reserve(&mut state) {
                    Some(reservation) => Next::Finalize(reservation),
                    None => Next::Nothing,
                }
            } else {
                // Launched under the same lock so no reservation can slip in
                self.launch_locked(&mut state, Launch::Resume);
                Next::Nothing
            }
        };

        match next {
            Next::Nothing => Ok(()),
            Next::Start => self.start().await,
            Next::Restart => self.restart().await,
            Next::Finalize(reservation) => {
                self.finalize_received().await;
                drop(reservation);
                Ok(())
            }
        }
    }

    /// Drop any transfer and partial data and begin again from offset 0
    pub async fn restart(&self) -> Result<(), DownloadError> {
        {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return Err(DownloadError::InvalidOperation(format!(
                    "cannot restart a {} download",
                    state.status
                )));
            }
            if state.reserved {
                debug!("Task {} busy, ignoring restart", self.inner.id);
                return Ok(());
            }
            if state.status == TaskStatus::Queued {
                self.inner.coordinator.withdraw(self.inner.id);
                state.pending = None;
            }
            if let Some(active) = &state.active {
                active.token.cancel();
            }
        }

        self.inner.wait_idle().await;
        let _reservation = {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return Err(DownloadError::InvalidOperation(format!(
                    "cannot restart a {} download",
                    state.status
                )));
            }
            match self.inner.reserve(&mut state) {
                Some(reservation) => reservation,
                None => {
                    debug!("Task {} relaunched meanwhile, ignoring restart", self.inner.id);
                    return Ok(());
                }
            }
        };

        self.inner.discard_partial().await?;
        info!("Restarting task {} from offset 0", self.inner.id);
        self.launch(Launch::Fresh);
        Ok(())
    }

    /// Stop the transfer, delete the temp file and mark the task `Cancelled`
    pub async fn cancel(&self) -> Result<(), DownloadError> {
        {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return Ok(());
            }
            if state.status == TaskStatus::Queued {
                self.inner.coordinator.withdraw(self.inner.id);
            }
            state.pending = None;
            if state.reserved {
                state.reservation_revoked = true;
            }
            if let Some(active) = &state.active {
                active.token.cancel();
            }
        }

        self.inner.wait_idle().await;
        if self.status() == TaskStatus::Completed {
            return Ok(());
        }

        remove_if_exists(&self.inner.temp_path).await?;

        let mut state = self.inner.state.lock();
        if !state.status.is_terminal() {
            state.bytes_downloaded = 0;
            state.last_reported = 0;
            state.pending = None;
            state.last_error = None;
            state.sampler.clear();
            info!("Cancelled task {}", self.inner.id);
            self.inner.transition(&mut state, TaskStatus::Cancelled);
        }
        Ok(())
    }

    /// Ask for a slot and run a session now, or wait in the queue
    fn launch(&self, launch: Launch) {
        let mut state = self.inner.state.lock();
        self.launch_locked(&mut state, launch);
    }

    fn launch_locked(&self, state: &mut TaskState, launch: Launch) {
        let inner = &self.inner;
        if state.active.is_some() || state.status.is_terminal() {
            return;
        }
        if state.reservation_revoked {
            debug!("Task {} stopped before its launch", inner.id);
            return;
        }
        if state.status == TaskStatus::Queued && inner.coordinator.is_queued(inner.id) {
            state.pending = Some(launch);
            return;
        }

        let entry: Arc<dyn Admissible> = inner.clone();
        match inner.coordinator.try_admit(entry) {
            Admission::Admitted => inner.spawn_session(state, launch),
            Admission::Queued => {
                info!("Task {} waiting for a download slot", inner.id);
                state.pending = Some(launch);
                inner.transition(state, TaskStatus::Queued);
            }
        }
    }

    /// Every byte is already on disk: only the rename is left. The caller
    /// holds the task's reservation.
    async fn finalize_received(&self) {
        info!(
            "Task {} already holds all bytes, finalizing without a request",
            self.inner.id
        );
        let renamed =
            tokio::fs::rename(&self.inner.temp_path, &self.inner.destination_path).await;

        let mut state = self.inner.state.lock();
        match renamed {
            Ok(()) => self.inner.complete(&mut state),
            Err(e) => self.inner.fail(&mut state, DownloadError::from(e)),
        }
    }
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.inner.id)
            .field("source_uri", &self.inner.source_uri.as_str())
            .field("destination_path", &self.inner.destination_path)
            .field("status", &self.status())
            .finish()
    }
}

impl TaskInner {
    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn transition(&self, state: &mut TaskState, status: TaskStatus) {
        if state.status == status {
            return;
        }
        debug!("Task {}: {} -> {}", self.id, state.status, status);
        state.status = status;
        self.status_tx.send_replace(status);
        self.emit(TaskEvent::StatusChanged {
            id: self.id,
            status,
        });
    }

    fn complete(&self, state: &mut TaskState) {
        if state.status.is_terminal() {
            return;
        }
        state.pending = None;
        state.last_error = None;
        info!(
            "Download {} completed: {}",
            self.id,
            self.destination_path.display()
        );
        self.transition(state, TaskStatus::Completed);
        self.emit(TaskEvent::Completed { id: self.id });
    }

    fn fail(&self, state: &mut TaskState, error: DownloadError) {
        if state.status.is_terminal() {
            warn!("Task {} already {}, dropping error: {}", self.id, state.status, error);
            return;
        }
        let message = error.to_string();
        error!("Download {} failed: {}", self.id, message);
        state.last_error = Some(message.clone());
        self.transition(state, TaskStatus::Error);
        self.emit(TaskEvent::Error {
            id: self.id,
            message,
        });
    }

    /// Claim the task for an operation that awaits before launching.
    /// `None` if a session or another operation already owns it.
    fn reserve<'a>(&'a self, state: &mut TaskState) -> Option<Reservation<'a>> {
        if state.reserved || state.active.is_some() {
            return None;
        }
        state.reserved = true;
        state.reservation_revoked = false;
        self.busy.send_replace(true);
        Some(Reservation { task: self })
    }

    async fn wait_idle(&self) {
        let mut busy = self.busy.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    /// Remove the temp file and forget every received byte
    async fn discard_partial(&self) -> Result<(), DownloadError> {
        remove_if_exists(&self.temp_path).await?;
        let mut state = self.state.lock();
        state.bytes_downloaded = 0;
        state.last_reported = 0;
        Ok(())
    }

    /// Size of the temp file, removing it if it holds nothing
    async fn bytes_on_disk(&self) -> u64 {
        match tokio::fs::metadata(&self.temp_path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => {
                if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
                    warn!(
                        "Failed to remove empty temp file {}: {}",
                        self.temp_path.display(),
                        e
                    );
                }
                0
            }
            Err(_) => 0,
        }
    }

    fn spawn_session(self: &Arc<Self>, state: &mut TaskState, launch: Launch) {
        let offset = match launch {
            Launch::Fresh => {
                state.bytes_downloaded = 0;
                state.last_reported = 0;
                0
            }
            // Re-fetch the last buffer in case its write was torn
            Launch::Resume => state
                .bytes_downloaded
                .saturating_sub(state.buffer_size as u64),
        };

        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        state.active = Some(ActiveSession {
            generation,
            token: token.clone(),
        });
        state.pending = None;
        state.last_error = None;
        state.sampler.clear();

        let status = match launch {
            Launch::Fresh => TaskStatus::Starting,
            Launch::Resume => TaskStatus::Resuming,
        };
        self.transition(state, status);
        self.busy.send_replace(true);

        let plan = SessionPlan {
            url: self.source_uri.clone(),
            temp_path: self.temp_path.clone(),
            destination_path: self.destination_path.clone(),
            offset,
            buffer_size: state.buffer_size,
            validator: if offset > 0 {
                state.validator.clone()
            } else {
                Validator::default()
            },
        };
        info!(
            "Task {} session {} starting at offset {}",
            self.id, generation, offset
        );

        let session = TransferSession::new(self.client.clone(), plan, token);
        tokio::spawn(Arc::clone(self).drive(session, generation));
    }

    async fn drive(self: Arc<Self>, session: TransferSession, generation: u64) {
        let mut guard = SessionGuard {
            task: Arc::clone(&self),
            generation,
            armed: true,
        };

        let outcome = session.run(self.as_ref()).await;
        let on_disk = match outcome {
            SessionOutcome::Completed { .. } => 0,
            _ => self.bytes_on_disk().await,
        };

        guard.armed = false;
        self.coordinator.release(self.id);

        {
            let mut state = self.state.lock();
            if state.active.as_ref().map(|a| a.generation) == Some(generation) {
                state.active = None;
            }
            state.sampler.clear();

            match outcome {
                SessionOutcome::Completed { bytes } => {
                    state.bytes_downloaded = bytes;
                    state.total_length = Some(bytes);
                    self.complete(&mut state);
                }
                SessionOutcome::Cancelled => {
                    // The requester (pause/cancel/restart) owns the transition
                    state.bytes_downloaded = on_disk;
                }
                SessionOutcome::Failed(e) => {
                    state.bytes_downloaded = on_disk;
                    self.fail(&mut state, e);
                }
            }

            // A reservation taken meanwhile keeps the task busy
            if !state.reserved {
                self.busy.send_replace(false);
            }
        }
    }
}

impl TransferSink for TaskInner {
    fn on_headers(&self, meta: &ResponseMeta) {
        let mut state = self.state.lock();
        state.resumable = meta.is_resumable();
        // A validator is only useful when ranges can be requested
        state.validator = if meta.accepts_ranges {
            meta.validator.clone()
        } else {
            Validator::default()
        };
        match meta.total_length {
            Some(total) => state.total_length = Some(total),
            None if meta.start_offset == 0 => state.total_length = None,
            None => {}
        }
        self.transition(&mut state, TaskStatus::Downloading);
    }

    fn on_chunk(&self, len: u64, elapsed_ms: u64, downloaded: u64) {
        let mut state = self.state.lock();
        state.sampler.record(len, elapsed_ms);
        if downloaded > state.bytes_downloaded {
            state.bytes_downloaded = downloaded;
        }
    }

    fn on_progress(&self, _downloaded: u64, total: Option<u64>) {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Downloading
            || state.bytes_downloaded <= state.last_reported
        {
            return;
        }
        state.last_reported = state.bytes_downloaded;
        self.emit(TaskEvent::Progress {
            id: self.id,
            downloaded: state.bytes_downloaded,
            total,
            speed: state.sampler.current_rate(),
        });
    }
}

impl Admissible for TaskInner {
    fn id(&self) -> Uuid {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    fn promote(self: Arc<Self>) {
        let mut state = self.state.lock();
        if state.active.is_some() {
            // Already running on this slot
            return;
        }
        match state.pending.take() {
            Some(launch) if state.status == TaskStatus::Queued => {
                self.spawn_session(&mut state, launch);
            }
            _ => {
                // Paused or cancelled while being promoted: hand the slot back
                drop(state);
                warn!("Task {} no longer waiting, releasing its slot", self.id);
                self.coordinator.release(self.id);
            }
        }
    }

    fn abandon(self: Arc<Self>) {
        let mut state = self.state.lock();
        if state.status == TaskStatus::Queued {
            state.pending = None;
            self.transition(&mut state, TaskStatus::Paused);
        }
    }
}

/// Releases a reservation. Must be dropped with the state lock released.
struct Reservation<'a> {
    task: &'a TaskInner,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut state = self.task.state.lock();
        state.reserved = false;
        state.reservation_revoked = false;
        if state.active.is_none() {
            self.task.busy.send_replace(false);
        }
    }
}

/// Returns a session's slot and clears its bookkeeping if the session future
/// is dropped or panics before reporting an outcome
struct SessionGuard {
    task: Arc<TaskInner>,
    generation: u64,
    armed: bool,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let task = &self.task;
        error!("Session {} of task {} ended abnormally", self.generation, task.id);
        task.coordinator.release(task.id);
        {
            let mut state = task.state.lock();
            if state.active.as_ref().map(|a| a.generation) == Some(self.generation) {
                state.active = None;
                task.fail(
                    &mut state,
                    DownloadError::InvalidOperation("transfer aborted".to_string()),
                );
            }
            if !state.reserved {
                task.busy.send_replace(false);
            }
        }
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
