//! Startup file-dispatch coordinator.
//!
//! Owns the pending store and the readiness flags, and decides when a file
//! moves from "the OS asked us to open it" to "the UI has it". Launch
//! arguments, OS open events, the single-instance relaunch callback and the
//! UI commands all go through one shared `DispatchCoordinator`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tauri::State;

use crate::config::DeliveryConfig;
use crate::delivery::{self, DeliveryBatch, DeliveryPriority, LoadedFile, RetryPolicy, UiSurface};
use crate::error::{AppError, AppResult};
use crate::launch;
use crate::state::{PendingFiles, Readiness, ReadinessState};

// ---------------------------------------------------------------------------
// Scheduled delivery tasks
// ---------------------------------------------------------------------------

/// Something that can be cancelled. Implemented for the async runtime's join handle.
pub(crate) trait AbortHandle: Send {
    fn abort(&self);
    fn is_finished(&self) -> bool;
}

impl AbortHandle for tauri::async_runtime::JoinHandle<()> {
    fn abort(&self) {
        tauri::async_runtime::JoinHandle::abort(self);
    }

    fn is_finished(&self) -> bool {
        self.inner().is_finished()
    }
}

/// Delayed deliveries, grouped by the window they target so they can be
/// dropped together when that window goes away.
#[derive(Default)]
pub(crate) struct DeliveryTasks {
    by_window: Mutex<HashMap<String, Vec<Box<dyn AbortHandle>>>>,
}

impl DeliveryTasks {
    /// Track `handle`, dropping handles of tasks that already completed.
    pub(crate) fn track(&self, window: &str, handle: Box<dyn AbortHandle>) {
        let mut by_window = self.by_window.lock();
        by_window.retain(|_, handles| {
            handles.retain(|h| !h.is_finished());
            !handles.is_empty()
        });
        by_window
            .entry(window.to_string())
            .or_default()
            .push(handle);
    }


    /// Abort every task scheduled for `window`. Returns how many were aborted.
    pub(crate) fn cancel_window(&self, window: &str) -> usize {
        let handles = self.by_window.lock().remove(window).unwrap_or_default();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub(crate) struct DispatchCoordinator {
    pending: PendingFiles,
    readiness: Readiness,
    config: DeliveryConfig,
    next_delivery_id: AtomicU64,
    tasks: DeliveryTasks,
}

/// Reply to the UI's readiness handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FrontendReadyAck {
    pub initialized: bool,
    pub delivered: usize,
}

impl DispatchCoordinator {
    pub(crate) fn new(config: DeliveryConfig) -> Self {
        Self {
            pending: PendingFiles::new(),
            readiness: Readiness::new(),
            config,
            next_delivery_id: AtomicU64::new(1),
            tasks: DeliveryTasks::default(),
        }
    }

    pub(crate) fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub(crate) fn readiness_state(&self) -> ReadinessState {
        self.readiness.state()
    }

    pub(crate) fn mark_initialized(&self) {
        self.readiness.mark_initialized();
    }

    pub(crate) fn mark_ready(&self) {
        self.readiness.mark_ready();
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Record the files passed on the command line.
    pub(crate) fn enqueue_startup(&self, paths: Vec<PathBuf>) {
        tracing::info!(count = paths.len(), "Startup files queued");
        self.pending.enqueue_startup(paths);
    }

    /// Mark the process initialized, push the earliest file straight away and
    /// mark ready. Returns how many files are still pending for the follow-up.
    pub(crate) fn begin_startup(&self, surface: &dyn UiSurface) -> usize {
        self.readiness.mark_initialized();
        if let Some(first) = self.pending.pop_front() {
            self.deliver_paths(surface, vec![first]);
        }
        self.readiness.mark_ready();
        self.pending_count()
    }

    /// Startup without a window to deliver into: files stay queued for
    /// `get_pending_files` or the handshake.
    pub(crate) fn begin_headless(&self) {
        self.readiness.mark_initialized();
        tracing::warn!(
            pending = self.pending.len(),
            "Main window missing at startup, files stay queued"
        );
    }

    /// Deliver everything still pending.
    pub(crate) fn dispatch_pending(&self, surface: &dyn UiSurface) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        self.deliver_paths(surface, self.pending.drain_all())
    }

    /// Readiness handshake from the UI, by command or event. The inbox is
    /// resumed even when nothing is pending here: it may still hold files
    /// it gave up polling for.
    pub(crate) fn handshake(&self, surface: &dyn UiSurface) -> FrontendReadyAck {
        self.readiness.mark_ready();
        let delivered = self.dispatch_pending(surface);
        delivery::resume_inbox(surface, &self.config.first_retry);
        FrontendReadyAck {
            initialized: self.readiness.is_initialized(),
            delivered,
        }
    }

    /// Files reported by the OS after launch. Delivered at once when the UI
    /// is ready and a window is available, otherwise left queued.
    pub(crate) fn accept_runtime_paths(
        &self,
        paths: Vec<PathBuf>,
        surface: Option<&dyn UiSurface>,
    ) -> usize {
        if paths.is_empty() {
            return 0;
        }
        for path in paths {
            tracing::info!(path = %path.display(), "File open requested");
            self.pending.enqueue_runtime(path);
        }
        match surface {
            Some(surface) if self.readiness.is_ready() => self.dispatch_pending(surface),
            _ => 0,
        }
    }

    /// Destructive pull for the UI's polling fallback.
    pub(crate) fn take_pending(&self) -> Vec<String> {
        self.pending
            .drain_all()
            .iter()
            .map(|p| launch::path_to_string(p))
            .collect()
    }

    /// Load and push `paths` in order. Unloadable files are logged and skipped.
    pub(crate) fn deliver_paths(&self, surface: &dyn UiSurface, paths: Vec<PathBuf>) -> usize {
        let loaded: Vec<LoadedFile> = paths
            .iter()
            .filter_map(|path| match delivery::load_file(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!(path = %path.display(), kind = e.kind(), "Skipping file: {e}");
                    None
                }
            })
            .collect();
        self.deliver_loaded(surface, loaded, false)
    }

    /// `show_all` renders every item at once, whether or not it won the
    /// `First` slot.
    fn deliver_loaded(
        &self,
        surface: &dyn UiSurface,
        files: Vec<LoadedFile>,
        show_all: bool,
    ) -> usize {
        if files.is_empty() {
            return 0;
        }
        let items: Vec<_> = files
            .into_iter()
            .map(|file| {
                let priority = if self.readiness.claim_first() {
                    DeliveryPriority::First
                } else {
                    DeliveryPriority::Subsequent
                };
                let id = self.next_delivery_id.fetch_add(1, Ordering::SeqCst);
                let mut payload = file.into_payload(id, priority);
                payload.show_immediately |= show_all;
                payload
            })
            .collect();

        let urgent = items.iter().any(|i| i.show_immediately);
        let retry = RetryPolicy::for_priority(
            if urgent { DeliveryPriority::First } else { DeliveryPriority::Subsequent },
            self.config.first_retry,
            self.config.subsequent_retry,
        );

        let batch = DeliveryBatch { items, retry };
        delivery::push_batch(surface, &batch);
        batch.items.len()
    }

    /// Open one file outside the startup flow and show it. Errors go back to the caller.
    pub(crate) fn direct_open(
        &self,
        surface: &dyn UiSurface,
        raw: &str,
        cwd: &Path,
    ) -> AppResult<usize> {
        let path = launch::resolve_open_path(raw, cwd).ok_or_else(|| AppError::NotFound {
            path: PathBuf::from(raw),
        })?;
        let file = delivery::load_file(&path)?;
        Ok(self.deliver_loaded(surface, vec![file], true))
    }

    /// Push the rest of the startup batch after the configured delay.
    pub(crate) fn schedule_followup<R: tauri::Runtime>(
        self: &Arc<Self>,
        window: tauri::WebviewWindow<R>,
    ) {
        let delay = std::time::Duration::from_millis(self.config.startup_followup_delay_ms);
        let label = window.label().to_string();
        let coordinator = Arc::clone(self);
        let handle = tauri::async_runtime::spawn(async move {
            tokio::time::sleep(delay).await;
            let delivered = coordinator.dispatch_pending(&window);
            tracing::debug!(delivered, "Startup follow-up delivery done");
        });
        self.tasks.track(&label, Box::new(handle));
    }

    /// Drop scheduled deliveries for a destroyed window. Their files stay pending.
    pub(crate) fn cancel_window(&self, window: &str) {
        let aborted = self.tasks.cancel_window(window);
        if aborted > 0 {
            tracing::info!(window, aborted, "Cancelled scheduled deliveries");
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tauri::command]
pub(crate) fn get_pending_files(state: State<'_, Arc<DispatchCoordinator>>) -> Vec<String> {
    state.take_pending()
}

#[tauri::command]
pub(crate) fn is_initialized(state: State<'_, Arc<DispatchCoordinator>>) -> bool {
    state.readiness_state() != ReadinessState::NotStarted
}

#[tauri::command]
pub(crate) fn frontend_ready(
    window: tauri::WebviewWindow,
    state: State<'_, Arc<DispatchCoordinator>>,
) -> FrontendReadyAck {
    state.handshake(&window)
}

#[tauri::command]
pub(crate) fn direct_open_file(
    window: tauri::WebviewWindow,
    state: State<'_, Arc<DispatchCoordinator>>,
    path: String,
) -> AppResult<usize> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    state.direct_open(&window, &path, &cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::tests::RecordingSurface;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn coordinator() -> DispatchCoordinator {
        DispatchCoordinator::new(DeliveryConfig::default())
    }

    fn items(surface: &RecordingSurface) -> Vec<serde_json::Value> {
        surface
            .events
            .lock()
            .iter()
            .flat_map(|(_, batch)| batch["items"].as_array().cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    fn single_report_is_delivered_first_and_rendered() {
        let dir = TempDir::new().unwrap();
        write(&dir, "report.msg", b"0123456789");
        let args = vec!["report.msg".to_string()];
        let resolved = launch::resolve_launch_args(&args, dir.path());
        assert_eq!(resolved.len(), 1);

        let c = coordinator();
        c.enqueue_startup(resolved);
        let surface = RecordingSurface::default();
        let remaining = c.begin_startup(&surface);

        assert_eq!(remaining, 0);
        let delivered = items(&surface);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["fileName"], "report.msg");
        assert_eq!(delivered[0]["byteLength"], 10);
        assert_eq!(delivered[0]["dataBase64"].as_str().unwrap().len(), 16);
        assert_eq!(delivered[0]["priority"], "first");
        assert_eq!(surface.scripts.lock().len(), 1);
        assert_eq!(c.readiness_state(), ReadinessState::Ready);
    }

    #[test]
    fn zero_args_still_reach_ready_without_delivery() {
        let c = coordinator();
        c.enqueue_startup(vec![]);
        let surface = RecordingSurface::default();
        assert_eq!(c.begin_startup(&surface), 0);
        assert!(surface.events.lock().is_empty());
        assert!(surface.scripts.lock().is_empty());
        assert_eq!(c.readiness_state(), ReadinessState::Ready);
    }

    #[test]
    fn remaining_startup_files_follow_as_subsequent() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.msg", b"a");
        let b = write(&dir, "b.eml", b"b");
        let d = write(&dir, "d.msg", b"d");

        let c = coordinator();
        c.enqueue_startup(vec![a, b, d]);
        let surface = RecordingSurface::default();
        assert_eq!(c.begin_startup(&surface), 2);
        assert_eq!(c.dispatch_pending(&surface), 2);

        let delivered = items(&surface);
        let names: Vec<_> = delivered.iter().map(|i| i["fileName"].clone()).collect();
        assert_eq!(names, ["a.msg", "b.eml", "d.msg"]);
        let ids: Vec<_> = delivered.iter().map(|i| i["deliveryId"].as_u64().unwrap()).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(delivered[0]["showImmediately"], true);
        assert_eq!(delivered[1]["showImmediately"], false);
        assert_eq!(delivered[2]["showImmediately"], false);

        let events = surface.events.lock();
        assert_eq!(events[0].1["retry"]["maxAttempts"], RetryPolicy::FIRST.max_attempts);
        assert_eq!(events[1].1["retry"]["maxAttempts"], RetryPolicy::SUBSEQUENT.max_attempts);
    }

    #[test]
    fn unreadable_first_file_passes_priority_to_next() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("missing.msg");
        let good = write(&dir, "good.eml", b"x");

        let c = coordinator();
        c.enqueue_startup(vec![bad, good]);
        let surface = RecordingSurface::default();
        c.begin_startup(&surface);
        assert!(surface.events.lock().is_empty());

        c.dispatch_pending(&surface);
        let delivered = items(&surface);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["priority"], "first");
    }

    #[test]
    fn unsupported_file_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let txt = write(&dir, "notes.txt", b"x");
        let msg = write(&dir, "mail.msg", b"x");

        let c = coordinator();
        let surface = RecordingSurface::default();
        assert_eq!(c.deliver_paths(&surface, vec![txt, msg]), 1);
        assert_eq!(items(&surface)[0]["fileName"], "mail.msg");
    }

    #[test]
    fn runtime_paths_wait_until_ready() {
        let dir = TempDir::new().unwrap();
        let late = write(&dir, "late.msg", b"x");

        let c = coordinator();
        let surface = RecordingSurface::default();
        assert_eq!(c.accept_runtime_paths(vec![late], Some(&surface)), 0);
        assert_eq!(c.pending_count(), 1);

        let ack = c.handshake(&surface);
        assert_eq!(ack, FrontendReadyAck { initialized: false, delivered: 1 });
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn runtime_paths_go_out_immediately_once_ready() {
        let dir = TempDir::new().unwrap();
        let late = write(&dir, "late.eml", b"x");

        let c = coordinator();
        let surface = RecordingSurface::default();
        c.begin_startup(&surface);
        assert_eq!(c.accept_runtime_paths(vec![late], Some(&surface)), 1);
        assert_eq!(items(&surface)[0]["priority"], "first");
    }

    #[test]
    fn runtime_paths_without_window_stay_queued() {
        let dir = TempDir::new().unwrap();
        let late = write(&dir, "late.eml", b"x");

        let c = coordinator();
        c.mark_ready();
        assert_eq!(c.accept_runtime_paths(vec![late.clone()], None), 0);
        assert_eq!(c.take_pending(), vec![launch::path_to_string(&late)]);
        assert!(c.take_pending().is_empty());
    }

    #[test]
    fn pull_and_push_never_deliver_the_same_file_twice() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.msg", b"a");
        let b = write(&dir, "b.msg", b"b");

        let c = coordinator();
        c.enqueue_startup(vec![a, b.clone()]);
        let surface = RecordingSurface::default();
        c.begin_startup(&surface);

        assert_eq!(c.take_pending(), vec![launch::path_to_string(&b)]);
        assert_eq!(c.dispatch_pending(&surface), 0);
        assert_eq!(items(&surface).len(), 1);
    }

    #[test]
    fn headless_start_keeps_files_for_the_handshake() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.msg", b"a");

        let c = coordinator();
        c.enqueue_startup(vec![a]);
        c.begin_headless();
        assert_eq!(c.readiness_state(), ReadinessState::Initialized);

        let surface = RecordingSurface::default();
        let ack = c.handshake(&surface);
        assert_eq!(ack, FrontendReadyAck { initialized: true, delivered: 1 });
    }

    #[test]
    fn direct_open_resolves_and_reports_missing_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "direct.msg", b"x");

        let c = coordinator();
        let surface = RecordingSurface::default();
        assert_eq!(c.direct_open(&surface, "direct.msg", dir.path()).unwrap(), 1);
        assert_eq!(items(&surface)[0]["priority"], "first");
        assert_eq!(items(&surface)[0]["showImmediately"], true);

        let err = c.direct_open(&surface, "nope.msg", dir.path()).unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn direct_open_after_startup_is_still_shown() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.msg", b"a");
        write(&dir, "b.msg", b"b");

        let c = coordinator();
        c.enqueue_startup(vec![a]);
        let surface = RecordingSurface::default();
        c.begin_startup(&surface);
        assert_eq!(c.direct_open(&surface, "b.msg", dir.path()).unwrap(), 1);

        let delivered = items(&surface);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[1]["fileName"], "b.msg");
        assert_eq!(delivered[1]["priority"], "subsequent");
        assert_eq!(delivered[1]["showImmediately"], true);
        let events = surface.events.lock();
        assert_eq!(events[1].1["retry"]["maxAttempts"], RetryPolicy::FIRST.max_attempts);
    }

    #[test]
    fn handshake_resumes_inbox_even_with_nothing_pending() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.msg", b"a");

        let c = coordinator();
        c.enqueue_startup(vec![a]);
        let surface = RecordingSurface::default();
        c.begin_startup(&surface);
        assert_eq!(c.pending_count(), 0);
        assert_eq!(surface.scripts.lock().len(), 1);

        let ack = c.handshake(&surface);
        assert_eq!(ack.delivered, 0);
        assert_eq!(surface.events.lock().len(), 1);
        let scripts = surface.scripts.lock();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[1].contains("inbox.resume("));
    }

    struct FlagHandle {
        aborted: Arc<AtomicBool>,
        finished: bool,
    }

    impl FlagHandle {
        fn running(aborted: Arc<AtomicBool>) -> Box<Self> {
            Box::new(Self { aborted, finished: false })
        }
    }

    impl AbortHandle for FlagHandle {
        fn abort(&self) {
            self.aborted.store(true, Ordering::SeqCst);
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    #[test]
    fn finished_handles_are_pruned_on_track() {
        let tasks = DeliveryTasks::default();
        let flag = Arc::new(AtomicBool::new(false));
        for _ in 0..3 {
            tasks.track(
                "main",
                Box::new(FlagHandle { aborted: flag.clone(), finished: true }),
            );
        }
        tasks.track("main", FlagHandle::running(flag.clone()));
        tasks.track("main", FlagHandle::running(flag.clone()));

        assert_eq!(tasks.cancel_window("main"), 2);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_window_aborts_only_that_window() {
        let tasks = DeliveryTasks::default();
        let main = Arc::new(AtomicBool::new(false));
        let other = Arc::new(AtomicBool::new(false));
        tasks.track("main", FlagHandle::running(main.clone()));
        tasks.track("main", FlagHandle::running(main.clone()));
        tasks.track("other", FlagHandle::running(other.clone()));

        assert_eq!(tasks.cancel_window("main"), 2);
        assert!(main.load(Ordering::SeqCst));
        assert!(!other.load(Ordering::SeqCst));
        assert_eq!(tasks.cancel_window("main"), 0);
        assert_eq!(tasks.cancel_window("other"), 1);
        assert!(other.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn aborted_followup_never_runs_and_files_stay_pending() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.msg", b"a");

        let c = Arc::new(coordinator());
        c.enqueue_startup(vec![a]);
        let ran = Arc::new(AtomicBool::new(false));

        let handle = {
            let c = c.clone();
            let ran = ran.clone();
            tauri::async_runtime::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                ran.store(true, Ordering::SeqCst);
                c.take_pending();
            })
        };
        c.tasks.track("main", Box::new(handle));
        c.cancel_window("main");

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(c.pending_count(), 1);
    }
}
