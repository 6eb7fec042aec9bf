use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Pending files
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PendingQueues {
    /// Launch arguments, set once before the UI exists.
    startup: VecDeque<PathBuf>,
    /// Files reported by OS open events after launch.
    runtime: VecDeque<PathBuf>,
    startup_set: bool,
}

/// Files waiting to be handed to the UI.
///
/// Reads are destructive: a drained path is never returned again. The lock
/// is only held to move paths in or out, never across I/O.
#[derive(Default)]
pub(crate) struct PendingFiles {
    inner: Mutex<PendingQueues>,
}

impl PendingFiles {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the startup batch.
    pub(crate) fn enqueue_startup(&self, paths: Vec<PathBuf>) {
        let mut queues = self.inner.lock();
        if queues.startup_set {
            tracing::warn!(
                replaced = queues.startup.len(),
                "Startup batch set more than once, replacing"
            );
        }
        queues.startup = paths.into();
        queues.startup_set = true;
    }

    pub(crate) fn enqueue_runtime(&self, path: PathBuf) {
        self.inner.lock().runtime.push_back(path);
    }

    /// Take everything: startup batch first, then runtime batch, each in
    /// insertion order.
    pub(crate) fn drain_all(&self) -> Vec<PathBuf> {
        let mut queues = self.inner.lock();
        let mut drained: Vec<PathBuf> = queues.startup.drain(..).collect();
        drained.extend(queues.runtime.drain(..));
        drained
    }

    /// Take only the earliest pending file.
    pub(crate) fn pop_front(&self) -> Option<PathBuf> {
        let mut queues = self.inner.lock();
        queues
            .startup
            .pop_front()
            .or_else(|| queues.runtime.pop_front())
    }

    pub(crate) fn len(&self) -> usize {
        let queues = self.inner.lock();
        queues.startup.len() + queues.runtime.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum ReadinessState {
    NotStarted,
    Initialized,
    Ready,
}

/// Lock-free startup flags. Every flag only ever goes from false to true.
#[derive(Default)]
pub(crate) struct Readiness {
    initialized: AtomicBool,
    ready: AtomicBool,
    first_claimed: AtomicBool,
}

impl Readiness {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            tracing::info!("UI marked ready");
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Claim the single first-priority delivery slot of this run.
    /// Returns true for exactly one caller.
    pub(crate) fn claim_first(&self) -> bool {
        !self.first_claimed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> ReadinessState {
        if self.is_ready() {
            ReadinessState::Ready
        } else if self.is_initialized() {
            ReadinessState::Initialized
        } else {
            ReadinessState::NotStarted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/mail/{n}"))).collect()
    }

    #[test]
    fn startup_then_drain_returns_batch_and_empties_store() {
        let store = PendingFiles::new();
        store.enqueue_startup(paths(&["a.msg", "b.eml", "c.msg"]));

        assert_eq!(store.drain_all(), paths(&["a.msg", "b.eml", "c.msg"]));
        assert!(store.is_empty());
        assert!(store.drain_all().is_empty());
    }

    #[test]
    fn drain_returns_startup_before_runtime() {
        let store = PendingFiles::new();
        store.enqueue_runtime(PathBuf::from("/mail/late.eml"));
        store.enqueue_startup(paths(&["a.msg"]));
        store.enqueue_runtime(PathBuf::from("/mail/later.msg"));

        assert_eq!(
            store.drain_all(),
            paths(&["a.msg", "late.eml", "later.msg"])
        );
    }

    #[test]
    fn second_startup_enqueue_replaces_batch() {
        let store = PendingFiles::new();
        store.enqueue_startup(paths(&["a.msg"]));
        store.enqueue_startup(paths(&["b.msg"]));
        assert_eq!(store.drain_all(), paths(&["b.msg"]));
    }

    #[test]
    fn pop_front_takes_earliest_file() {
        let store = PendingFiles::new();
        store.enqueue_startup(paths(&["a.msg", "b.msg"]));
        store.enqueue_runtime(PathBuf::from("/mail/c.msg"));

        assert_eq!(store.pop_front(), Some(PathBuf::from("/mail/a.msg")));
        assert_eq!(store.len(), 2);
        assert_eq!(store.drain_all(), paths(&["b.msg", "c.msg"]));
        assert_eq!(store.pop_front(), None);
    }

    #[test]
    fn concurrent_runtime_appends_are_not_lost() {
        let store = Arc::new(PendingFiles::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.enqueue_runtime(PathBuf::from(format!("/mail/{t}-{i}.msg")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut drained = store.drain_all();
        assert_eq!(drained.len(), 400);
        drained.sort();
        drained.dedup();
        assert_eq!(drained.len(), 400);
        assert!(store.is_empty());
    }

    #[test]
    fn per_thread_order_is_preserved() {
        let store = Arc::new(PendingFiles::new());
        let a = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..20 {
                    store.enqueue_runtime(PathBuf::from(format!("/a/{i:02}.msg")));
                }
            })
        };
        let b = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..20 {
                    store.enqueue_runtime(PathBuf::from(format!("/b/{i:02}.msg")));
                }
            })
        };
        a.join().unwrap();
        b.join().unwrap();

        let drained = store.drain_all();
        let from_a: Vec<_> = drained.iter().filter(|p| p.starts_with("/a")).collect();
        let mut sorted = from_a.clone();
        sorted.sort();
        assert_eq!(from_a, sorted);
    }

    #[test]
    fn readiness_starts_not_started() {
        let r = Readiness::new();
        assert_eq!(r.state(), ReadinessState::NotStarted);
        assert!(!r.is_ready());
        assert!(!r.is_initialized());
    }

    #[test]
    fn ready_is_idempotent_and_never_downgraded() {
        let r = Readiness::new();
        r.mark_ready();
        r.mark_ready();
        assert!(r.is_ready());
        r.mark_initialized();
        r.mark_initialized();
        assert!(r.is_ready());
        assert_eq!(r.state(), ReadinessState::Ready);
    }

    #[test]
    fn initialized_before_ready() {
        let r = Readiness::new();
        r.mark_initialized();
        assert_eq!(r.state(), ReadinessState::Initialized);
        r.mark_ready();
        assert_eq!(r.state(), ReadinessState::Ready);
    }

    #[test]
    fn first_slot_is_claimed_once_across_threads() {
        let r = Arc::new(Readiness::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let r = r.clone();
                std::thread::spawn(move || r.claim_first())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(!r.claim_first());
    }
}
