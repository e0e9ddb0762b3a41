use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { documents: usize },
    ThrottleWaited { duration: Duration },
    DocumentStarted { index: usize },
    DocumentFinished { index: usize, elements_written: usize },
    DocumentFailed { index: usize, message: String },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// A simple stderr logger for execution events.
#[derive(Debug, Default)]
pub struct StdErrExecutionObserver;

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        eprintln!("{event:?}");
    }
}

/// Real-time metrics for a batch run.
///
/// The engine updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    documents_started: AtomicU64,
    documents_finished: AtomicU64,
    documents_failed: AtomicU64,
    elements_written: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_documents: AtomicUsize,
    max_active_documents: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            documents_started: AtomicU64::new(0),
            documents_finished: AtomicU64::new(0),
            documents_failed: AtomicU64::new(0),
            elements_written: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_documents: AtomicUsize::new(0),
            max_active_documents: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.documents_started.store(0, Ordering::SeqCst);
        self.documents_finished.store(0, Ordering::SeqCst);
        self.documents_failed.store(0, Ordering::SeqCst);
        self.elements_written.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_documents.store(0, Ordering::SeqCst);
        self.max_active_documents.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_document_start(&self) {
        let _ = self.documents_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_documents.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_documents, now);
    }

    /// Record a finished document; `elements_written` is `None` for a failed one.
    pub fn on_document_end(&self, elements_written: Option<usize>) {
        let _ = self.documents_finished.fetch_add(1, Ordering::SeqCst);
        match elements_written {
            Some(n) => {
                let _ = self.elements_written.fetch_add(n as u64, Ordering::SeqCst);
            }
            None => {
                let _ = self.documents_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        let _ = self.active_documents.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let add = d.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns));

        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed,
            documents_started: self.documents_started.load(Ordering::SeqCst),
            documents_finished: self.documents_finished.load(Ordering::SeqCst),
            documents_failed: self.documents_failed.load(Ordering::SeqCst),
            elements_written: self.elements_written.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_documents: self.max_active_documents.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub documents_started: u64,
    pub documents_finished: u64,
    pub documents_failed: u64,
    pub elements_written: u64,
    pub throttle_wait: Duration,
    pub max_active_documents: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, documents={}/{}, failed={}, elements={}, max_active_documents={}, throttle_wait={:?}, elapsed={:?}",
            self.run_id,
            self.documents_finished,
            self.documents_started,
            self.documents_failed,
            self.elements_written,
            self.max_active_documents,
            self.throttle_wait,
            self.elapsed
        )
    }
}
