use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::MappingError;
use crate::mapping::EmitStats;
use crate::rules::RuleFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConversionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (conversion failed).
    Error,
    /// Critical error (typically I/O failures).
    Critical,
}

/// Context about a conversion attempt.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    /// JSON input document.
    pub input: PathBuf,
    /// Rule file.
    pub rules: PathBuf,
    /// Rule file format used.
    pub format: RuleFormat,
    /// XML output file.
    pub output: PathBuf,
}

/// Observer interface for conversion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait ConversionObserver: Send + Sync {
    /// Called when a conversion succeeds.
    fn on_success(&self, _ctx: &ConversionContext, _stats: EmitStats) {}

    /// Called when the mapping tree was built with errors or warnings, before emission.
    fn on_build_issues(&self, _ctx: &ConversionContext, _errors: usize, _warnings: usize) {}

    /// Called when a conversion fails.
    fn on_failure(&self, _ctx: &ConversionContext, _severity: ConversionSeverity, _error: &MappingError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ConversionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn ConversionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ConversionObserver for CompositeObserver {
    fn on_success(&self, ctx: &ConversionContext, stats: EmitStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_build_issues(&self, ctx: &ConversionContext, errors: usize, warnings: usize) {
        for o in &self.observers {
            o.on_build_issues(ctx, errors, warnings);
        }
    }

    fn on_failure(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs conversion events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl ConversionObserver for StdErrObserver {
    fn on_success(&self, ctx: &ConversionContext, stats: EmitStats) {
        eprintln!(
            "[convert][ok] input={} rules={} output={} elements={} skipped={}",
            ctx.input.display(),
            ctx.rules.display(),
            ctx.output.display(),
            stats.elements_written,
            stats.nodes_skipped
        );
    }

    fn on_build_issues(&self, ctx: &ConversionContext, errors: usize, warnings: usize) {
        eprintln!(
            "[convert][rules] rules={} format={:?} errors={errors} warnings={warnings}",
            ctx.rules.display(),
            ctx.format
        );
    }

    fn on_failure(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        eprintln!(
            "[convert][{:?}] input={} rules={} err={}",
            severity,
            ctx.input.display(),
            ctx.rules.display(),
            error
        );
    }

    fn on_alert(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        eprintln!(
            "[ALERT][convert][{:?}] input={} rules={} err={}",
            severity,
            ctx.input.display(),
            ctx.rules.display(),
            error
        );
    }
}

/// Forwards conversion events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ConversionObserver for TracingObserver {
    fn on_success(&self, ctx: &ConversionContext, stats: EmitStats) {
        tracing::info!(
            input = %ctx.input.display(),
            output = %ctx.output.display(),
            elements = stats.elements_written,
            skipped = stats.nodes_skipped,
            failed = stats.elements_failed,
            "conversion finished"
        );
    }

    fn on_build_issues(&self, ctx: &ConversionContext, errors: usize, warnings: usize) {
        tracing::warn!(rules = %ctx.rules.display(), errors, warnings, "mapping rules have issues");
    }

    fn on_failure(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        tracing::error!(input = %ctx.input.display(), ?severity, %error, "conversion failed");
    }
}

/// Appends conversion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl ConversionObserver for FileObserver {
    fn on_success(&self, ctx: &ConversionContext, stats: EmitStats) {
        self.append_line(&format!(
            "{} ok input={} output={} elements={}",
            unix_ts(),
            ctx.input.display(),
            ctx.output.display(),
            stats.elements_written
        ));
    }

    fn on_build_issues(&self, ctx: &ConversionContext, errors: usize, warnings: usize) {
        self.append_line(&format!(
            "{} rules rules={} errors={errors} warnings={warnings}",
            unix_ts(),
            ctx.rules.display()
        ));
    }

    fn on_failure(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        self.append_line(&format!(
            "{} fail severity={:?} input={} err={}",
            unix_ts(),
            severity,
            ctx.input.display(),
            error
        ));
    }

    fn on_alert(&self, ctx: &ConversionContext, severity: ConversionSeverity, error: &MappingError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} input={} err={}",
            unix_ts(),
            severity,
            ctx.input.display(),
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
