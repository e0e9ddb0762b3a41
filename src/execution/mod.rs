//! Execution engine for converting many documents with configurable parallelism.
//!
//! This module sits "above" [`crate::convert`] and provides:
//!
//! - Parallel conversion of document batches against one shared [`MappingTree`]
//! - Resource limits / throttling (in-flight documents)
//! - Real-time metrics + observer hooks for monitoring

mod observer;
mod semaphore;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use serde_json::Value;
use tracing::warn;
use walkdir::WalkDir;

use crate::convert::json::load_document_from_path;
use crate::convert::{write_xml, ConvertOptions};
use crate::error::{MappingError, MappingResult};
use crate::mapping::EmitStats;
use crate::types::MappingTree;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, StdErrExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on documents converted at the same time.
    ///
    /// This is an additional throttle on top of `num_threads`; each in-flight document holds its
    /// parsed JSON and output buffer in memory.
    pub max_in_flight_documents: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_documents: n.max(1),
        }
    }
}

/// Result of converting one file in [`ExecutionEngine::convert_directory`].
#[derive(Debug)]
pub struct DocumentOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: MappingResult<EmitStats>,
}

/// A configurable engine for converting document batches in parallel.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// Fails with [`MappingError::Input`] if `max_in_flight_documents == 0`,
    /// `num_threads == Some(0)`, or the worker pool cannot be started.
    pub fn new(opts: ExecutionOptions) -> MappingResult<Self> {
        if opts.max_in_flight_documents == 0 {
            return Err(MappingError::Input {
                message: "max_in_flight_documents must be > 0".to_string(),
            });
        }
        if opts.num_threads == Some(0) {
            return Err(MappingError::Input {
                message: "num_threads must be > 0 when set".to_string(),
            });
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("json-xml-worker-{i}"))
            .build()
            .map_err(|e| MappingError::Input {
                message: format!("failed to build worker pool: {e}"),
            })?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Convert each document to an XML string.
    ///
    /// Results are returned in input order. A failing document does not stop the others.
    pub fn convert_documents(
        &self,
        tree: &MappingTree,
        documents: &[Value],
        options: &ConvertOptions,
    ) -> Vec<MappingResult<String>> {
        let jobs = documents.iter().collect::<Vec<_>>();
        self.run_batch(jobs, |doc| {
            let mut out = Vec::new();
            let stats = write_xml(doc, tree, &mut out, options)?;
            let xml = String::from_utf8(out).map_err(|e| MappingError::Xml { message: e.to_string() })?;
            Ok((xml, stats))
        })
    }

    /// Convert every `*.json` file under `input_dir` into a matching `*.xml` under `output_dir`.
    ///
    /// The relative directory layout is preserved. Outcomes are sorted by input path. Walking
    /// `input_dir` or creating `output_dir` fails the whole call; per-file failures are reported
    /// in each [`DocumentOutcome`].
    pub fn convert_directory(
        &self,
        tree: &MappingTree,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        options: &ConvertOptions,
    ) -> MappingResult<Vec<DocumentOutcome>> {
        let input_dir = input_dir.as_ref();
        let output_dir = output_dir.as_ref();

        let mut jobs = Vec::new();
        for entry in WalkDir::new(input_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| MappingError::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !has_json_extension(path) {
                continue;
            }
            let relative = path.strip_prefix(input_dir).unwrap_or(path);
            let output = output_dir.join(relative).with_extension("xml");
            jobs.push((path.to_path_buf(), output));
        }
        fs::create_dir_all(output_dir)?;

        let paths = jobs.clone();
        let results = self.run_batch(jobs, |(input, output)| {
            let stats = convert_file(tree, &input, &output, options)?;
            Ok((stats, stats))
        });

        Ok(paths
            .into_iter()
            .zip(results)
            .map(|((input, output), result)| DocumentOutcome { input, output, result })
            .collect())
    }

    fn run_batch<J, R, F>(&self, jobs: Vec<J>, work: F) -> Vec<MappingResult<R>>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> MappingResult<(R, EmitStats)> + Send + Sync,
    {
        self.pool.install(|| self.run_batch_impl(jobs, &work))
    }

    fn run_batch_impl<J, R, F>(&self, jobs: Vec<J>, work: &F) -> Vec<MappingResult<R>>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> MappingResult<(R, EmitStats)> + Send + Sync,
    {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted { documents: jobs.len() });

        let sem = Semaphore::new(self.opts.max_in_flight_documents);

        let results: Vec<MappingResult<R>> = jobs
            .into_par_iter()
            .enumerate()
            .map(|(index, job)| {
                let waited = sem.acquire();
                if waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(waited);
                    self.emit(ExecutionEvent::ThrottleWaited { duration: waited });
                }

                self.metrics.on_document_start();
                self.emit(ExecutionEvent::DocumentStarted { index });

                let out = match work(job) {
                    Ok((value, stats)) => {
                        self.emit(ExecutionEvent::DocumentFinished {
                            index,
                            elements_written: stats.elements_written,
                        });
                        self.metrics.on_document_end(Some(stats.elements_written));
                        Ok(value)
                    }
                    Err(e) => {
                        self.emit(ExecutionEvent::DocumentFailed {
                            index,
                            message: e.to_string(),
                        });
                        self.metrics.on_document_end(None);
                        Err(e)
                    }
                };
                sem.release();
                out
            })
            .collect();

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });

        results
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn convert_file(tree: &MappingTree, input: &Path, output: &Path, options: &ConvertOptions) -> MappingResult<EmitStats> {
    let root = load_document_from_path(input)?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(output)?;
    write_xml(&root, tree, BufWriter::new(file), options).inspect_err(|_| {
        if let Err(e) = fs::remove_file(output) {
            warn!(output = %output.display(), error = %e, "could not remove partial output");
        }
    })
}
