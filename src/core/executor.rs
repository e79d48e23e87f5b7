//! Three-phase processing orchestrator.
//!
//! Phase 1 (analyze, single-threaded) resolves every input to a processor,
//! extracting containers recursively and scheduling recompressible leaves.
//! Phase 2 (process, parallel) runs the scheduled leaves on the worker
//! pool. Phase 3 (finalize, single-threaded) drains the container stack in
//! LIFO order so children are rebuilt and committed before their parents.
//!
//! The orchestrator owns the finalize stack and the work list; the phases
//! never overlap, so neither needs a lock. All progress is published on
//! the event bus; exactly one terminal event is published per analyzed
//! path.

use crate::config::Settings;
use crate::core::bus::EventBus;
use crate::core::containers::{handler_for, ContainerJob, FinalizeContext};
use crate::core::events::*;
use crate::core::fs_util::{commit_if_smaller, file_size, leaf_tmp_path, CommitOutcome};
use crate::core::mime::{dot_extension, MimeDetector};
use crate::core::parallel::{Task, TaskResult, WorkerPool};
use crate::core::registry::{Processor, ProcessorRegistry, RecompressOptions};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct WorkItem {
    path: PathBuf,
    origin: Option<PathBuf>,
}

/// Orchestrates the analysis, processing, and finalization of files.
pub struct ProcessorExecutor {
    registry: Arc<ProcessorRegistry>,
    settings: Settings,
    bus: Arc<EventBus>,
    stop: Arc<AtomicBool>,
    work_list: Vec<WorkItem>,
    finalize_stack: Vec<ContainerJob>,
}

impl ProcessorExecutor {
    pub fn new(registry: Arc<ProcessorRegistry>, settings: Settings, bus: Arc<EventBus>) -> Self {
        Self::with_stop_flag(registry, settings, bus, Arc::new(AtomicBool::new(false)))
    }

    /// Build an executor observing an external cooperative stop flag,
    /// checked between phases and at the start of each worker task.
    pub fn with_stop_flag(
        registry: Arc<ProcessorRegistry>,
        settings: Settings,
        bus: Arc<EventBus>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            settings,
            bus,
            stop,
            work_list: Vec::new(),
            finalize_stack: Vec::new(),
        }
    }

    /// Entry point: run all three phases over the input list.
    pub async fn process(&mut self, inputs: &[PathBuf]) {
        for path in inputs {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            self.analyze_path(path, None);
        }

        if !self.stop.load(Ordering::SeqCst) {
            self.process_work_list().await;
        }

        if self.stop.load(Ordering::SeqCst) {
            log::warn!(target: "executor", "stop requested, skipping container finalization");
            // dropping the stack releases every scratch directory
            self.finalize_stack.clear();
            return;
        }
        self.finalize_containers();
    }

    /// Phase 1: recursively analyze files and containers.
    fn analyze_path(&mut self, path: &Path, origin: Option<PathBuf>) {
        self.bus.publish(&FileAnalyzeStartEvent {
            path: path.to_path_buf(),
        });

        let mime = MimeDetector::detect(path);
        let processor = self
            .registry
            .find_by_mime(&mime)
            .or_else(|| self.registry.find_by_extension(&dot_extension(path)));

        let Some(processor) = processor else {
            log::warn!(target: "executor", "no processor for {}", path.display());
            self.bus.publish(&FileAnalyzeSkippedEvent {
                path: path.to_path_buf(),
                reason: "Unsupported format".to_string(),
            });
            return;
        };

        if processor.can_extract() {
            match processor.prepare(path) {
                Ok(job) => {
                    let mut leaves = Vec::new();
                    job.collect_leaves(&mut leaves);
                    self.finalize_stack.push(job);
                    for (leaf, parent) in leaves {
                        self.analyze_path(&leaf, Some(parent));
                    }
                    self.bus.publish(&FileAnalyzeCompleteEvent {
                        path: path.to_path_buf(),
                        extracted: true,
                        scheduled: false,
                    });
                }
                Err(e) => {
                    log::error!(
                        target: "executor",
                        "prepare failed for {}: {}",
                        path.display(),
                        e
                    );
                    self.bus.publish(&FileAnalyzeErrorEvent {
                        path: path.to_path_buf(),
                        error_message: e.to_string(),
                    });
                }
            }
        } else if processor.can_recompress() {
            self.work_list.push(WorkItem {
                path: path.to_path_buf(),
                origin,
            });
            self.bus.publish(&FileAnalyzeCompleteEvent {
                path: path.to_path_buf(),
                extracted: false,
                scheduled: true,
            });
        } else {
            log::debug!(target: "executor", "file ignored: {}", path.display());
            self.bus.publish(&FileAnalyzeSkippedEvent {
                path: path.to_path_buf(),
                reason: "No operations available".to_string(),
            });
        }
    }

    /// Phase 2: recompress scheduled leaves on the worker pool.
    async fn process_work_list(&mut self) {
        let pool = WorkerPool::new(self.settings.num_threads);
        for item in self.work_list.drain(..) {
            let task = FileProcessTask {
                path: item.path,
                origin: item.origin,
                registry: Arc::clone(&self.registry),
                bus: Arc::clone(&self.bus),
                options: self.settings.recompress_options(),
                dry_run: self.settings.dry_run,
                stop: Arc::clone(&self.stop),
            };
            if let Err(e) = pool.submit(Box::new(task)) {
                log::error!(target: "executor", "task submission failed: {}", e);
            }
        }
        pool.wait_idle().await;
    }

    /// Phase 3: drain the LIFO stack; children finalize before parents.
    fn finalize_containers(&mut self) {
        while let Some(job) = self.finalize_stack.pop() {
            self.bus.publish(&ContainerFinalizeStartEvent {
                path: job.original_path.clone(),
            });

            let size_before = file_size(&job.original_path);
            let processor = self.resolve_finalizer(&job);
            let ctx = FinalizeContext {
                settings: &self.settings,
                bus: &self.bus,
            };

            match processor.finalize(&job, &ctx) {
                Ok(()) => {
                    self.bus.publish(&ContainerFinalizeCompleteEvent {
                        path: job.original_path.clone(),
                        format: job.format,
                        original_size: size_before,
                        final_size: file_size(&job.original_path),
                    });
                }
                Err(e) => {
                    log::error!(
                        target: "executor",
                        "finalize error: {} - {}",
                        job.original_path.display(),
                        e
                    );
                    self.bus.publish(&ContainerFinalizeErrorEvent {
                        path: job.original_path.clone(),
                        error_message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Registry resolution keeps per-instance handler state (the PDF
    /// processor) alive between prepare and finalize; the format-based
    /// factory is the fallback.
    fn resolve_finalizer(&self, job: &ContainerJob) -> Arc<dyn Processor> {
        self.registry
            .find_by_extension(&dot_extension(&job.original_path))
            .or_else(|| {
                let mime = MimeDetector::detect(&job.original_path);
                self.registry.find_by_mime(&mime)
            })
            .filter(|p| p.can_extract())
            .unwrap_or_else(|| handler_for(job.format))
    }
}

/// Phase-2 unit of work: recompress one leaf and apply the commit rule.
struct FileProcessTask {
    path: PathBuf,
    origin: Option<PathBuf>,
    registry: Arc<ProcessorRegistry>,
    bus: Arc<EventBus>,
    options: RecompressOptions,
    dry_run: bool,
    stop: Arc<AtomicBool>,
}

#[async_trait]
impl Task for FileProcessTask {
    async fn execute(&self) -> TaskResult {
        if self.stop.load(Ordering::SeqCst) {
            self.bus.publish(&FileProcessSkippedEvent {
                path: self.path.clone(),
                reason: "Interrupted".to_string(),
                container_origin: self.origin.clone(),
            });
            return TaskResult::Skipped("interrupted".into());
        }

        self.bus.publish(&FileProcessStartEvent {
            path: self.path.clone(),
        });

        // Phase 2 resolves extension-first: the file is already known to be
        // a recompressible leaf, and the extension lookup avoids re-reading
        // the file
        let processor = self
            .registry
            .find_by_extension(&dot_extension(&self.path))
            .or_else(|| {
                let mime = MimeDetector::detect(&self.path);
                self.registry.find_by_mime(&mime)
            });
        let Some(processor) = processor else {
            log::warn!(target: "executor", "no processor for {}", self.path.display());
            self.bus.publish(&FileProcessSkippedEvent {
                path: self.path.clone(),
                reason: "Unsupported format".to_string(),
                container_origin: self.origin.clone(),
            });
            return TaskResult::Skipped("unsupported".into());
        };

        let tmp = leaf_tmp_path(&self.path);
        let started = Instant::now();

        let path = self.path.clone();
        let tmp_for_codec = tmp.clone();
        let options = self.options.clone();
        let joined = tokio::task::spawn_blocking(move || {
            processor.recompress(&path, &tmp_for_codec, &options)
        })
        .await;

        let codecs = match joined {
            Ok(Ok(codecs)) => codecs,
            Ok(Err(e)) => {
                log::error!(
                    target: "executor",
                    "error on {}: {}",
                    self.path.display(),
                    e
                );
                self.bus.publish(&FileProcessErrorEvent {
                    path: self.path.clone(),
                    error_message: e.to_string(),
                    container_origin: self.origin.clone(),
                });
                let _ = std::fs::remove_file(&tmp);
                return TaskResult::Failed(e.to_string());
            }
            Err(join_error) => {
                log::error!(
                    target: "executor",
                    "codec crashed on {}: {}",
                    self.path.display(),
                    join_error
                );
                self.bus.publish(&FileProcessErrorEvent {
                    path: self.path.clone(),
                    error_message: format!("codec crashed: {}", join_error),
                    container_origin: self.origin.clone(),
                });
                let _ = std::fs::remove_file(&tmp);
                return TaskResult::Failed(join_error.to_string());
            }
        };

        let duration = started.elapsed();
        let original_size = file_size(&self.path);
        let new_size = file_size(&tmp);

        match commit_if_smaller(&self.path, &tmp, self.dry_run) {
            Ok(CommitOutcome::Replaced) => {
                log::info!(
                    target: "executor",
                    "recompressed: {} ({} -> {} bytes)",
                    self.path.display(),
                    original_size,
                    new_size
                );
                self.bus.publish(&FileProcessCompleteEvent {
                    path: self.path.clone(),
                    original_size,
                    new_size,
                    replaced: true,
                    duration,
                    codecs_used: codecs,
                    container_origin: self.origin.clone(),
                });
                TaskResult::Success("replaced".into())
            }
            Ok(CommitOutcome::DryRun) => {
                self.bus.publish(&FileProcessCompleteEvent {
                    path: self.path.clone(),
                    original_size,
                    new_size,
                    replaced: false,
                    duration,
                    codecs_used: codecs,
                    container_origin: self.origin.clone(),
                });
                TaskResult::Success("dry-run".into())
            }
            Ok(CommitOutcome::NoImprovement) => {
                log::debug!(target: "executor", "no improvement: {}", self.path.display());
                self.bus.publish(&FileProcessSkippedEvent {
                    path: self.path.clone(),
                    reason: "No size improvement".to_string(),
                    container_origin: self.origin.clone(),
                });
                TaskResult::Skipped("no improvement".into())
            }
            Err(e) => {
                log::error!(
                    target: "executor",
                    "rename failed: {} ({})",
                    self.path.display(),
                    e
                );
                self.bus.publish(&FileProcessErrorEvent {
                    path: self.path.clone(),
                    error_message: format!("Rename failed: {}", e),
                    container_origin: self.origin.clone(),
                });
                TaskResult::Failed(e.to_string())
            }
        }
    }

    fn task_id(&self) -> String {
        format!("process_{}", self.path.display())
    }

    fn description(&self) -> String {
        format!("recompress {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codecs::CodecRun;
    use crate::error::OptiPackError;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Leaf stub: `.shrink` halves the file, `.keep` rewrites it at the
    /// same size, `.boom` fails.
    struct StubLeaf;

    impl Processor for StubLeaf {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn handles_mime(&self, _mime: &str) -> bool {
            false
        }
        fn handles_extension(&self, ext: &str) -> bool {
            matches!(ext, ".shrink" | ".keep" | ".boom")
        }
        fn can_recompress(&self) -> bool {
            true
        }
        fn recompress(
            &self,
            input: &Path,
            output: &Path,
            _opts: &RecompressOptions,
        ) -> crate::Result<Vec<CodecRun>> {
            let data = fs::read(input)?;
            match dot_extension(input).as_str() {
                ".shrink" => fs::write(output, &data[..data.len() / 2])?,
                ".keep" => fs::write(output, &data)?,
                _ => return Err(OptiPackError::codec("stub", "boom")),
            }
            Ok(vec![CodecRun {
                codec: "stub".to_string(),
                reduction_pct: 50.0,
            }])
        }
    }

    #[derive(Default)]
    struct Recorder {
        terminal: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn attach(&self, bus: &EventBus) {
            let sink = Arc::clone(&self.terminal);
            bus.subscribe(move |e: &FileProcessCompleteEvent| {
                sink.lock()
                    .unwrap()
                    .push(format!("complete:{}:{}", e.path.display(), e.replaced));
            });
            let sink = Arc::clone(&self.terminal);
            bus.subscribe(move |e: &FileProcessSkippedEvent| {
                sink.lock()
                    .unwrap()
                    .push(format!("skipped:{}:{}", e.path.display(), e.reason));
            });
            let sink = Arc::clone(&self.terminal);
            bus.subscribe(move |e: &FileProcessErrorEvent| {
                sink.lock()
                    .unwrap()
                    .push(format!("error:{}", e.path.display()));
            });
            let sink = Arc::clone(&self.terminal);
            bus.subscribe(move |e: &FileAnalyzeSkippedEvent| {
                sink.lock()
                    .unwrap()
                    .push(format!("analyze-skipped:{}:{}", e.path.display(), e.reason));
            });
        }

        fn events(&self) -> Vec<String> {
            self.terminal.lock().unwrap().clone()
        }
    }

    fn stub_registry() -> Arc<ProcessorRegistry> {
        Arc::new(ProcessorRegistry::new(vec![Arc::new(StubLeaf)]))
    }

    fn executor(registry: Arc<ProcessorRegistry>, bus: Arc<EventBus>) -> ProcessorExecutor {
        let mut settings = Settings::default();
        settings.num_threads = 2;
        ProcessorExecutor::new(registry, settings, bus)
    }

    #[tokio::test]
    async fn test_shrinkable_leaf_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("image.shrink");
        fs::write(&file, vec![7u8; 1000]).unwrap();

        let bus = Arc::new(EventBus::new());
        let recorder = Recorder::default();
        recorder.attach(&bus);

        let mut exec = executor(stub_registry(), Arc::clone(&bus));
        exec.process(&[file.clone()]).await;

        assert_eq!(fs::metadata(&file).unwrap().len(), 500);
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], format!("complete:{}:true", file.display()));
        assert!(!leaf_tmp_path(&file).exists());
    }

    #[tokio::test]
    async fn test_no_gain_leaf_is_skipped_and_untouched() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("image.keep");
        fs::write(&file, vec![7u8; 1000]).unwrap();

        let bus = Arc::new(EventBus::new());
        let recorder = Recorder::default();
        recorder.attach(&bus);

        let mut exec = executor(stub_registry(), Arc::clone(&bus));
        exec.process(&[file.clone()]).await;

        assert_eq!(fs::metadata(&file).unwrap().len(), 1000);
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            format!("skipped:{}:No size improvement", file.display())
        );
        assert!(!leaf_tmp_path(&file).exists());
    }

    #[tokio::test]
    async fn test_failing_codec_reports_error_and_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("image.boom");
        fs::write(&file, vec![7u8; 100]).unwrap();

        let bus = Arc::new(EventBus::new());
        let recorder = Recorder::default();
        recorder.attach(&bus);

        let mut exec = executor(stub_registry(), Arc::clone(&bus));
        exec.process(&[file.clone()]).await;

        assert_eq!(fs::metadata(&file).unwrap().len(), 100);
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], format!("error:{}", file.display()));
        assert!(!leaf_tmp_path(&file).exists());
    }

    #[tokio::test]
    async fn test_unsupported_file_skipped_in_analysis() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("opaque.xyz");
        fs::write(&file, b"bytes").unwrap();

        let bus = Arc::new(EventBus::new());
        let recorder = Recorder::default();
        recorder.attach(&bus);

        let mut exec = executor(stub_registry(), Arc::clone(&bus));
        exec.process(&[file.clone()]).await;

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            format!("analyze-skipped:{}:Unsupported format", file.display())
        );
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_replacing() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("image.shrink");
        fs::write(&file, vec![7u8; 1000]).unwrap();

        let bus = Arc::new(EventBus::new());
        let recorder = Recorder::default();
        recorder.attach(&bus);

        let registry = stub_registry();
        let mut settings = Settings::default();
        settings.num_threads = 2;
        settings.dry_run = true;
        let mut exec = ProcessorExecutor::new(registry, settings, Arc::clone(&bus));
        exec.process(&[file.clone()]).await;

        assert_eq!(fs::metadata(&file).unwrap().len(), 1000);
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], format!("complete:{}:false", file.display()));
        assert!(!leaf_tmp_path(&file).exists());
    }

    #[tokio::test]
    async fn test_stop_flag_skips_queued_work() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("image.shrink");
        fs::write(&file, vec![7u8; 1000]).unwrap();

        let bus = Arc::new(EventBus::new());
        let recorder = Recorder::default();
        recorder.attach(&bus);

        let stop = Arc::new(AtomicBool::new(true));
        let mut settings = Settings::default();
        settings.num_threads = 1;
        let mut exec = ProcessorExecutor::with_stop_flag(
            stub_registry(),
            settings,
            Arc::clone(&bus),
            stop,
        );
        exec.process(&[file.clone()]).await;

        // nothing analyzed, nothing replaced
        assert_eq!(fs::metadata(&file).unwrap().len(), 1000);
        assert!(recorder.events().is_empty());
    }
}
