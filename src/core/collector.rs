//! Result collection from bus events.
//!
//! The collector subscribes to the terminal event types and is the sole
//! writer of the two report vectors. Publishes are serialized by the bus
//! lock, so the handlers themselves stay lock-free beyond the shared `Arc`
//! plumbing. Snapshots are meant to be taken after Phase 3.

use crate::core::bus::EventBus;
use crate::core::codecs::CodecRun;
use crate::core::events::{
    ContainerFinalizeCompleteEvent, ContainerFinalizeErrorEvent, FileProcessCompleteEvent,
    FileProcessErrorEvent, FileProcessSkippedEvent,
};
use crate::core::formats::ContainerFormat;
use crate::core::fs_util::file_size;
use crate::core::mime::MimeDetector;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Per-file outcome row.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub mime: String,
    pub size_before: u64,
    pub size_after: u64,
    pub success: bool,
    pub replaced: bool,
    pub duration_ms: u64,
    pub codecs_used: Vec<CodecRun>,
    pub container_origin: Option<PathBuf>,
    pub error_msg: String,
}

/// Per-container outcome row.
#[derive(Debug, Clone)]
pub struct ContainerReport {
    pub filename: PathBuf,
    pub format: ContainerFormat,
    pub size_before: u64,
    pub size_after: u64,
    pub success: bool,
    pub error_msg: String,
}

/// Accumulates report rows from terminal events.
#[derive(Default)]
pub struct ReportCollector {
    files: Arc<Mutex<Vec<FileReport>>>,
    containers: Arc<Mutex<Vec<ContainerReport>>>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this collector's handlers on the bus.
    pub fn attach(&self, bus: &EventBus) {
        let files = Arc::clone(&self.files);
        bus.subscribe(move |e: &FileProcessCompleteEvent| {
            files.lock().unwrap().push(FileReport {
                path: e.path.clone(),
                mime: MimeDetector::detect(&e.path),
                size_before: e.original_size,
                size_after: e.new_size,
                success: true,
                replaced: e.replaced,
                duration_ms: e.duration.as_millis() as u64,
                codecs_used: e.codecs_used.clone(),
                container_origin: e.container_origin.clone(),
                error_msg: String::new(),
            });
        });

        let files = Arc::clone(&self.files);
        bus.subscribe(move |e: &FileProcessSkippedEvent| {
            let size = file_size(&e.path);
            files.lock().unwrap().push(FileReport {
                path: e.path.clone(),
                mime: MimeDetector::detect(&e.path),
                size_before: size,
                size_after: size,
                success: true,
                replaced: false,
                duration_ms: 0,
                codecs_used: Vec::new(),
                container_origin: e.container_origin.clone(),
                error_msg: String::new(),
            });
        });

        let files = Arc::clone(&self.files);
        bus.subscribe(move |e: &FileProcessErrorEvent| {
            files.lock().unwrap().push(FileReport {
                path: e.path.clone(),
                mime: MimeDetector::detect(&e.path),
                size_before: file_size(&e.path),
                size_after: 0,
                success: false,
                replaced: false,
                duration_ms: 0,
                codecs_used: Vec::new(),
                container_origin: e.container_origin.clone(),
                error_msg: e.error_message.clone(),
            });
        });

        let containers = Arc::clone(&self.containers);
        bus.subscribe(move |e: &ContainerFinalizeCompleteEvent| {
            containers.lock().unwrap().push(ContainerReport {
                filename: e.path.clone(),
                format: e.format,
                size_before: e.original_size,
                size_after: e.final_size,
                success: true,
                error_msg: String::new(),
            });
        });

        let containers = Arc::clone(&self.containers);
        bus.subscribe(move |e: &ContainerFinalizeErrorEvent| {
            containers.lock().unwrap().push(ContainerReport {
                filename: e.path.clone(),
                format: ContainerFormat::Unknown,
                size_before: 0,
                size_after: 0,
                success: false,
                error_msg: e.error_message.clone(),
            });
        });
    }

    /// Snapshot of the per-file rows.
    pub fn file_reports(&self) -> Vec<FileReport> {
        self.files.lock().unwrap().clone()
    }

    /// Snapshot of the per-container rows.
    pub fn container_reports(&self) -> Vec<ContainerReport> {
        self.containers.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_collects_complete_and_error_rows() {
        let bus = EventBus::new();
        let collector = ReportCollector::new();
        collector.attach(&bus);

        bus.publish(&FileProcessCompleteEvent {
            path: PathBuf::from("/x/a.png"),
            original_size: 1000,
            new_size: 700,
            replaced: true,
            duration: Duration::from_millis(42),
            codecs_used: vec![CodecRun {
                codec: "oxipng".to_string(),
                reduction_pct: 30.0,
            }],
            container_origin: None,
        });
        bus.publish(&FileProcessErrorEvent {
            path: PathBuf::from("/x/b.png"),
            error_message: "boom".to_string(),
            container_origin: Some(PathBuf::from("/x/outer.zip")),
        });

        let rows = collector.file_reports();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].success);
        assert!(rows[0].replaced);
        assert_eq!(rows[0].duration_ms, 42);
        assert_eq!(rows[0].codecs_used.len(), 1);
        assert!(!rows[1].success);
        assert_eq!(rows[1].error_msg, "boom");
        assert_eq!(
            rows[1].container_origin,
            Some(PathBuf::from("/x/outer.zip"))
        );
    }

    #[test]
    fn test_collects_container_rows() {
        let bus = EventBus::new();
        let collector = ReportCollector::new();
        collector.attach(&bus);

        bus.publish(&ContainerFinalizeCompleteEvent {
            path: PathBuf::from("/x/a.zip"),
            format: ContainerFormat::Zip,
            original_size: 5000,
            final_size: 4000,
        });
        bus.publish(&ContainerFinalizeErrorEvent {
            path: PathBuf::from("/x/b.zip"),
            error_message: "write failure".to_string(),
        });

        let rows = collector.container_reports();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].success);
        assert_eq!(rows[0].size_before, 5000);
        assert_eq!(rows[0].size_after, 4000);
        assert!(!rows[1].success);
        assert_eq!(rows[1].error_msg, "write failure");
    }

    #[test]
    fn test_skip_rows_count_as_success_without_replacement() {
        let bus = EventBus::new();
        let collector = ReportCollector::new();
        collector.attach(&bus);

        bus.publish(&FileProcessSkippedEvent {
            path: PathBuf::from("/x/c.png"),
            reason: "No size improvement".to_string(),
            container_origin: None,
        });

        let rows = collector.file_reports();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].success);
        assert!(!rows[0].replaced);
        assert!(rows[0].error_msg.is_empty());
    }
}
