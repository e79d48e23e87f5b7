//! Phase events published on the [`EventBus`](crate::core::bus::EventBus).
//!
//! One struct per event. The orchestrator and the container engine are the
//! only publishers; the collector and the CLI progress listeners are the
//! consumers. Every analyzed path receives exactly one terminal event.

use crate::core::codecs::CodecRun;
use crate::core::formats::ContainerFormat;
use std::path::PathBuf;
use std::time::Duration;

// --- Phase 1: Analysis ---

/// Analysis of a path has begun.
#[derive(Debug, Clone)]
pub struct FileAnalyzeStartEvent {
    pub path: PathBuf,
}

/// Analysis of a path finished.
#[derive(Debug, Clone)]
pub struct FileAnalyzeCompleteEvent {
    pub path: PathBuf,
    /// True when the path was a container and has been extracted.
    pub extracted: bool,
    /// True when the path was scheduled for leaf recompression.
    pub scheduled: bool,
}

/// Analysis of a path failed.
#[derive(Debug, Clone)]
pub struct FileAnalyzeErrorEvent {
    pub path: PathBuf,
    pub error_message: String,
}

/// A path was skipped during analysis (no processor, unsupported format).
#[derive(Debug, Clone)]
pub struct FileAnalyzeSkippedEvent {
    pub path: PathBuf,
    pub reason: String,
}

// --- Phase 2: Processing ---

/// Leaf recompression of a file has begun.
#[derive(Debug, Clone)]
pub struct FileProcessStartEvent {
    pub path: PathBuf,
}

/// Leaf recompression finished.
#[derive(Debug, Clone)]
pub struct FileProcessCompleteEvent {
    pub path: PathBuf,
    pub original_size: u64,
    pub new_size: u64,
    /// True when the original was replaced by the smaller output.
    pub replaced: bool,
    pub duration: Duration,
    /// Codecs applied, in order, with their percentage reduction.
    pub codecs_used: Vec<CodecRun>,
    /// Original path of the container this file was extracted from, if any.
    pub container_origin: Option<PathBuf>,
}

/// Leaf recompression failed.
#[derive(Debug, Clone)]
pub struct FileProcessErrorEvent {
    pub path: PathBuf,
    pub error_message: String,
    pub container_origin: Option<PathBuf>,
}

/// Leaf recompression was skipped (no improvement, unsupported format).
#[derive(Debug, Clone)]
pub struct FileProcessSkippedEvent {
    pub path: PathBuf,
    pub reason: String,
    pub container_origin: Option<PathBuf>,
}

// --- Phase 3: Finalization ---

/// Rebuild of a container has begun.
#[derive(Debug, Clone)]
pub struct ContainerFinalizeStartEvent {
    pub path: PathBuf,
}

/// Rebuild of a container finished; the commit rule has been applied.
#[derive(Debug, Clone)]
pub struct ContainerFinalizeCompleteEvent {
    pub path: PathBuf,
    pub format: ContainerFormat,
    pub original_size: u64,
    pub final_size: u64,
}

/// Rebuild of a container failed; the original is untouched.
#[derive(Debug, Clone)]
pub struct ContainerFinalizeErrorEvent {
    pub path: PathBuf,
    pub error_message: String,
}
