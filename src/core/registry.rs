//! Processor capability trait and lookup registry.
//!
//! A [`Processor`] is the polymorphic capability object the orchestrator
//! works with: container families implement `prepare`/`finalize`, leaf
//! codecs implement `recompress`, and each declares what it handles via
//! MIME and extension predicates. The [`ProcessorRegistry`] resolves a file
//! to at most one processor; resolution *policy* (MIME first or extension
//! first) belongs to the caller.

use crate::core::codecs::CodecRun;
use crate::core::containers::{ContainerJob, FinalizeContext};
use crate::core::formats::EncodeMode;
use crate::error::OptiPackError;
use std::path::Path;
use std::sync::Arc;

/// Options forwarded to leaf codecs during recompression.
#[derive(Debug, Clone)]
pub struct RecompressOptions {
    /// Verify decoded content matches the original before replacing.
    pub verify_checksums: bool,
    /// Preserve metadata chunks/tags where the codec supports it.
    pub preserve_metadata: bool,
    /// Codec composition strategy.
    pub encode_mode: EncodeMode,
}

impl Default for RecompressOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            preserve_metadata: true,
            encode_mode: EncodeMode::Pipe,
        }
    }
}

/// Polymorphic processing capability over the set
/// {extract containers, recompress leaves}.
pub trait Processor: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Whether this processor handles files of the given MIME type.
    fn handles_mime(&self, mime: &str) -> bool;

    /// Whether this processor handles files with the given extension
    /// (leading dot, lowercase).
    fn handles_extension(&self, ext: &str) -> bool;

    /// Whether this processor can extract container contents.
    fn can_extract(&self) -> bool {
        false
    }

    /// Whether this processor can recompress a leaf file.
    fn can_recompress(&self) -> bool {
        false
    }

    /// Extract a container into a scratch tree.
    fn prepare(&self, path: &Path) -> crate::Result<ContainerJob> {
        Err(OptiPackError::CommandExecution(format!(
            "{} cannot extract {}",
            self.name(),
            path.display()
        )))
    }

    /// Rebuild a container from its (possibly optimized) scratch tree and
    /// commit the result if smaller.
    fn finalize(&self, job: &ContainerJob, ctx: &FinalizeContext) -> crate::Result<()> {
        let _ = ctx;
        Err(OptiPackError::CommandExecution(format!(
            "{} cannot finalize {}",
            self.name(),
            job.original_path.display()
        )))
    }

    /// Losslessly recompress `input` into `output`, returning the codecs
    /// applied with their percentage reductions.
    fn recompress(
        &self,
        input: &Path,
        output: &Path,
        opts: &RecompressOptions,
    ) -> crate::Result<Vec<CodecRun>> {
        let _ = (output, opts);
        Err(OptiPackError::CommandExecution(format!(
            "{} cannot recompress {}",
            self.name(),
            input.display()
        )))
    }
}

/// Ordered processor lookup by MIME type or extension.
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Build a registry from an explicit processor list (first match wins).
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// Registry with the built-in processors: generic archives, office
    /// bundles, PDF, and the PNG leaf codec.
    pub fn with_default_processors() -> Self {
        use crate::core::codecs::png::PngProcessor;
        use crate::core::containers::archive::ArchiveProcessor;
        use crate::core::containers::office::OfficeZipProcessor;
        use crate::core::containers::pdf::PdfProcessor;

        Self::new(vec![
            Arc::new(OfficeZipProcessor::new()),
            Arc::new(PdfProcessor::new()),
            Arc::new(ArchiveProcessor::new()),
            Arc::new(PngProcessor::new()),
        ])
    }

    /// Find a processor by MIME type. Empty strings match nothing.
    pub fn find_by_mime(&self, mime: &str) -> Option<Arc<dyn Processor>> {
        if mime.is_empty() {
            return None;
        }
        self.processors
            .iter()
            .find(|p| p.handles_mime(mime))
            .cloned()
    }

    /// Find a processor by extension (leading dot, case-insensitive).
    pub fn find_by_extension(&self, ext: &str) -> Option<Arc<dyn Processor>> {
        if ext.is_empty() {
            return None;
        }
        let ext = ext.to_ascii_lowercase();
        self.processors
            .iter()
            .find(|p| p.handles_extension(&ext))
            .cloned()
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// True when no processors are registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
