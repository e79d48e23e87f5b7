//! PDF container handler.
//!
//! Unlike the archive families, a PDF is state-preserving: `finalize`
//! reopens the original document rather than rebuilding from scratch.
//! `prepare` walks the indirect objects, decodes each stream where the
//! filters allow it, guesses a file extension from the stream dictionary
//! and magic bytes, and drops the decoded bytes into the scratch directory
//! so leaf codecs can work on them. `finalize` then recompresses exactly
//! the streams that are safe to touch: decodable, no `/DecodeParms`, and
//! a `/Filter` that is exactly `/FlateDecode`, feeding them through the
//! high-effort zlib compressor before the commit rule is applied.

use super::{
    cleanup_temp_dir, finalize_children, make_temp_dir, ContainerJob, FinalizeContext,
};
use crate::core::codecs::zlib::{compress_zlib, compress_zlib_verified};
use crate::core::formats::ContainerFormat;
use crate::core::fs_util::{commit_if_smaller, file_size, leaf_tmp_path, CommitOutcome};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct StreamInfo {
    decodable: bool,
    file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct PdfState {
    streams: HashMap<ObjectId, StreamInfo>,
}

/// Handler for PDF documents.
pub struct PdfProcessor {
    state: Mutex<HashMap<PathBuf, PdfState>>,
}

impl PdfProcessor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::core::registry::Processor for PdfProcessor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn handles_mime(&self, mime: &str) -> bool {
        mime == "application/pdf"
    }

    fn handles_extension(&self, ext: &str) -> bool {
        ext == ".pdf"
    }

    fn can_extract(&self) -> bool {
        true
    }

    fn prepare(&self, path: &Path) -> crate::Result<ContainerJob> {
        log::info!(target: "pdf", "preparing PDF container: {}", path.display());

        let temp_dir = make_temp_dir(ContainerFormat::Pdf.temp_prefix())?;
        let mut job = ContainerJob::empty(path.to_path_buf(), temp_dir, ContainerFormat::Pdf);

        let doc = match Document::load(path) {
            Ok(doc) => doc,
            Err(e) => {
                log::error!(target: "pdf", "failed to parse {}: {}", path.display(), e);
                return Ok(job);
            }
        };

        let mut state = PdfState::default();
        for (&id, object) in &doc.objects {
            let Object::Stream(stream) = object else {
                continue;
            };

            let (data, decodable) = match stream.decompressed_content() {
                Ok(data) => (data, true),
                Err(_) => {
                    log::warn!(
                        target: "pdf",
                        "stream {} {} not decodable, using raw data",
                        id.0,
                        id.1
                    );
                    (stream.content.clone(), false)
                }
            };

            let ext = guess_extension(&stream.dict, &data);
            let prefix = if decodable { "object" } else { "raw_object" };
            let out_file = job
                .temp_dir
                .join(format!("{}_{}_{}{}", prefix, id.0, id.1, ext));
            fs::write(&out_file, &data)?;

            state.streams.insert(
                id,
                StreamInfo {
                    decodable,
                    file: Some(out_file.clone()),
                },
            );
            job.file_list.push(out_file);
        }

        self.state
            .lock()
            .unwrap()
            .insert(job.original_path.clone(), state);
        Ok(job)
    }

    fn finalize(&self, job: &ContainerJob, ctx: &FinalizeContext) -> crate::Result<()> {
        log::info!(
            target: "pdf",
            "finalizing PDF container: {}",
            job.original_path.display()
        );

        finalize_children(job, ctx)?;

        let state = self
            .state
            .lock()
            .unwrap()
            .remove(&job.original_path)
            .unwrap_or_default();

        let result = self.recompress_streams(job, ctx, &state);
        cleanup_temp_dir(&job.temp_dir);
        result
    }
}

impl PdfProcessor {
    fn recompress_streams(
        &self,
        job: &ContainerJob,
        ctx: &FinalizeContext,
        state: &PdfState,
    ) -> crate::Result<()> {
        let mut doc = Document::load(&job.original_path)?;
        let mut touched = 0usize;

        let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
        for id in ids {
            let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
                continue;
            };

            let info = state.streams.get(&id);
            if info.is_some_and(|i| !i.decodable) {
                continue;
            }
            if stream.dict.has(b"DecodeParms") {
                continue;
            }
            if !is_single_flate(&stream.dict) {
                continue;
            }

            // prefer the scratch copy: Phase 2 may have optimized it
            let decoded = match read_decoded(stream, info, &job.temp_dir, id) {
                Some(data) => data,
                None => {
                    log::debug!(
                        target: "pdf",
                        "skipping stream {} {} (not decodable now)",
                        id.0,
                        id.1
                    );
                    continue;
                }
            };

            let iterations = ctx.settings.pdf_zopfli_iterations;
            let recompressed = if ctx.settings.verify_checksums {
                compress_zlib_verified(&decoded, iterations)?
            } else {
                compress_zlib(&decoded, iterations)?
            };
            stream.set_content(recompressed);
            stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
            stream.dict.remove(b"DecodeParms");
            touched += 1;
        }

        log::debug!(target: "pdf", "recompressed {} flate streams", touched);

        let tmp_path = leaf_tmp_path(&job.original_path);
        doc.save(&tmp_path)?;

        let orig_size = file_size(&job.original_path);
        let new_size = file_size(&tmp_path);
        match commit_if_smaller(&job.original_path, &tmp_path, ctx.settings.dry_run)? {
            CommitOutcome::Replaced => log::info!(
                target: "pdf",
                "optimized PDF: {} ({} -> {} bytes)",
                job.original_path.display(),
                orig_size,
                new_size
            ),
            CommitOutcome::DryRun => log::info!(
                target: "pdf",
                "dry-run: {} would shrink {} -> {} bytes",
                job.original_path.display(),
                orig_size,
                new_size
            ),
            CommitOutcome::NoImprovement => log::debug!(
                target: "pdf",
                "no improvement for {}",
                job.original_path.display()
            ),
        }
        Ok(())
    }
}

/// Fetch the decoded bytes for a stream: the scratch file when present,
/// a fresh decode otherwise.
fn read_decoded(
    stream: &Stream,
    info: Option<&StreamInfo>,
    temp_dir: &Path,
    id: ObjectId,
) -> Option<Vec<u8>> {
    if let Some(file) = info.and_then(|i| i.file.as_ref()) {
        if file.exists() {
            return fs::read(file).ok();
        }
    }
    // no state (nested job finalized by a fresh handler): look the scratch
    // file up by its naming pattern
    if let Some(file) = find_object_file(temp_dir, id) {
        return fs::read(file).ok();
    }
    stream.decompressed_content().ok()
}

fn find_object_file(temp_dir: &Path, id: ObjectId) -> Option<PathBuf> {
    let prefix = format!("object_{}_{}.", id.0, id.1);
    let entries = fs::read_dir(temp_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) {
            return Some(entry.path());
        }
    }
    None
}

/// A stream qualifies for recompression only when its filter chain is
/// exactly one `/FlateDecode`.
fn is_single_flate(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"FlateDecode",
        Ok(Object::Array(filters)) => {
            filters.len() == 1
                && filters[0]
                    .as_name()
                    .map(|n| n == b"FlateDecode")
                    .unwrap_or(false)
        }
        _ => false,
    }
}

/// Guess a file extension from the stream dictionary and magic bytes.
fn guess_extension(dict: &Dictionary, data: &[u8]) -> &'static str {
    if let Ok(subtype) = dict.get(b"Subtype").and_then(Object::as_name) {
        if subtype == b"Image" {
            if let Ok(filter) = dict.get(b"Filter").and_then(Object::as_name) {
                match filter {
                    b"DCTDecode" => return ".jpg",
                    b"JPXDecode" => return ".jp2",
                    b"FlateDecode" => {
                        if data.starts_with(b"\x89PNG") {
                            return ".png";
                        }
                        return ".raw";
                    }
                    _ => {}
                }
            }
        }
        if subtype == b"Form" {
            return ".form";
        }
    }

    if dict.has(b"FontFile2") {
        return ".ttf";
    }
    if dict.has(b"FontFile3") {
        let is_type1c = dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"Type1C")
            .unwrap_or(false);
        return if is_type1c { ".otf" } else { ".cff" };
    }

    if dict
        .get(b"Type")
        .and_then(Object::as_name)
        .map(|n| n == b"Metadata")
        .unwrap_or(false)
    {
        return ".xml";
    }

    if data.len() >= 4 {
        if data.starts_with(b"\xFF\xD8") {
            return ".jpg";
        }
        if data.starts_with(b"\x89PNG") {
            return ".png";
        }
        if data.starts_with(b"%PDF") {
            return ".pdf";
        }
        if data.starts_with(b"OTTO") {
            return ".otf";
        }
    }

    ".bin"
}
