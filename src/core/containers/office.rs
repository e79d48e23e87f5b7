//! Office bundle handler: OOXML (DOCX/XLSX/PPTX) and ODF (ODT/ODS/ODP/ODG/ODF).
//!
//! Office documents are ZIP bundles with format-specific entry rules, so
//! the rebuild writes the archive records directly instead of going through
//! a compressing writer: XML and RELS entries get a zopfli-built deflate
//! stream (high effort, block splitting), image entries are losslessly
//! optimized first, and everything else is deflated at level 9. OOXML
//! output leads with `[Content_Types].xml`, per the packaging convention.
//!
//! Entry timestamps are zeroed and permissions fixed at 0644 so identical
//! inputs rebuild byte-identically.

use super::{
    archive::{apply_commit, extract_zip, scan_extracted},
    cleanup_temp_dir, finalize_children, make_temp_dir, relative_entry_name, ContainerJob,
    FinalizeContext,
};
use crate::core::codecs::png::optimize_png;
use crate::core::formats::ContainerFormat;
use crate::core::fs_util::container_tmp_path;
use crate::core::mime::MimeDetector;
use crate::error::OptiPackError;
use std::fs::{self, File};
use std::io::Write;
use std::num::NonZeroU64;
use std::path::Path;
use walkdir::WalkDir;

const METHOD_DEFLATED: u16 = 8;

/// Handler for ZIP-bundled office documents.
pub struct OfficeZipProcessor;

impl OfficeZipProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OfficeZipProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::core::registry::Processor for OfficeZipProcessor {
    fn name(&self) -> &'static str {
        "office"
    }

    fn handles_mime(&self, mime: &str) -> bool {
        ContainerFormat::from_mime(mime).is_some_and(|f| f.is_office())
    }

    fn handles_extension(&self, ext: &str) -> bool {
        ContainerFormat::parse(ext.trim_start_matches('.')).is_some_and(|f| f.is_office())
    }

    fn can_extract(&self) -> bool {
        true
    }

    fn prepare(&self, path: &Path) -> crate::Result<ContainerJob> {
        let mime = MimeDetector::detect(path);
        let format = ContainerFormat::detect(path, &mime);
        log::info!(
            target: "office",
            "preparing office container: {} ({})",
            path.display(),
            format
        );

        let temp_dir = make_temp_dir(format.temp_prefix())?;
        let mut job = ContainerJob::empty(path.to_path_buf(), temp_dir, format);

        if let Err(e) = extract_zip(path, &job.temp_dir) {
            log::error!(
                target: "office",
                "extraction failed for {}: {}",
                path.display(),
                e
            );
            return Ok(job);
        }

        scan_extracted(&mut job)?;

        log::debug!(
            target: "office",
            "office prepare complete: {} files, {} nested containers",
            job.file_list.len(),
            job.children.len()
        );
        Ok(job)
    }

    fn finalize(&self, job: &ContainerJob, ctx: &FinalizeContext) -> crate::Result<()> {
        log::info!(
            target: "office",
            "finalizing office container: {}",
            job.original_path.display()
        );

        finalize_children(job, ctx)?;

        if job.file_list.is_empty() && job.children.is_empty() {
            log::debug!(
                target: "office",
                "nothing extracted for {}, leaving original untouched",
                job.original_path.display()
            );
            cleanup_temp_dir(&job.temp_dir);
            return Ok(());
        }

        let tmp_path = container_tmp_path(&job.original_path, job.format.extension());

        if let Err(e) = build_office_zip(
            &job.temp_dir,
            &tmp_path,
            job.format,
            ctx.settings.zopfli_iterations,
            ctx.settings.preserve_metadata,
        ) {
            let _ = fs::remove_file(&tmp_path);
            cleanup_temp_dir(&job.temp_dir);
            return Err(e);
        }

        let commit = apply_commit(
            &job.original_path,
            &job.original_path,
            &tmp_path,
            job.format,
            ctx.settings.dry_run,
        );
        cleanup_temp_dir(&job.temp_dir);
        commit
    }
}

/// Rebuild an office bundle with per-entry recompression.
fn build_office_zip(
    root: &Path,
    out_path: &Path,
    fmt: ContainerFormat,
    zopfli_iterations: u64,
    preserve_metadata: bool,
) -> crate::Result<()> {
    let mut names: Vec<String> = WalkDir::new(root)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| relative_entry_name(root, e.path()))
        .collect();

    // OOXML consumers expect the content-types part as the first entry
    if fmt.is_ooxml() {
        if let Some(pos) = names.iter().position(|n| n == "[Content_Types].xml") {
            let first = names.remove(pos);
            names.insert(0, first);
        }
    }

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let data = fs::read(root.join(&name))?;
        let entry = encode_entry(&name, &data, fmt, zopfli_iterations, preserve_metadata)?;
        entries.push(entry);
    }

    write_raw_zip(out_path, &entries)?;
    Ok(())
}

/// One finished archive record: name, crc and a ready deflate stream.
struct RawEntry {
    name: String,
    crc: u32,
    uncompressed_size: u32,
    data: Vec<u8>,
}

fn entry_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn encode_entry(
    name: &str,
    data: &[u8],
    fmt: ContainerFormat,
    zopfli_iterations: u64,
    preserve_metadata: bool,
) -> crate::Result<RawEntry> {
    let ext = entry_extension(name);

    let (payload, stream) = match ext.as_str() {
        ".xml" | ".rels" => {
            let stream = zopfli_deflate(data, zopfli_iterations)?;
            log::debug!(
                target: "office",
                "recompressed entry: {} ({} -> {} bytes)",
                name,
                data.len(),
                stream.len()
            );
            (data.to_vec(), stream)
        }
        ".png" if fmt.is_ooxml() => {
            // lossless image pass, then the usual deflate wrapper
            let optimized = match optimize_png(data, preserve_metadata) {
                Ok(out) if out.len() <= data.len() => out,
                Ok(_) => data.to_vec(),
                Err(e) => {
                    log::warn!(target: "office", "image pass failed for {}: {}", name, e);
                    data.to_vec()
                }
            };
            let stream = deflate9(&optimized)?;
            (optimized, stream)
        }
        _ => {
            log::debug!(target: "office", "copied entry unchanged: {}", name);
            (data.to_vec(), deflate9(data)?)
        }
    };

    let mut crc = flate2::Crc::new();
    crc.update(&payload);
    Ok(RawEntry {
        name: name.to_string(),
        crc: crc.sum(),
        uncompressed_size: payload.len() as u32,
        data: stream,
    })
}

/// Raw deflate stream from zopfli at the configured effort.
fn zopfli_deflate(data: &[u8], iterations: u64) -> crate::Result<Vec<u8>> {
    let options = zopfli::Options {
        iteration_count: NonZeroU64::new(iterations.max(1)).unwrap_or(NonZeroU64::MIN),
        ..zopfli::Options::default()
    };
    let mut out = Vec::new();
    zopfli::compress(options, zopfli::Format::Deflate, data, &mut out)
        .map_err(|e| OptiPackError::codec("zopfli", e.to_string()))?;
    Ok(out)
}

fn deflate9(data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::new(9));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

// ---------- raw archive writing ----------
//
// Local file records, central directory, end-of-central-directory; zeroed
// DOS timestamps, unix mode 0644 in the external attributes.

const LOCAL_FILE_SIGNATURE: u32 = 0x04034B50;
const CENTRAL_DIR_SIGNATURE: u32 = 0x02014B50;
const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054B50;
const VERSION_MADE_BY: u16 = (3 << 8) | 20; // unix, spec 2.0
const VERSION_NEEDED: u16 = 20;
const FILE_MODE: u32 = 0o100644;

fn write_raw_zip(out_path: &Path, entries: &[RawEntry]) -> crate::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut offsets = Vec::with_capacity(entries.len());

    for entry in entries {
        offsets.push(buf.len() as u32);
        buf.extend_from_slice(&LOCAL_FILE_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // general purpose flags
        buf.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // mod time
        buf.extend_from_slice(&0u16.to_le_bytes()); // mod date
        buf.extend_from_slice(&entry.crc.to_le_bytes());
        buf.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        buf.extend_from_slice(entry.name.as_bytes());
        buf.extend_from_slice(&entry.data);
    }

    let central_dir_offset = buf.len() as u32;
    for (entry, offset) in entries.iter().zip(&offsets) {
        buf.extend_from_slice(&CENTRAL_DIR_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
        buf.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // general purpose flags
        buf.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // mod time
        buf.extend_from_slice(&0u16.to_le_bytes()); // mod date
        buf.extend_from_slice(&entry.crc.to_le_bytes());
        buf.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        buf.extend_from_slice(&0u16.to_le_bytes()); // comment length
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        buf.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        buf.extend_from_slice(&(FILE_MODE << 16).to_le_bytes());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(entry.name.as_bytes());
    }
    let central_dir_size = buf.len() as u32 - central_dir_offset;

    buf.extend_from_slice(&END_OF_CENTRAL_DIR_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // this disk
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk with central dir
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    buf.extend_from_slice(&central_dir_size.to_le_bytes());
    buf.extend_from_slice(&central_dir_offset.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // comment length

    let mut file = File::create(out_path)?;
    file.write_all(&buf)?;
    Ok(())
}
