//! Generic archive handler: ZIP family, tar, and single-file compressors.
//!
//! `prepare` extracts an archive into its scratch directory with zip-slip
//! defenses, recursing into any nested container it finds. `finalize`
//! rebuilds a deterministic archive (zeroed mtimes, fixed permissions,
//! forward-slash names, deflate/gzip/bzip2/xz at level 9) next to the
//! original and replaces it only when strictly smaller.
//!
//! Entry-order rules: EPUB emits `mimetype` first and stored; comic book
//! archives (CBZ/CBT) are ordered by natural numeric sort of their relative
//! paths; everything else keeps name-sorted discovery order so rebuilds are
//! reproducible across filesystems.

use super::{
    cleanup_temp_dir, finalize_children, handler_for, make_temp_dir, natural_cmp,
    relative_entry_name, sanitize_entry_path, ContainerJob, FinalizeContext,
};
use crate::core::formats::ContainerFormat;
use crate::core::fs_util::container_tmp_path;
use crate::core::mime::MimeDetector;
use crate::error::OptiPackError;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Handler for generic archives (everything that is not an office bundle
/// or a PDF).
pub struct ArchiveProcessor;

impl ArchiveProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ArchiveProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn claimed_format(fmt: ContainerFormat) -> bool {
    fmt.is_readable() && !fmt.is_office() && fmt != ContainerFormat::Pdf
}

impl crate::core::registry::Processor for ArchiveProcessor {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn handles_mime(&self, mime: &str) -> bool {
        ContainerFormat::from_mime(mime).is_some_and(claimed_format)
    }

    fn handles_extension(&self, ext: &str) -> bool {
        ContainerFormat::parse(ext.trim_start_matches('.')).is_some_and(claimed_format)
    }

    fn can_extract(&self) -> bool {
        true
    }

    fn prepare(&self, path: &Path) -> crate::Result<ContainerJob> {
        let mime = MimeDetector::detect(path);
        let format = ContainerFormat::detect(path, &mime);

        if format.needs_backup() {
            log::warn!(
                target: "archive",
                "recompressing {} will invalidate its digital signature; re-sign before installing",
                path.display()
            );
        }

        let temp_dir = make_temp_dir(format.temp_prefix())?;
        let mut job = ContainerJob::empty(path.to_path_buf(), temp_dir, format);

        if !format.is_readable() {
            log::warn!(
                target: "archive",
                "unreadable or unrecognized format: {}",
                path.display()
            );
            return Ok(job);
        }

        log::info!(
            target: "archive",
            "extracting archive: {} -> {}",
            path.display(),
            job.temp_dir.display()
        );

        let extracted = if format.is_zip_based() {
            extract_zip(path, &job.temp_dir)
        } else {
            match format {
                ContainerFormat::Tar | ContainerFormat::Cbt => extract_tar(path, &job.temp_dir),
                ContainerFormat::GZip | ContainerFormat::BZip2 | ContainerFormat::Xz => {
                    extract_single_file(path, &job.temp_dir, format)
                }
                other => Err(OptiPackError::container(
                    other.extension(),
                    "no extraction support",
                )),
            }
        };

        if let Err(e) = extracted {
            // abort the job: an empty job commits nothing at finalize
            log::error!(
                target: "archive",
                "extraction failed for {}: {}",
                path.display(),
                e
            );
            return Ok(job);
        }

        scan_extracted(&mut job)?;

        log::debug!(
            target: "archive",
            "extracted files: {} | nested containers: {}",
            job.file_list.len(),
            job.children.len()
        );
        Ok(job)
    }

    fn finalize(&self, job: &ContainerJob, ctx: &FinalizeContext) -> crate::Result<()> {
        finalize_children(job, ctx)?;

        // an aborted or empty extraction never commits
        if job.file_list.is_empty() && job.children.is_empty() {
            log::debug!(
                target: "archive",
                "nothing extracted for {}, leaving original untouched",
                job.original_path.display()
            );
            cleanup_temp_dir(&job.temp_dir);
            return Ok(());
        }

        let out_fmt = if job.format.is_writable() {
            job.format
        } else if let Some(fallback) = ctx.settings.unencodable_target_format {
            log::info!(
                target: "archive",
                "non-writable format ({}), recompressing as {}",
                job.format,
                fallback
            );
            fallback
        } else {
            log::info!(
                target: "archive",
                "non-writable format and no fallback: left intact -> {}",
                job.original_path.display()
            );
            cleanup_temp_dir(&job.temp_dir);
            return Ok(());
        };

        let tmp_archive = container_tmp_path(&job.original_path, out_fmt.extension());
        log::info!(target: "archive", "recreating archive: {}", tmp_archive.display());

        if let Err(e) = build_archive(&job.temp_dir, &tmp_archive, out_fmt) {
            let _ = fs::remove_file(&tmp_archive);
            cleanup_temp_dir(&job.temp_dir);
            return Err(e);
        }

        // when falling back to another format the output keeps the new
        // extension next to the original name
        let mut final_path = job.original_path.clone();
        if out_fmt != job.format {
            final_path.set_extension(out_fmt.extension());
        }

        let commit = apply_commit(
            &job.original_path,
            &final_path,
            &tmp_archive,
            job.format,
            ctx.settings.dry_run,
        );
        cleanup_temp_dir(&job.temp_dir);
        commit
    }
}

/// Commit a rebuilt container against the universal rule, honoring the
/// backup rule for signed formats. `final_path` differs from `original`
/// only when the output format (and so the extension) changed.
pub(crate) fn apply_commit(
    original: &Path,
    final_path: &Path,
    tmp_archive: &Path,
    format: ContainerFormat,
    dry_run: bool,
) -> crate::Result<()> {
    let orig_size = crate::core::fs_util::file_size(original);
    let new_size = crate::core::fs_util::file_size(tmp_archive);

    let improves =
        tmp_archive.exists() && new_size > 0 && (orig_size == 0 || new_size < orig_size);
    if !improves {
        let _ = fs::remove_file(tmp_archive);
        log::debug!(target: "archive", "no improvement for {}", original.display());
        return Ok(());
    }

    if dry_run {
        let _ = fs::remove_file(tmp_archive);
        log::info!(
            target: "archive",
            "dry-run: {} would shrink {} -> {} bytes",
            original.display(),
            orig_size,
            new_size
        );
        return Ok(());
    }

    if format.needs_backup() {
        let mut backup = original.as_os_str().to_os_string();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        match fs::copy(original, &backup) {
            Ok(_) => log::warn!(
                target: "archive",
                "backup of original {} saved to {} (signature will be invalid)",
                original.display(),
                backup.display()
            ),
            Err(e) => log::warn!(
                target: "archive",
                "failed to create backup for {}: {}",
                original.display(),
                e
            ),
        }
    }

    if let Err(e) = fs::rename(tmp_archive, final_path) {
        let _ = fs::remove_file(tmp_archive);
        return Err(OptiPackError::file_operation(format!(
            "renaming archive failed: {} ({})",
            final_path.display(),
            e
        )));
    }
    // replacing under a new extension retires the old file
    if final_path != original {
        let _ = fs::remove_file(original);
    }
    log::info!(
        target: "archive",
        "optimized archive: {} ({} -> {} bytes)",
        final_path.display(),
        orig_size,
        new_size
    );
    Ok(())
}

/// Walk the scratch tree and split plain files from nested containers.
pub(crate) fn scan_extracted(job: &mut ContainerJob) -> crate::Result<()> {
    let mut walker = WalkDir::new(&job.temp_dir)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter();
    // the walker root itself is the first entry
    walker.next();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!(target: "archive", "walk error in scratch dir: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.path();
        let mime = MimeDetector::detect(p);
        let fmt = ContainerFormat::detect(p, &mime);
        if fmt != ContainerFormat::Unknown && fmt.is_readable() {
            log::debug!(target: "archive", "found nested container: {}", p.display());
            let handler = handler_for(fmt);
            job.children.push(handler.prepare(p)?);
        } else {
            job.file_list.push(p.to_path_buf());
        }
    }
    Ok(())
}

// ---------- extraction ----------

pub(crate) fn extract_zip(path: &Path, dest: &Path) -> crate::Result<()> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let raw_name = entry.name().to_string();

        let Some(out_path) = sanitize_entry_path(&raw_name, dest) else {
            log::warn!(
                target: "archive",
                "skipping suspicious archive entry (path traversal): {}",
                raw_name
            );
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        if entry
            .unix_mode()
            .is_some_and(|m| m & 0o170000 == 0o120000)
        {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;
            if !target.is_empty() {
                if let Err(e) = std::os::unix::fs::symlink(&target, &out_path) {
                    log::warn!(
                        target: "archive",
                        "can't recreate symlink {}: {}",
                        out_path.display(),
                        e
                    );
                }
            }
            continue;
        }

        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn extract_tar(path: &Path, dest: &Path) -> crate::Result<()> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(file);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if sanitize_entry_path(&raw_name, dest).is_none() {
            log::warn!(
                target: "archive",
                "skipping suspicious archive entry (path traversal): {}",
                raw_name
            );
            continue;
        }

        // unpack_in re-checks containment and handles dirs, links and files
        entry.unpack_in(dest)?;
    }
    Ok(())
}

/// GZip/BZip2/Xz wrap exactly one payload; decode it to `<stem>` so a
/// compressed tarball recurses into its inner tar.
fn extract_single_file(path: &Path, dest: &Path, format: ContainerFormat) -> crate::Result<()> {
    let inner_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("data");
    let out_path = dest.join(inner_name);
    let input = File::open(path)?;
    let mut out = File::create(&out_path)?;

    let copied: io::Result<u64> = match format {
        ContainerFormat::GZip => {
            io::copy(&mut flate2::read::MultiGzDecoder::new(input), &mut out)
        }
        ContainerFormat::BZip2 => io::copy(&mut bzip2::read::BzDecoder::new(input), &mut out),
        ContainerFormat::Xz => io::copy(&mut xz2::read::XzDecoder::new(input), &mut out),
        other => {
            return Err(OptiPackError::container(
                other.extension(),
                "not a single-file compressor",
            ))
        }
    };
    copied?;
    Ok(())
}

// ---------- rebuild ----------

struct TreeEntry {
    path: PathBuf,
    rel: String,
    is_dir: bool,
    is_symlink: bool,
}

/// Collect the scratch tree in deterministic order, natural-sorted for
/// comic book archives.
fn collect_tree(root: &Path, fmt: ContainerFormat) -> Vec<TreeEntry> {
    let mut entries: Vec<TreeEntry> = WalkDir::new(root)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path() != root)
        .map(|e| TreeEntry {
            rel: relative_entry_name(root, e.path()),
            is_dir: e.file_type().is_dir(),
            is_symlink: e.file_type().is_symlink(),
            path: e.path().to_path_buf(),
        })
        .collect();

    if fmt.is_comic() {
        entries.sort_by(|a, b| natural_cmp(&a.rel, &b.rel));
    }
    entries
}

/// Rebuild the scratch tree as an archive of the given format.
pub(crate) fn build_archive(
    root: &Path,
    out_path: &Path,
    fmt: ContainerFormat,
) -> crate::Result<()> {
    if fmt.is_zip_based() {
        return build_zip(root, out_path, fmt);
    }
    match fmt {
        ContainerFormat::Tar | ContainerFormat::Cbt => build_tar(root, out_path, fmt),
        ContainerFormat::GZip | ContainerFormat::BZip2 | ContainerFormat::Xz => {
            build_single_file(root, out_path, fmt)
        }
        other => Err(OptiPackError::container(
            other.extension(),
            "unsupported output format for writing",
        )),
    }
}

fn zip_file_options() -> zip::write::FileOptions {
    zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(9))
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

fn build_zip(root: &Path, out_path: &Path, fmt: ContainerFormat) -> crate::Result<()> {
    let file = File::create(out_path)?;
    let mut writer = zip::ZipWriter::new(file);

    if fmt == ContainerFormat::Epub {
        // the EPUB contract: `mimetype` first, stored, no extra field
        let mimetype_path = root.join("mimetype");
        if mimetype_path.exists() {
            let stored = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .last_modified_time(zip::DateTime::default())
                .unix_permissions(0o644);
            writer.start_file("mimetype", stored)?;
            writer.write_all(&fs::read(&mimetype_path)?)?;
        }
    }

    let mut entries = collect_tree(root, fmt);
    if fmt == ContainerFormat::Epub {
        entries.retain(|e| e.rel != "mimetype");
    }

    for entry in entries {
        if entry.is_dir {
            let dir_opts = zip::write::FileOptions::default()
                .last_modified_time(zip::DateTime::default())
                .unix_permissions(0o755);
            writer.add_directory(entry.rel.clone(), dir_opts)?;
            continue;
        }

        #[cfg(unix)]
        if entry.is_symlink {
            let target = fs::read_link(&entry.path)?;
            let link_opts = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .last_modified_time(zip::DateTime::default())
                .unix_permissions(0o777);
            writer.add_symlink(
                entry.rel.clone(),
                target.to_string_lossy().into_owned(),
                link_opts,
            )?;
            continue;
        }
        #[cfg(not(unix))]
        if entry.is_symlink {
            continue;
        }

        writer.start_file(entry.rel.clone(), zip_file_options())?;
        let mut src = File::open(&entry.path)?;
        io::copy(&mut src, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

fn build_tar(root: &Path, out_path: &Path, fmt: ContainerFormat) -> crate::Result<()> {
    let file = File::create(out_path)?;
    let mut builder = tar::Builder::new(file);

    #[cfg(unix)]
    let mut hardlinks: std::collections::HashMap<(u64, u64), String> =
        std::collections::HashMap::new();

    for entry in collect_tree(root, fmt) {
        let mut header = tar::Header::new_ustar();
        header.set_mtime(0);

        if entry.is_dir {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, format!("{}/", entry.rel), io::empty())?;
            continue;
        }

        if entry.is_symlink {
            let target = fs::read_link(&entry.path)?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            builder.append_link(&mut header, &entry.rel, &target)?;
            continue;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta = fs::metadata(&entry.path)?;
            if meta.nlink() > 1 {
                let key = (meta.dev(), meta.ino());
                if let Some(first) = hardlinks.get(&key) {
                    // second occurrence becomes a hardlink entry, zero data
                    header.set_entry_type(tar::EntryType::Link);
                    header.set_mode(0o644);
                    header.set_size(0);
                    builder.append_link(&mut header, &entry.rel, first)?;
                    continue;
                }
                hardlinks.insert(key, entry.rel.clone());
            }
        }

        let meta = fs::metadata(&entry.path)?;
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(meta.len());
        let src = File::open(&entry.path)?;
        builder.append_data(&mut header, &entry.rel, src)?;
    }

    builder.finish()?;
    Ok(())
}

fn build_single_file(root: &Path, out_path: &Path, fmt: ContainerFormat) -> crate::Result<()> {
    let payload = collect_tree(root, fmt)
        .into_iter()
        .find(|e| !e.is_dir && !e.is_symlink)
        .ok_or_else(|| OptiPackError::container(fmt.extension(), "empty scratch tree"))?;

    let mut input = File::open(&payload.path)?;
    let out = File::create(out_path)?;

    match fmt {
        ContainerFormat::GZip => {
            let mut encoder = flate2::write::GzEncoder::new(out, flate2::Compression::new(9));
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
        }
        ContainerFormat::BZip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(out, bzip2::Compression::best());
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
        }
        ContainerFormat::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(out, 9);
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
        }
        other => {
            return Err(OptiPackError::container(
                other.extension(),
                "not a single-file compressor",
            ))
        }
    }
    Ok(())
}
