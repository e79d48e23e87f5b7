//! Container engine: extraction jobs, path defenses, and family dispatch.
//!
//! Every container family implements the same two-operation contract:
//! `prepare` extracts a container into an exclusively-owned scratch
//! directory (recursing into nested containers), and `finalize` rebuilds a
//! deterministic replacement and commits it only when smaller. This module
//! holds the pieces the families share: the [`ContainerJob`] tree, scratch
//! directory management, archive entry sanitization, natural ordering for
//! comic book archives, and post-order child finalization.

pub mod archive;
pub mod office;
pub mod pdf;

use crate::config::Settings;
use crate::core::bus::EventBus;
use crate::core::events::{
    ContainerFinalizeCompleteEvent, ContainerFinalizeErrorEvent, ContainerFinalizeStartEvent,
};
use crate::core::formats::ContainerFormat;
use crate::core::fs_util::file_size;
use crate::core::registry::Processor;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An in-progress container operation.
///
/// The job exclusively owns `temp_dir` and everything beneath it until
/// `finalize` removes the tree. Dropping a job removes any scratch
/// directory a finalize did not get to (panic and early-error backstop).
#[derive(Debug)]
pub struct ContainerJob {
    /// The input container on disk.
    pub original_path: PathBuf,
    /// Exclusively-owned scratch directory under the system temp root.
    pub temp_dir: PathBuf,
    /// Detected container format.
    pub format: ContainerFormat,
    /// Extracted leaf files (absolute paths inside `temp_dir`).
    pub file_list: Vec<PathBuf>,
    /// Nested containers discovered during `prepare`, in discovery order.
    pub children: Vec<ContainerJob>,
}

impl ContainerJob {
    /// Empty job for a container that failed to extract; finalize performs
    /// no commit on it.
    pub fn empty(original_path: PathBuf, temp_dir: PathBuf, format: ContainerFormat) -> Self {
        Self {
            original_path,
            temp_dir,
            format,
            file_list: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Collect every leaf file in this job's subtree, paired with the
    /// original path of the container it was extracted from.
    pub fn collect_leaves(&self, out: &mut Vec<(PathBuf, PathBuf)>) {
        for file in &self.file_list {
            out.push((file.clone(), self.original_path.clone()));
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }
}

impl Drop for ContainerJob {
    fn drop(&mut self) {
        if self.temp_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.temp_dir) {
                log::warn!(
                    target: "container",
                    "can't remove temp dir {}: {}",
                    self.temp_dir.display(),
                    e
                );
            }
        }
    }
}

/// Shared context for the finalize pass.
pub struct FinalizeContext<'a> {
    pub settings: &'a Settings,
    pub bus: &'a EventBus,
}

/// Create a unique scratch directory `<system_temp>/<prefix>_<rand>`.
pub fn make_temp_dir(prefix: &str) -> crate::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!(
        "{}_{}",
        prefix,
        uuid::Uuid::new_v4().simple()
    ));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Sanitize an archive entry name against path traversal.
///
/// Backslashes normalize to `/`, leading slashes are stripped, and the
/// lexically-normalized target must stay inside `dest_dir`. Entries with
/// NUL bytes, drive prefixes, or `..` escapes yield `None`.
pub fn sanitize_entry_path(entry_name: &str, dest_dir: &Path) -> Option<PathBuf> {
    if entry_name.is_empty() || entry_name.contains('\0') {
        return None;
    }

    let normalized = entry_name.replace('\\', "/");
    let trimmed = normalized.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    for comp in trimmed.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                // any escape above the extraction root is hostile
                if parts.pop().is_none() {
                    return None;
                }
            }
            c if c.contains(':') => return None,
            c => parts.push(c),
        }
    }
    if parts.is_empty() {
        return None;
    }

    let mut out = dest_dir.to_path_buf();
    for part in parts {
        out.push(part);
    }
    Some(out)
}

/// Natural (numeric-aware) comparison of archive-relative paths.
///
/// Digit runs compare as numbers with leading zeros insignificant, so
/// `page2.png` sorts before `page10.png`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ab = a.as_bytes();
    let bb = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < ab.len() && j < bb.len() {
        if ab[i].is_ascii_digit() && bb[j].is_ascii_digit() {
            let di = ab[i..].iter().take_while(|c| c.is_ascii_digit()).count();
            let dj = bb[j..].iter().take_while(|c| c.is_ascii_digit()).count();
            let na = a[i..i + di].trim_start_matches('0');
            let nb = b[j..j + dj].trim_start_matches('0');
            let ord = na
                .len()
                .cmp(&nb.len())
                .then_with(|| na.cmp(nb));
            if ord != Ordering::Equal {
                return ord;
            }
            i += di;
            j += dj;
        } else {
            if ab[i] != bb[j] {
                return ab[i].cmp(&bb[j]);
            }
            i += 1;
            j += 1;
        }
    }
    a.len().cmp(&b.len())
}

/// Archive-relative path of `p` under `root`, forward-slash separated.
pub fn relative_entry_name(root: &Path, p: &Path) -> String {
    let rel = p.strip_prefix(root).unwrap_or(p);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        parts.join("/")
    }
}

/// Dispatch a container format to its family handler.
pub fn handler_for(format: ContainerFormat) -> Arc<dyn Processor> {
    if format.is_office() {
        Arc::new(office::OfficeZipProcessor::new())
    } else if format == ContainerFormat::Pdf {
        Arc::new(pdf::PdfProcessor::new())
    } else {
        Arc::new(archive::ArchiveProcessor::new())
    }
}

/// Finalize all children of `job` depth-first, publishing the per-child
/// finalize events. A child failure aborts the parent.
pub fn finalize_children(job: &ContainerJob, ctx: &FinalizeContext) -> crate::Result<()> {
    for child in &job.children {
        ctx.bus.publish(&ContainerFinalizeStartEvent {
            path: child.original_path.clone(),
        });
        let size_before = file_size(&child.original_path);
        let handler = handler_for(child.format);
        match handler.finalize(child, ctx) {
            Ok(()) => {
                ctx.bus.publish(&ContainerFinalizeCompleteEvent {
                    path: child.original_path.clone(),
                    format: child.format,
                    original_size: size_before,
                    final_size: file_size(&child.original_path),
                });
            }
            Err(e) => {
                log::error!(
                    target: "container",
                    "finalize failed for nested container {}: {}",
                    child.original_path.display(),
                    e
                );
                ctx.bus.publish(&ContainerFinalizeErrorEvent {
                    path: child.original_path.clone(),
                    error_message: e.to_string(),
                });
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Remove a job's scratch directory, logging (not failing) on error.
pub fn cleanup_temp_dir(temp_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(temp_dir) {
        if temp_dir.exists() {
            log::warn!(
                target: "container",
                "can't remove temp dir {}: {}",
                temp_dir.display(),
                e
            );
        }
    } else {
        log::debug!(target: "container", "removed temp dir {}", temp_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_accepts_nested_entries() {
        let dest = Path::new("/tmp/x");
        assert_eq!(
            sanitize_entry_path("a/b/c.txt", dest),
            Some(PathBuf::from("/tmp/x/a/b/c.txt"))
        );
        assert_eq!(
            sanitize_entry_path("a/./b.txt", dest),
            Some(PathBuf::from("/tmp/x/a/b.txt"))
        );
        // interior .. that stays inside the root is allowed
        assert_eq!(
            sanitize_entry_path("a/../b.txt", dest),
            Some(PathBuf::from("/tmp/x/b.txt"))
        );
    }

    #[test]
    fn test_sanitize_normalizes_separators_and_leading_slash() {
        let dest = Path::new("/tmp/x");
        assert_eq!(
            sanitize_entry_path("a\\b\\c.txt", dest),
            Some(PathBuf::from("/tmp/x/a/b/c.txt"))
        );
        assert_eq!(
            sanitize_entry_path("/etc/passwd", dest),
            Some(PathBuf::from("/tmp/x/etc/passwd"))
        );
    }

    #[test]
    fn test_sanitize_rejects_escapes() {
        let dest = Path::new("/tmp/x");
        assert_eq!(sanitize_entry_path("../evil.bin", dest), None);
        assert_eq!(sanitize_entry_path("a/../../evil.bin", dest), None);
        assert_eq!(sanitize_entry_path("..\\evil.bin", dest), None);
        assert_eq!(sanitize_entry_path("", dest), None);
        assert_eq!(sanitize_entry_path("a\0b", dest), None);
        assert_eq!(sanitize_entry_path("C:/windows/evil", dest), None);
        assert_eq!(sanitize_entry_path("/", dest), None);
        assert_eq!(sanitize_entry_path("..", dest), None);
    }

    #[test]
    fn test_natural_cmp_numeric_runs() {
        assert_eq!(natural_cmp("page2.png", "page10.png"), Ordering::Less);
        // leading zeros are insignificant; ties break on total length
        assert_eq!(natural_cmp("page010.png", "page10.png"), Ordering::Greater);
        assert_eq!(natural_cmp("02.png", "2.png"), Ordering::Greater);
        assert_eq!(natural_cmp("a1b2", "a1b10"), Ordering::Less);
        assert_eq!(natural_cmp("abc", "abd"), Ordering::Less);
        assert_eq!(natural_cmp("abc", "abc"), Ordering::Equal);
    }

    #[test]
    fn test_natural_sort_of_pages() {
        let mut names = vec![
            "ch1/page10.png",
            "ch1/page2.png",
            "ch1/page1.png",
            "ch10/page1.png",
            "ch2/page1.png",
        ];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec![
                "ch1/page1.png",
                "ch1/page2.png",
                "ch1/page10.png",
                "ch2/page1.png",
                "ch10/page1.png",
            ]
        );
    }

    #[test]
    fn test_relative_entry_name() {
        let root = Path::new("/tmp/work");
        assert_eq!(
            relative_entry_name(root, Path::new("/tmp/work/a/b.txt")),
            "a/b.txt"
        );
        assert_eq!(
            relative_entry_name(root, Path::new("/tmp/work/top.txt")),
            "top.txt"
        );
    }

    #[test]
    fn test_make_temp_dir_and_job_drop_cleanup() {
        let dir = make_temp_dir("archive").unwrap();
        assert!(dir.exists());
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("archive_"));

        let marker = dir.join("inner.txt");
        fs::write(&marker, b"x").unwrap();
        {
            let _job = ContainerJob::empty(
                PathBuf::from("/nonexistent/a.zip"),
                dir.clone(),
                ContainerFormat::Zip,
            );
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_collect_leaves_pairs_files_with_parent() {
        let t1 = TempDir::new().unwrap();
        let t2 = TempDir::new().unwrap();
        let mut parent = ContainerJob::empty(
            PathBuf::from("/in/outer.zip"),
            t1.path().join("scratch_outer"),
            ContainerFormat::Zip,
        );
        fs::create_dir_all(&parent.temp_dir).unwrap();
        let mut child = ContainerJob::empty(
            PathBuf::from("/in/inner.zip"),
            t2.path().join("scratch_inner"),
            ContainerFormat::Zip,
        );
        fs::create_dir_all(&child.temp_dir).unwrap();

        parent.file_list.push(parent.temp_dir.join("a.png"));
        child.file_list.push(child.temp_dir.join("b.png"));
        parent.children.push(child);

        let mut leaves = Vec::new();
        parent.collect_leaves(&mut leaves);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].1, PathBuf::from("/in/outer.zip"));
        assert_eq!(leaves[1].1, PathBuf::from("/in/inner.zip"));
    }
}
