//! Filesystem helpers shared by the orchestrator and container engine.
//!
//! The commit rule lives here: a rebuilt file replaces its original only
//! when the new file exists, is non-empty, and is strictly smaller (or the
//! original was empty). Everything else is discarded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Outcome of applying the commit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The candidate replaced the original.
    Replaced,
    /// The candidate would have replaced the original, but dry-run is on;
    /// the candidate was deleted and the original left untouched.
    DryRun,
    /// No size improvement; the candidate was deleted.
    NoImprovement,
}

/// Size of a file in bytes, 0 when unreadable.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Sibling temp path for a leaf rewrite: `<file>.tmp`.
pub fn leaf_tmp_path(file: &Path) -> PathBuf {
    let mut os = file.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Sibling temp path for a container rebuild: `<stem>_tmp.<ext>` in the
/// original's parent directory.
pub fn container_tmp_path(original: &Path, ext: &str) -> PathBuf {
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("container");
    let parent = original.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}_tmp.{}", stem, ext))
}

/// Apply the universal commit rule.
///
/// Replace `original` with `candidate` iff the candidate exists, has
/// nonzero size, and is strictly smaller than the original (or the
/// original had zero size). On any other outcome, and on every failure
/// path, the candidate is deleted.
pub fn commit_if_smaller(
    original: &Path,
    candidate: &Path,
    dry_run: bool,
) -> io::Result<CommitOutcome> {
    let orig_size = file_size(original);
    let new_size = file_size(candidate);

    let improves = candidate.exists() && new_size > 0 && (orig_size == 0 || new_size < orig_size);
    if !improves {
        let _ = fs::remove_file(candidate);
        return Ok(CommitOutcome::NoImprovement);
    }

    if dry_run {
        let _ = fs::remove_file(candidate);
        return Ok(CommitOutcome::DryRun);
    }

    if let Err(e) = fs::rename(candidate, original) {
        let _ = fs::remove_file(candidate);
        return Err(e);
    }
    Ok(CommitOutcome::Replaced)
}
