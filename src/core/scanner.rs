//! Input expansion: files, directories and stdin into a flat path list.
//!
//! Exclude patterns run first; include patterns, when configured, require
//! at least one match. Invalid regexes are reported once and treated as
//! non-matching. Junk files (`._*` resource forks, `.DS_Store`,
//! `desktop.ini`) are dropped, and the final list is deduplicated while
//! preserving discovery order.

use crate::config::Settings;
use crate::error::OptiPackError;
use regex::Regex;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expand user inputs into an ordered, deduplicated list of regular files.
///
/// `-` drains stdin into a temp file; at most one `-` per invocation.
pub fn collect_input_files(inputs: &[PathBuf], settings: &Settings) -> crate::Result<Vec<PathBuf>> {
    let excludes = compile_patterns(&settings.exclude_patterns, "exclude");
    let includes = compile_patterns(&settings.include_patterns, "include");
    let include_configured = !settings.include_patterns.is_empty();

    let mut result = Vec::new();
    let mut seen = HashSet::new();
    let mut stdin_taken = false;

    for input in inputs {
        if input.to_str() == Some("-") {
            if stdin_taken {
                return Err(OptiPackError::config(
                    "stdin ('-') may be given at most once",
                ));
            }
            stdin_taken = true;
            let tmp = drain_stdin()?;
            push_unique(&mut result, &mut seen, tmp);
            continue;
        }

        if !input.exists() {
            log::error!(target: "scanner", "input not found: {}", input.display());
            continue;
        }

        if input.is_dir() {
            let walker = if settings.recursive {
                WalkDir::new(input)
            } else {
                WalkDir::new(input).max_depth(1)
            };
            for entry in walker.sort_by(|a, b| a.file_name().cmp(b.file_name())) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log::warn!(target: "scanner", "walk error: {}", e);
                        continue;
                    }
                };
                if entry.file_type().is_file()
                    && !is_junk(entry.path())
                    && !is_filtered(entry.path(), &excludes, &includes, include_configured)
                {
                    push_unique(&mut result, &mut seen, entry.path().to_path_buf());
                }
            }
        } else if input.is_file()
            && !is_junk(input)
            && !is_filtered(input, &excludes, &includes, include_configured)
        {
            push_unique(&mut result, &mut seen, input.clone());
        }
    }

    log::info!(
        target: "scanner",
        "scanner collected {} files",
        result.len()
    );
    Ok(result)
}

fn push_unique(result: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>, path: PathBuf) {
    let key = path.canonicalize().unwrap_or_else(|_| path.clone());
    if seen.insert(key) {
        result.push(path);
    }
}

fn drain_stdin() -> crate::Result<PathBuf> {
    let tmp = std::env::temp_dir().join(format!(
        "stdin_optipack_{}.bin",
        uuid::Uuid::new_v4().simple()
    ));
    let mut data = Vec::new();
    std::io::stdin().read_to_end(&mut data)?;
    std::fs::write(&tmp, data)?;
    Ok(tmp)
}

/// Compile a pattern list, warning once per invalid regex.
fn compile_patterns(patterns: &[String], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!(target: "scanner", "invalid {} regex: {} ({})", kind, p, e);
                None
            }
        })
        .collect()
}

fn is_junk(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with("._") {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    lower == ".ds_store" || lower == "desktop.ini"
}

fn is_filtered(
    path: &Path,
    excludes: &[Regex],
    includes: &[Regex],
    include_configured: bool,
) -> bool {
    let path_str = path.to_string_lossy();

    if excludes.iter().any(|re| re.is_match(&path_str)) {
        return true;
    }

    if include_configured {
        return !includes.iter().any(|re| re.is_match(&path_str));
    }

    false
}
