//! Source pattern expansion
//!
//! Patterns are matched against paths relative to the project directory.
//! `*` stays inside one path component; `**` crosses directories. Hidden
//! directories (module directories included) are never searched.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::{DirEntry, WalkDir};

use super::BuildError;

/// Expand `patterns` into source files under `project_dir`
///
/// Results keep pattern order; matches of one pattern are sorted. A file
/// matched by several patterns is listed once.
pub fn expand_sources(project_dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, BuildError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let matchers = patterns
        .iter()
        .map(|pattern| compile(pattern))
        .collect::<Result<Vec<GlobMatcher>, BuildError>>()?;

    let mut walker = WalkDir::new(project_dir).min_depth(1).sort_by_file_name();
    if let Some(depth) = search_depth(patterns) {
        walker = walker.max_depth(depth);
    }
    let files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(project_dir)
                .ok()
                .map(Path::to_path_buf)
        })
        .collect();

    let mut sources: Vec<PathBuf> = Vec::new();
    for matcher in &matchers {
        let mut matched: Vec<PathBuf> = files
            .iter()
            .filter(|relative| matcher.is_match(relative))
            .map(|relative| project_dir.join(relative))
            .collect();
        matched.sort();
        for path in matched {
            if !sources.contains(&path) {
                sources.push(path);
            }
        }
    }
    Ok(sources)
}

fn compile(pattern: &str) -> Result<GlobMatcher, BuildError> {
    GlobBuilder::new(pattern.trim_start_matches("./"))
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| BuildError::SourcePattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Deepest directory level any pattern can reach, `None` if unbounded
fn search_depth(patterns: &[String]) -> Option<usize> {
    let mut depth = 0;
    for pattern in patterns {
        if pattern.contains("**") {
            return None;
        }
        depth = depth.max(pattern.trim_start_matches("./").split('/').count());
    }
    Some(depth)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('.')
}
