//! Per-source-file build metadata
//!
//! A module ties one source file to the object file it compiles into and the
//! headers it was found to include. Its staleness is decided purely from
//! file modification times.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Modification time of `path`, `None` if it does not exist
pub fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Build metadata for one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Canonical source file path
    pub source_path: PathBuf,

    /// Compiled artifact path inside the project's module directory
    pub module_path: PathBuf,

    /// Files the source depends on, the source itself excluded
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
}

impl Module {
    pub fn new(source_path: impl Into<PathBuf>, module_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            module_path: module_path.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<PathBuf>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Source followed by every dependency
    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.source_path.as_path()).chain(self.dependencies.iter().map(PathBuf::as_path))
    }

    /// Whether the module must be recompiled
    ///
    /// True if the artifact is missing, or if the source, any dependency or
    /// the recipe file is newer than it. A missing input also counts as
    /// newer. A missing recipe file is ignored.
    pub fn is_dirty(&self, recipe_path: Option<&Path>) -> bool {
        let Some(artifact) = modified(&self.module_path) else {
            return true;
        };
        let input_newer = self
            .inputs()
            .any(|input| modified(input).map_or(true, |t| t > artifact));
        if input_newer {
            return true;
        }
        recipe_path
            .and_then(modified)
            .map_or(false, |t| t > artifact)
    }
}
