//! Persistent dependency cache
//!
//! Remembers, per source file, the module produced by its last dependency
//! analysis. An entry is only handed back while it still describes the files
//! on disk: the analysis command must be unchanged and neither the source nor
//! any recorded dependency may have been modified since the entry was taken.
//!
//! The cache file is plain JSON next to the project's modules. A missing or
//! unreadable file is not an error; the project is simply analysed again.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::module::{modified, Module};

/// Schema version of the cache file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier of the cache file
pub const SCHEMA_ID: &str = "mach/dependency_cache@1";

/// File name of the cache inside a module directory
pub const CACHE_FILE_NAME: &str = "dependency.cache";

/// One cached analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub module: Module,

    /// SHA-256 of the analysis command that produced the module
    pub command_digest: String,

    /// When the analysis was started
    pub analysed_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_current(&self, command_digest: &str) -> bool {
        if self.command_digest != command_digest {
            return false;
        }
        self.module.inputs().all(|input| match modified(input) {
            Some(time) => DateTime::<Utc>::from(time) <= self.analysed_at,
            None => false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    schema_version: u32,
    schema_id: String,
    entries: Vec<CacheEntry>,
}

/// Source path → module map backed by one file
#[derive(Debug)]
pub struct DependencyCache {
    path: PathBuf,
    entries: BTreeMap<PathBuf, CacheEntry>,
    changed: bool,
}

/// SHA-256 hex digest of an analysis command line
pub fn command_digest(command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    hex::encode(hasher.finalize())
}

impl DependencyCache {
    /// Location of the cache file for a module directory
    pub fn cache_path(module_dir: &Path) -> PathBuf {
        module_dir.join(CACHE_FILE_NAME)
    }

    /// Load the cache at `path`, starting empty if it is absent or corrupt
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read(&path) {
            Ok(Some(file)) => file
                .entries
                .into_iter()
                .map(|entry| (entry.module.source_path.clone(), entry))
                .collect(),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable dependency cache");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "dependency cache opened");
        Self {
            path,
            entries,
            changed: false,
        }
    }

    fn read(path: &Path) -> io::Result<Option<CacheFile>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let file: CacheFile = serde_json::from_str(&text)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if file.schema_version != SCHEMA_VERSION || file.schema_id != SCHEMA_ID {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported schema {}", file.schema_id),
            ));
        }
        Ok(Some(file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached module for `source`, if the entry still matches the files on disk
    ///
    /// `analyse_command` is the command that would analyse the source now.
    pub fn lookup(&self, source: &Path, analyse_command: &str) -> Option<Module> {
        let entry = self.entries.get(source)?;
        if entry.is_current(&command_digest(analyse_command)) {
            debug!(source = %source.display(), "dependency cache hit");
            Some(entry.module.clone())
        } else {
            debug!(source = %source.display(), "dependency cache entry stale");
            None
        }
    }

    /// Record `module`, replacing any previous entry for its source
    pub fn insert(&mut self, module: Module, analyse_command: &str, analysed_at: DateTime<Utc>) {
        let entry = CacheEntry {
            command_digest: command_digest(analyse_command),
            analysed_at,
            module,
        };
        self.entries.insert(entry.module.source_path.clone(), entry);
        self.changed = true;
    }

    /// Write pending changes to disk
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.changed {
            return Ok(());
        }
        let file = CacheFile {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            entries: self.entries.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = self.path.with_extension("cache.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        self.changed = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "dependency cache written");
        Ok(())
    }
}
