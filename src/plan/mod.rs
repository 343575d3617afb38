//! Build plans
//!
//! A [`BuildPlan`] is the in-memory state of one project: its recipe, the
//! options it is built with, the sources it compiles and the modules those
//! sources produce. Plans live in a [`BuildMap`] and are driven through their
//! phases by a [`BuildSession`].
//!
//! The filesystem helpers on a plan echo the equivalent shell command and do
//! nothing else in dry-run mode, which is how bootstrap scripts are produced.

mod map;
mod options;
mod session;
mod sources;

pub use map::{common_prefix, BuildMap, PlanId};
pub use options::BuildOptions;
pub use session::{BuildSession, SessionConfig};
pub use sources::expand_sources;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mach_jobs::{Job, JobError};
use tracing::debug;

use crate::config::{ConfigError, ProjectKind, Recipe};
use crate::module::{self, Module};
use crate::toolchain::{quote, ToolChain, MACHINE_VARIABLE};

/// Errors that abort a build outright
///
/// Failing compiler or linker commands are not errors; they make a phase
/// report failure instead.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("processing multiple recipes at once is not supported")]
    MultipleProjects,

    #[error("cyclic prerequisite involving {0}")]
    CyclicPrerequisite(PathBuf),

    #[error("cannot resolve project {path}: {source}")]
    ProjectPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid source pattern `{pattern}`: {source}")]
    SourcePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Jobs(#[from] JobError),
}

/// Progress of one phase on one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase<T> {
    NotStarted,
    Running,
    Done(T),
}

/// Phase memo of one plan
#[derive(Debug)]
pub(crate) struct PhaseState {
    pub(crate) prepare: Phase<()>,
    pub(crate) analyse: Phase<bool>,
    pub(crate) build: Phase<bool>,
    pub(crate) clean: Phase<()>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            prepare: Phase::NotStarted,
            analyse: Phase::NotStarted,
            build: Phase::NotStarted,
            clean: Phase::NotStarted,
        }
    }
}

/// In-memory state of one project
#[derive(Debug)]
pub struct BuildPlan {
    project_path: PathBuf,
    build_dir: PathBuf,
    recipe: Recipe,
    kind: ProjectKind,
    name: String,
    version: String,
    options: BuildOptions,

    include_paths: Vec<PathBuf>,
    library_paths: Vec<PathBuf>,
    libraries: Vec<String>,

    sources: Vec<PathBuf>,
    modules: Vec<Module>,
    prerequisites: Vec<PlanId>,

    source_prefix: PathBuf,
    module_dir: PathBuf,

    pub(crate) phases: PhaseState,
}

impl BuildPlan {
    /// Load the plan for `project_path` from its recipe
    ///
    /// `project_path` must already be canonical. When `parent` is given its
    /// global options replace this project's own.
    pub fn load(
        project_path: PathBuf,
        build_dir: PathBuf,
        overrides: Option<serde_json::Value>,
        parent: Option<&BuildOptions>,
        toolchain: &dyn ToolChain,
    ) -> Result<Self, BuildError> {
        let recipe = Recipe::load(&project_path, overrides)?;
        let kind = recipe.kind()?;
        let name = match recipe.string("name")? {
            Some(name) if !name.is_empty() => name,
            _ => project_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string()),
        };
        let version = recipe.string("version")?.unwrap_or_default();

        let mut options = BuildOptions::from_recipe(
            &recipe,
            toolchain.default_speed_optimization_level(),
            toolchain.default_size_optimization_level(),
        );
        if let Some(parent) = parent {
            options.inherit_global(parent);
        }

        let resolve = |entry: String| -> PathBuf {
            let path = PathBuf::from(entry);
            if path.is_absolute() {
                path
            } else {
                project_path.join(path)
            }
        };
        let include_paths = recipe
            .string_list("include-path")?
            .into_iter()
            .map(resolve)
            .collect();
        let library_paths = recipe
            .string_list("link-path")?
            .into_iter()
            .map(resolve)
            .collect();
        let libraries = recipe.string_list("link")?;

        debug!(project = %project_path.display(), %kind, %name, layers = ?recipe.layers(), "plan loaded");
        Ok(Self {
            source_prefix: project_path.clone(),
            module_dir: build_dir.clone(),
            project_path,
            build_dir,
            recipe,
            kind,
            name,
            version,
            options,
            include_paths,
            library_paths,
            libraries,
            sources: Vec::new(),
            modules: Vec::new(),
            prerequisites: Vec::new(),
            phases: PhaseState::default(),
        })
    }

    /// Canonical project directory
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Directory final outputs are written to
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn kind(&self) -> ProjectKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    pub fn library_paths(&self) -> &[PathBuf] {
        &self.library_paths
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Modules in source order, populated by a successful analyse
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn prerequisites(&self) -> &[PlanId] {
        &self.prerequisites
    }

    /// Per-configuration directory holding compiled modules and the cache
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Whether a library is linked statically
    pub fn is_static(&self) -> bool {
        self.options.static_link
    }

    /// Artifact path for `source` inside the module directory
    ///
    /// The path relative to the project is flattened with `_`, so sources
    /// sharing a file name in different directories do not collide.
    pub fn module_file(&self, source: &Path, extension: &str) -> PathBuf {
        let relative = source.strip_prefix(&self.project_path).unwrap_or(source);
        let mut flat = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("_");
        if !extension.is_empty() {
            flat.push('.');
            flat.push_str(extension);
        }
        self.module_dir.join(flat)
    }

    pub(crate) fn add_include_path(&mut self, path: PathBuf) {
        if !self.include_paths.contains(&path) {
            self.include_paths.push(path);
        }
    }

    pub(crate) fn add_library_path(&mut self, path: PathBuf) {
        if !self.library_paths.contains(&path) {
            self.library_paths.push(path);
        }
    }

    pub(crate) fn add_library(&mut self, name: String) {
        if !self.libraries.contains(&name) {
            self.libraries.push(name);
        }
    }

    pub(crate) fn add_prerequisite(&mut self, id: PlanId) {
        if !self.prerequisites.contains(&id) {
            self.prerequisites.push(id);
        }
    }

    pub(crate) fn set_sources(&mut self, sources: Vec<PathBuf>) {
        self.sources = sources;
    }

    pub(crate) fn set_modules(&mut self, modules: Vec<Module>) {
        self.modules = modules;
    }

    /// Derive the module directory name from the configuration
    ///
    /// `.modules-<path parts below the common prefix>[-<version>][-static]`
    /// `[-debug][-release][-optimize-speed-N][-optimize-size-N]-<machine>`.
    pub(crate) fn assign_module_dir(&mut self, source_prefix: &Path, machine: &str) {
        let mut parts: Vec<String> = Vec::new();
        if let Some(name) = source_prefix.file_name() {
            parts.push(name.to_string_lossy().into_owned());
        }
        if let Ok(relative) = self.project_path.strip_prefix(source_prefix) {
            parts.extend(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned()),
            );
        }

        let mut name = format!(".modules-{}", parts.join("_"));
        if !self.version.is_empty() {
            name.push('-');
            name.push_str(&self.version);
        }
        if self.options.static_link {
            name.push_str("-static");
        }
        if self.options.debug {
            name.push_str("-debug");
        }
        if self.options.release {
            name.push_str("-release");
        }
        if let Some(level) = self.options.optimize_speed {
            name.push_str(&format!("-optimize-speed-{level}"));
        }
        if let Some(level) = self.options.optimize_size {
            name.push_str(&format!("-optimize-size-{level}"));
        }
        name.push('-');
        if self.options.bootstrap {
            name.push_str(MACHINE_VARIABLE);
        } else {
            name.push_str(machine);
        }

        self.source_prefix = source_prefix.to_path_buf();
        self.module_dir = self.build_dir.join(name);
    }

    /// Rewrite a command for bootstrap scripts
    ///
    /// The source tree becomes `$SOURCE` and the build directory `$PWD`, so
    /// the script runs from any checkout.
    pub fn beautify_command(&self, command: &str) -> String {
        if !self.options.bootstrap {
            return command.to_string();
        }
        let source = self.source_prefix.to_string_lossy().into_owned();
        let build = self.build_dir.to_string_lossy().into_owned();
        let mut rewrites = [(source, "$SOURCE"), (build, "$PWD")];
        // The more specific prefix goes first when one tree contains the other.
        rewrites.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut out = command.to_string();
        for (prefix, variable) in &rewrites {
            if !prefix.is_empty() && prefix != "/" {
                out = out.replace(prefix.as_str(), variable);
            }
        }
        out
    }

    /// Print a command the way the user should see it
    pub fn echo(&self, command: &str) {
        eprintln!("{}", self.beautify_command(command));
    }

    /// Run one build command synchronously, echoing it first
    ///
    /// Returns whether the command succeeded; in dry-run mode it is only
    /// printed and counts as a success.
    pub fn run_build(&self, command: &str) -> bool {
        self.echo(command);
        if self.options.dry_run {
            return true;
        }
        let mut job = Job::new(command);
        mach_jobs::execute(&mut job);
        if !job.output().is_empty() {
            print!("{}", job.output());
        }
        if !job.succeeded() {
            eprintln!("mach: `{}` failed: {}", command, job.outcome());
        }
        job.succeeded()
    }

    /// Modification time of `path`; nothing exists while blindfolded
    pub fn modified(&self, path: &Path) -> Option<SystemTime> {
        if self.options.blindfold {
            return None;
        }
        module::modified(path)
    }

    /// Create a directory and its parents
    pub fn mkdir(&self, path: &Path) -> Result<(), BuildError> {
        if !self.options.blindfold && path.is_dir() {
            return Ok(());
        }
        self.echo(&format!("mkdir -p {}", quote(path)));
        if self.options.dry_run {
            return Ok(());
        }
        fs::create_dir_all(path).map_err(|source| BuildError::Io {
            action: "create directory",
            path: path.to_path_buf(),
            source,
        })
    }

    /// Remove a directory and everything left in it
    pub fn rmdir(&self, path: &Path) -> Result<(), BuildError> {
        if !path.exists() {
            return Ok(());
        }
        self.echo(&format!("rm -rf {}", quote(path)));
        if self.options.dry_run {
            return Ok(());
        }
        fs::remove_dir_all(path).map_err(|source| BuildError::Io {
            action: "remove directory",
            path: path.to_path_buf(),
            source,
        })
    }

    /// Remove a file or symbolic link if present
    pub fn unlink(&self, path: &Path) -> Result<(), BuildError> {
        if fs::symlink_metadata(path).is_err() {
            return Ok(());
        }
        self.echo(&format!("rm -f {}", quote(path)));
        if self.options.dry_run {
            return Ok(());
        }
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BuildError::Io {
                action: "remove",
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Point `link` at `target`, replacing whatever `link` was
    pub fn symlink(&self, target: &Path, link: &Path) -> Result<(), BuildError> {
        self.echo(&format!("ln -sf {} {}", quote(target), quote(link)));
        if self.options.dry_run {
            return Ok(());
        }
        let io_error = |source| BuildError::Io {
            action: "link",
            path: link.to_path_buf(),
            source,
        };
        if fs::symlink_metadata(link).is_ok() {
            fs::remove_file(link).map_err(io_error)?;
        }
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link).map_err(io_error)
        }
        #[cfg(not(unix))]
        {
            let target = link.parent().map_or_else(|| target.to_path_buf(), |dir| dir.join(target));
            fs::copy(&target, link).map(|_| ()).map_err(io_error)
        }
    }
}
