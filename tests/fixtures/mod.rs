//! Shared fixtures for integration tests
//!
//! Builds throwaway project trees in a temporary directory and provides a
//! toolchain whose commands are plain POSIX utilities, so full builds run
//! without a compiler:
//! - analysis prints the `#include "..."` names of a source
//! - compiling touches the module, failing if the source has a `#fail` line
//! - linking touches the output

#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use mach_build::plan::{BuildError, BuildPlan, BuildSession, SessionConfig};
use mach_build::{Job, Module, ProjectKind, ToolChain};

/// Temporary tree holding projects and a build directory
pub struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        Self { _dir: dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Create `name/Recipe` with the given TOML
    pub fn project(&self, name: &str, recipe: &str) -> PathBuf {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Recipe"), recipe).unwrap();
        dir
    }

    /// Write a file relative to the workspace root
    pub fn file(&self, path: &str, contents: &str) -> PathBuf {
        let path = self.root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn session(&self, project: &str, toolchain: &Arc<CountingToolChain>) -> BuildSession {
        self.session_with(project, toolchain, serde_json::json!({}))
    }

    pub fn session_with(
        &self,
        project: &str,
        toolchain: &Arc<CountingToolChain>,
        overrides: serde_json::Value,
    ) -> BuildSession {
        self.try_session(project, toolchain, overrides).unwrap()
    }

    pub fn try_session(
        &self,
        project: &str,
        toolchain: &Arc<CountingToolChain>,
        overrides: serde_json::Value,
    ) -> Result<BuildSession, BuildError> {
        self.session_with_jobs(project, toolchain, overrides, 2)
    }

    /// Session running one job at a time, so jobs finish in source order
    pub fn serial_session(&self, project: &str, toolchain: &Arc<CountingToolChain>) -> BuildSession {
        self.session_with_jobs(project, toolchain, serde_json::json!({}), 1)
            .unwrap()
    }

    fn session_with_jobs(
        &self,
        project: &str,
        toolchain: &Arc<CountingToolChain>,
        overrides: serde_json::Value,
        jobs: usize,
    ) -> Result<BuildSession, BuildError> {
        let config = SessionConfig::new(self.root.join(project), self.build_dir())
            .with_overrides(overrides)
            .with_jobs(jobs);
        let toolchain: Arc<dyn ToolChain> = toolchain.clone();
        BuildSession::new(toolchain, config)
    }
}

/// Move a file's modification time into the future
pub fn touch_later(path: &Path) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

/// Move a file's modification time into the past
pub fn touch_earlier(path: &Path) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(60))
        .unwrap();
}

/// Snapshot of how much work a toolchain was asked to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub analysed: usize,
    pub compiled: usize,
    pub tools_linked: usize,
    pub linked: usize,
}

/// Shell-utility toolchain counting the work it hands out
#[derive(Debug, Default)]
pub struct CountingToolChain {
    analysed: AtomicUsize,
    compiled: AtomicUsize,
    tools_linked: AtomicUsize,
    linked: AtomicUsize,
}

impl CountingToolChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn counts(&self) -> Counts {
        Counts {
            analysed: self.analysed.load(Ordering::SeqCst),
            compiled: self.compiled.load(Ordering::SeqCst),
            tools_linked: self.tools_linked.load(Ordering::SeqCst),
            linked: self.linked.load(Ordering::SeqCst),
        }
    }
}

impl ToolChain for CountingToolChain {
    fn machine(&self) -> &str {
        "test-machine"
    }

    fn machine_command(&self) -> String {
        "echo test-machine".to_string()
    }

    fn default_speed_optimization_level(&self) -> u32 {
        2
    }

    fn default_size_optimization_level(&self) -> u32 {
        1
    }

    fn analyse_job(&self, _plan: &BuildPlan, source: &Path) -> Job {
        Job::new(format!(
            r#"! grep -q '^#broken' {src} && sed -n 's/^#include "\(.*\)"$/\1/p' {src}"#,
            src = source.display()
        ))
    }

    fn finish_analyse_job(&self, plan: &BuildPlan, source: &Path, job: &Job) -> Module {
        self.analysed.fetch_add(1, Ordering::SeqCst);
        let dir = source.parent().unwrap_or(Path::new("/"));
        let dependencies = job
            .output()
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| dir.join(line))
            .collect();
        Module::new(source, plan.module_file(source, "o")).with_dependencies(dependencies)
    }

    fn compile_job(&self, _plan: &BuildPlan, module: &Module) -> Job {
        self.compiled.fetch_add(1, Ordering::SeqCst);
        Job::new(format!(
            "! grep -q '^#fail' {} && touch {}",
            module.source_path.display(),
            module.module_path.display()
        ))
    }

    fn link_job(&self, plan: &BuildPlan, module: &Module) -> Job {
        self.tools_linked.fetch_add(1, Ordering::SeqCst);
        Job::new(format!("touch {}", self.tool_path(plan, module).display()))
    }

    fn tool_path(&self, plan: &BuildPlan, module: &Module) -> PathBuf {
        let stem = module.source_path.file_stem().unwrap_or_default();
        plan.build_dir().join(stem)
    }

    fn link_path(&self, plan: &BuildPlan) -> PathBuf {
        match plan.kind() {
            ProjectKind::Library => plan.build_dir().join(format!("lib{}.a", plan.name())),
            _ => plan.build_dir().join(plan.name()),
        }
    }

    fn link(&self, plan: &BuildPlan) -> Result<bool, BuildError> {
        self.linked.fetch_add(1, Ordering::SeqCst);
        plan.mkdir(plan.build_dir())?;
        Ok(plan.run_build(&format!("touch {}", self.link_path(plan).display())))
    }

    fn clean(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        for module in plan.modules() {
            plan.unlink(&module.module_path)?;
            if plan.kind() == ProjectKind::ToolSet {
                plan.unlink(&self.tool_path(plan, module))?;
            }
        }
        plan.unlink(&self.link_path(plan))
    }
}
