//! Build session: drives plans through their phases
//!
//! Every phase is run at most once per plan. `prepare` discovers the
//! prerequisite graph, `analyse` finds each source's dependencies, `build`
//! compiles stale modules and links, `clean` removes what was produced.
//! Prerequisites always finish a phase before their dependents start it.
//!
//! Jobs of one plan's phase run concurrently on a [`JobScheduler`]; the phase
//! does not return before every job it scheduled has been collected.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use mach_jobs::{default_concurrency, Job, JobId, JobScheduler};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{BuildError, BuildMap, BuildPlan, Phase, PlanId};
use crate::cache::DependencyCache;
use crate::config::ProjectKind;
use crate::module::Module;
use crate::toolchain::ToolChain;

use super::sources::expand_sources;

/// Inputs of a build session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding the top-level recipe
    pub project_dir: PathBuf,
    /// Directory outputs and module directories are written to
    pub build_dir: PathBuf,
    /// Recipe values given on the command line, applied to the top-level project
    pub overrides: Option<Value>,
    /// Number of concurrent jobs
    pub jobs: usize,
    /// Raised to stop scheduling new jobs
    pub interrupt: Option<Arc<AtomicBool>>,
}

impl SessionConfig {
    pub fn new(project_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            build_dir: build_dir.into(),
            overrides: None,
            jobs: default_concurrency(),
            interrupt: None,
        }
    }

    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Compile,
    Link,
}

/// All plans reachable from one top-level project
pub struct BuildSession {
    toolchain: Arc<dyn ToolChain>,
    map: BuildMap,
    root: PlanId,
    build_dir: PathBuf,
    jobs: usize,
    interrupt: Arc<AtomicBool>,
}

impl BuildSession {
    /// Load the top-level project
    pub fn new(toolchain: Arc<dyn ToolChain>, config: SessionConfig) -> Result<Self, BuildError> {
        let project = fs::canonicalize(&config.project_dir).map_err(|source| BuildError::ProjectPath {
            path: config.project_dir.clone(),
            source,
        })?;
        let build_dir = std::path::absolute(&config.build_dir).map_err(|source| BuildError::Io {
            action: "resolve build directory",
            path: config.build_dir.clone(),
            source,
        })?;

        let plan = BuildPlan::load(project, build_dir.clone(), config.overrides, None, toolchain.as_ref())?;
        let mut map = BuildMap::new();
        let root = map.insert(plan);

        Ok(Self {
            toolchain,
            map,
            root,
            build_dir,
            jobs: config.jobs.max(1),
            interrupt: config.interrupt.unwrap_or_default(),
        })
    }

    pub fn root(&self) -> PlanId {
        self.root
    }

    pub fn map(&self) -> &BuildMap {
        &self.map
    }

    pub fn plan(&self, id: PlanId) -> &BuildPlan {
        &self.map[id]
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Run the whole build for the top-level project
    ///
    /// Prepares, analyses and then either cleans or builds. Returns whether
    /// the build succeeded.
    pub fn run(&mut self, clean: bool) -> Result<bool, BuildError> {
        let root = self.root;
        self.prepare(root)?;

        let plan = &self.map[root];
        if plan.options().bootstrap {
            eprintln!(
                "#!/bin/sh -ex\nSOURCE=$1\nMACHINE=$({})\n",
                self.toolchain.machine_command()
            );
        }
        info!(project = %plan.project_path().display(), plans = self.map.len(), "prepared");

        if !self.analyse(root)? {
            return Ok(false);
        }
        if clean {
            self.clean(root)?;
            return Ok(true);
        }
        self.build(root)
    }

    /// Resolve `use` entries, register prerequisites and expand sources
    pub fn prepare(&mut self, id: PlanId) -> Result<(), BuildError> {
        match self.map[id].phases.prepare {
            Phase::Done(()) => return Ok(()),
            Phase::Running => {
                return Err(BuildError::CyclicPrerequisite(self.map[id].project_path().to_path_buf()))
            }
            Phase::NotStarted => {}
        }
        self.map[id].phases.prepare = Phase::Running;
        let result = self.prepare_plan(id);
        self.map[id].phases.prepare = match result {
            Ok(()) => Phase::Done(()),
            Err(_) => Phase::NotStarted,
        };
        result
    }

    fn prepare_plan(&mut self, id: PlanId) -> Result<(), BuildError> {
        let project = self.map[id].project_path().to_path_buf();
        let uses = self.map[id].recipe().string_list("use")?;

        for entry in uses {
            let path = project.join(&entry);
            let path = fs::canonicalize(&path).map_err(|source| BuildError::ProjectPath { path, source })?;
            let prerequisite = self.plan_for(path, id)?;
            self.prepare(prerequisite)?;

            let (kind, name, dir) = {
                let p = &self.map[prerequisite];
                (p.kind(), p.name().to_string(), p.project_path().to_path_buf())
            };
            let plan = &mut self.map[id];
            if kind == ProjectKind::Library {
                plan.add_include_path(dir);
                plan.add_library_path(self.build_dir.clone());
                plan.add_library(name);
            }
            plan.add_prerequisite(prerequisite);
        }

        let patterns = self.map[id].recipe().string_list("source")?;
        let sources = if self.map[id].kind() == ProjectKind::Package {
            Vec::new()
        } else {
            expand_sources(&project, &patterns)?
        };
        debug!(project = %project.display(), sources = sources.len(), "sources expanded");
        self.map[id].set_sources(sources);
        Ok(())
    }

    /// Plan for `path`, loading it with `parent`'s global options if new
    fn plan_for(&mut self, path: PathBuf, parent: PlanId) -> Result<PlanId, BuildError> {
        if let Some(id) = self.map.lookup(&path) {
            return Ok(id);
        }
        let options = *self.map[parent].options();
        let plan = BuildPlan::load(
            path,
            self.build_dir.clone(),
            None,
            Some(&options),
            self.toolchain.as_ref(),
        )?;
        Ok(self.map.insert(plan))
    }

    fn assign_module_dir(&mut self, id: PlanId) {
        let prefix = self
            .map
            .common_prefix()
            .unwrap_or_else(|| self.map[id].project_path().to_path_buf());
        let machine = self.toolchain.machine().to_string();
        self.map[id].assign_module_dir(&prefix, &machine);
    }

    /// Determine every module of the plan and its prerequisites
    ///
    /// Cached results are reused; the rest are analysed concurrently.
    /// Returns false if any analysis failed.
    pub fn analyse(&mut self, id: PlanId) -> Result<bool, BuildError> {
        match self.map[id].phases.analyse {
            Phase::Done(ok) => return Ok(ok),
            Phase::Running => {
                return Err(BuildError::CyclicPrerequisite(self.map[id].project_path().to_path_buf()))
            }
            Phase::NotStarted => {}
        }
        self.map[id].phases.analyse = Phase::Running;
        let result = self.analyse_plan(id);
        self.map[id].phases.analyse = match result {
            Ok(ok) => Phase::Done(ok),
            Err(_) => Phase::NotStarted,
        };
        result
    }

    fn analyse_plan(&mut self, id: PlanId) -> Result<bool, BuildError> {
        self.assign_module_dir(id);
        for prerequisite in self.map[id].prerequisites().to_vec() {
            if !self.analyse(prerequisite)? {
                return Ok(false);
            }
        }
        if self.map[id].kind() == ProjectKind::Package {
            return Ok(true);
        }

        let toolchain = Arc::clone(&self.toolchain);
        let plan = &self.map[id];
        let options = *plan.options();
        plan.mkdir(plan.module_dir())?;

        let mut cache = DependencyCache::open(DependencyCache::cache_path(plan.module_dir()));
        let mut modules: Vec<Option<Module>> = vec![None; plan.sources().len()];
        let mut pending: HashMap<JobId, (usize, String)> = HashMap::new();
        let mut scheduler: Option<JobScheduler> = None;
        let analysed_at = Utc::now();
        let mut ok = true;

        for (i, source) in plan.sources().iter().enumerate() {
            let mut job = toolchain.analyse_job(plan, source);
            if !options.blindfold {
                if let Some(module) = cache.lookup(source, job.command()) {
                    modules[i] = Some(module);
                    continue;
                }
            }
            if options.dry_run {
                if options.verbose {
                    plan.echo(job.command());
                }
                job.finish(0, String::new());
                modules[i] = Some(toolchain.finish_analyse_job(plan, source, &job));
                continue;
            }
            if self.interrupted() {
                warn!(project = %plan.project_path().display(), "interrupted, not analysing further sources");
                ok = false;
                break;
            }
            let command = job.command().to_string();
            let scheduler = scheduler.get_or_insert_with(|| JobScheduler::new(self.jobs));
            pending.insert(scheduler.schedule(job), (i, command));
        }

        if let Some(mut scheduler) = scheduler {
            while let Some(job) = scheduler.collect()? {
                let Some((i, command)) = pending.remove(&job.id()) else {
                    continue;
                };
                if !job.succeeded() {
                    report_failure(plan, &job);
                    ok = false;
                    continue;
                }
                if options.verbose {
                    plan.echo(job.command());
                }
                let module = toolchain.finish_analyse_job(plan, &plan.sources()[i], &job);
                cache.insert(module.clone(), &command, analysed_at);
                modules[i] = Some(module);
            }
        }

        if let Err(e) = cache.flush() {
            warn!(path = %cache.path().display(), error = %e, "failed to write dependency cache");
        }
        if !ok {
            return Ok(false);
        }

        let modules: Vec<Module> = modules.into_iter().flatten().collect();
        debug!(project = %plan.project_path().display(), modules = modules.len(), "analysed");
        self.map[id].set_modules(modules);
        Ok(true)
    }

    /// Compile stale modules and link, prerequisites first
    ///
    /// Returns false if any command failed.
    pub fn build(&mut self, id: PlanId) -> Result<bool, BuildError> {
        match self.map[id].phases.build {
            Phase::Done(ok) => return Ok(ok),
            Phase::Running => {
                return Err(BuildError::CyclicPrerequisite(self.map[id].project_path().to_path_buf()))
            }
            Phase::NotStarted => {}
        }
        self.map[id].phases.build = Phase::Running;
        let result = self.build_plan(id);
        self.map[id].phases.build = match result {
            Ok(ok) => Phase::Done(ok),
            Err(_) => Phase::NotStarted,
        };
        result
    }

    fn build_plan(&mut self, id: PlanId) -> Result<bool, BuildError> {
        for prerequisite in self.map[id].prerequisites().to_vec() {
            if !self.build(prerequisite)? {
                return Ok(false);
            }
        }

        let toolchain = Arc::clone(&self.toolchain);
        let plan = &self.map[id];
        let kind = plan.kind();
        if kind == ProjectKind::Package {
            return Ok(true);
        }
        let options = *plan.options();
        let recipe_path = plan.recipe().path();

        let mut pending: HashMap<JobId, (usize, Stage)> = HashMap::new();
        let mut scheduler: Option<JobScheduler> = None;
        let mut ok = true;
        let mut any_dirty = false;

        for (i, module) in plan.modules().iter().enumerate() {
            let mut dirty = options.blindfold || module.is_dirty(Some(recipe_path));
            if kind == ProjectKind::ToolSet {
                dirty = dirty || plan.modified(&toolchain.tool_path(plan, module)).is_none();
            }
            if !dirty {
                continue;
            }
            any_dirty = true;

            let job = toolchain.compile_job(plan, module);
            if options.dry_run {
                plan.echo(job.command());
                if kind == ProjectKind::ToolSet {
                    plan.echo(toolchain.link_job(plan, module).command());
                }
                continue;
            }
            if self.interrupted() {
                warn!(project = %plan.project_path().display(), "interrupted, not compiling further modules");
                ok = false;
                break;
            }
            let scheduler = scheduler.get_or_insert_with(|| JobScheduler::new(self.jobs));
            pending.insert(scheduler.schedule(job), (i, Stage::Compile));
        }

        if let Some(mut scheduler) = scheduler {
            while let Some(job) = scheduler.collect()? {
                let Some((i, stage)) = pending.remove(&job.id()) else {
                    continue;
                };
                plan.echo(job.command());
                if !job.output().is_empty() {
                    print!("{}", job.output());
                }
                if !job.succeeded() {
                    eprintln!("mach: job failed: {}", job.outcome());
                    ok = false;
                    continue;
                }
                if ok && stage == Stage::Compile && kind == ProjectKind::ToolSet && !self.interrupted() {
                    let link = toolchain.link_job(plan, &plan.modules()[i]);
                    pending.insert(scheduler.schedule(link), (i, Stage::Link));
                }
            }
        }

        if !ok {
            return Ok(false);
        }
        if kind == ProjectKind::ToolSet {
            return Ok(true);
        }

        let target = toolchain.link_path(plan);
        let linked_at = if any_dirty { None } else { plan.modified(&target) };
        if let Some(linked_at) = linked_at {
            let module_newer = plan
                .modules()
                .iter()
                .any(|m| plan.modified(&m.module_path).map_or(true, |t| t > linked_at));
            let recipe_newer = plan.modified(recipe_path).is_some_and(|t| t > linked_at);
            if !module_newer && !recipe_newer {
                debug!(target = %target.display(), "up to date");
                return Ok(true);
            }
        }
        if self.interrupted() {
            return Ok(false);
        }
        toolchain.link(plan)
    }

    /// Remove every artifact of the plan and its prerequisites
    ///
    /// Packages produce nothing and are only recursed through.
    pub fn clean(&mut self, id: PlanId) -> Result<(), BuildError> {
        match self.map[id].phases.clean {
            Phase::Done(()) => return Ok(()),
            Phase::Running => {
                return Err(BuildError::CyclicPrerequisite(self.map[id].project_path().to_path_buf()))
            }
            Phase::NotStarted => {}
        }
        self.map[id].phases.clean = Phase::Running;
        let result = self.clean_plan(id);
        self.map[id].phases.clean = match result {
            Ok(()) => Phase::Done(()),
            Err(_) => Phase::NotStarted,
        };
        result
    }

    fn clean_plan(&mut self, id: PlanId) -> Result<(), BuildError> {
        for prerequisite in self.map[id].prerequisites().to_vec() {
            self.clean(prerequisite)?;
        }
        if self.map[id].phases.analyse == Phase::NotStarted {
            self.assign_module_dir(id);
        }

        let plan = &self.map[id];
        if plan.kind() == ProjectKind::Package {
            return Ok(());
        }
        self.toolchain.clean(plan)?;
        plan.unlink(&DependencyCache::cache_path(plan.module_dir()))?;
        plan.rmdir(plan.module_dir())
    }
}

fn report_failure(plan: &BuildPlan, job: &Job) {
    eprintln!("{}", plan.beautify_command(job.command()));
    if !job.output().is_empty() {
        eprint!("{}", job.output());
    }
    eprintln!("mach: job failed: {}", job.outcome());
}
