//! GCC-compatible toolchain
//!
//! Works with any compiler driver that understands the GCC command line
//! (gcc, g++, clang, clang++). Dependencies come from `-MM`, static libraries
//! are archived with `ar`.

use std::path::{Path, PathBuf};

use mach_jobs::Job;
use tracing::{debug, warn};

use super::{quote, ToolChain};
use crate::config::ProjectKind;
use crate::module::Module;
use crate::plan::{BuildError, BuildPlan};

/// Toolchain driving `cc` for C sources and `cxx` for everything else
#[derive(Debug, Clone)]
pub struct GccToolChain {
    cc: String,
    cxx: String,
    machine: String,
}

impl GccToolChain {
    /// Use the given drivers, asking `cc` for the target machine
    pub fn detect(cc: impl Into<String>, cxx: impl Into<String>) -> Self {
        let cc = cc.into();
        let mut job = Job::new(format!("{cc} -dumpmachine"));
        mach_jobs::execute(&mut job);
        let reported = job.output().trim();
        let machine = if job.succeeded() && !reported.is_empty() {
            reported.to_string()
        } else {
            let fallback = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);
            warn!(compiler = %cc, status = %job.outcome(), %fallback, "cannot query target machine");
            fallback
        };
        debug!(%machine, "toolchain target");
        Self::with_machine(cc, cxx, machine)
    }

    /// Use the given drivers and target without probing
    pub fn with_machine(cc: impl Into<String>, cxx: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            cc: cc.into(),
            cxx: cxx.into(),
            machine: machine.into(),
        }
    }

    fn compiler_for(&self, source: &Path) -> &str {
        match source.extension().and_then(|e| e.to_str()) {
            Some("c") => &self.cc,
            _ => &self.cxx,
        }
    }

    fn compile_flags(&self, plan: &BuildPlan) -> Vec<String> {
        let options = plan.options();
        let mut flags = Vec::new();
        if options.debug {
            flags.push("-g".to_string());
        }
        if options.release {
            flags.push("-DNDEBUG".to_string());
        }
        if let Some(level) = options.optimize_speed {
            flags.push(format!("-O{level}"));
        }
        if options.optimize_size.is_some() {
            flags.push("-Os".to_string());
        }
        if plan.kind() == ProjectKind::Library && !plan.is_static() {
            flags.push("-fPIC".to_string());
        }
        for path in plan.include_paths() {
            flags.push(format!("-I{}", quote(path)));
        }
        flags
    }

    fn link_flags(&self, plan: &BuildPlan) -> Vec<String> {
        let mut flags: Vec<String> = plan
            .library_paths()
            .iter()
            .map(|path| format!("-L{}", quote(path)))
            .collect();
        flags.extend(plan.libraries().iter().map(|lib| format!("-l{lib}")));
        flags
    }

    fn module_list(plan: &BuildPlan) -> String {
        plan.modules()
            .iter()
            .map(|m| quote(&m.module_path))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Symbolic links pointing at a versioned shared library, with their targets
    fn shared_aliases(&self, plan: &BuildPlan) -> Vec<(PathBuf, PathBuf)> {
        let version = plan.version();
        if version.is_empty() {
            return Vec::new();
        }
        let base = format!("lib{}.so", plan.name());
        let major = version.split('.').next().unwrap_or(version);
        let soname = format!("{base}.{major}");
        let full = format!("{base}.{version}");

        let mut aliases = Vec::new();
        if soname != full {
            aliases.push((plan.build_dir().join(&soname), PathBuf::from(&full)));
        }
        aliases.push((plan.build_dir().join(&base), PathBuf::from(soname)));
        aliases
    }
}

impl ToolChain for GccToolChain {
    fn machine(&self) -> &str {
        &self.machine
    }

    fn machine_command(&self) -> String {
        format!("{} -dumpmachine", self.cc)
    }

    fn default_speed_optimization_level(&self) -> u32 {
        2
    }

    fn default_size_optimization_level(&self) -> u32 {
        1
    }

    fn analyse_job(&self, plan: &BuildPlan, source: &Path) -> Job {
        let mut command = vec![self.compiler_for(source).to_string(), "-MM".to_string()];
        command.extend(self.compile_flags(plan));
        command.push(quote(source));
        Job::new(command.join(" "))
    }

    fn finish_analyse_job(&self, plan: &BuildPlan, source: &Path, job: &Job) -> Module {
        Module::new(source, plan.module_file(source, "o"))
            .with_dependencies(parse_dependencies(job.output(), source))
    }

    fn compile_job(&self, plan: &BuildPlan, module: &Module) -> Job {
        let mut command = vec![
            self.compiler_for(&module.source_path).to_string(),
            "-c".to_string(),
            "-o".to_string(),
            quote(&module.module_path),
        ];
        command.extend(self.compile_flags(plan));
        command.push(quote(&module.source_path));
        Job::new(command.join(" "))
    }

    fn link_job(&self, plan: &BuildPlan, module: &Module) -> Job {
        let mut command = vec![
            self.cxx.clone(),
            "-o".to_string(),
            quote(&self.tool_path(plan, module)),
            quote(&module.module_path),
        ];
        command.extend(self.link_flags(plan));
        Job::new(command.join(" "))
    }

    fn tool_path(&self, plan: &BuildPlan, module: &Module) -> PathBuf {
        let stem = module.source_path.file_stem().unwrap_or_default();
        plan.build_dir().join(stem)
    }

    fn link_path(&self, plan: &BuildPlan) -> PathBuf {
        let file = match plan.kind() {
            ProjectKind::Library if plan.is_static() => format!("lib{}.a", plan.name()),
            ProjectKind::Library if plan.version().is_empty() => format!("lib{}.so", plan.name()),
            ProjectKind::Library => format!("lib{}.so.{}", plan.name(), plan.version()),
            _ => plan.name().to_string(),
        };
        plan.build_dir().join(file)
    }

    fn link(&self, plan: &BuildPlan) -> Result<bool, BuildError> {
        let target = quote(&self.link_path(plan));
        let modules = Self::module_list(plan);
        let flags = self.link_flags(plan).join(" ");

        match plan.kind() {
            ProjectKind::Application => {
                let command = format!("{} -o {target} {modules} {flags}", self.cxx);
                Ok(plan.run_build(command.trim_end()))
            }
            ProjectKind::Library if plan.is_static() => {
                plan.unlink(&self.link_path(plan))?;
                Ok(plan.run_build(&format!("ar rcs {target} {modules}")))
            }
            ProjectKind::Library => {
                let soname = match plan.version().split('.').next() {
                    Some(major) if !major.is_empty() => format!("lib{}.so.{major}", plan.name()),
                    _ => format!("lib{}.so", plan.name()),
                };
                let command = format!(
                    "{} -shared -Wl,-soname,{soname} -o {target} {modules} {flags}",
                    self.cxx
                );
                if !plan.run_build(command.trim_end()) {
                    return Ok(false);
                }
                for (link, alias_target) in self.shared_aliases(plan) {
                    plan.symlink(&alias_target, &link)?;
                }
                Ok(true)
            }
            ProjectKind::ToolSet | ProjectKind::Package => Ok(true),
        }
    }

    fn clean(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        for module in plan.modules() {
            plan.unlink(&module.module_path)?;
            if plan.kind() == ProjectKind::ToolSet {
                plan.unlink(&self.tool_path(plan, module))?;
            }
        }
        match plan.kind() {
            ProjectKind::Application => plan.unlink(&self.link_path(plan)),
            ProjectKind::Library => {
                for (link, _) in self.shared_aliases(plan) {
                    plan.unlink(&link)?;
                }
                plan.unlink(&self.link_path(plan))
            }
            ProjectKind::ToolSet | ProjectKind::Package => Ok(()),
        }
    }
}

/// Dependencies listed by `-MM` output, `source` itself excluded
///
/// Only the first rule is read. Continuation lines are joined and `\ `
/// escapes a space inside a file name.
pub fn parse_dependencies(output: &str, source: &Path) -> Vec<PathBuf> {
    let joined = output.replace("\\\r\n", " ").replace("\\\n", " ");
    let Some(rule) = joined.lines().find(|line| !line.trim().is_empty()) else {
        return Vec::new();
    };
    let Some((_, prerequisites)) = rule.split_once(':') else {
        return Vec::new();
    };

    let mut dependencies: Vec<PathBuf> = Vec::new();
    let mut push = |token: &mut String| {
        if !token.is_empty() {
            let path = PathBuf::from(std::mem::take(token));
            if path != source && !dependencies.contains(&path) {
                dependencies.push(path);
            }
        }
    };

    let mut token = String::new();
    let mut chars = prerequisites.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&' ') => {
                token.push(' ');
                chars.next();
            }
            c if c.is_whitespace() => push(&mut token),
            c => token.push(c),
        }
    }
    push(&mut token);
    dependencies
}
