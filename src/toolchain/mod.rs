//! Compiler toolchains
//!
//! A toolchain turns plans and modules into shell commands. It decides how
//! sources are analysed for dependencies, how modules are compiled and how a
//! project's final output is linked. The build phases never look inside the
//! commands; they only schedule them and read back status and output.

mod gcc;

pub use gcc::{parse_dependencies, GccToolChain};

use std::path::{Path, PathBuf};

use mach_jobs::Job;

use crate::module::Module;
use crate::plan::{BuildError, BuildPlan};

/// Placeholder for the target triple in bootstrap scripts
pub const MACHINE_VARIABLE: &str = "$MACHINE";

/// Quote a path for `sh` when it contains anything but plain characters
///
/// Quoted paths use double quotes so that [`MACHINE_VARIABLE`], and the
/// `$SOURCE` and `$PWD` prefixes bootstrap scripts substitute later, still
/// expand. Any other `$` is escaped.
pub fn quote(path: &Path) -> String {
    let text = path.to_string_lossy();
    let plain = text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+=,:@%".contains(c));
    if plain && !text.is_empty() {
        return text.into_owned();
    }

    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    let mut rest: &str = &text;
    while let Some(c) = rest.chars().next() {
        if rest.starts_with(MACHINE_VARIABLE) {
            quoted.push_str(MACHINE_VARIABLE);
            rest = &rest[MACHINE_VARIABLE.len()..];
            continue;
        }
        if matches!(c, '"' | '\\' | '`' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
        rest = &rest[c.len_utf8()..];
    }
    quoted.push('"');
    quoted
}

/// Command factory for one compiler family
pub trait ToolChain: Send + Sync {
    /// Target triple modules are built for
    fn machine(&self) -> &str;

    /// Shell command printing the target triple, used by bootstrap scripts
    fn machine_command(&self) -> String;

    /// Level used when speed optimization is enabled without one
    fn default_speed_optimization_level(&self) -> u32;

    /// Level used when size optimization is enabled without one
    fn default_size_optimization_level(&self) -> u32;

    /// Job printing the dependencies of `source`
    fn analyse_job(&self, plan: &BuildPlan, source: &Path) -> Job;

    /// Build the module for `source` from a finished analyse job
    ///
    /// In dry-run mode `job` was never run and carries empty output.
    fn finish_analyse_job(&self, plan: &BuildPlan, source: &Path, job: &Job) -> Module;

    /// Job compiling one module
    fn compile_job(&self, plan: &BuildPlan, module: &Module) -> Job;

    /// Job linking the executable of one ToolSet module
    fn link_job(&self, plan: &BuildPlan, module: &Module) -> Job;

    /// Executable produced from one ToolSet module
    fn tool_path(&self, plan: &BuildPlan, module: &Module) -> PathBuf;

    /// Final output of an Application or Library
    fn link_path(&self, plan: &BuildPlan) -> PathBuf;

    /// Link the project's final output; false if a command failed
    fn link(&self, plan: &BuildPlan) -> Result<bool, BuildError>;

    /// Remove every artifact the toolchain produced for the project
    fn clean(&self, plan: &BuildPlan) -> Result<(), BuildError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Toolchain whose commands are harmless shell builtins
    #[derive(Debug, Default)]
    pub(crate) struct StubToolChain;

    impl ToolChain for StubToolChain {
        fn machine(&self) -> &str {
            "stub-machine"
        }

        fn machine_command(&self) -> String {
            "echo stub-machine".to_string()
        }

        fn default_speed_optimization_level(&self) -> u32 {
            2
        }

        fn default_size_optimization_level(&self) -> u32 {
            1
        }

        fn analyse_job(&self, _plan: &BuildPlan, source: &Path) -> Job {
            Job::new(format!("echo {}", source.display()))
        }

        fn finish_analyse_job(&self, plan: &BuildPlan, source: &Path, _job: &Job) -> Module {
            Module::new(source, plan.module_file(source, "o"))
        }

        fn compile_job(&self, _plan: &BuildPlan, module: &Module) -> Job {
            Job::new(format!("touch {}", module.module_path.display()))
        }

        fn link_job(&self, plan: &BuildPlan, module: &Module) -> Job {
            Job::new(format!("touch {}", self.tool_path(plan, module).display()))
        }

        fn tool_path(&self, plan: &BuildPlan, module: &Module) -> PathBuf {
            plan.build_dir().join(module.source_path.file_stem().unwrap_or_default())
        }

        fn link_path(&self, plan: &BuildPlan) -> PathBuf {
            plan.build_dir().join(plan.name())
        }

        fn link(&self, plan: &BuildPlan) -> Result<bool, BuildError> {
            Ok(plan.run_build(&format!("touch {}", self.link_path(plan).display())))
        }

        fn clean(&self, plan: &BuildPlan) -> Result<(), BuildError> {
            for module in plan.modules() {
                plan.unlink(&module.module_path)?;
            }
            plan.unlink(&self.link_path(plan))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote(Path::new("/usr/include")), "/usr/include");
        assert_eq!(quote(Path::new("/my dir/a.c")), "\"/my dir/a.c\"");
        assert_eq!(quote(Path::new("/it's \"x\"")), "\"/it's \\\"x\\\"\"");
        assert_eq!(quote(Path::new("/a$b/`c`")), "\"/a\\$b/\\`c\\`\"");
    }

    #[test]
    fn test_quote_keeps_machine_variable() {
        assert_eq!(
            quote(Path::new("/out/.modules-app-$MACHINE/a.o")),
            "\"/out/.modules-app-$MACHINE/a.o\""
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_quoted_paths_survive_the_shell() {
        for text in ["/my dir/a.c", "/it's", "/a$b/\"c\"", "/back\\slash"] {
            let mut job = Job::new(format!("printf '%s' {}", quote(Path::new(text))));
            mach_jobs::execute(&mut job);
            assert!(job.succeeded());
            assert_eq!(job.output(), text);
        }
    }
}
