//! mach - incremental multi-project build orchestrator
//!
//! A project is a directory with a `Recipe` file naming its sources and the
//! projects it uses. Starting from one project, mach discovers every
//! prerequisite, analyses sources for header dependencies (reusing a
//! persistent cache), compiles what is stale on a pool of worker threads and
//! links the results.

pub mod cache;
pub mod config;
pub mod module;
pub mod plan;
pub mod signal;
pub mod toolchain;

pub use cache::DependencyCache;
pub use config::{ConfigError, ProjectKind, Recipe};
pub use module::Module;
pub use plan::{BuildError, BuildMap, BuildOptions, BuildPlan, BuildSession, PlanId, SessionConfig};
pub use toolchain::{GccToolChain, ToolChain};

pub use mach_jobs::{Job, JobId, JobScheduler};
