//! mach CLI
//!
//! Entry point for the `mach` command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mach_build::plan::{BuildError, BuildSession, SessionConfig};
use mach_build::signal::{self, SignalState, EXIT_CODE_INTERRUPTED};
use mach_build::GccToolChain;
use serde_json::{json, Map, Value};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mach")]
#[command(about = "Incremental multi-project build orchestrator", version)]
struct Cli {
    /// Project directory containing a Recipe (default: current directory)
    projects: Vec<PathBuf>,

    /// Build with debug information
    #[arg(long)]
    debug: bool,

    /// Build with NDEBUG defined
    #[arg(long)]
    release: bool,

    /// Link libraries statically
    #[arg(long = "static")]
    static_link: bool,

    /// Print commands without running them
    #[arg(long)]
    dry_run: bool,

    /// Ignore existing files and rebuild everything
    #[arg(long)]
    blindfold: bool,

    /// Print a standalone shell script that builds the project
    #[arg(long)]
    bootstrap: bool,

    /// Echo every analysis command
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Optimize for speed, optionally at the given level
    #[arg(long, value_name = "LEVEL", num_args = 0..=1)]
    optimize_speed: Option<Option<u32>>,

    /// Optimize for size, optionally at the given level
    #[arg(long, value_name = "LEVEL", num_args = 0..=1)]
    optimize_size: Option<Option<u32>>,

    /// Remove build outputs instead of building
    #[arg(long, short = 'c')]
    clean: bool,

    /// Number of concurrent jobs (default: available parallelism)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// C compiler driver (default: $CC or cc)
    #[arg(long)]
    cc: Option<String>,

    /// C++ compiler driver (default: $CXX or c++)
    #[arg(long)]
    cxx: Option<String>,

    /// Directory outputs are written to (default: current directory)
    #[arg(long, short = 'C', default_value = ".")]
    build_dir: PathBuf,
}

impl Cli {
    /// Recipe values set on the command line
    fn overrides(&self) -> Value {
        let mut values = Map::new();
        let flags = [
            ("debug", self.debug),
            ("release", self.release),
            ("static", self.static_link),
            ("dry-run", self.dry_run),
            ("blindfold", self.blindfold),
            ("bootstrap", self.bootstrap),
            ("verbose", self.verbose),
        ];
        for (key, set) in flags {
            if set {
                values.insert(key.to_string(), Value::Bool(true));
            }
        }
        for (key, level) in [
            ("optimize-speed", self.optimize_speed),
            ("optimize-size", self.optimize_size),
        ] {
            match level {
                Some(Some(n)) => {
                    values.insert(key.to_string(), json!(n));
                }
                Some(None) => {
                    values.insert(key.to_string(), Value::Bool(true));
                }
                None => {}
            }
        }
        Value::Object(values)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mach=warn,mach_build=warn")))
        .init();

    let signals = Arc::new(SignalState::new());
    if let Err(e) = signal::install(Arc::clone(&signals)) {
        warn!(error = %e, "cannot install interrupt handler");
    }

    match run(cli, &signals) {
        Ok(_) if signals.is_interrupted() => ExitCode::from(EXIT_CODE_INTERRUPTED as u8),
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("mach: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, signals: &SignalState) -> Result<bool, BuildError> {
    if cli.projects.len() > 1 {
        return Err(BuildError::MultipleProjects);
    }
    let project = cli.projects.first().cloned().unwrap_or_else(|| PathBuf::from("."));

    let cc = cli
        .cc
        .clone()
        .or_else(|| std::env::var("CC").ok())
        .unwrap_or_else(|| "cc".to_string());
    let cxx = cli
        .cxx
        .clone()
        .or_else(|| std::env::var("CXX").ok())
        .unwrap_or_else(|| "c++".to_string());
    let toolchain = GccToolChain::detect(cc, cxx);

    let mut config = SessionConfig::new(project, cli.build_dir.clone())
        .with_overrides(cli.overrides())
        .with_interrupt(signals.flag());
    if let Some(jobs) = cli.jobs {
        config = config.with_jobs(jobs);
    }

    let mut session = BuildSession::new(Arc::new(toolchain), config)?;
    session.run(cli.clean)
}
