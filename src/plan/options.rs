//! Per-project build options
//!
//! Global options are chosen once for the whole build and forced onto every
//! prerequisite. `static` and the project kind belong to each project.

use serde_json::Value;

use crate::config::Recipe;

/// Named option flags and optimization levels of one project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Link libraries statically
    pub static_link: bool,
    pub debug: bool,
    pub release: bool,
    /// Print commands instead of running them
    pub dry_run: bool,
    /// Pretend no file exists, so everything is rebuilt
    pub blindfold: bool,
    /// Emit a standalone shell script (implies dry run and blindfold)
    pub bootstrap: bool,
    pub verbose: bool,
    /// Speed optimization level, if enabled
    pub optimize_speed: Option<u32>,
    /// Size optimization level, if enabled
    pub optimize_size: Option<u32>,
}

impl BuildOptions {
    /// Read options from a recipe
    ///
    /// `optimize-speed`/`optimize-size` take an explicit level when given an
    /// integer and fall back to the toolchain defaults otherwise.
    pub fn from_recipe(recipe: &Recipe, default_speed_level: u32, default_size_level: u32) -> Self {
        let bootstrap = recipe.flag("bootstrap");
        Self {
            static_link: recipe.flag("static"),
            debug: recipe.flag("debug"),
            release: recipe.flag("release"),
            dry_run: recipe.flag("dry-run") || bootstrap,
            blindfold: recipe.flag("blindfold") || bootstrap,
            bootstrap,
            verbose: recipe.flag("verbose"),
            optimize_speed: optimization_level(recipe.value("optimize-speed"), default_speed_level),
            optimize_size: optimization_level(recipe.value("optimize-size"), default_size_level),
        }
    }

    /// Replace every global option with the parent's
    pub fn inherit_global(&mut self, parent: &BuildOptions) {
        let static_link = self.static_link;
        *self = *parent;
        self.static_link = static_link;
    }
}

fn optimization_level(value: Option<&Value>, default: u32) -> Option<u32> {
    match value {
        None | Some(Value::Bool(false)) => None,
        Some(v) => Some(
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(default),
        ),
    }
}
