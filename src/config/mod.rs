//! Recipe configuration
//!
//! A project's effective recipe is assembled from three layers, later layers
//! winning:
//! 1. Built-in recipe defaults
//! 2. The project's `Recipe` file (TOML)
//! 3. Command-line overrides (root project only)

mod defaults;
mod merge;
mod recipe;

pub use defaults::RecipeDefaults;
pub use merge::{deep_merge, merge_layers};
pub use recipe::{ConfigError, ProjectKind, Recipe, RecipeLayer, RECIPE_FILE_NAME};
