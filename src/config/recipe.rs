//! Project recipes
//!
//! A recipe is the declarative description of one project. It lives in a
//! TOML file named `Recipe` at the project root:
//!
//! ```toml
//! kind = "Library"
//! name = "core"
//! version = "1.2.0"
//! source = ["*.cpp"]
//! use = ["../support"]
//! optimize-speed = 2
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults::RecipeDefaults;
use super::merge::merge_layers;

/// File name of a project recipe inside its directory
pub const RECIPE_FILE_NAME: &str = "Recipe";

/// What a project produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectKind {
    /// One executable linked from all modules
    Application,
    /// A static or shared library other projects can link against
    Library,
    /// One executable per source file
    ToolSet,
    /// No sources, groups prerequisites
    Package,
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectKind::Application => "Application",
            ProjectKind::Library => "Library",
            ProjectKind::ToolSet => "ToolSet",
            ProjectKind::Package => "Package",
        };
        f.write_str(name)
    }
}

impl FromStr for ProjectKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "application" => Ok(ProjectKind::Application),
            "library" => Ok(ProjectKind::Library),
            "toolset" => Ok(ProjectKind::ToolSet),
            "package" => Ok(ProjectKind::Package),
            _ => Err(ConfigError::UnsupportedKind(s.to_string())),
        }
    }
}

/// Layer that contributed to a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeLayer {
    Builtin,
    File,
    Cli,
}

/// Errors reading or interpreting a recipe
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no recipe found at {0}")]
    MissingRecipe(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("recipe key `{key}` must be {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("unsupported project kind: {0}")]
    UnsupportedKind(String),
}

/// Merged, read-only view of one project's recipe
#[derive(Debug, Clone)]
pub struct Recipe {
    path: PathBuf,
    values: Value,
    layers: Vec<RecipeLayer>,
}

impl Recipe {
    /// Load `<project_dir>/Recipe` and apply optional overrides on top
    pub fn load(project_dir: &Path, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let path = project_dir.join(RECIPE_FILE_NAME);
        if !path.is_file() {
            return Err(ConfigError::MissingRecipe(path));
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(path, &text, overrides)
    }

    /// Build a recipe from TOML text attributed to `path`
    pub fn parse(path: PathBuf, text: &str, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let file: Value = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let mut layers = vec![RecipeLayer::Builtin, RecipeLayer::File];
        let mut values = vec![RecipeDefaults::default().to_value(), file];
        if let Some(cli) = overrides {
            layers.push(RecipeLayer::Cli);
            values.push(cli);
        }

        Ok(Self {
            path,
            values: merge_layers(values),
            layers,
        })
    }

    /// Path of the recipe file, used for staleness comparisons
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layers(&self) -> &[RecipeLayer] {
        &self.layers
    }

    /// Raw value of a key; explicit nulls count as absent
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// True only if the key is set to boolean true
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.value(key), Some(Value::Bool(true)))
    }

    pub fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                expected: "a string",
            }),
        }
    }

    /// A list of strings; a single string is accepted as a one-element list
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            expected: "a string or a list of strings",
        };
        match self.value(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
                .collect(),
            Some(_) => Err(invalid()),
        }
    }

    pub fn kind(&self) -> Result<ProjectKind, ConfigError> {
        match self.string("kind")? {
            Some(kind) => kind.parse(),
            None => Ok(ProjectKind::Application),
        }
    }
}
