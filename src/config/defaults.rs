//! Built-in recipe defaults (layer 1)

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Values every recipe starts from before its own file is applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDefaults {
    /// Project kind (default: "Application")
    pub kind: String,

    /// Version string appended to module directories and library names
    pub version: String,

    /// Source glob patterns
    pub source: Vec<String>,

    /// Prerequisite project paths
    pub uses: Vec<String>,
}

impl Default for RecipeDefaults {
    fn default() -> Self {
        Self {
            kind: "Application".to_string(),
            version: String::new(),
            source: Vec::new(),
            uses: Vec::new(),
        }
    }
}

impl RecipeDefaults {
    /// Convert to a JSON value for merging
    pub fn to_value(&self) -> Value {
        json!({
            "kind": self.kind,
            "version": self.version,
            "source": self.source,
            "use": self.uses,
            "include-path": [],
            "link-path": [],
            "link": [],
        })
    }
}
