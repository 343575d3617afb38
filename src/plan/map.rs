//! Registry of build plans
//!
//! Each project directory is loaded at most once per session. Plans refer to
//! one another by [`PlanId`], so the prerequisite graph needs no shared
//! ownership.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use super::BuildPlan;

/// Handle of a plan inside its [`BuildMap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanId(usize);

/// Canonical project path → plan
#[derive(Debug, Default)]
pub struct BuildMap {
    plans: Vec<BuildPlan>,
    index: HashMap<PathBuf, PlanId>,
}

impl BuildMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan registered for `project_path`, if any
    pub fn lookup(&self, project_path: &Path) -> Option<PlanId> {
        self.index.get(project_path).copied()
    }

    /// Register a plan under its project path
    ///
    /// The first registration for a path wins; registering the same path again
    /// hands back the existing id and drops `plan`.
    pub fn insert(&mut self, plan: BuildPlan) -> PlanId {
        if let Some(id) = self.lookup(plan.project_path()) {
            return id;
        }
        let id = PlanId(self.plans.len());
        self.index.insert(plan.project_path().to_path_buf(), id);
        self.plans.push(plan);
        id
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Plans in registration order
    pub fn iter(&self) -> impl Iterator<Item = (PlanId, &BuildPlan)> {
        self.plans.iter().enumerate().map(|(i, plan)| (PlanId(i), plan))
    }

    /// Deepest directory containing every registered project
    pub fn common_prefix(&self) -> Option<PathBuf> {
        common_prefix(self.plans.iter().map(BuildPlan::project_path))
    }
}

impl Index<PlanId> for BuildMap {
    type Output = BuildPlan;

    fn index(&self, id: PlanId) -> &BuildPlan {
        &self.plans[id.0]
    }
}

impl IndexMut<PlanId> for BuildMap {
    fn index_mut(&mut self, id: PlanId) -> &mut BuildPlan {
        &mut self.plans[id.0]
    }
}

/// Longest shared leading path of `paths`, compared component-wise
pub fn common_prefix<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut paths = paths.into_iter();
    let mut prefix: PathBuf = paths.next()?.to_path_buf();
    for path in paths {
        let shared: PathBuf = prefix
            .components()
            .zip(path.components())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();
        prefix = shared;
    }
    Some(prefix)
}
