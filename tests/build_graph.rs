//! Prerequisite graph tests
//!
//! Covers discovery of `use` entries, sharing of prerequisites between
//! dependents, propagation of global options and phase ordering.

#![cfg(unix)]

mod fixtures;

use fixtures::{Counts, CountingToolChain, Workspace};
use mach_build::plan::BuildError;
use mach_build::ProjectKind;
use serde_json::json;

fn diamond(ws: &Workspace) {
    ws.project("app", "name = \"app\"\nsource = \"*.c\"\nuse = [\"../left\", \"../right\"]\n");
    ws.project("left", "kind = \"Library\"\nsource = \"*.c\"\nuse = \"../base\"\n");
    ws.project("right", "kind = \"Library\"\nsource = \"*.c\"\nuse = \"../base\"\n");
    ws.project("base", "kind = \"Library\"\nsource = \"*.c\"\n");
    ws.file("app/main.c", "");
    ws.file("left/left.c", "");
    ws.file("right/right.c", "");
    ws.file("base/base.c", "");
}

// =============================================================================
// Shared prerequisites
// =============================================================================

#[test]
fn test_diamond_prerequisite_built_once() {
    let ws = Workspace::new();
    diamond(&ws);
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("app", &toolchain);
    assert!(session.run(false).unwrap());

    assert_eq!(session.map().len(), 4);
    assert_eq!(
        toolchain.counts(),
        Counts {
            analysed: 4,
            compiled: 4,
            tools_linked: 0,
            linked: 4,
        }
    );
    for name in ["app", "libleft.a", "libright.a", "libbase.a"] {
        assert!(ws.build_dir().join(name).exists(), "{name} not linked");
    }
}

#[test]
fn test_phases_are_idempotent() {
    let ws = Workspace::new();
    diamond(&ws);
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("app", &toolchain);
    let root = session.root();
    assert!(session.run(false).unwrap());
    let after_first = toolchain.counts();

    session.prepare(root).unwrap();
    assert!(session.analyse(root).unwrap());
    assert!(session.build(root).unwrap());
    assert_eq!(session.map().len(), 4);
    assert_eq!(toolchain.counts(), after_first);
}

#[test]
fn test_library_prerequisite_feeds_dependent() {
    let ws = Workspace::new();
    diamond(&ws);
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("app", &toolchain);
    let root = session.root();
    session.prepare(root).unwrap();

    let app = session.plan(root);
    assert_eq!(app.libraries(), &["left".to_string(), "right".to_string()]);
    assert!(app.include_paths().contains(&ws.root().join("left")));
    assert!(app.include_paths().contains(&ws.root().join("right")));
    assert_eq!(app.library_paths(), &[ws.build_dir()]);

    let left = session.map().lookup(&ws.root().join("left")).unwrap();
    assert_eq!(session.plan(left).kind(), ProjectKind::Library);
    assert_eq!(session.plan(left).libraries(), &["base".to_string()]);
}

#[test]
fn test_application_prerequisite_adds_no_libraries() {
    let ws = Workspace::new();
    ws.project("app", "source = \"*.c\"\nuse = \"../gen\"\n");
    ws.project("gen", "kind = \"Application\"\nsource = \"*.c\"\n");
    ws.file("app/main.c", "");
    ws.file("gen/gen.c", "");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("app", &toolchain);
    let root = session.root();
    session.prepare(root).unwrap();

    let app = session.plan(root);
    assert_eq!(app.prerequisites().len(), 1);
    assert!(app.libraries().is_empty());
    assert!(app.library_paths().is_empty());
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn test_global_options_reach_prerequisites() {
    let ws = Workspace::new();
    diamond(&ws);
    ws.project("base", "kind = \"Library\"\nsource = \"*.c\"\ndebug = false\nstatic = true\n");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session_with("app", &toolchain, json!({"debug": true}));
    assert!(session.run(false).unwrap());

    let base = session.map().lookup(&ws.root().join("base")).unwrap();
    let plan = session.plan(base);
    assert!(plan.options().debug);
    assert!(plan.is_static());
    let module_dir = plan.module_dir().file_name().unwrap().to_string_lossy().into_owned();
    assert!(module_dir.contains("-static-debug-"), "{module_dir}");
    assert!(module_dir.ends_with("-test-machine"));
}

#[test]
fn test_module_dirs_are_distinct_per_project() {
    let ws = Workspace::new();
    diamond(&ws);
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("app", &toolchain);
    assert!(session.run(false).unwrap());

    let mut dirs: Vec<_> = session.map().iter().map(|(_, p)| p.module_dir().to_path_buf()).collect();
    dirs.sort();
    dirs.dedup();
    assert_eq!(dirs.len(), 4);
    assert!(dirs.iter().all(|d| d.starts_with(ws.build_dir())));
}

// =============================================================================
// Graph errors
// =============================================================================

#[test]
fn test_cycle_fails_before_any_job() {
    let ws = Workspace::new();
    ws.project("a", "source = \"*.c\"\nuse = \"../b\"\n");
    ws.project("b", "kind = \"Library\"\nsource = \"*.c\"\nuse = \"../a\"\n");
    ws.file("a/a.c", "");
    ws.file("b/b.c", "");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("a", &toolchain);
    let err = session.run(false).unwrap_err();
    assert!(matches!(err, BuildError::CyclicPrerequisite(_)));
    assert_eq!(toolchain.counts(), Counts::default());
}

#[test]
fn test_self_use_is_a_cycle() {
    let ws = Workspace::new();
    ws.project("a", "use = \".\"\n");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("a", &toolchain);
    assert!(matches!(
        session.run(false),
        Err(BuildError::CyclicPrerequisite(_))
    ));
}

#[test]
fn test_bad_recipe_in_prerequisite() {
    let ws = Workspace::new();
    ws.project("app", "use = \"../lib\"\n");
    ws.project("lib", "kind = \"Plugin\"\n");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("app", &toolchain);
    assert!(matches!(session.run(false), Err(BuildError::Config(_))));
}

#[test]
fn test_missing_recipe_is_config_error() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.root().join("empty")).unwrap();
    let toolchain = CountingToolChain::new();

    assert!(matches!(
        ws.try_session("empty", &toolchain, json!({})),
        Err(BuildError::Config(_))
    ));
}

// =============================================================================
// Packages and tool sets
// =============================================================================

#[test]
fn test_package_builds_prerequisites_only() {
    let ws = Workspace::new();
    ws.project("all", "kind = \"Package\"\nuse = [\"../one\", \"../two\"]\n");
    ws.project("one", "source = \"*.c\"\n");
    ws.project("two", "source = \"*.c\"\n");
    ws.file("one/one.c", "");
    ws.file("two/two.c", "");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("all", &toolchain);
    assert!(session.run(false).unwrap());
    assert_eq!(toolchain.counts().linked, 2);
    assert!(ws.build_dir().join("one").exists());
    assert!(ws.build_dir().join("two").exists());
    assert!(!ws.build_dir().join("all").exists());
}

#[test]
fn test_toolset_links_each_source() {
    let ws = Workspace::new();
    ws.project("tools", "kind = \"ToolSet\"\nsource = \"*.c\"\n");
    ws.file("tools/fmt.c", "");
    ws.file("tools/lint.c", "");
    let toolchain = CountingToolChain::new();

    let mut session = ws.session("tools", &toolchain);
    assert!(session.run(false).unwrap());

    let counts = toolchain.counts();
    assert_eq!(counts.compiled, 2);
    assert_eq!(counts.tools_linked, 2);
    assert_eq!(counts.linked, 0);
    assert!(ws.build_dir().join("fmt").exists());
    assert!(ws.build_dir().join("lint").exists());
}

#[test]
fn test_toolset_rebuilds_missing_tool() {
    let ws = Workspace::new();
    ws.project("tools", "kind = \"ToolSet\"\nsource = \"*.c\"\n");
    ws.file("tools/fmt.c", "");
    ws.file("tools/lint.c", "");
    let first = CountingToolChain::new();
    assert!(ws.session("tools", &first).run(false).unwrap());

    std::fs::remove_file(ws.build_dir().join("lint")).unwrap();
    let second = CountingToolChain::new();
    assert!(ws.session("tools", &second).run(false).unwrap());

    let counts = second.counts();
    assert_eq!(counts.compiled, 1);
    assert_eq!(counts.tools_linked, 1);
    assert!(ws.build_dir().join("lint").exists());
}

#[test]
fn test_toolset_failed_compile_is_not_linked() {
    let ws = Workspace::new();
    ws.project("tools", "kind = \"ToolSet\"\nsource = \"*.c\"\n");
    ws.file("tools/fmt.c", "");
    ws.file("tools/lint.c", "#fail\n");
    let toolchain = CountingToolChain::new();

    let mut session = ws.serial_session("tools", &toolchain);
    assert!(!session.run(false).unwrap());

    let counts = toolchain.counts();
    assert_eq!(counts.compiled, 2);
    assert_eq!(counts.tools_linked, 1);
    assert!(ws.build_dir().join("fmt").exists());
    assert!(!ws.build_dir().join("lint").exists());
}

#[test]
fn test_toolset_stops_linking_after_failure() {
    let ws = Workspace::new();
    ws.project("tools", "kind = \"ToolSet\"\nsource = \"*.c\"\n");
    ws.file("tools/fmt.c", "#fail\n");
    ws.file("tools/lint.c", "");
    let toolchain = CountingToolChain::new();

    let mut session = ws.serial_session("tools", &toolchain);
    assert!(!session.run(false).unwrap());

    let counts = toolchain.counts();
    assert_eq!(counts.compiled, 2);
    assert_eq!(counts.tools_linked, 0);
    assert!(!ws.build_dir().join("fmt").exists());
    assert!(!ws.build_dir().join("lint").exists());
}
