//! Every workspace crate inherits the workspace version, and the workspace
//! version is the one this crate was built with.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .to_path_buf()
}

fn manifest(path: &Path) -> toml::Value {
    std::fs::read_to_string(path.join("Cargo.toml"))
        .unwrap()
        .parse()
        .unwrap()
}

/// Workspace members listed in the root manifest.
fn members() -> Vec<String> {
    manifest(&workspace_root())["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn all_crates_use_workspace_version() {
    let root = workspace_root();
    let members = members();
    assert!(members.iter().any(|m| m == "crates/pushflow-core"));

    for member in &members {
        let doc = manifest(&root.join(member));
        let inherits = doc["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool());
        assert_eq!(
            inherits,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let doc = manifest(&workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, env!("CARGO_PKG_VERSION"));
    assert_eq!(ws_version, pushflow_core::VERSION);
}

#[test]
fn path_dependency_versions_match_workspace() {
    let doc = manifest(&workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    let core = &doc["workspace"]["dependencies"]["pushflow-core"];
    assert_eq!(core["version"].as_str(), Some(ws_version));
}
