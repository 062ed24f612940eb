use cascade::{BuildOptions, ProjectSession, RiskLevel};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn rust_project(files: &[(&str, &str)]) -> (TempDir, ProjectSession) {
    let td = TempDir::new().unwrap();
    let root = td.path();
    fs::write(root.join("Cargo.toml"), "[package]\nname = \"fixture\"\n").unwrap();
    fs::create_dir(root.join("src")).unwrap();
    for (name, content) in files {
        fs::write(root.join("src").join(name), content).unwrap();
    }
    let session = ProjectSession::build(root, &BuildOptions::default());
    (td, session)
}

#[test]
fn minimal_chain_levels_and_risk() {
    // a imports b, b imports c.
    let (_td, mut session) = rust_project(&[
        ("a.rs", "use crate::b::B;\n"),
        ("b.rs", "use crate::c::C;\npub struct B;\n"),
        ("c.rs", "pub struct C;\n"),
    ]);
    let report = session.analyse_impact("src/c.rs", false).unwrap();
    assert_eq!(report.direct_dependents, vec!["b.rs"]);
    assert_eq!(report.transitive_dependents, vec!["a.rs"]);
    assert_eq!(report.total_impacted, 2);
    assert_eq!(report.risk_level, RiskLevel::Low);
    let levels = report.cascade_levels.unwrap();
    assert_eq!(levels["b.rs"], 1);
    assert_eq!(levels["a.rs"], 2);
    assert!(report.circular_cluster.is_none());
    assert!(!report.from_cache);
}

#[test]
fn cycle_cluster_is_level_zero() {
    // x → y → z → x.
    let (_td, mut session) = rust_project(&[
        ("x.rs", "use crate::y::Y;\npub struct X;\n"),
        ("y.rs", "use crate::z::Z;\npub struct Y;\n"),
        ("z.rs", "use crate::x::X;\npub struct Z;\n"),
    ]);
    let report = session.analyse_impact("src/x.rs", false).unwrap();
    assert_eq!(report.total_impacted, 2);
    assert!(report.direct_dependents.contains(&"y.rs".to_string()));
    assert!(report.direct_dependents.contains(&"z.rs".to_string()));
    assert_eq!(
        report.circular_cluster,
        Some(vec!["y.rs".to_string(), "z.rs".to_string()])
    );
    let levels = report.cascade_levels.unwrap();
    assert_eq!(levels["y.rs"], 0);
    assert_eq!(levels["z.rs"], 0);
    assert_eq!(report.cyclic_scc_count, Some(1));
}

#[test]
fn hub_ranking() {
    // u, v, w all import h.
    let (_td, session) = rust_project(&[
        ("u.rs", "use crate::h::H;\n"),
        ("v.rs", "use crate::h::H;\n"),
        ("w.rs", "use crate::h::H;\n"),
        ("h.rs", "pub struct H;\n"),
    ]);
    let hubs = session.hub_files(1);
    assert_eq!(hubs.len(), 1);
    assert_eq!(hubs[0].file, "h.rs");
    assert_eq!(hubs[0].dependent_count, 3);
    assert_eq!(hubs[0].risk_level, RiskLevel::Low);
}

#[test]
fn second_query_is_served_from_cache() {
    let (_td, mut session) = rust_project(&[
        ("a.rs", "use crate::b::B;\n"),
        ("b.rs", "pub struct B;\n"),
    ]);
    let first = session.analyse_impact("src/b.rs", false).unwrap();
    let second = session.analyse_impact("src/b.rs", false).unwrap();
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.direct_dependents, second.direct_dependents);
    assert_eq!(first.total_impacted, second.total_impacted);
    let stats = session.memo_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

#[test]
fn unknown_file_is_a_structured_error() {
    let (_td, mut session) = rust_project(&[("a.rs", "")]);
    let err = session.analyse_impact("src/nope.rs", false).unwrap_err();
    assert!(err.to_string().contains("not in graph"));
}

#[test]
fn self_import_does_not_create_a_cycle_report() {
    let (_td, mut session) = rust_project(&[("a.rs", "use crate::a::A;\npub struct A;\n")]);
    let report = session.analyse_impact("src/a.rs", false).unwrap();
    assert_eq!(report.total_impacted, 0);
    assert!(report.circular_cluster.is_none());
    assert_eq!(report.risk_level, RiskLevel::None);
}

#[test]
fn single_file_without_imports() {
    let (_td, mut session) = rust_project(&[("only.rs", "pub fn f() {}\n")]);
    assert_eq!(session.graph().len(), 1);
    assert_eq!(session.graph().edge_count(), 0);
    let report = session.analyse_impact("src/only.rs", false).unwrap();
    assert_eq!(report.total_impacted, 0);
}

#[test]
fn high_risk_when_ten_files_depend() {
    let mut files: Vec<(String, String)> = (0..10)
        .map(|i| (format!("f{i}.rs"), "use crate::core::Core;\n".to_string()))
        .collect();
    files.push(("core.rs".to_string(), "pub struct Core;\n".to_string()));
    let refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    let (_td, mut session) = rust_project(&refs);
    let report = session.analyse_impact("src/core.rs", false).unwrap();
    assert_eq!(report.total_impacted, 10);
    assert_eq!(report.risk_level, RiskLevel::High);
}

#[test]
fn javascript_project_with_aliases_and_index_files() {
    let td = TempDir::new().unwrap();
    let root = td.path();
    fs::write(root.join("package.json"), r#"{ "name": "webapp" }"#).unwrap();
    fs::write(
        root.join("tsconfig.json"),
        r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@app/*": ["src/*"] } } }"#,
    )
    .unwrap();
    fs::create_dir_all(root.join("src/components")).unwrap();
    fs::write(
        root.join("src/app.ts"),
        "import { Button } from './components';\nimport { fmt } from '@app/util';\n",
    )
    .unwrap();
    fs::write(root.join("src/components/index.ts"), "export const Button = 1;\n").unwrap();
    fs::write(root.join("src/util.ts"), "export const fmt = (s) => s;\n").unwrap();

    let mut session = ProjectSession::build(root, &BuildOptions::default());
    assert_eq!(session.graph().len(), 3);
    assert_eq!(session.graph().edge_count(), 2);

    let report = session.analyse_impact("src/util.ts", false).unwrap();
    assert_eq!(report.direct_dependents, vec!["app.ts"]);
}

#[test]
fn display_paths_are_source_root_relative(){
    let (_td, mut session) = rust_project(&[
        ("a.rs", "use crate::b::B;\n"),
        ("b.rs", "pub struct B;\n"),
    ]);
    let abs = session
        .graph()
        .project_root()
        .join("src/b.rs")
        .to_string_lossy()
        .into_owned();
    let report = session.analyse_impact(&abs, false).unwrap();
    assert_eq!(report.relative_path, "b.rs");
    assert!(Path::new(&report.file_path).is_absolute());
}
