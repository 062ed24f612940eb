use cascade::{BuildOptions, CouplingOptions, ProjectSession};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git(cwd: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("git command failed to spawn");
    if !out.status.success() {
        panic!(
            "git {:?} failed:\nstdout:{}\nstderr:{}",
            args,
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        );
    }
}

fn commit_files(root: &Path, names: &[&str], msg: &str) {
    for name in names {
        let path = root.join(name);
        let prev = fs::read_to_string(&path).unwrap_or_default();
        fs::write(&path, format!("{prev}// {msg}\n")).unwrap();
    }
    git(root, &["add", "."]);
    git(root, &["commit", "-m", msg, "-q"]);
}

fn setup_repo() -> TempDir {
    let td = TempDir::new().unwrap();
    let root = td.path();
    git(root, &["init", "-q"]);
    git(root, &["config", "user.email", "tester@example.com"]);
    git(root, &["config", "user.name", "Tester"]);
    fs::write(root.join("Cargo.toml"), "[package]\nname = \"repo\"\n").unwrap();
    fs::create_dir(root.join("src")).unwrap();
    td
}

#[test]
fn coupled_pair_above_thresholds_is_reported() {
    // (a, b) co-change three times, (a, c) once; a changes 4 times total.
    let td = setup_repo();
    let root = td.path();
    commit_files(root, &["src/a.rs", "src/b.rs"], "one");
    commit_files(root, &["src/a.rs", "src/b.rs"], "two");
    commit_files(root, &["src/a.rs", "src/b.rs"], "three");
    commit_files(root, &["src/a.rs", "src/c.rs"], "four");

    let mut session = ProjectSession::build(root, &BuildOptions::default());
    let result = session.couplings(&CouplingOptions::default());

    assert_eq!(result.couplings.len(), 1, "only (a, b) clears support 3");
    let c = &result.couplings[0];
    assert_eq!(c.file1, "src/a.rs");
    assert_eq!(c.file2, "src/b.rs");
    assert_eq!(c.co_change_count, 3);
    assert_eq!(c.file1_changes, 4);
    assert!((c.confidence - 0.75).abs() < 1e-9);
    assert!(result.commits_analysed >= 4);
}

#[test]
fn second_call_is_served_from_the_ttl_cache() {
    let td = setup_repo();
    let root = td.path();
    commit_files(root, &["src/a.rs", "src/b.rs"], "one");
    commit_files(root, &["src/a.rs", "src/b.rs"], "two");
    commit_files(root, &["src/a.rs", "src/b.rs"], "three");

    let mut session = ProjectSession::build(root, &BuildOptions::default());
    let first = session.couplings(&CouplingOptions::default());

    // New history after the first call is invisible within the TTL window.
    commit_files(root, &["src/a.rs", "src/c.rs"], "late");
    let second = session.couplings(&CouplingOptions::default());
    assert_eq!(first.commits_analysed, second.commits_analysed);

    // A rebuild invalidates the coupling cache.
    session.rebuild(&BuildOptions::default());
    let third = session.couplings(&CouplingOptions::default());
    assert_eq!(third.commits_analysed, second.commits_analysed + 1);
}

#[test]
fn directory_without_vcs_yields_empty_result() {
    let td = TempDir::new().unwrap();
    fs::write(td.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
    let mut session = ProjectSession::build(td.path(), &BuildOptions::default());
    let result = session.couplings(&CouplingOptions::default());
    assert!(result.couplings.is_empty());
    assert_eq!(result.commits_analysed, 0);
}

#[test]
fn hidden_couplings_exclude_import_neighbours() {
    // a imports b; a and b co-change AND a co-changes with doc-ish sibling
    // n.rs that it does not import. Only the non-neighbour shows up.
    let td = setup_repo();
    let root = td.path();
    fs::write(root.join("src/a.rs"), "use crate::b::B;\n").unwrap();
    fs::write(root.join("src/b.rs"), "pub struct B;\n").unwrap();
    fs::write(root.join("src/n.rs"), "pub struct N;\n").unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-m", "init", "-q"]);
    for msg in ["one", "two", "three"] {
        commit_files(root, &["src/a.rs", "src/b.rs", "src/n.rs"], msg);
    }

    let mut session = ProjectSession::build(root, &BuildOptions::default());
    let report = session.analyse_impact("src/a.rs", true).unwrap();
    let hidden = report.hidden_couplings.expect("augmentation requested");
    assert!(
        hidden.iter().all(|c| c.partner_of("src/a.rs") != "src/b.rs"),
        "imported neighbour must not be reported as hidden"
    );
    assert!(
        hidden.iter().any(|c| c.partner_of("src/a.rs") == "src/n.rs"),
        "co-changing non-neighbour is the hidden dependency"
    );
}
