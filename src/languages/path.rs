//! Path normalisation and filesystem probing shared by the language plugins.

use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components lexically, without touching the
/// filesystem. Symlinks are deliberately not resolved: identity must be
/// stable between discovery, watcher events and query input.
pub fn normalize_abs(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The internal string form of a file identifier.
pub fn normalize_abs_str(p: &Path) -> String {
    normalize_abs(p).to_string_lossy().into_owned()
}

/// First candidate that exists as a regular file, normalised.
pub fn probe<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates
        .into_iter()
        .map(|c| normalize_abs(&c))
        .find(|c| c.is_file())
}

/// Probe `base` with each extension appended, e.g. `base.rs`.
pub fn probe_with_extensions(base: &Path, exts: &[&str]) -> Option<PathBuf> {
    probe(exts.iter().map(|ext| {
        let mut s = base.as_os_str().to_os_string();
        s.push(".");
        s.push(ext);
        PathBuf::from(s)
    }))
}

/// Probe `dir/<index_name>.<ext>` for directory-style modules
/// (`index.ts`, `mod.rs`, `__init__.py`).
pub fn probe_index(dir: &Path, index_name: &str, exts: &[&str]) -> Option<PathBuf> {
    probe_with_extensions(&dir.join(index_name), exts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(
            normalize_abs(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_abs(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn probe_finds_first_existing() {
        let td = tempfile::tempdir().unwrap();
        let hit = td.path().join("x.rs");
        std::fs::write(&hit, "").unwrap();
        let found = probe_with_extensions(&td.path().join("x"), &["ts", "rs"]);
        assert_eq!(found, Some(normalize_abs(&hit)));
        assert!(probe_with_extensions(&td.path().join("y"), &["rs"]).is_none());
    }

    #[test]
    fn probe_index_variants() {
        let td = tempfile::tempdir().unwrap();
        let dir = td.path().join("m");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("__init__.py"), "").unwrap();
        assert!(probe_index(&dir, "__init__", &["py"]).is_some());
        assert!(probe_index(&dir, "index", &["ts"]).is_none());
    }
}
