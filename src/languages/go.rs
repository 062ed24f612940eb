use crate::languages::path::{normalize_abs, normalize_abs_str};
use crate::languages::{read_source, LanguagePlugin, PluginCaches, ResolveContext};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub struct GoPlugin;

fn re_single_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*import\s+(?:\w+\s+)?"([^"]+)""#).unwrap())
}

fn re_block_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*(?:\w+\s+|\.\s+|_\s+)?"([^"]+)""#).unwrap())
}

impl LanguagePlugin for GoPlugin {
    fn id(&self) -> &'static str {
        "go"
    }

    fn display_name(&self) -> &'static str {
        "Go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn detect_project(&self, root: &Path) -> bool {
        root.join("go.mod").is_file()
    }

    fn source_dirs(&self, root: &Path) -> Vec<PathBuf> {
        vec![root.to_path_buf()]
    }

    fn package_name(&self, root: &Path, caches: &PluginCaches) -> Option<String> {
        caches.package_name("go", root, || {
            let gomod = std::fs::read_to_string(root.join("go.mod")).ok()?;
            gomod
                .lines()
                .find_map(|l| l.trim().strip_prefix("module "))
                .map(|m| m.trim().to_string())
        })
    }

    /// Go imports name packages, and a package is a directory: an internal
    /// import expands to every `.go` file in the imported directory.
    fn parse_imports(
        &self,
        file: &Path,
        ctx: &ResolveContext<'_>,
        pre_read: Option<&str>,
    ) -> Vec<PathBuf> {
        let Some(content) = read_source(file, pre_read) else {
            return Vec::new();
        };
        let Some(module) = self.package_name(ctx.project_root, ctx.caches) else {
            return Vec::new();
        };
        let self_path = normalize_abs_str(file);

        let mut specs = Vec::new();
        let mut in_block = false;
        for line in content.lines() {
            let trimmed = line.trim();
            if in_block {
                if trimmed.starts_with(')') {
                    in_block = false;
                } else if let Some(caps) = re_block_line().captures(line) {
                    specs.push(caps[1].to_string());
                }
                continue;
            }
            if trimmed.starts_with("import (") || trimmed == "import (" {
                in_block = true;
                continue;
            }
            if let Some(caps) = re_single_import().captures(line) {
                specs.push(caps[1].to_string());
            }
        }

        let mut out = Vec::new();
        for spec in specs {
            let rel = if spec == module {
                ""
            } else if let Some(rest) = spec.strip_prefix(&format!("{module}/")) {
                rest
            } else {
                continue; // stdlib or external module
            };
            let dir = normalize_abs(&ctx.project_root.join(rel));
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let p = entry.path();
                let is_go = p.extension().and_then(|e| e.to_str()) == Some("go");
                if is_go && p.is_file() {
                    let p = normalize_abs(&p);
                    if p.to_string_lossy() != self_path {
                        out.push(p);
                    }
                }
            }
        }
        // read_dir order is platform-dependent; keep edge order stable
        // across rebuilds.
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, PathBuf) {
        let td = TempDir::new().unwrap();
        let root = td.path().to_path_buf();
        fs::write(root.join("go.mod"), "module example.com/app\n\ngo 1.22\n").unwrap();
        fs::create_dir_all(root.join("store")).unwrap();
        fs::write(root.join("main.go"), "").unwrap();
        fs::write(root.join("store/store.go"), "").unwrap();
        fs::write(root.join("store/iter.go"), "").unwrap();
        fs::write(root.join("store/store_test.go"), "").unwrap();
        (td, root)
    }

    fn parse(root: &Path, file: &Path, content: &str) -> Vec<PathBuf> {
        let caches = PluginCaches::new();
        let dirs = vec![root.to_path_buf()];
        let ctx = ResolveContext {
            project_root: root,
            source_dirs: &dirs,
            caches: &caches,
        };
        GoPlugin.parse_imports(file, &ctx, Some(content))
    }

    #[test]
    fn internal_import_expands_to_directory() {
        let (_td, root) = project();
        let out = parse(
            &root,
            &root.join("main.go"),
            "package main\n\nimport \"example.com/app/store\"\n",
        );
        assert_eq!(out.len(), 3, "every .go file in the package directory");
        assert!(out.iter().any(|p| p.ends_with("store/store.go")));
        assert!(out.iter().any(|p| p.ends_with("store/iter.go")));
    }

    #[test]
    fn import_block_with_aliases() {
        let (_td, root) = project();
        let src = r#"package main

import (
    "fmt"
    s "example.com/app/store"
    _ "example.com/app/store"
)
"#;
        let out = parse(&root, &root.join("main.go"), src);
        assert!(out.iter().any(|p| p.ends_with("store/store.go")));
    }

    #[test]
    fn stdlib_and_external_modules_dropped() {
        let (_td, root) = project();
        let src = "package main\n\nimport (\n    \"fmt\"\n    \"github.com/other/pkg\"\n)\n";
        let out = parse(&root, &root.join("main.go"), src);
        assert!(out.is_empty());
    }

    #[test]
    fn importer_is_excluded_from_its_own_package() {
        let (_td, root) = project();
        let out = parse(
            &root,
            &root.join("store/store.go"),
            "package store\n\nimport \"example.com/app/store\"\n",
        );
        assert!(out.iter().all(|p| !p.ends_with("store/store.go")));
    }

    #[test]
    fn module_name_from_gomod() {
        let (_td, root) = project();
        let caches = PluginCaches::new();
        assert_eq!(
            GoPlugin.package_name(&root, &caches),
            Some("example.com/app".to_string())
        );
    }
}
