use crate::languages::path::{normalize_abs, probe, probe_with_extensions};
use crate::languages::{read_source, LanguagePlugin, PluginCaches, ResolveContext};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub struct RustPlugin;

fn re_mod() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_][A-Za-z0-9_]*)\s*;").unwrap()
    })
}

fn re_use() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([A-Za-z_][A-Za-z0-9_:]*)(\{[^}]*\})?")
            .unwrap()
    })
}

impl LanguagePlugin for RustPlugin {
    fn id(&self) -> &'static str {
        "rust"
    }

    fn display_name(&self) -> &'static str {
        "Rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn detect_project(&self, root: &Path) -> bool {
        root.join("Cargo.toml").is_file()
    }

    fn source_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let src = root.join("src");
        if src.is_dir() {
            vec![src]
        } else {
            vec![root.to_path_buf()]
        }
    }

    fn package_name(&self, root: &Path, caches: &PluginCaches) -> Option<String> {
        caches.package_name("rust", root, || {
            let manifest = std::fs::read_to_string(root.join("Cargo.toml")).ok()?;
            parse_cargo_package_name(&manifest)
        })
    }

    fn parse_imports(
        &self,
        file: &Path,
        ctx: &ResolveContext<'_>,
        pre_read: Option<&str>,
    ) -> Vec<PathBuf> {
        let Some(content) = read_source(file, pre_read) else {
            return Vec::new();
        };
        let dir = file.parent().unwrap_or(Path::new("."));
        let package = self
            .package_name(ctx.project_root, ctx.caches)
            .map(|n| n.replace('-', "_"));

        let mut out = Vec::new();
        for line in content.lines() {
            if let Some(caps) = re_mod().captures(line) {
                let name = &caps[1];
                if let Some(hit) = resolve_sibling_module(dir, name) {
                    out.push(hit);
                }
                continue;
            }
            if let Some(caps) = re_use().captures(line) {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                match caps.get(2) {
                    // `use crate::{graph, scc};` — expand one brace level.
                    Some(group) => {
                        let inner = group.as_str().trim_matches(|c| c == '{' || c == '}');
                        for item in inner.split(',') {
                            let item = item.trim().trim_end_matches("::*");
                            let item = item.split_whitespace().next().unwrap_or("");
                            if item.is_empty() || item == "self" {
                                continue;
                            }
                            let full = format!("{prefix}{item}");
                            if let Some(hit) =
                                resolve_use_path(&full, file, dir, ctx, package.as_deref())
                            {
                                out.push(hit);
                            }
                        }
                    }
                    None => {
                        let full = prefix.trim_end_matches("::");
                        if let Some(hit) =
                            resolve_use_path(full, file, dir, ctx, package.as_deref())
                        {
                            out.push(hit);
                        }
                    }
                }
            }
        }
        out
    }
}

fn parse_cargo_package_name(manifest: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"(?m)^\s*name\s*=\s*"([^"]+)""#).unwrap());
    re.captures(manifest).map(|c| c[1].to_string())
}

/// `mod foo;` → `foo.rs` or `foo/mod.rs` next to the declaring file.
fn resolve_sibling_module(dir: &Path, name: &str) -> Option<PathBuf> {
    probe([dir.join(format!("{name}.rs")), dir.join(name).join("mod.rs")])
}

/// Resolve a `use` path to a module file. The path usually names an item
/// inside a module, so candidate prefixes are probed longest-first until a
/// file answers.
fn resolve_use_path(
    path: &str,
    file: &Path,
    dir: &Path,
    ctx: &ResolveContext<'_>,
    package: Option<&str>,
) -> Option<PathBuf> {
    let segments: Vec<&str> = path.split("::").filter(|s| !s.is_empty()).collect();
    let (first, tail) = segments.split_first()?;
    let (base, rest): (PathBuf, &[&str]) = match *first {
        "crate" => (ctx.primary_source_dir().to_path_buf(), tail),
        "self" => (dir.to_path_buf(), tail),
        "super" => {
            // For a file module, the first `super` lands among its siblings;
            // each further `super` climbs one directory.
            let supers = segments.iter().take_while(|s| **s == "super").count();
            let mut base = dir.to_path_buf();
            for _ in 1..supers {
                base.pop();
            }
            (base, &segments[supers..])
        }
        name if Some(name) == package => (ctx.primary_source_dir().to_path_buf(), tail),
        // std / third-party crate: not an internal dependency.
        _ => return None,
    };

    for end in (1..=rest.len()).rev() {
        let mut candidate = base.clone();
        for seg in &rest[..end] {
            candidate.push(seg);
        }
        if let Some(hit) = probe_with_extensions(&candidate, &["rs"]) {
            if hit != normalize_abs(file) {
                return Some(hit);
            }
        }
        if let Some(hit) = probe([candidate.join("mod.rs")]) {
            if hit != normalize_abs(file) {
                return Some(hit);
            }
        }
    }
    // `use crate::x` with empty rest (e.g. grouped `self`) resolves nowhere.
    None
}
