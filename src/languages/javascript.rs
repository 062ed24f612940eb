use crate::languages::path::{probe, probe_with_extensions};
use crate::languages::{read_source, LanguagePlugin, PluginCaches, ResolveContext};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

pub struct JavaScriptPlugin;

const EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Path-alias configuration distilled from `tsconfig.json`
/// (`compilerOptions.baseUrl` + `compilerOptions.paths`).
#[derive(Debug, Default)]
pub struct TsPaths {
    base_url: Option<PathBuf>,
    /// (`alias prefix without *`, `target prefix without *`), longest first.
    patterns: Vec<(String, String)>,
}

impl TsPaths {
    fn load(root: &Path) -> Self {
        let file = root.join("tsconfig.json");
        let Ok(text) = std::fs::read_to_string(&file) else {
            return Self::default();
        };
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Self::from_json(root, &json),
            Err(e) => {
                // tsconfig allows comments and trailing commas; a strict
                // parse failure just means no aliases.
                log::debug!("malformed {}: {e}; resolving without aliases", file.display());
                Self::default()
            }
        }
    }

    fn from_json(root: &Path, json: &serde_json::Value) -> Self {
        let opts = &json["compilerOptions"];
        let base_url = opts["baseUrl"].as_str().map(|b| root.join(b));
        let mut patterns = Vec::new();
        if let Some(paths) = opts["paths"].as_object() {
            for (alias, targets) in paths {
                let Some(target) = targets.as_array().and_then(|a| a.first()).and_then(|t| t.as_str())
                else {
                    continue;
                };
                patterns.push((
                    alias.trim_end_matches('*').to_string(),
                    target.trim_end_matches('*').to_string(),
                ));
            }
        }
        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { base_url, patterns }
    }

    /// Map an aliased specifier to a filesystem base path, if any alias
    /// prefix matches.
    fn apply(&self, root: &Path, spec: &str) -> Option<PathBuf> {
        for (alias, target) in &self.patterns {
            if let Some(rest) = spec.strip_prefix(alias.as_str()) {
                let base = self.base_url.clone().unwrap_or_else(|| root.to_path_buf());
                return Some(base.join(format!("{target}{rest}")));
            }
        }
        None
    }
}

fn ts_paths(ctx: &ResolveContext<'_>) -> Arc<TsPaths> {
    let mut map = ctx
        .caches
        .js_aliases
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    map.entry(ctx.project_root.to_path_buf())
        .or_insert_with(|| Arc::new(TsPaths::load(ctx.project_root)))
        .clone()
}

fn re_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(?:import|export)\s+(?:[^'"]*?\s+from\s+)?['"]([^'"]+)['"]"#)
            .unwrap()
    })
}

fn re_require() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
    })
}

impl LanguagePlugin for JavaScriptPlugin {
    fn id(&self) -> &'static str {
        "javascript"
    }

    fn display_name(&self) -> &'static str {
        "JavaScript/TypeScript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        EXTS
    }

    fn detect_project(&self, root: &Path) -> bool {
        root.join("package.json").is_file() || root.join("tsconfig.json").is_file()
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
        caches.package_name("javascript", root, || {
            let text = std::fs::read_to_string(root.join("package.json")).ok()?;
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| log::debug!("malformed package.json: {e}"))
                .ok()?;
            json["name"].as_str().map(str::to_string)
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
        let aliases = ts_paths(ctx);
        let package = self.package_name(ctx.project_root, ctx.caches);

        let mut out = Vec::new();
        let specs = re_from()
            .captures_iter(&content)
            .chain(re_require().captures_iter(&content))
            .map(|c| c[1].to_string());
        for spec in specs {
            let hit = if spec.starts_with("./") || spec.starts_with("../") {
                resolve_module(&dir.join(&spec))
            } else if let Some(base) = aliases.apply(ctx.project_root, &spec) {
                resolve_module(&base)
            } else if let Some(rest) = package
                .as_deref()
                .and_then(|p| spec.strip_prefix(&format!("{p}/")))
            {
                // Self-referential package import: `mypkg/util` → `src/util`.
                resolve_module(&ctx.primary_source_dir().join(rest))
            } else {
                // Bare specifier with no alias and no package prefix:
                // a third-party or node builtin module.
                None
            };
            if let Some(hit) = hit {
                out.push(hit);
            }
        }
        out
    }

    fn classify_layer(&self, rel_path: &str) -> Option<&'static str> {
        let tag = |needle: &str| rel_path.split('/').any(|seg| seg == needle);
        if tag("components") || tag("ui") {
            Some("ui")
        } else if tag("pages") || tag("views") || tag("routes") {
            Some("view")
        } else if tag("api") || tag("services") {
            Some("service")
        } else if tag("utils") || tag("lib") || tag("helpers") {
            Some("util")
        } else {
            None
        }
    }
}

/// Probe a module base path the way a bundler would: exact file, extension
/// variants, then `index.*` inside a directory of that name.
fn resolve_module(base: &Path) -> Option<PathBuf> {
    if base.extension().is_some() {
        if let Some(hit) = probe([base.to_path_buf()]) {
            return Some(hit);
        }
    }
    probe_with_extensions(base, EXTS)
        .or_else(|| probe(EXTS.iter().map(|e| base.join(format!("index.{e}")))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, PathBuf) {
        let td = TempDir::new().unwrap();
        let root = td.path().to_path_buf();
        fs::write(
            root.join("package.json"),
            r#"{ "name": "webapp", "version": "1.0.0" }"#,
        )
        .unwrap();
        fs::write(
            root.join("tsconfig.json"),
            r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@app/*": ["src/*"] } } }"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("src/components")).unwrap();
        fs::write(root.join("src/app.ts"), "").unwrap();
        fs::write(root.join("src/util.ts"), "").unwrap();
        fs::write(root.join("src/components/index.tsx"), "").unwrap();
        (td, root)
    }

    fn parse(root: &Path, file: &Path, content: &str) -> Vec<PathBuf> {
        let caches = PluginCaches::new();
        let dirs = vec![root.join("src")];
        let ctx = ResolveContext {
            project_root: root,
            source_dirs: &dirs,
            caches: &caches,
        };
        JavaScriptPlugin.parse_imports(file, &ctx, Some(content))
    }

    #[test]
    fn relative_import_with_extension_variants() {
        let (_td, root) = project();
        let out = parse(&root, &root.join("src/app.ts"), "import { x } from './util';\n");
        assert!(out.iter().any(|p| p.ends_with("src/util.ts")));
    }

    #[test]
    fn directory_import_resolves_index() {
        let (_td, root) = project();
        let out = parse(
            &root,
            &root.join("src/app.ts"),
            "import { Button } from './components';\n",
        );
        assert!(out.iter().any(|p| p.ends_with("src/components/index.tsx")));
    }

    #[test]
    fn tsconfig_alias_resolves() {
        let (_td, root) = project();
        let out = parse(&root, &root.join("src/app.ts"), "import u from '@app/util';\n");
        assert!(out.iter().any(|p| p.ends_with("src/util.ts")));
    }

    #[test]
    fn package_prefix_resolves_to_source_dir() {
        let (_td, root) = project();
        let out = parse(&root, &root.join("src/app.ts"), "import u from 'webapp/util';\n");
        assert!(out.iter().any(|p| p.ends_with("src/util.ts")));
    }

    #[test]
    fn third_party_and_builtin_are_dropped() {
        let (_td, root) = project();
        let out = parse(
            &root,
            &root.join("src/app.ts"),
            "import React from 'react';\nimport fs from 'node:fs';\n",
        );
        assert!(out.is_empty());
    }

    #[test]
    fn require_and_dynamic_import_are_scanned() {
        let (_td, root) = project();
        let out = parse(
            &root,
            &root.join("src/app.ts"),
            "const u = require('./util');\nconst c = await import('./components');\n",
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn export_from_is_a_dependency() {
        let (_td, root) = project();
        let out = parse(&root, &root.join("src/app.ts"), "export * from './util';\n");
        assert!(out.iter().any(|p| p.ends_with("src/util.ts")));
    }

    #[test]
    fn malformed_tsconfig_recovers_without_aliases() {
        let (_td, root) = project();
        fs::write(root.join("tsconfig.json"), "{ not json").unwrap();
        let out = parse(&root, &root.join("src/app.ts"), "import u from '@app/util';\n");
        assert!(out.is_empty(), "alias lookup silently disabled");
    }

    #[test]
    fn layer_classification() {
        assert_eq!(JavaScriptPlugin.classify_layer("components/Button.tsx"), Some("ui"));
        assert_eq!(JavaScriptPlugin.classify_layer("api/client.ts"), Some("service"));
        assert_eq!(JavaScriptPlugin.classify_layer("deep/utils/fmt.ts"), Some("util"));
        assert_eq!(JavaScriptPlugin.classify_layer("main.ts"), None);
    }
}
