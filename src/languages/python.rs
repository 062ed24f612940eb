use crate::languages::path::{probe, probe_with_extensions};
use crate::languages::{read_source, LanguagePlugin, PluginCaches, ResolveContext};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub struct PythonPlugin;

fn re_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*from\s+(\.*[\w.]*)\s+import\s+(.+)").unwrap())
}

fn re_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*import\s+([\w.]+(?:\s*,\s*[\w.]+)*)").unwrap())
}

impl LanguagePlugin for PythonPlugin {
    fn id(&self) -> &'static str {
        "python"
    }

    fn display_name(&self) -> &'static str {
        "Python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn detect_project(&self, root: &Path) -> bool {
        ["pyproject.toml", "setup.py", "setup.cfg", "requirements.txt"]
            .iter()
            .any(|m| root.join(m).is_file())
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
        caches.package_name("python", root, || {
            static RE: OnceLock<Regex> = OnceLock::new();
            let re = RE.get_or_init(|| Regex::new(r#"(?m)^\s*name\s*=\s*"([^"]+)""#).unwrap());
            let manifest = std::fs::read_to_string(root.join("pyproject.toml")).ok()?;
            re.captures(&manifest).map(|c| c[1].replace('-', "_"))
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
        let package = self.package_name(ctx.project_root, ctx.caches);

        let mut out = Vec::new();
        for line in content.lines() {
            if let Some(caps) = re_from().captures(line) {
                let module = &caps[1];
                let names = &caps[2];
                if let Some(stripped) = module.strip_prefix('.') {
                    out.extend(resolve_relative(dir, stripped, names));
                } else {
                    // The imported names may themselves be modules of the
                    // named package (`from pkg.sub import worker`).
                    let mut hit_any = false;
                    for name in names.split(',') {
                        let name = name
                            .split_whitespace()
                            .next()
                            .unwrap_or("")
                            .trim_matches(|c| c == '(' || c == ')');
                        if name.is_empty() || name == "*" {
                            continue;
                        }
                        if let Some(hit) =
                            resolve_absolute(ctx, package.as_deref(), &format!("{module}.{name}"))
                        {
                            out.push(hit);
                            hit_any = true;
                        }
                    }
                    if !hit_any {
                        if let Some(hit) = resolve_absolute(ctx, package.as_deref(), module) {
                            out.push(hit);
                        }
                    }
                }
                continue;
            }
            if let Some(caps) = re_import().captures(line) {
                for module in caps[1].split(',') {
                    let module = module.trim();
                    if let Some(hit) = resolve_absolute(ctx, package.as_deref(), module) {
                        out.push(hit);
                    }
                }
            }
        }
        out
    }
}

/// Relative import: each extra leading dot climbs one package level, then
/// the dotted remainder walks down. `from . import a, b` resolves every
/// imported name as a sibling module.
fn resolve_relative(dir: &Path, after_first_dot: &str, names: &str) -> Vec<PathBuf> {
    let extra_dots = after_first_dot.chars().take_while(|&c| c == '.').count();
    let module = &after_first_dot[extra_dots..];
    let mut base = dir.to_path_buf();
    for _ in 0..extra_dots {
        base.pop();
    }

    if module.is_empty() {
        // `from . import a, b` — the names themselves are the modules.
        return names
            .split(',')
            .filter_map(|n| {
                let n = n.split_whitespace().next()?;
                probe_module(&base.join(n))
            })
            .collect();
    }
    let mut path = base;
    for seg in module.split('.') {
        path.push(seg);
    }
    probe_module(&path).into_iter().collect()
}

/// Absolute import: only specifiers anchored at the project's own package
/// (or a directory visible under the source root) are internal; the rest is
/// stdlib or third-party and is dropped.
fn resolve_absolute(
    ctx: &ResolveContext<'_>,
    package: Option<&str>,
    module: &str,
) -> Option<PathBuf> {
    let segments: Vec<&str> = module.split('.').filter(|s| !s.is_empty()).collect();
    let first = segments.first()?;
    let anchored = Some(*first) == package
        || ctx.primary_source_dir().join(first).is_dir()
        || ctx
            .primary_source_dir()
            .join(format!("{first}.py"))
            .is_file();
    if !anchored {
        return None;
    }
    // Dotted paths may end in a symbol name, so probe longest-first.
    for end in (1..=segments.len()).rev() {
        let mut candidate = ctx.primary_source_dir().to_path_buf();
        for seg in &segments[..end] {
            candidate.push(seg);
        }
        if let Some(hit) = probe_module(&candidate) {
            return Some(hit);
        }
    }
    None
}

fn probe_module(base: &Path) -> Option<PathBuf> {
    probe_with_extensions(base, &["py"]).or_else(|| probe([base.join("__init__.py")]))
}
