use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

pub mod c;
pub mod go;
pub mod javascript;
pub mod path;
pub mod python;
pub mod rust;

use self::path::normalize_abs;

/// One source language. Implementations are stateless unit structs; any
/// configuration they parse (package manifests, path-alias maps) goes
/// through [`PluginCaches`] so it can be dropped on graph rebuild.
pub trait LanguagePlugin: Sync {
    fn id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn extensions(&self) -> &'static [&'static str];

    /// Does `root` look like a project of this language? Cheap manifest
    /// checks only.
    fn detect_project(&self, root: &Path) -> bool;

    /// Source directories to load and watch, most significant first.
    fn source_dirs(&self, root: &Path) -> Vec<PathBuf>;

    /// The project's own package/module name, used to recognise
    /// self-referential absolute imports.
    fn package_name(&self, root: &Path, caches: &PluginCaches) -> Option<String>;

    /// Enumerate source files under `dir`, excluding the baseline skip set.
    fn discover_files(&self, dir: &Path) -> Vec<PathBuf> {
        default_discover(dir, self.extensions())
    }

    /// Best-effort import extraction: line-regex scan plus filesystem
    /// probing. Must not fail — an unreadable file yields an empty list.
    /// `pre_read` avoids a second disk read when the caller already holds
    /// the content.
    fn parse_imports(
        &self,
        file: &Path,
        ctx: &ResolveContext<'_>,
        pre_read: Option<&str>,
    ) -> Vec<PathBuf>;

    /// Optional coarse layer tag for visualisation.
    fn classify_layer(&self, _rel_path: &str) -> Option<&'static str> {
        None
    }
}

/// Everything a plugin needs to turn an import specifier into a path.
pub struct ResolveContext<'a> {
    pub project_root: &'a Path,
    pub source_dirs: &'a [PathBuf],
    pub caches: &'a PluginCaches,
}

impl ResolveContext<'_> {
    /// The canonical source dir (first in the ordered list).
    pub fn primary_source_dir(&self) -> &Path {
        self.source_dirs
            .first()
            .map(PathBuf::as_path)
            .unwrap_or(self.project_root)
    }
}

/// Per-session plugin caches, keyed by project root. Cleared on rebuild.
/// Mutex rather than RefCell because the initial load parses files in
/// parallel batches.
#[derive(Debug, Default)]
pub struct PluginCaches {
    pub(crate) js_aliases: Mutex<HashMap<PathBuf, Arc<javascript::TsPaths>>>,
    pub(crate) package_names: Mutex<HashMap<(&'static str, PathBuf), Option<String>>>,
}

impl PluginCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.js_aliases.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.package_names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub(crate) fn package_name(
        &self,
        plugin: &'static str,
        root: &Path,
        load: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        let mut map = self
            .package_names
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        map.entry((plugin, root.to_path_buf()))
            .or_insert_with(load)
            .clone()
    }
}

/// The process-wide plugin list. Closed at compile time; order decides
/// which plugin claims an extension both languages declare.
pub fn plugins() -> &'static [&'static dyn LanguagePlugin] {
    static REGISTRY: &[&dyn LanguagePlugin] = &[
        &rust::RustPlugin,
        &javascript::JavaScriptPlugin,
        &python::PythonPlugin,
        &go::GoPlugin,
        &c::CFamilyPlugin,
    ];
    REGISTRY
}

/// All plugins whose project detection fires for `root`.
pub fn detect_languages(root: &Path) -> Vec<&'static dyn LanguagePlugin> {
    plugins()
        .iter()
        .copied()
        .filter(|p| p.detect_project(root))
        .collect()
}

/// Dispatch a file to its plugin by extension.
pub fn plugin_for_path(file: &Path) -> Option<&'static dyn LanguagePlugin> {
    let ext = file.extension()?.to_str()?;
    plugins()
        .iter()
        .copied()
        .find(|p| p.extensions().contains(&ext))
}

/// Baseline directory skip set; plugins extend it, never shrink it.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    "vendor",
    "third_party",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    "coverage",
    ".idea",
    ".vscode",
];

pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name) || name.starts_with('.')
}

/// Generated, minified and declaration-only files carry no import signal
/// worth following.
pub fn is_non_source_file(name: &str) -> bool {
    const SUFFIXES: &[&str] = &[
        ".min.js",
        ".min.css",
        ".bundle.js",
        ".d.ts",
        ".pb.go",
        "_pb2.py",
        ".generated.ts",
    ];
    SUFFIXES.iter().any(|s| name.ends_with(s))
}

pub(crate) fn default_discover(dir: &Path, exts: &[&str]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            // Never prune the walk root itself, whatever it is named.
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_str().unwrap_or("");
            !(e.file_type().is_dir() && is_skipped_dir(name))
        })
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or("");
        if is_non_source_file(name) {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if exts.contains(&ext) {
            out.push(normalize_abs(entry.path()));
        }
    }
    out.sort();
    out
}

/// Read a file for import parsing; any I/O error degrades to "no content".
pub(crate) fn read_source(file: &Path, pre_read: Option<&str>) -> Option<String> {
    match pre_read {
        Some(s) => Some(s.to_string()),
        None => match std::fs::read_to_string(file) {
            Ok(s) => Some(s),
            Err(e) => {
                log::debug!("unreadable source {}: {e}", file.display());
                None
            }
        },
    }
}
