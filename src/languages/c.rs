use crate::languages::path::probe;
use crate::languages::{read_source, LanguagePlugin, PluginCaches, ResolveContext};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub struct CFamilyPlugin;

fn re_include() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Quoted form only: angle-bracket includes are system headers.
    RE.get_or_init(|| Regex::new(r#"^\s*#\s*include\s*"([^"]+)""#).unwrap())
}

impl LanguagePlugin for CFamilyPlugin {
    fn id(&self) -> &'static str {
        "c"
    }

    fn display_name(&self) -> &'static str {
        "C/C++"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["c", "h", "cc", "cpp", "cxx", "hh", "hpp", "hxx"]
    }

    fn detect_project(&self, root: &Path) -> bool {
        ["CMakeLists.txt", "Makefile", "makefile", "configure"]
            .iter()
            .any(|m| root.join(m).is_file())
    }

    fn source_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = [root.join("src"), root.join("include")]
            .into_iter()
            .filter(|d| d.is_dir())
            .collect();
        if dirs.is_empty() {
            dirs.push(root.to_path_buf());
        }
        dirs
    }

    fn package_name(&self, root: &Path, _caches: &PluginCaches) -> Option<String> {
        root.file_name().map(|n| n.to_string_lossy().into_owned())
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

        let mut out = Vec::new();
        for line in content.lines() {
            let Some(caps) = re_include().captures(line) else {
                continue;
            };
            let inc = &caps[1];
            // Probe order: the including file's directory, then each source
            // dir, then the project root and its include/ subdirectory.
            let candidates = std::iter::once(dir.join(inc))
                .chain(ctx.source_dirs.iter().map(|d| d.join(inc)))
                .chain([
                    ctx.project_root.join(inc),
                    ctx.project_root.join("include").join(inc),
                ]);
            if let Some(hit) = probe(candidates) {
                out.push(hit);
            }
        }
        out
    }
}
