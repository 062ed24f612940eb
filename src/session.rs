use crate::coupling::{CouplingMiner, CouplingOptions, CouplingResult, FileCoupling};
use crate::graph::DependencyGraph;
use crate::impact::{self, AnalysisError, HubFile, ImpactReport};
use crate::languages::path::{normalize_abs, normalize_abs_str};
use crate::languages::{detect_languages, LanguagePlugin, PluginCaches, ResolveContext};
use crate::memo::{MemoCache, MemoStats};
use crate::scc::{self, SccResult};
use crate::update::{self, IncrementalUpdateResult};
use crate::watcher::ChangeEvent;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Stop discovery after this many files; `None` means unbounded.
    pub max_files: Option<usize>,
}

/// Synchronous observer of settled file changes.
pub trait ChangeListener {
    fn on_change(&self, event: &ChangeEvent);
}

/// Synchronous observer of applied graph updates.
pub trait GraphUpdateListener {
    fn on_graph_updated(&self, result: &IncrementalUpdateResult);
}

/// Handle returned by the subscribe calls; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// Owns every per-project store: the dependency graph, its SCC condensation,
/// the memoised impact cache, plugin configuration caches and the coupling
/// miner. Dropping the session (or rebuilding it for another root) tears all
/// of them down together; nothing lives in process-wide state.
pub struct ProjectSession {
    project_root: PathBuf,
    graph: DependencyGraph,
    scc: Option<SccResult>,
    memo: MemoCache,
    caches: PluginCaches,
    miner: CouplingMiner,
    change_listeners: Vec<(u64, Box<dyn ChangeListener>)>,
    graph_listeners: Vec<(u64, Box<dyn GraphUpdateListener>)>,
    next_listener: u64,
}

impl ProjectSession {
    /// Build the dependency graph for `project_root` and attach the SCC
    /// result. A root no plugin recognises yields an empty graph, not an
    /// error.
    pub fn build(project_root: impl AsRef<Path>, options: &BuildOptions) -> Self {
        let project_root = project_root.as_ref();
        let absolute = if project_root.is_absolute() {
            project_root.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(project_root)
        };
        let project_root = normalize_abs(&absolute);
        let mut session = Self {
            graph: DependencyGraph::new(project_root.clone()),
            project_root,
            scc: None,
            memo: MemoCache::default(),
            caches: PluginCaches::new(),
            miner: CouplingMiner::new(),
            change_listeners: Vec::new(),
            graph_listeners: Vec::new(),
            next_listener: 0,
        };
        session.populate(options);
        session
    }

    /// Throw away every derived store and rebuild from the filesystem.
    pub fn rebuild(&mut self, options: &BuildOptions) {
        self.caches.clear();
        self.memo.invalidate_all();
        self.miner.invalidate();
        self.graph = DependencyGraph::new(self.project_root.clone());
        self.scc = None;
        self.populate(options);
    }

    fn populate(&mut self, options: &BuildOptions) {
        let plugins = detect_languages(&self.project_root);
        if plugins.is_empty() {
            log::warn!(
                "no language detected under {}; graph stays empty",
                self.project_root.display()
            );
            return;
        }

        let mut roots: Vec<PathBuf> = Vec::new();
        let mut work: Vec<(String, &'static dyn LanguagePlugin)> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let cap = options.max_files.unwrap_or(usize::MAX);
        'discovery: for plugin in &plugins {
            for dir in plugin.source_dirs(&self.project_root) {
                if !roots.contains(&dir) {
                    roots.push(dir.clone());
                }
                for file in plugin.discover_files(&dir) {
                    let path = normalize_abs_str(&file);
                    if !claimed.insert(path.clone()) {
                        continue;
                    }
                    if work.len() >= cap {
                        log::warn!("file cap {cap} reached; graph is partial");
                        break 'discovery;
                    }
                    work.push((path, *plugin));
                }
            }
        }

        self.graph.set_roots(roots);
        self.graph
            .set_languages(plugins.iter().map(|p| p.id().to_string()).collect());
        for (path, _) in &work {
            self.graph.add_file(path);
        }

        // Import parsing is read-only over the filesystem: run it in
        // parallel batches, then apply the edges on this thread.
        let source_dirs_by_plugin: HashMap<&'static str, Vec<PathBuf>> = plugins
            .iter()
            .map(|p| (p.id(), p.source_dirs(&self.project_root)))
            .collect();
        let project_root = self.project_root.clone();
        let caches = &self.caches;
        let parsed: Vec<(String, Vec<String>)> = work
            .par_iter()
            .map(|(path, plugin)| {
                let ctx = ResolveContext {
                    project_root: &project_root,
                    source_dirs: &source_dirs_by_plugin[plugin.id()],
                    caches,
                };
                let imports = plugin
                    .parse_imports(Path::new(path), &ctx, None)
                    .iter()
                    .map(|p| normalize_abs_str(p))
                    .collect();
                (path.clone(), imports)
            })
            .collect();

        for (path, imports) in parsed {
            let from = self.graph.id_of(&path).expect("file inserted above");
            for target in imports {
                if let Some(to) = self.graph.id_of(&target) {
                    self.graph.add_edge(from, to);
                }
            }
        }

        self.scc = Some(scc::compute(&self.graph));
        log::info!(
            "graph built: {} files, {} edges, {} sccs",
            self.graph.len(),
            self.graph.edge_count(),
            self.scc.as_ref().map(SccResult::scc_count).unwrap_or(0)
        );
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn scc(&self) -> Option<&SccResult> {
        self.scc.as_ref()
    }

    /// Impact of changing `file`. Accepts the internal absolute form or a
    /// path relative to the project root / canonical source root.
    pub fn analyse_impact(
        &mut self,
        file: &str,
        include_coupling: bool,
    ) -> Result<ImpactReport, AnalysisError> {
        let resolved = self.resolve_query_path(file);
        let mut report = impact::analyse(&self.graph, self.scc.as_ref(), &mut self.memo, &resolved)?;
        if include_coupling {
            report.hidden_couplings = Some(self.hidden_couplings(&resolved));
        }
        Ok(report)
    }

    /// Couplings whose partner is NOT already an import neighbour of `file`:
    /// the dependencies the graph cannot see. Top five by confidence.
    ///
    /// Coupling records carry repository-relative paths (what git reports),
    /// so both sides of the comparison are mapped into that form.
    fn hidden_couplings(&mut self, abs_path: &str) -> Vec<FileCoupling> {
        let rel = self.repo_relative(abs_path);
        let result = self
            .miner
            .couplings(&self.project_root, &CouplingOptions::default());
        let Some(mine) = result.by_file.get(&rel) else {
            return Vec::new();
        };
        let neighbours: HashSet<String> = match self.graph.id_of(abs_path) {
            Some(id) => self
                .graph
                .forward(id)
                .iter()
                .chain(self.graph.reverse(id))
                .map(|&n| self.repo_relative(self.graph.path_of(n)))
                .collect(),
            None => HashSet::new(),
        };
        mine.iter()
            .filter(|c| !neighbours.contains(c.partner_of(&rel)))
            .take(5)
            .cloned()
            .collect()
    }

    fn repo_relative(&self, abs_path: &str) -> String {
        Path::new(abs_path)
            .strip_prefix(&self.project_root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| abs_path.to_string())
    }

    pub fn hub_files(&self, top_n: usize) -> Vec<HubFile> {
        impact::hub_files(&self.graph, top_n)
    }

    pub fn couplings(&mut self, options: &CouplingOptions) -> CouplingResult {
        self.miner.couplings(&self.project_root, options)
    }

    pub fn memo_stats(&self) -> MemoStats {
        self.memo.stats()
    }

    /// Apply one settled change event: re-parse, patch adjacency, recompute
    /// the SCC result if the structure moved, invalidate the affected memo
    /// entries, then notify graph-update subscribers.
    pub fn apply_file_change(&mut self, event: &ChangeEvent) -> IncrementalUpdateResult {
        let result =
            update::apply_file_change(&mut self.graph, &mut self.scc, &mut self.memo, &self.caches, event);
        if result.graph_changed {
            for (_, listener) in &self.graph_listeners {
                listener.on_graph_updated(&result);
            }
        }
        result
    }

    /// Deliver a change event to subscribers. The watcher calls this after
    /// `apply_file_change`, so no subscriber can observe an invalidated memo
    /// over a stale graph.
    pub fn notify_change(&self, event: &ChangeEvent) {
        for (_, listener) in &self.change_listeners {
            listener.on_change(event);
        }
    }

    pub fn subscribe_changes(&mut self, listener: Box<dyn ChangeListener>) -> ListenerHandle {
        let id = self.next_listener;
        self.next_listener += 1;
        self.change_listeners.push((id, listener));
        ListenerHandle(id)
    }

    pub fn unsubscribe_changes(&mut self, handle: ListenerHandle) {
        self.change_listeners.retain(|(id, _)| *id != handle.0);
    }

    pub fn subscribe_graph_updates(
        &mut self,
        listener: Box<dyn GraphUpdateListener>,
    ) -> ListenerHandle {
        let id = self.next_listener;
        self.next_listener += 1;
        self.graph_listeners.push((id, listener));
        ListenerHandle(id)
    }

    pub fn unsubscribe_graph_updates(&mut self, handle: ListenerHandle) {
        self.graph_listeners.retain(|(id, _)| *id != handle.0);
    }

    /// Map query input to the internal absolute form. Relative inputs are
    /// tried against the project root, then the canonical source root.
    fn resolve_query_path(&self, file: &str) -> String {
        let p = Path::new(file);
        if p.is_absolute() {
            return normalize_abs_str(p);
        }
        let from_root = normalize_abs_str(&self.project_root.join(p));
        if self.graph.contains(&from_root) {
            return from_root;
        }
        if let Some(src) = self.graph.roots().first() {
            let from_src = normalize_abs_str(&src.join(p));
            if self.graph.contains(&from_src) {
                return from_src;
            }
        }
        from_root
    }
}

/// Walk upward from `start` looking for a version-control directory or a
/// language manifest; the nearest match is the project root.
pub fn discover_project_root(start: &Path) -> Option<PathBuf> {
    const MARKERS: &[&str] = &[
        ".git",
        "Cargo.toml",
        "package.json",
        "go.mod",
        "pyproject.toml",
        "CMakeLists.txt",
        "Makefile",
    ];
    let mut cur = normalize_abs(start);
    loop {
        if MARKERS.iter().any(|m| cur.join(m).exists()) {
            return Some(cur);
        }
        if !cur.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impact::RiskLevel;
    use std::fs;
    use tempfile::TempDir;

    fn chain_project() -> (TempDir, ProjectSession) {
        // a.rs → b.rs → c.rs through `use crate::...`.
        let td = TempDir::new().unwrap();
        let root = td.path();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"chain\"\n").unwrap();
        fs::create_dir(root.join("src")).unwrap();
        fs::write(root.join("src/a.rs"), "use crate::b::B;\n").unwrap();
        fs::write(root.join("src/b.rs"), "use crate::c::C;\npub struct B;\n").unwrap();
        fs::write(root.join("src/c.rs"), "pub struct C;\n").unwrap();
        let session = ProjectSession::build(root, &BuildOptions::default());
        (td, session)
    }

    #[test]
    fn build_discovers_files_and_edges() {
        let (_td, session) = chain_project();
        assert_eq!(session.graph().len(), 3);
        assert_eq!(session.graph().edge_count(), 2);
        assert_eq!(session.graph().languages(), &["rust".to_string()]);
        assert!(session.scc().is_some());
    }

    #[test]
    fn impact_accepts_relative_paths() {
        let (_td, mut session) = chain_project();
        let report = session.analyse_impact("src/c.rs", false).unwrap();
        assert_eq!(report.direct_dependents, vec!["b.rs"]);
        assert_eq!(report.transitive_dependents, vec!["a.rs"]);
        assert_eq!(report.risk_level, RiskLevel::Low);
    }

    #[test]
    fn unknown_root_builds_empty_graph() {
        let td = TempDir::new().unwrap();
        let session = ProjectSession::build(td.path(), &BuildOptions::default());
        assert!(session.graph().is_empty());
    }

    #[test]
    fn file_cap_limits_discovery() {
        let td = TempDir::new().unwrap();
        let root = td.path();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"cap\"\n").unwrap();
        fs::create_dir(root.join("src")).unwrap();
        for i in 0..10 {
            fs::write(root.join(format!("src/f{i}.rs")), "").unwrap();
        }
        let session = ProjectSession::build(
            root,
            &BuildOptions {
                max_files: Some(4),
            },
        );
        assert_eq!(session.graph().len(), 4);
    }

    #[test]
    fn rebuild_clears_memo_and_counters_survive() {
        let (_td, mut session) = chain_project();
        session.analyse_impact("src/c.rs", false).unwrap();
        session.analyse_impact("src/c.rs", false).unwrap();
        let before = session.memo_stats();
        assert_eq!(before.size, 1);
        session.rebuild(&BuildOptions::default());
        let after = session.memo_stats();
        assert_eq!(after.size, 0);
        assert_eq!(after.hits, before.hits);
        assert_eq!(session.graph().len(), 3);
    }
}
