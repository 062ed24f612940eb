use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Index into the session's node table. File ids are only meaningful for the
/// graph that issued them; paths are the identity at every module boundary.
pub type FileId = usize;

#[derive(Debug, Clone)]
struct FileNode {
    path: String,
    live: bool,
}

/// File-level dependency graph: node arena plus forward (imports) and
/// reverse (imported-by) adjacency. The two maps are kept mutually
/// consistent on every mutation: `b ∈ forward[a] ⇔ a ∈ reverse[b]`.
///
/// Removed files leave a dead slot behind so ids stay stable; `files()` and
/// `len()` only see live nodes. Edge mutators are crate-private: the
/// incremental updater and the session builder are the only writers, which
/// keeps the memo cache's invalidation contract airtight.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<FileNode>,
    index: HashMap<String, FileId>,
    forward: Vec<Vec<FileId>>,
    reverse: Vec<Vec<FileId>>,
    project_root: PathBuf,
    roots: Vec<PathBuf>,
    languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GraphSummary {
    pub files: usize,
    pub edges: usize,
    pub languages: Vec<String>,
    pub roots: Vec<String>,
}

impl DependencyGraph {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            forward: Vec::new(),
            reverse: Vec::new(),
            project_root,
            roots: Vec::new(),
            languages: Vec::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Ordered source roots; the first is the canonical root used for
    /// relative-path display.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub(crate) fn set_roots(&mut self, roots: Vec<PathBuf>) {
        self.roots = roots;
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub(crate) fn set_languages(&mut self, languages: Vec<String>) {
        self.languages = languages;
    }

    /// Number of live files.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Upper bound on file ids ever issued (dead slots included). Useful for
    /// sizing id-indexed scratch vectors.
    pub fn id_bound(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn id_of(&self, path: &str) -> Option<FileId> {
        self.index.get(path).copied()
    }

    pub fn path_of(&self, id: FileId) -> &str {
        &self.nodes[id].path
    }

    pub fn is_live(&self, id: FileId) -> bool {
        self.nodes.get(id).map(|n| n.live).unwrap_or(false)
    }

    /// Live files in insertion order.
    pub fn files(&self) -> impl Iterator<Item = (FileId, &str)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.live)
            .map(|(id, n)| (id, n.path.as_str()))
    }

    /// Insert a file, returning its id. Idempotent: re-inserting an existing
    /// path returns the existing id unchanged.
    pub(crate) fn add_file(&mut self, path: &str) -> FileId {
        if let Some(&id) = self.index.get(path) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(FileNode {
            path: path.to_string(),
            live: true,
        });
        self.forward.push(Vec::new());
        self.reverse.push(Vec::new());
        self.index.insert(path.to_string(), id);
        id
    }

    /// Add an import edge `from → to`, maintaining the reverse map.
    /// Returns false (and changes nothing) if the edge already exists.
    pub(crate) fn add_edge(&mut self, from: FileId, to: FileId) -> bool {
        if self.forward[from].contains(&to) {
            return false;
        }
        self.forward[from].push(to);
        self.reverse[to].push(from);
        true
    }

    /// Remove an import edge, maintaining the reverse map. Returns false if
    /// the edge was not present.
    pub(crate) fn remove_edge(&mut self, from: FileId, to: FileId) -> bool {
        let Some(pos) = self.forward[from].iter().position(|&t| t == to) else {
            return false;
        };
        self.forward[from].remove(pos);
        if let Some(pos) = self.reverse[to].iter().position(|&s| s == from) {
            self.reverse[to].remove(pos);
        }
        true
    }

    /// Delete a file and every edge touching it. The slot goes dead; the id
    /// is never reused.
    pub(crate) fn remove_file(&mut self, id: FileId) {
        if !self.is_live(id) {
            return;
        }
        for to in std::mem::take(&mut self.forward[id]) {
            if let Some(pos) = self.reverse[to].iter().position(|&s| s == id) {
                self.reverse[to].remove(pos);
            }
        }
        for from in std::mem::take(&mut self.reverse[id]) {
            if let Some(pos) = self.forward[from].iter().position(|&t| t == id) {
                self.forward[from].remove(pos);
            }
        }
        self.index.remove(&self.nodes[id].path);
        self.nodes[id].live = false;
    }

    pub fn forward(&self, id: FileId) -> &[FileId] {
        &self.forward[id]
    }

    pub fn reverse(&self, id: FileId) -> &[FileId] {
        &self.reverse[id]
    }

    /// Reverse-transitive closure of `id`, including `id` itself: every file
    /// a change to `id` can reach through imported-by edges.
    pub fn reverse_closure(&self, id: FileId) -> Vec<FileId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        seen[id] = true;
        queue.push_back(id);
        while let Some(cur) = queue.pop_front() {
            out.push(cur);
            for &dep in &self.reverse[cur] {
                if !seen[dep] {
                    seen[dep] = true;
                    queue.push_back(dep);
                }
            }
        }
        out
    }

    /// Render a file identifier for the outside world: relative to the
    /// canonical source root, forward slashes on every platform.
    pub fn display_path(&self, path: &str) -> String {
        let p = Path::new(path);
        let anchor = self.roots.first().map(PathBuf::as_path);
        let rel = anchor
            .and_then(|root| p.strip_prefix(root).ok())
            .or_else(|| p.strip_prefix(&self.project_root).ok())
            .unwrap_or(p);
        rel.to_string_lossy().replace('\\', "/")
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            files: self.len(),
            edges: self.edge_count(),
            languages: self.languages.clone(),
            roots: self
                .roots
                .iter()
                .map(|r| r.to_string_lossy().replace('\\', "/"))
                .collect(),
        }
    }
}
