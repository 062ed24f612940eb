use crate::graph::{DependencyGraph, FileId};
use crate::languages::path::normalize_abs_str;
use crate::languages::{plugin_for_path, PluginCaches, ResolveContext};
use crate::memo::MemoCache;
use crate::scc::{self, SccResult};
use crate::watcher::{ChangeEvent, ChangeKind};
use serde::Serialize;
use std::path::Path;

/// What one file event did to the graph.
#[derive(Debug, Clone, Serialize, Default)]
pub struct IncrementalUpdateResult {
    pub file: String,
    pub added_edges: Vec<(String, String)>,
    pub removed_edges: Vec<(String, String)>,
    pub edges_changed: bool,
    /// Reverse-transitive closure of the changed file (the file included),
    /// i.e. everything whose impact answer may have moved.
    pub affected_files: Vec<String>,
    /// True when the node set or the edge set changed: the SCC result was
    /// recomputed and subscribers should be notified.
    pub graph_changed: bool,
    pub invalidated_memo_entries: usize,
}

/// Apply a single watcher event to the graph, keeping `forward`/`reverse`
/// mutually consistent, recomputing the SCC condensation when the structure
/// moved, and invalidating exactly the memo entries the change can reach.
///
/// Idempotent under replay: re-applying an event finds no edge delta and
/// leaves everything untouched.
///
/// Known lag: adding a file does not re-scan pre-existing files whose source
/// already names it, so their forward lists miss the new target until the
/// next full rebuild (see DESIGN.md).
pub(crate) fn apply_file_change(
    graph: &mut DependencyGraph,
    scc_result: &mut Option<SccResult>,
    memo: &mut MemoCache,
    caches: &PluginCaches,
    event: &ChangeEvent,
) -> IncrementalUpdateResult {
    let path = normalize_abs_str(&event.file_path);
    match event.kind {
        ChangeKind::Deleted => remove_file(graph, scc_result, memo, &path),
        ChangeKind::Added | ChangeKind::Modified => upsert_file(
            graph,
            scc_result,
            memo,
            caches,
            &path,
            event.new_content.as_deref(),
        ),
    }
}

fn upsert_file(
    graph: &mut DependencyGraph,
    scc_result: &mut Option<SccResult>,
    memo: &mut MemoCache,
    caches: &PluginCaches,
    path: &str,
    new_content: Option<&str>,
) -> IncrementalUpdateResult {
    let node_added = !graph.contains(path);
    let id = graph.add_file(path);

    let old_deps: Vec<FileId> = graph.forward(id).to_vec();
    let new_deps = parse_current_deps(graph, caches, path, new_content);

    let added: Vec<FileId> = new_deps
        .iter()
        .copied()
        .filter(|t| !old_deps.contains(t))
        .collect();
    let removed: Vec<FileId> = old_deps
        .iter()
        .copied()
        .filter(|t| !new_deps.contains(t))
        .collect();
    for &t in &removed {
        graph.remove_edge(id, t);
    }
    for &t in &added {
        graph.add_edge(id, t);
    }

    let edges_changed = !added.is_empty() || !removed.is_empty();
    let graph_changed = edges_changed || node_added;
    let closure = graph.reverse_closure(id);
    let affected_abs: Vec<String> = closure
        .iter()
        .map(|&f| graph.path_of(f).to_string())
        .collect();

    // A content-only edit leaves every impact set intact; the memo is
    // touched only when the structure moved.
    let mut invalidated = 0;
    if graph_changed {
        *scc_result = Some(scc::compute(graph));
        invalidated = memo.invalidate(&affected_abs);
    }

    IncrementalUpdateResult {
        file: graph.display_path(path),
        added_edges: added
            .iter()
            .map(|&t| edge_display(graph, path, t))
            .collect(),
        removed_edges: removed
            .iter()
            .map(|&t| edge_display(graph, path, t))
            .collect(),
        edges_changed,
        affected_files: affected_abs
            .iter()
            .map(|p| graph.display_path(p))
            .collect(),
        graph_changed,
        invalidated_memo_entries: invalidated,
    }
}

fn remove_file(
    graph: &mut DependencyGraph,
    scc_result: &mut Option<SccResult>,
    memo: &mut MemoCache,
    path: &str,
) -> IncrementalUpdateResult {
    let Some(id) = graph.id_of(path) else {
        // Replay of an already-applied deletion.
        return IncrementalUpdateResult {
            file: graph.display_path(path),
            ..Default::default()
        };
    };

    // Capture the closure and the doomed edges before any mutation.
    let closure = graph.reverse_closure(id);
    let affected_abs: Vec<String> = closure
        .iter()
        .map(|&f| graph.path_of(f).to_string())
        .collect();
    let mut removed_edges: Vec<(String, String)> = graph
        .forward(id)
        .iter()
        .map(|&t| edge_display(graph, path, t))
        .collect();
    removed_edges.extend(
        graph
            .reverse(id)
            .iter()
            .map(|&s| (graph.display_path(graph.path_of(s)), graph.display_path(path))),
    );
    let edges_changed = !removed_edges.is_empty();

    graph.remove_file(id);
    *scc_result = Some(scc::compute(graph));
    let invalidated = memo.invalidate(&affected_abs);

    IncrementalUpdateResult {
        file: graph.display_path(path),
        added_edges: Vec::new(),
        removed_edges,
        edges_changed,
        affected_files: affected_abs
            .iter()
            .map(|p| graph.display_path(p))
            .collect(),
        graph_changed: true,
        invalidated_memo_entries: invalidated,
    }
}

/// Re-parse the file's imports and keep only targets that are already nodes.
fn parse_current_deps(
    graph: &DependencyGraph,
    caches: &PluginCaches,
    path: &str,
    new_content: Option<&str>,
) -> Vec<FileId> {
    let file = Path::new(path);
    let Some(plugin) = plugin_for_path(file) else {
        return Vec::new();
    };
    let source_dirs = plugin.source_dirs(graph.project_root());
    let ctx = ResolveContext {
        project_root: graph.project_root(),
        source_dirs: &source_dirs,
        caches,
    };
    let mut deps: Vec<FileId> = plugin
        .parse_imports(file, &ctx, new_content)
        .iter()
        .filter_map(|p| graph.id_of(&normalize_abs_str(p)))
        .collect();
    // Dedupe preserving first-seen order.
    let mut seen = std::collections::HashSet::new();
    deps.retain(|&d| seen.insert(d));
    deps
}

fn edge_display(graph: &DependencyGraph, from: &str, to: FileId) -> (String, String) {
    (
        graph.display_path(from),
        graph.display_path(graph.path_of(to)),
    )
}
