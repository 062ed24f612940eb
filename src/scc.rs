use crate::graph::{DependencyGraph, FileId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// One node of the condensed DAG: a strongly-connected component of files.
#[derive(Debug, Clone, Serialize)]
pub struct CondensedNode {
    pub index: usize,
    pub files: Vec<FileId>,
    pub size: usize,
    pub is_cyclic: bool,
}

/// Condensation of the dependency graph: one node per SCC, deduplicated
/// forward/reverse adjacency between component indices (no self-loops), and
/// a topological order with dependencies before dependents.
#[derive(Debug, Clone, Serialize)]
pub struct CondensedGraph {
    pub nodes: Vec<CondensedNode>,
    pub forward: Vec<Vec<usize>>,
    pub reverse: Vec<Vec<usize>>,
    pub topo_order: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct SccResult {
    /// Each file appears in exactly one component.
    pub components: Vec<Vec<FileId>>,
    /// FileId → component index. Dead or unknown ids map to `usize::MAX`.
    node_component: Vec<usize>,
    pub condensed: CondensedGraph,
}

impl SccResult {
    pub fn component_of(&self, id: FileId) -> Option<usize> {
        match self.node_component.get(id) {
            Some(&c) if c != usize::MAX => Some(c),
            _ => None,
        }
    }

    pub fn scc_count(&self) -> usize {
        self.components.len()
    }

    pub fn cyclic_scc_count(&self) -> usize {
        self.condensed.nodes.iter().filter(|n| n.is_cyclic).count()
    }
}

/// Compute SCCs, the condensed DAG and its topological order for the current
/// graph. Self-imports are ignored; files with no edges become singleton
/// components. O(V+E).
pub fn compute(graph: &DependencyGraph) -> SccResult {
    let mut pg: DiGraph<FileId, ()> = DiGraph::new();
    let mut node_ix: HashMap<FileId, NodeIndex> = HashMap::with_capacity(graph.len());
    for (id, _) in graph.files() {
        node_ix.insert(id, pg.add_node(id));
    }
    for (id, _) in graph.files() {
        for &to in graph.forward(id) {
            if to == id {
                continue;
            }
            if let Some(&tix) = node_ix.get(&to) {
                pg.add_edge(node_ix[&id], tix, ());
            }
        }
    }

    let raw = tarjan_scc(&pg);
    let mut components: Vec<Vec<FileId>> = raw
        .into_iter()
        .map(|scc| scc.into_iter().map(|ix| pg[ix]).collect())
        .collect();
    for files in &mut components {
        files.sort_unstable();
    }

    let mut node_component = vec![usize::MAX; graph.id_bound()];
    for (ci, files) in components.iter().enumerate() {
        for &f in files {
            node_component[f] = ci;
        }
    }

    let condensed = condense(graph, &components, &node_component);
    SccResult {
        components,
        node_component,
        condensed,
    }
}

fn condense(
    graph: &DependencyGraph,
    components: &[Vec<FileId>],
    node_component: &[usize],
) -> CondensedGraph {
    let n = components.len();
    let mut edge_set: HashSet<(usize, usize)> = HashSet::new();
    for (id, _) in graph.files() {
        let cu = node_component[id];
        for &to in graph.forward(id) {
            let cv = match node_component.get(to) {
                Some(&c) if c != usize::MAX => c,
                _ => continue,
            };
            if cu != cv {
                edge_set.insert((cu, cv));
            }
        }
    }

    let mut forward = vec![Vec::new(); n];
    let mut reverse = vec![Vec::new(); n];
    for &(u, v) in &edge_set {
        forward[u].push(v);
        reverse[v].push(u);
    }
    for adj in forward.iter_mut().chain(reverse.iter_mut()) {
        adj.sort_unstable();
    }

    let nodes = components
        .iter()
        .enumerate()
        .map(|(index, files)| CondensedNode {
            index,
            files: files.clone(),
            size: files.len(),
            is_cyclic: files.len() > 1,
        })
        .collect();

    let topo_order = kahn_order(&forward, &reverse);
    CondensedGraph {
        nodes,
        forward,
        reverse,
        topo_order,
    }
}

/// Kahn's algorithm, leaves of the dependency relation first: start from
/// components with zero outgoing forward edges, then release the components
/// importing them. The result places every component after all components it
/// transitively depends on.
fn kahn_order(forward: &[Vec<usize>], reverse: &[Vec<usize>]) -> Vec<usize> {
    let n = forward.len();
    let mut out_deg: Vec<usize> = forward.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..n).filter(|&u| out_deg[u] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(u) = queue.pop_front() {
        order.push(u);
        for &importer in &reverse[u] {
            out_deg[importer] -= 1;
            if out_deg[importer] == 0 {
                queue.push_back(importer);
            }
        }
    }
    if order.len() < n {
        // Unreachable from a well-formed condensation; a shortfall means the
        // condensed graph still contains a cycle.
        log::warn!(
            "topological sort returned {} of {} components; appending the remainder",
            order.len(),
            n
        );
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..n).filter(|u| !placed.contains(u)));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn build(edges: &[(&str, &str)], files: &[&str]) -> DependencyGraph {
        let mut g = DependencyGraph::new(PathBuf::from("/p"));
        for f in files {
            g.add_file(f);
        }
        for (a, b) in edges {
            let from = g.add_file(a);
            let to = g.add_file(b);
            g.add_edge(from, to);
        }
        g
    }

    fn comp_paths(graph: &DependencyGraph, scc: &SccResult, id: usize) -> Vec<String> {
        scc.components[id]
            .iter()
            .map(|&f| graph.path_of(f).to_string())
            .collect()
    }

    #[test]
    fn singletons_for_disconnected_nodes() {
        let g = build(&[], &["a", "b", "c"]);
        let scc = compute(&g);
        assert_eq!(scc.scc_count(), 3);
        assert_eq!(scc.cyclic_scc_count(), 0);
    }

    #[test]
    fn cycle_collapses_to_one_component() {
        let g = build(&[("x", "y"), ("y", "z"), ("z", "x")], &[]);
        let scc = compute(&g);
        assert_eq!(scc.scc_count(), 1);
        assert!(scc.condensed.nodes[0].is_cyclic);
        let mut files = comp_paths(&g, &scc, 0);
        files.sort();
        assert_eq!(files, vec!["x", "y", "z"]);
    }

    #[test]
    fn self_import_stays_singleton() {
        let mut g = build(&[], &["a"]);
        let a = g.id_of("a").unwrap();
        g.add_edge(a, a);
        let scc = compute(&g);
        assert_eq!(scc.scc_count(), 1);
        assert!(!scc.condensed.nodes[0].is_cyclic);
    }

    #[test]
    fn topo_order_puts_dependencies_first() {
        // a → b → c: c depends on nothing, a on everything.
        let g = build(&[("a", "b"), ("b", "c")], &[]);
        let scc = compute(&g);
        let order = &scc.condensed.topo_order;
        assert_eq!(order.len(), 3);
        let pos: HashMap<usize, usize> =
            order.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        let ca = scc.component_of(g.id_of("a").unwrap()).unwrap();
        let cb = scc.component_of(g.id_of("b").unwrap()).unwrap();
        let cc = scc.component_of(g.id_of("c").unwrap()).unwrap();
        assert!(pos[&cc] < pos[&cb]);
        assert!(pos[&cb] < pos[&ca]);
    }

    #[test]
    fn nested_cycles_share_one_component() {
        // Two cycles sharing node b: a→b→a and b→c→b.
        let g = build(&[("a", "b"), ("b", "a"), ("b", "c"), ("c", "b")], &[]);
        let scc = compute(&g);
        assert_eq!(scc.scc_count(), 1);
        assert_eq!(scc.condensed.nodes[0].size, 3);
    }

    #[test]
    fn condensed_edges_are_deduplicated() {
        // Two parallel file edges between the same pair of components.
        let g = build(&[("a1", "b"), ("a2", "b"), ("a1", "a2"), ("a2", "a1")], &[]);
        let scc = compute(&g);
        assert_eq!(scc.scc_count(), 2);
        let ca = scc.component_of(g.id_of("a1").unwrap()).unwrap();
        assert_eq!(scc.condensed.forward[ca].len(), 1);
    }

    #[test]
    fn components_partition_files() {
        let g = build(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a")], &["e"]);
        let scc = compute(&g);
        let mut seen = HashSet::new();
        for comp in &scc.components {
            for &f in comp {
                assert!(seen.insert(f), "file appears in more than one SCC");
            }
        }
        assert_eq!(seen.len(), g.len());
    }
}
