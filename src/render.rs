use crate::graph::DependencyGraph;
use crate::languages::plugin_for_path;
use crate::scc::SccResult;
use std::path::Path;

fn esc_dot(s: &str) -> String {
    s.replace('"', "\\\"").replace('\n', " ")
}

/// Render the dependency graph in GraphViz dot form. Members of cyclic
/// components are filled red so import cycles stand out; files with a
/// recognised layer carry it as a tooltip.
pub fn graph_to_dot(graph: &DependencyGraph, scc: Option<&SccResult>) -> String {
    use std::fmt::Write as _;
    let mut buf = String::new();
    buf.push_str("digraph deps {\n");
    buf.push_str("  rankdir=LR;\n  node [shape=box, fontname=\"monospace\"];\n");

    for (id, path) in graph.files() {
        let rel = graph.display_path(path);
        let label = esc_dot(&rel);
        let mut attrs: Vec<String> = Vec::new();
        let cyclic = scc
            .and_then(|s| s.component_of(id))
            .map(|c| scc.unwrap().condensed.nodes[c].is_cyclic)
            .unwrap_or(false);
        if cyclic {
            attrs.push("style=filled, fillcolor=\"#ffcccc\"".to_string());
        }
        if let Some(layer) = plugin_for_path(Path::new(path)).and_then(|p| p.classify_layer(&rel))
        {
            attrs.push(format!("tooltip=\"{layer}\""));
        }
        if attrs.is_empty() {
            let _ = writeln!(buf, "  \"{label}\";");
        } else {
            let _ = writeln!(buf, "  \"{label}\" [{}];", attrs.join(", "));
        }
    }
    for (id, path) in graph.files() {
        let from = esc_dot(&graph.display_path(path));
        for &to in graph.forward(id) {
            let to_label = esc_dot(&graph.display_path(graph.path_of(to)));
            let _ = writeln!(buf, "  \"{from}\" -> \"{to_label}\";");
        }
    }
    buf.push_str("}\n");
    buf
}
