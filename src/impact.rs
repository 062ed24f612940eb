use crate::coupling::FileCoupling;
use crate::graph::{DependencyGraph, FileId};
use crate::memo::{MemoCache, MemoEntry};
use crate::scc::SccResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("file not in graph: {0}")]
    FileNotInGraph(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

/// Risk tag from the size of the impact set.
pub fn classify_risk(total_impacted: usize) -> RiskLevel {
    match total_impacted {
        0 => RiskLevel::None,
        1..=4 => RiskLevel::Low,
        5..=9 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

/// Result of one impact query. All paths are rendered relative to the
/// canonical source root except `file_path`, which keeps the absolute form
/// the caller passed in.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub file_path: String,
    pub relative_path: String,
    pub risk_level: RiskLevel,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
    pub total_impacted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade_levels: Option<HashMap<String, u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circular_cluster: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scc_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cyclic_scc_count: Option<usize>,
    pub from_cache: bool,
    /// Change couplings whose partner is not an import neighbour; attached
    /// only when the caller asks for coupling augmentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_couplings: Option<Vec<FileCoupling>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HubFile {
    pub file: String,
    pub dependent_count: usize,
    pub risk_level: RiskLevel,
}

/// Analyse the impact of changing `file` (absolute, normalised form).
///
/// Consults the memo cache first; on a miss, runs an SCC-aware reverse BFS
/// over the condensed graph (or a plain reverse BFS when no SCC result is
/// available) and stores the outcome.
pub fn analyse(
    graph: &DependencyGraph,
    scc: Option<&SccResult>,
    memo: &mut MemoCache,
    file: &str,
) -> Result<ImpactReport, AnalysisError> {
    let id = graph
        .id_of(file)
        .ok_or_else(|| AnalysisError::FileNotInGraph(file.to_string()))?;

    if let Some(entry) = memo.get(file) {
        let impact_set = entry.impact_set.clone();
        let cascade = entry.cascade_levels.clone();
        let risk = entry.risk_level;
        // Direct dependents are recomputed from the live reverse adjacency;
        // the cached set is the transitive closure. A self-import never
        // counts as a dependent.
        let direct: Vec<String> =
            sorted_paths(graph, graph.reverse(id).iter().copied().filter(|&d| d != id));
        let direct_set: HashSet<&String> = direct.iter().collect();
        let transitive: Vec<String> = impact_set
            .iter()
            .filter(|p| !direct_set.contains(p))
            .cloned()
            .collect();
        return Ok(build_report(
            graph, scc, id, file, risk, direct, transitive, cascade, true,
        ));
    }

    let levels = match scc.and_then(|s| s.component_of(id).map(|c| (s, c))) {
        Some((scc, comp)) => scc_levels(graph, scc, id, comp),
        None => bfs_levels(graph, id),
    };

    let cluster: HashSet<FileId> = cyclic_cluster(scc, graph, id).into_iter().collect();
    let mut direct_ids: Vec<FileId> = graph
        .reverse(id)
        .iter()
        .copied()
        .filter(|&d| d != id)
        .collect();
    for &member in &cluster {
        if !direct_ids.contains(&member) {
            direct_ids.push(member);
        }
    }
    let direct = sorted_paths(graph, direct_ids.iter().copied());
    let direct_set: HashSet<&String> = direct.iter().collect();

    let mut impact_set: Vec<String> = levels
        .keys()
        .map(|&f| graph.path_of(f).to_string())
        .collect();
    impact_set.sort_unstable();
    let transitive: Vec<String> = impact_set
        .iter()
        .filter(|p| !direct_set.contains(p))
        .cloned()
        .collect();

    let cascade: HashMap<String, u32> = levels
        .iter()
        .map(|(&f, &lvl)| (graph.path_of(f).to_string(), lvl))
        .collect();
    let total = impact_set.len();
    let risk = classify_risk(total);

    memo.set(
        file,
        MemoEntry {
            impact_set,
            direct_count: direct.len(),
            transitive_count: transitive.len(),
            risk_level: risk,
            cascade_levels: cascade.clone(),
            computed_at: Instant::now(),
        },
    );

    Ok(build_report(
        graph, scc, id, file, risk, direct, transitive, cascade, false,
    ))
}

/// Files ranked by in-degree of the reverse map: the ones whose change
/// fans out the widest.
pub fn hub_files(graph: &DependencyGraph, top_n: usize) -> Vec<HubFile> {
    let mut ranked: Vec<(usize, &str)> = graph
        .files()
        .map(|(id, path)| (graph.reverse(id).len(), path))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(top_n)
        .map(|(count, path)| HubFile {
            file: graph.display_path(path),
            dependent_count: count,
            risk_level: classify_risk(count),
        })
        .collect()
}

/// SCC-aware cascade levels: BFS over the condensed reverse edges from the
/// subject's component. Files sharing a cyclic component with the subject
/// are level 0; each hop in the condensed graph adds one level. The subject
/// itself is excluded.
fn scc_levels(
    graph: &DependencyGraph,
    scc: &SccResult,
    id: FileId,
    comp: usize,
) -> HashMap<FileId, u32> {
    let condensed = &scc.condensed;
    let mut dist: HashMap<usize, u32> = HashMap::new();
    let mut queue = VecDeque::new();
    dist.insert(comp, 0);
    queue.push_back(comp);
    while let Some(cur) = queue.pop_front() {
        let d = dist[&cur];
        for &importer in &condensed.reverse[cur] {
            if !dist.contains_key(&importer) {
                dist.insert(importer, d + 1);
                queue.push_back(importer);
            }
        }
    }

    let mut levels = HashMap::new();
    for (&c, &d) in &dist {
        for &f in &condensed.nodes[c].files {
            if f != id && graph.is_live(f) {
                levels.insert(f, d);
            }
        }
    }
    levels
}

/// Plain reverse BFS used when no SCC result is attached, or when the file
/// is newer than the last SCC computation.
fn bfs_levels(graph: &DependencyGraph, id: FileId) -> HashMap<FileId, u32> {
    let mut levels = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back((id, 0u32));
    let mut seen = HashSet::new();
    seen.insert(id);
    while let Some((cur, d)) = queue.pop_front() {
        for &dep in graph.reverse(cur) {
            if seen.insert(dep) {
                levels.insert(dep, d + 1);
                queue.push_back((dep, d + 1));
            }
        }
    }
    levels
}

/// Other members of the subject's component, when that component is cyclic.
fn cyclic_cluster(scc: Option<&SccResult>, graph: &DependencyGraph, id: FileId) -> Vec<FileId> {
    let Some(scc) = scc else { return Vec::new() };
    let Some(comp) = scc.component_of(id) else {
        return Vec::new();
    };
    let node = &scc.condensed.nodes[comp];
    if !node.is_cyclic {
        return Vec::new();
    }
    node.files
        .iter()
        .copied()
        .filter(|&f| f != id && graph.is_live(f))
        .collect()
}

fn sorted_paths(graph: &DependencyGraph, ids: impl Iterator<Item = FileId>) -> Vec<String> {
    let mut out: Vec<String> = ids.map(|f| graph.path_of(f).to_string()).collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[allow(clippy::too_many_arguments)]
fn build_report(
    graph: &DependencyGraph,
    scc: Option<&SccResult>,
    id: FileId,
    file: &str,
    risk: RiskLevel,
    direct_abs: Vec<String>,
    transitive_abs: Vec<String>,
    cascade_abs: HashMap<String, u32>,
    from_cache: bool,
) -> ImpactReport {
    let total = direct_abs.len() + transitive_abs.len();
    let cluster = cyclic_cluster(scc, graph, id);
    let circular_cluster = if cluster.is_empty() {
        None
    } else {
        Some(sorted_paths(graph, cluster.into_iter()).iter().map(|p| graph.display_path(p)).collect())
    };
    ImpactReport {
        file_path: file.to_string(),
        relative_path: graph.display_path(file),
        risk_level: risk,
        direct_dependents: direct_abs.iter().map(|p| graph.display_path(p)).collect(),
        transitive_dependents: transitive_abs.iter().map(|p| graph.display_path(p)).collect(),
        total_impacted: total,
        cascade_levels: Some(
            cascade_abs
                .into_iter()
                .map(|(p, l)| (graph.display_path(&p), l))
                .collect(),
        ),
        circular_cluster,
        scc_count: scc.map(|s| s.scc_count()),
        cyclic_scc_count: scc.map(|s| s.cyclic_scc_count()),
        from_cache,
        hidden_couplings: None,
    }
}
