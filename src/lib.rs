pub mod coupling;
pub mod diff;
pub mod graph;
pub mod impact;
pub mod languages;
pub mod memo;
pub mod render;
pub mod scc;
pub mod session;
pub mod update;
pub mod watcher;

pub use coupling::{CouplingOptions, CouplingResult, FileCoupling};
pub use diff::{diff_lines, LineChangeKind, LineDiff};
pub use graph::{DependencyGraph, FileId};
pub use impact::{AnalysisError, HubFile, ImpactReport, RiskLevel};
pub use memo::{MemoCache, MemoStats};
pub use render::graph_to_dot;
pub use scc::{CondensedGraph, SccResult};
pub use session::{
    discover_project_root, BuildOptions, ChangeListener, GraphUpdateListener, ProjectSession,
};
pub use update::IncrementalUpdateResult;
pub use watcher::{ChangeEvent, ChangeKind, ContentCache, FileWatcher, WatchOptions};
