use crate::diff::{diff_lines, LineDiff};
use crate::graph::DependencyGraph;
use crate::languages::path::normalize_abs;
use crate::languages::{is_non_source_file, is_skipped_dir, plugin_for_path};
use crate::session::ProjectSession;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A settled, debounced file mutation with before/after content and a
/// line diff.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub file_path: PathBuf,
    pub relative_path: String,
    pub kind: ChangeKind,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub diff: Vec<LineDiff>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Quiet window per path; repeated events inside it coalesce into the
    /// last one.
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
        }
    }
}

/// In-memory mirror of every discoverable source file. The watcher owns the
/// strings; consumers get copies inside events.
#[derive(Debug, Default)]
pub struct ContentCache {
    files: HashMap<PathBuf, String>,
}

impl ContentCache {
    /// Load the content of every file in the graph, in parallel batches.
    pub fn load(graph: &DependencyGraph) -> Self {
        let paths: Vec<PathBuf> = graph.files().map(|(_, p)| PathBuf::from(p)).collect();
        let loaded: Vec<(PathBuf, String)> = paths
            .par_iter()
            .filter_map(|p| match std::fs::read_to_string(p) {
                Ok(content) => Some((p.clone(), content)),
                Err(e) => {
                    log::debug!("skipping unreadable {}: {e}", p.display());
                    None
                }
            })
            .collect();
        let files: HashMap<PathBuf, String> = loaded.into_iter().collect();
        log::info!(
            "content cache: {} files, {} lines",
            files.len(),
            files.values().map(|c| c.lines().count()).sum::<usize>()
        );
        Self { files }
    }

    pub fn get(&self, path: &Path) -> Option<&String> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_lines(&self) -> usize {
        self.files.values().map(|c| c.lines().count()).sum()
    }
}

/// Recursive filesystem watcher with per-path debouncing. Raw notify events
/// arm a deadline per path; when a deadline fires the path is re-read,
/// classified against the content cache, diffed, pushed through the
/// incremental updater and only then emitted to observers.
pub struct FileWatcher {
    options: WatchOptions,
    cache: ContentCache,
    /// Watched source roots; the first is the display anchor.
    roots: Vec<PathBuf>,
    /// Pending debounce deadlines; dropping the watcher drops the timers.
    pending: HashMap<PathBuf, Instant>,
}

impl FileWatcher {
    pub fn new(graph: &DependencyGraph, options: WatchOptions) -> Self {
        let mut roots = graph.roots().to_vec();
        if roots.is_empty() {
            roots.push(graph.project_root().to_path_buf());
        }
        Self {
            options,
            cache: ContentCache::load(graph),
            roots,
            pending: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Record a raw filesystem notification for `path`, arming (or
    /// re-arming) its debounce timer.
    pub fn note_raw_event(&mut self, path: &Path) {
        let path = normalize_abs(path);
        if !self.is_watchable(&path) {
            return;
        }
        self.pending
            .insert(path, Instant::now() + self.options.debounce);
    }

    /// Fire every expired debounce timer: classify, diff, apply to the
    /// session's graph, then notify observers. Returns the emitted events.
    pub fn dispatch_due(&mut self, session: &mut ProjectSession) -> Vec<ChangeEvent> {
        let now = Instant::now();
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(p, _)| p.clone())
            .collect();
        due.sort();

        let mut emitted = Vec::new();
        for path in due {
            self.pending.remove(&path);
            if let Some(event) = self.settle(&path) {
                session.apply_file_change(&event);
                session.notify_change(&event);
                emitted.push(event);
            }
        }
        emitted
    }

    /// Classify a path once its debounce window has closed. Returns `None`
    /// for no-ops: unknown deleted paths, unreadable files, unchanged
    /// content.
    pub fn settle(&mut self, path: &Path) -> Option<ChangeEvent> {
        let path = normalize_abs(path);
        let relative = self.relative(&path);
        let timestamp = SystemTime::now();

        if !path.is_file() {
            let old = self.cache.files.remove(&path)?;
            let diff = diff_lines(&old, "");
            return Some(ChangeEvent {
                file_path: path,
                relative_path: relative,
                kind: ChangeKind::Deleted,
                old_content: Some(old),
                new_content: None,
                diff,
                timestamp,
            });
        }

        let new = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("ignoring unreadable {}: {e}", path.display());
                return None;
            }
        };
        match self.cache.files.insert(path.clone(), new.clone()) {
            None => Some(ChangeEvent {
                file_path: path,
                relative_path: relative,
                kind: ChangeKind::Added,
                old_content: None,
                diff: diff_lines("", &new),
                new_content: Some(new),
                timestamp,
            }),
            Some(old) if old == new => None,
            Some(old) => Some(ChangeEvent {
                file_path: path,
                relative_path: relative,
                kind: ChangeKind::Modified,
                diff: diff_lines(&old, &new),
                old_content: Some(old),
                new_content: Some(new),
                timestamp,
            }),
        }
    }

    /// Number of paths with an armed debounce timer.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Watch the session's source roots until the channel closes. Blocks
    /// the calling thread; this is the event loop.
    pub fn run(&mut self, session: &mut ProjectSession) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        let roots: Vec<PathBuf> = session.graph().roots().to_vec();
        for root in &roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }
        log::info!(
            "watching {} roots, debounce {:?}",
            roots.len(),
            self.options.debounce
        );

        loop {
            let timeout = self
                .next_deadline()
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_millis(500));
            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    for path in &event.paths {
                        self.note_raw_event(path);
                    }
                }
                Ok(Err(e)) => log::warn!("watch error: {e}"),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    anyhow::bail!("watcher channel disconnected")
                }
            }
            self.dispatch_due(session);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.roots[0])
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// A path is worth a timer if it lives under a watched root, a plugin
    /// claims it, and no component below the root is in the skip set.
    fn is_watchable(&self, path: &Path) -> bool {
        if plugin_for_path(path).is_none() {
            return false;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if is_non_source_file(name) {
            return false;
        }
        let Some(rel) = self.roots.iter().find_map(|r| path.strip_prefix(r).ok()) else {
            return false;
        };
        !rel.components()
            .any(|c| matches!(c, std::path::Component::Normal(n) if is_skipped_dir(&n.to_string_lossy())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{BuildOptions, ProjectSession};
    use std::fs;
    use tempfile::TempDir;

    fn rust_project() -> (TempDir, ProjectSession) {
        let td = TempDir::new().unwrap();
        let root = td.path();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"w\"\n").unwrap();
        fs::create_dir(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), "mod a;\n").unwrap();
        fs::write(root.join("src/a.rs"), "pub fn a() {}\n").unwrap();
        let session = ProjectSession::build(root, &BuildOptions::default());
        (td, session)
    }

    #[test]
    fn cache_loads_discovered_files() {
        let (_td, session) = rust_project();
        let watcher = FileWatcher::new(session.graph(), WatchOptions::default());
        assert_eq!(watcher.cache().len(), 2);
        assert!(watcher.cache().total_lines() >= 2);
    }

    #[test]
    fn unchanged_content_is_dropped_silently() {
        let (_td, session) = rust_project();
        let mut watcher = FileWatcher::new(session.graph(), WatchOptions::default());
        let a = session.graph().project_root().join("src/a.rs");
        assert!(watcher.settle(&a).is_none());
    }

    #[test]
    fn modification_produces_a_diff_against_the_cache() {
        let (_td, session) = rust_project();
        let mut watcher = FileWatcher::new(session.graph(), WatchOptions::default());
        let a = session.graph().project_root().join("src/a.rs");
        fs::write(&a, "pub fn a() {}\npub fn b() {}\n").unwrap();
        let event = watcher.settle(&a).expect("modified event");
        assert_eq!(event.kind, ChangeKind::Modified);
        assert_eq!(event.diff.len(), 1);
        assert_eq!(event.diff[0].line, 2);
        assert_eq!(event.old_content.as_deref(), Some("pub fn a() {}\n"));
    }

    #[test]
    fn deletion_serves_old_content_from_cache_and_evicts() {
        let (_td, session) = rust_project();
        let mut watcher = FileWatcher::new(session.graph(), WatchOptions::default());
        let a = session.graph().project_root().join("src/a.rs");
        fs::remove_file(&a).unwrap();
        let event = watcher.settle(&a).expect("deleted event");
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(event.old_content.is_some());
        // Second settle finds neither file nor cache entry.
        assert!(watcher.settle(&a).is_none());
    }

    #[test]
    fn new_file_classifies_as_added() {
        let (_td, session) = rust_project();
        let mut watcher = FileWatcher::new(session.graph(), WatchOptions::default());
        let b = session.graph().project_root().join("src/b.rs");
        fs::write(&b, "pub fn b() {}\n").unwrap();
        let event = watcher.settle(&b).expect("added event");
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(event.relative_path, "b.rs");
        assert!(event.old_content.is_none());
    }

    #[test]
    fn burst_of_writes_coalesces_to_one_event() {
        let (_td, mut session) = rust_project();
        let mut watcher = FileWatcher::new(
            session.graph(),
            WatchOptions {
                debounce: Duration::from_millis(30),
            },
        );
        let a = session.graph().project_root().join("src/a.rs");
        for i in 0..10 {
            fs::write(&a, format!("pub fn a() {{}} // rev {i}\n")).unwrap();
            watcher.note_raw_event(&a);
        }
        assert_eq!(watcher.pending_count(), 1, "timers coalesce per path");
        assert!(watcher.dispatch_due(&mut session).is_empty(), "window open");
        std::thread::sleep(Duration::from_millis(40));
        let events = watcher.dispatch_due(&mut session);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn irrelevant_paths_never_arm_timers() {
        let (_td, session) = rust_project();
        let mut watcher = FileWatcher::new(session.graph(), WatchOptions::default());
        let root = session.graph().project_root().to_path_buf();
        watcher.note_raw_event(&root.join("notes.txt"));
        watcher.note_raw_event(&root.join("target/debug/x.rs"));
        watcher.note_raw_event(&root.join("app.min.js"));
        assert_eq!(watcher.pending_count(), 0);
    }
}
