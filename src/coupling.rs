use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant, SystemTime};

/// Thresholds for the change-coupling miner.
#[derive(Debug, Clone, Copy)]
pub struct CouplingOptions {
    /// How many commits of history to read.
    pub max_commits: usize,
    /// Minimum co-change count for a pair to be reported.
    pub min_support: u32,
    /// Minimum confidence for a pair to be reported.
    pub min_confidence: f64,
    /// Commits touching more files than this are skipped entirely; they are
    /// merges or mass refactors and would dominate the statistics.
    pub max_files_per_commit: usize,
}

impl Default for CouplingOptions {
    fn default() -> Self {
        Self {
            max_commits: 500,
            min_support: 3,
            min_confidence: 0.3,
            max_files_per_commit: 20,
        }
    }
}

/// A pair of files that tend to change in the same commit. `file1 < file2`
/// canonically; `confidence = co_change_count / max(file1_changes,
/// file2_changes)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileCoupling {
    pub file1: String,
    pub file2: String,
    pub co_change_count: u32,
    pub file1_changes: u32,
    pub file2_changes: u32,
    pub confidence: f64,
    pub support: u32,
}

impl FileCoupling {
    /// The side of the pair that is not `file`.
    pub fn partner_of(&self, file: &str) -> &str {
        if self.file1 == file {
            &self.file2
        } else {
            &self.file1
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CouplingResult {
    pub couplings: Vec<FileCoupling>,
    /// file → its couplings, sorted by confidence descending.
    pub by_file: HashMap<String, Vec<FileCoupling>>,
    pub commits_analysed: usize,
    pub analysed_at: SystemTime,
}

impl CouplingResult {
    fn empty() -> Self {
        Self {
            couplings: Vec::new(),
            by_file: HashMap::new(),
            commits_analysed: 0,
            analysed_at: SystemTime::now(),
        }
    }
}

const GIT_TIMEOUT: Duration = Duration::from_secs(30);
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Mines and caches change couplings per project root. Results stay valid
/// for five minutes or until `invalidate` (graph rebuild).
#[derive(Debug, Default)]
pub struct CouplingMiner {
    cache: HashMap<PathBuf, (CouplingResult, Instant)>,
}

impl CouplingMiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn couplings(&mut self, project_root: &Path, opts: &CouplingOptions) -> CouplingResult {
        if let Some((cached, at)) = self.cache.get(project_root) {
            if at.elapsed() < CACHE_TTL {
                return cached.clone();
            }
        }
        let result = mine(project_root, opts);
        self.cache
            .insert(project_root.to_path_buf(), (result.clone(), Instant::now()));
        result
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}

/// Read the last `max_commits` commits and surface file pairs that co-change
/// above the support and confidence thresholds. A missing or failing git is
/// not an error: the result is empty (and cached, so the probe is not
/// repeated for the cache window).
fn mine(project_root: &Path, opts: &CouplingOptions) -> CouplingResult {
    let Some(output) = run_git_log(project_root, opts.max_commits) else {
        return CouplingResult::empty();
    };
    let commits = parse_history(&output);
    accumulate(&commits, opts)
}

fn run_git_log(project_root: &Path, max_commits: usize) -> Option<String> {
    let mut child = Command::new("git")
        .args([
            "-C",
            project_root.to_str().unwrap_or("."),
            "log",
            "-n",
            &max_commits.to_string(),
            "--pretty=format:%H",
            "--name-only",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    // Drain stdout on a helper thread so a large log cannot deadlock the
    // pipe while we watch the deadline.
    let mut stdout = child.stdout.take()?;
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        let _ = tx.send(buf);
    });

    let deadline = Instant::now() + GIT_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let buf = rx.recv_timeout(Duration::from_secs(1)).unwrap_or_default();
                if !status.success() {
                    log::debug!("git log exited with {status}; treating as no history");
                    return None;
                }
                return Some(buf);
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    log::warn!("git log exceeded {GIT_TIMEOUT:?}; killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                log::debug!("git log wait failed: {e}");
                return None;
            }
        }
    }
}

/// Split `--pretty=format:%H --name-only` output into (commit, files)
/// records. Robust to empty segments and interleaved blank lines.
fn parse_history(output: &str) -> Vec<(String, Vec<String>)> {
    let mut commits: Vec<(String, Vec<String>)> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_commit_hash(line) {
            commits.push((line.to_string(), Vec::new()));
        } else if let Some((_, files)) = commits.last_mut() {
            files.push(line.to_string());
        }
    }
    commits
}

fn is_commit_hash(line: &str) -> bool {
    line.len() == 40 && line.bytes().all(|b| b.is_ascii_hexdigit())
}

fn accumulate(commits: &[(String, Vec<String>)], opts: &CouplingOptions) -> CouplingResult {
    let mut change_count: HashMap<String, u32> = HashMap::new();
    let mut pair_count: HashMap<(String, String), u32> = HashMap::new();

    for (_, files) in commits {
        let mut relevant: Vec<&String> =
            files.iter().filter(|f| is_coupling_relevant(f)).collect();
        relevant.sort_unstable();
        relevant.dedup();
        if relevant.len() > opts.max_files_per_commit {
            continue;
        }
        for f in &relevant {
            *change_count.entry((*f).clone()).or_insert(0) += 1;
        }
        for i in 0..relevant.len() {
            for j in (i + 1)..relevant.len() {
                // relevant is sorted, so (i, j) is already canonical.
                let key = (relevant[i].clone(), relevant[j].clone());
                *pair_count.entry(key).or_insert(0) += 1;
            }
        }
    }

    let mut couplings: Vec<FileCoupling> = pair_count
        .into_iter()
        .filter_map(|((a, b), co)| {
            let ca = change_count.get(&a).copied().unwrap_or(0);
            let cb = change_count.get(&b).copied().unwrap_or(0);
            let denom = ca.max(cb);
            if denom == 0 {
                return None;
            }
            let confidence = f64::from(co) / f64::from(denom);
            (co >= opts.min_support && confidence >= opts.min_confidence).then(|| FileCoupling {
                file1: a,
                file2: b,
                co_change_count: co,
                file1_changes: ca,
                file2_changes: cb,
                confidence,
                support: co,
            })
        })
        .collect();
    couplings.sort_by(|x, y| {
        y.confidence
            .partial_cmp(&x.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.file1.cmp(&y.file1))
            .then_with(|| x.file2.cmp(&y.file2))
    });

    let mut by_file: HashMap<String, Vec<FileCoupling>> = HashMap::new();
    for c in &couplings {
        by_file.entry(c.file1.clone()).or_default().push(c.clone());
        by_file.entry(c.file2.clone()).or_default().push(c.clone());
    }
    // couplings is already confidence-descending, so each per-file list is too.

    CouplingResult {
        couplings,
        by_file,
        commits_analysed: commits.len(),
        analysed_at: SystemTime::now(),
    }
}

/// Files that carry no coupling signal: lock files, minified and generated
/// assets, images, fonts, archives, source maps, declaration files.
fn is_coupling_relevant(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    const LOCK_FILES: &[&str] = &[
        "Cargo.lock",
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Gemfile.lock",
        "poetry.lock",
        "composer.lock",
        "go.sum",
    ];
    if LOCK_FILES.contains(&name) {
        return false;
    }
    const SKIP_SUFFIXES: &[&str] = &[
        ".min.js", ".min.css", ".map", ".d.ts", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
        ".woff", ".woff2", ".ttf", ".eot", ".otf", ".zip", ".tar", ".gz", ".tgz", ".jar", ".pdf",
    ];
    !SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
}
