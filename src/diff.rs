use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeKind {
    Added,
    Removed,
    Changed,
}

/// One changed line between two revisions of a file. `line` is 1-based and
/// refers to the NEW content for `Added`/`Changed` and the OLD content for
/// `Removed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineDiff {
    pub line: u32,
    pub kind: LineChangeKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Line-aligned pairwise diff: walk both line arrays in step, report a
/// `Changed` entry where they disagree, then report the tail of the longer
/// side as pure additions or removals.
///
/// Deliberately not an LCS diff — an insertion shifts every following line
/// into a `Changed` entry. The consumers here only need to know which lines
/// moved, at millisecond cost, and the line-number contract above holds.
pub fn diff_lines(old: &str, new: &str) -> Vec<LineDiff> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let common = old_lines.len().min(new_lines.len());
    let mut out = Vec::new();

    for i in 0..common {
        if old_lines[i] != new_lines[i] {
            out.push(LineDiff {
                line: (i as u32) + 1,
                kind: LineChangeKind::Changed,
                old: Some(old_lines[i].to_string()),
                new: Some(new_lines[i].to_string()),
            });
        }
    }
    for (i, line) in new_lines.iter().enumerate().skip(common) {
        out.push(LineDiff {
            line: (i as u32) + 1,
            kind: LineChangeKind::Added,
            old: None,
            new: Some(line.to_string()),
        });
    }
    for (i, line) in old_lines.iter().enumerate().skip(common) {
        out.push(LineDiff {
            line: (i as u32) + 1,
            kind: LineChangeKind::Removed,
            old: Some(line.to_string()),
            new: None,
        });
    }
    out
}
