// ABOUTME: Line diff between deployed and desired stack templates.
// ABOUTME: JSON inputs are pretty-printed first; the report keeps a context window around changes.

use colored::Colorize;
use std::fmt;

/// Marker standing in for a run of suppressed common lines.
pub const ELISION_MARKER: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRecord {
    Common(String),
    /// Present only in the current (deployed) text.
    LeftOnly(String),
    /// Present only in the desired text.
    RightOnly(String),
}

impl DiffRecord {
    pub fn text(&self) -> &str {
        match self {
            DiffRecord::Common(t) | DiffRecord::LeftOnly(t) | DiffRecord::RightOnly(t) => t,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, DiffRecord::Common(_))
    }

    fn plain(&self) -> String {
        match self {
            DiffRecord::Common(t) => format!("  {t}"),
            DiffRecord::LeftOnly(t) => format!("- {t}"),
            DiffRecord::RightOnly(t) => format!("+ {t}"),
        }
    }
}

/// One line of a formatted report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Record(DiffRecord),
    Elision,
}

impl ReportLine {
    /// Uncolored rendering.
    pub fn plain(&self) -> String {
        match self {
            ReportLine::Record(record) => record.plain(),
            ReportLine::Elision => ELISION_MARKER.to_string(),
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.plain();
        match self {
            ReportLine::Record(DiffRecord::Common(_)) => f.write_str(&line),
            ReportLine::Record(DiffRecord::LeftOnly(_)) => write!(f, "{}", line.red()),
            ReportLine::Record(DiffRecord::RightOnly(_)) => write!(f, "{}", line.green()),
            ReportLine::Elision => write!(f, "{}", line.dimmed()),
        }
    }
}

/// Pretty-print `text` when it parses as JSON; otherwise return it unchanged.
pub fn normalize(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}

/// Edit script between the lines of `left` and `right`, in document order.
pub fn diff_lines(left: &str, right: &str) -> Vec<DiffRecord> {
    let a: Vec<&str> = left.lines().collect();
    let b: Vec<&str> = right.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut records: Vec<DiffRecord> = a[..prefix]
        .iter()
        .map(|l| DiffRecord::Common(l.to_string()))
        .collect();
    records.extend(lcs_script(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    ));
    records.extend(
        a[a.len() - suffix..]
            .iter()
            .map(|l| DiffRecord::Common(l.to_string())),
    );
    records
}

/// Longest-common-subsequence script in linear space (Hirschberg): split `a` in half,
/// find where the halves' LCS rows meet in `b`, and recurse on both sides.
fn lcs_script(a: &[&str], b: &[&str]) -> Vec<DiffRecord> {
    let mut records = Vec::with_capacity(a.len() + b.len());
    hirschberg(a, b, &mut records);
    records
}

fn hirschberg(a: &[&str], b: &[&str], records: &mut Vec<DiffRecord>) {
    match (a.len(), b.len()) {
        (0, _) => records.extend(b.iter().map(|l| DiffRecord::RightOnly(l.to_string()))),
        (_, 0) => records.extend(a.iter().map(|l| DiffRecord::LeftOnly(l.to_string()))),
        (1, _) => match b.iter().position(|l| *l == a[0]) {
            Some(j) => {
                records.extend(b[..j].iter().map(|l| DiffRecord::RightOnly(l.to_string())));
                records.push(DiffRecord::Common(a[0].to_string()));
                records.extend(b[j + 1..].iter().map(|l| DiffRecord::RightOnly(l.to_string())));
            }
            None => {
                records.push(DiffRecord::LeftOnly(a[0].to_string()));
                records.extend(b.iter().map(|l| DiffRecord::RightOnly(l.to_string())));
            }
        },
        (n, m) => {
            let mid = n / 2;
            let forward = lcs_row(&a[..mid], b);
            let a_tail: Vec<&str> = a[mid..].iter().rev().copied().collect();
            let b_reversed: Vec<&str> = b.iter().rev().copied().collect();
            let backward = lcs_row(&a_tail, &b_reversed);
            let mut split = 0;
            let mut best = 0;
            for k in 0..=m {
                let total = forward[k] + backward[m - k];
                if total > best {
                    best = total;
                    split = k;
                }
            }
            hirschberg(&a[..mid], &b[..split], records);
            hirschberg(&a[mid..], &b[split..], records);
        }
    }
}

/// `row[j]` is the LCS length of all of `a` against the first `j` lines of `b`.
fn lcs_row(a: &[&str], b: &[&str]) -> Vec<u32> {
    let mut previous = vec![0u32; b.len() + 1];
    let mut current = vec![0u32; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            current[j + 1] = if x == y {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous
}

/// Keep records within `context` lines of a change; `None` keeps everything.
///
/// Each run of suppressed records collapses into one [`ReportLine::Elision`].
pub fn window(records: &[DiffRecord], context: Option<usize>) -> Vec<ReportLine> {
    let Some(context) = context else {
        return records.iter().cloned().map(ReportLine::Record).collect();
    };

    let mut distance = vec![usize::MAX; records.len()];
    let mut previous: Option<usize> = None;
    for (i, record) in records.iter().enumerate() {
        if record.is_change() {
            previous = Some(i);
        }
        if let Some(p) = previous {
            distance[i] = i - p;
        }
    }
    let mut next: Option<usize> = None;
    for (i, record) in records.iter().enumerate().rev() {
        if record.is_change() {
            next = Some(i);
        }
        if let Some(n) = next {
            distance[i] = distance[i].min(n - i);
        }
    }

    let mut lines = Vec::new();
    for (record, distance) in records.iter().zip(distance) {
        if distance <= context {
            lines.push(ReportLine::Record(record.clone()));
        } else if lines.last() != Some(&ReportLine::Elision) {
            lines.push(ReportLine::Elision);
        }
    }
    lines
}

/// Diff of one stack's current and desired template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDiff {
    pub records: Vec<DiffRecord>,
    pub lines: Vec<ReportLine>,
}

impl TemplateDiff {
    /// A negative `context_lines` reports every line.
    pub fn new(current: &str, desired: &str, context_lines: i32) -> Self {
        let records = diff_lines(&normalize(current), &normalize(desired));
        let context = usize::try_from(context_lines).ok();
        let lines = window(&records, context);
        Self { records, lines }
    }

    pub fn has_changes(&self) -> bool {
        self.records.iter().any(DiffRecord::is_change)
    }

    /// Uncolored report text.
    pub fn plain(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.plain() + "\n")
            .collect()
    }
}

impl fmt::Display for TemplateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
