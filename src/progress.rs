//! Index progress reporting.
//!
//! Reports observable progress during `llmc index` (and `llmc sync`) so
//! users see what is being walked, how much is left, and when the catalog
//! is up to date. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

/// Phase of the indexing pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexPhase {
    /// Walking the tree to enumerate candidate files. Total unknown.
    Walking,
    /// Files are being split, hashed, and reconciled into the catalog.
    Indexing,
}

/// A single progress event for indexing.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// Currently walking the tree (no total yet).
    Walking { root: String },
    /// Indexing phase: n files processed out of total.
    Indexing { root: String, n: u64, total: u64 },
}

/// Reports index progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the indexer.
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index /repo  indexing  1,234 / 5,000 files".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Walking { root } => format!("index {}  walking...\n", root),
            IndexProgressEvent::Indexing { root, n, total } => {
                let n_fmt = format_number(*n);
                let total_fmt = format_number(*total);
                format!("index {}  indexing  {} / {} files\n", root, n_fmt, total_fmt)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Walking { root } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "walking"
            }),
            IndexProgressEvent::Indexing { root, n, total } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "indexing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to the indexer.
    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
