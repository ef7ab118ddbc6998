//! Sync progress reporting.
//!
//! Reports observable progress during `shelf sync` so users see whether
//! they are looking at the cached view, which author folders are being
//! scanned, and when the catalog is reconciled. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncProgressEvent {
    /// A fresh cache was exposed before any network call.
    CachedView { documents: usize },
    /// Fetching the remote catalog and listing the base directory.
    Discovering { store: String },
    /// Author folder `n` of `total` listed.
    Scanning { author: String, n: u64, total: u64 },
    /// Merge finished.
    Reconciled { documents: usize, changed: bool },
    /// Discovery failed; the cached view stays.
    Offline { reason: String },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the synchronizer.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync acme/library@main  scanning  3 / 12 authors".
pub struct StderrProgress {
    label: String,
}

impl StderrProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::CachedView { documents } => format!(
                "sync {}  cached view  {} documents\n",
                self.label,
                format_number(*documents as u64)
            ),
            SyncProgressEvent::Discovering { store } => {
                format!("sync {}  discovering ({})...\n", self.label, store)
            }
            SyncProgressEvent::Scanning { author, n, total } => format!(
                "sync {}  scanning  {} / {} authors  {}\n",
                self.label,
                format_number(*n),
                format_number(*total),
                author
            ),
            SyncProgressEvent::Reconciled { documents, changed } => format!(
                "sync {}  reconciled  {} documents{}\n",
                self.label,
                format_number(*documents as u64),
                if *changed { "" } else { " (unchanged)" }
            ),
            SyncProgressEvent::Offline { reason } => {
                format!("sync {}  offline: {}\n", self.label, reason)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::CachedView { documents } => serde_json::json!({
                "event": "progress",
                "phase": "cached_view",
                "documents": documents
            }),
            SyncProgressEvent::Discovering { store } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "store": store
            }),
            SyncProgressEvent::Scanning { author, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "author": author,
                "n": n,
                "total": total
            }),
            SyncProgressEvent::Reconciled { documents, changed } => serde_json::json!({
                "event": "progress",
                "phase": "reconciled",
                "documents": documents,
                "changed": changed
            }),
            SyncProgressEvent::Offline { reason } => serde_json::json!({
                "event": "progress",
                "phase": "offline",
                "reason": reason
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

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
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

    /// Build a reporter for this mode. `label` names the repository in
    /// human output.
    pub fn reporter(&self, label: &str) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress::new(label)),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
