//! Engine notifications.
//!
//! The engine never prints. Anything a caller might want to observe
//! (commits landing, checkouts, merge resolutions) is delivered as a
//! [`DbEvent`] through an injectable sink on the database handle. The
//! `verbose` config flag simply installs [`stderr_sink`].

use std::fmt;
use std::path::PathBuf;

/// A notification emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DbEvent {
    Committed { id: String, message: String },
    CheckedOut { id: String },
    BranchSwitched { name: String, created: bool },
    Tagged { name: String, id: String },
    EntryMerged { key: String },
    ConflictResolved { key: String },
    Merged { source: String, target: String, commit: String },
    Saved { path: PathBuf, entries: usize },
    Loaded { path: PathBuf, entries: usize },
}

impl fmt::Display for DbEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbEvent::Committed { id, message } => write!(f, "commit {}: {}", id, message),
            DbEvent::CheckedOut { id } => write!(f, "checked out {}", id),
            DbEvent::BranchSwitched { name, created } => {
                if *created {
                    write!(f, "switched to new branch '{}'", name)
                } else {
                    write!(f, "switched to branch '{}'", name)
                }
            }
            DbEvent::Tagged { name, id } => write!(f, "tagged {} as '{}'", id, name),
            DbEvent::EntryMerged { key } => write!(f, "merged key '{}'", key),
            DbEvent::ConflictResolved { key } => {
                write!(f, "conflict on '{}' resolved in source's favour", key)
            }
            DbEvent::Merged {
                source,
                target,
                commit,
            } => write!(f, "merged {} into {} as {}", source, target, commit),
            DbEvent::Saved { path, entries } => {
                write!(f, "saved {} entries to {}", entries, path.display())
            }
            DbEvent::Loaded { path, entries } => {
                write!(f, "loaded {} entries from {}", entries, path.display())
            }
        }
    }
}

/// Receives every event the engine emits.
pub type EventSink = Box<dyn Fn(&DbEvent) + Send + Sync>;

/// A sink that writes each event to stderr, used by the `verbose` flag.
pub fn stderr_sink() -> EventSink {
    Box::new(|event| eprintln!("[bluecrab] {}", event))
}
