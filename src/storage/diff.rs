//! Diff and merge over commit snapshots.
//!
//! Both operations compare entries by key and decide "changed" purely by
//! entry hash, so a modification is visible whether it touched the value,
//! the metadata, or a timestamp. Diff produces a structured report (never
//! prints); merge produces a fully resolved entry set or refuses with the
//! complete conflict list.

use serde::Serialize;

use crate::storage::entry::{find_entry, Entry};
use crate::storage::error::{StorageError, StorageResult};

/// What happened to a key between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Removed,
    Modified,
    Added,
}

/// One line of a diff report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRecord {
    pub key: String,
    pub status: ChangeStatus,
}

/// Diff between two snapshots: removed, then modified, then added, each
/// segment sorted by key. Unchanged keys are not reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffReport {
    records: Vec<DiffRecord>,
}

impl DiffReport {
    /// All records in segment order.
    pub fn records(&self) -> &[DiffRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.by_status(ChangeStatus::Removed)
    }

    pub fn modified(&self) -> impl Iterator<Item = &str> {
        self.by_status(ChangeStatus::Modified)
    }

    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.by_status(ChangeStatus::Added)
    }

    fn by_status(&self, status: ChangeStatus) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(move |r| r.status == status)
            .map(|r| r.key.as_str())
    }
}

/// Compare snapshot `a` (old) to snapshot `b` (new) by key set.
pub fn diff_snapshots(a: &[Entry], b: &[Entry]) -> DiffReport {
    let mut removed = Vec::new();
    let mut modified = Vec::new();
    let mut added = Vec::new();

    for ea in a {
        match find_entry(b, &ea.key) {
            None => removed.push(ea.key.clone()),
            Some(eb) if eb.hash != ea.hash => modified.push(ea.key.clone()),
            Some(_) => {}
        }
    }
    for eb in b {
        if find_entry(a, &eb.key).is_none() {
            added.push(eb.key.clone());
        }
    }

    removed.sort();
    modified.sort();
    added.sort();

    let mut records = Vec::with_capacity(removed.len() + modified.len() + added.len());
    records.extend(removed.into_iter().map(|key| DiffRecord {
        key,
        status: ChangeStatus::Removed,
    }));
    records.extend(modified.into_iter().map(|key| DiffRecord {
        key,
        status: ChangeStatus::Modified,
    }));
    records.extend(added.into_iter().map(|key| DiffRecord {
        key,
        status: ChangeStatus::Added,
    }));

    DiffReport { records }
}

/// Result of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The fully merged entry set: target order, source-only keys appended.
    pub entries: Vec<Entry>,
    /// Keys inserted from the source.
    pub merged_keys: Vec<String>,
    /// Conflicting keys resolved in the source's favour.
    pub resolved_keys: Vec<String>,
}

/// Three-way-style reconciliation of `source` into `target`.
///
/// Source-only entries are installed verbatim (hashes and timestamps
/// intact). A key present in both with differing hashes is a conflict:
/// with `auto_resolve` the source entry wins, otherwise the whole merge
/// is refused and every conflicting key is reported.
pub fn merge_snapshots(
    source: &[Entry],
    target: &[Entry],
    auto_resolve: bool,
) -> StorageResult<MergeOutcome> {
    let mut entries: Vec<Entry> = target.to_vec();
    let mut merged_keys = Vec::new();
    let mut resolved_keys = Vec::new();
    let mut conflicts = Vec::new();

    for se in source {
        match find_entry(target, &se.key) {
            None => {
                entries.push(se.clone());
                merged_keys.push(se.key.clone());
            }
            Some(te) if te.hash != se.hash => {
                if auto_resolve {
                    if let Some(slot) = entries.iter_mut().find(|e| e.key == se.key) {
                        *slot = se.clone();
                    }
                    resolved_keys.push(se.key.clone());
                } else {
                    conflicts.push(se.key.clone());
                }
            }
            Some(_) => {}
        }
    }

    if !conflicts.is_empty() {
        return Err(StorageError::MergeConflict {
            conflicting_keys: conflicts,
        });
    }

    Ok(MergeOutcome {
        entries,
        merged_keys,
        resolved_keys,
    })
}
