//! Commit creation and history traversal.
//!
//! Commits are the atomic units of history. Each one owns a deep copy of
//! the entry set taken at commit time - live mutations can never alias
//! into a snapshot. Commits are stored in creation order in a single
//! append-only log; per-branch history is recovered by walking parent
//! links from a branch tip.

use std::fmt;

use crate::hash::Fnv1a;
use crate::storage::entry::Entry;

/// Identifier of a commit: 16 hex characters.
///
/// The first 8 are a strictly monotonic sequence number, the last 8 come
/// from the content hash over (parent id, message, timestamp, snapshot
/// entry hashes). Ids are therefore deterministic, unique within a
/// database, and ordered by creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (the sequence half) for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frozen snapshot of the entry set plus identifying metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub id: CommitId,
    /// Prior commit this one builds on; `None` for a root commit.
    pub parent_id: Option<CommitId>,
    /// Branch the commit was created on. Advisory: the on-disk format
    /// preserves only the current branch, so labels collapse to it on load.
    pub branch: String,
    pub message: String,
    /// Nanosecond epoch at commit time.
    pub timestamp: u64,
    /// Deep copy of the entry set, original hashes included.
    pub snapshot: Vec<Entry>,
}

impl Commit {
    /// True for a commit with no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// Append-only commit log, creation order.
#[derive(Debug, Default, Clone)]
pub struct CommitLog {
    commits: Vec<Commit>,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// All commits, creation order.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Commit> {
        self.commits.iter()
    }

    /// Linear scan by id.
    pub fn find(&self, id: &str) -> Option<&Commit> {
        self.commits.iter().find(|c| c.id.as_str() == id)
    }

    /// Sequence number the next commit will carry (1-based).
    pub fn next_sequence(&self) -> u64 {
        self.commits.len() as u64 + 1
    }

    pub fn append(&mut self, commit: Commit) {
        self.commits.push(commit);
    }

    pub(crate) fn replace_all(&mut self, commits: Vec<Commit>) {
        self.commits = commits;
    }

    /// Walk parent links from `tip`, newest first. Stops at a root or at
    /// a dangling parent reference.
    pub fn walk<'a>(&'a self, tip: &str) -> Vec<&'a Commit> {
        let mut history = Vec::new();
        let mut cursor = self.find(tip);
        while let Some(commit) = cursor {
            history.push(commit);
            cursor = commit
                .parent_id
                .as_ref()
                .and_then(|parent| self.find(parent.as_str()));
        }
        history
    }
}

/// Derive the id for the next commit.
///
/// Every component participates in the content half, so changing the
/// parent, message, timestamp, or any snapshot entry changes the id.
pub fn derive_commit_id(
    sequence: u64,
    parent: Option<&CommitId>,
    message: &str,
    timestamp: u64,
    snapshot: &[Entry],
) -> CommitId {
    let mut hasher = Fnv1a::new();
    if let Some(parent) = parent {
        hasher.write(parent.as_str().as_bytes());
    }
    hasher.write(message.as_bytes());
    hasher.write_u64_le(timestamp);
    for entry in snapshot {
        hasher.write(entry.hash.as_bytes());
    }
    let content = hasher.finish();

    CommitId::new(format!(
        "{:08X}{:08X}",
        (sequence & 0xFFFF_FFFF) as u32,
        (content & 0xFFFF_FFFF) as u32
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entry::EntryStore;
    use crate::value::Value;

    fn snapshot_of(pairs: &[(&str, i32)]) -> Vec<Entry> {
        let mut store = EntryStore::new();
        for (k, v) in pairs {
            store.set(k, Value::I32(*v)).unwrap();
        }
        store.snapshot()
    }

    fn commit_with(
        log: &mut CommitLog,
        parent: Option<CommitId>,
        message: &str,
        ts: u64,
    ) -> CommitId {
        let snapshot = snapshot_of(&[("k", 1)]);
        let id = derive_commit_id(log.next_sequence(), parent.as_ref(), message, ts, &snapshot);
        log.append(Commit {
            id: id.clone(),
            parent_id: parent,
            branch: "main".to_string(),
            message: message.to_string(),
            timestamp: ts,
            snapshot,
        });
        id
    }

    #[test]
    fn test_id_shape() {
        let id = derive_commit_id(1, None, "init", 42, &[]);
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id.short(), "00000001");
    }

    #[test]
    fn test_ids_are_ordered_and_unique() {
        let a = derive_commit_id(1, None, "same", 7, &[]);
        let b = derive_commit_id(2, None, "same", 7, &[]);
        assert_ne!(a, b);
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn test_every_component_changes_the_id() {
        let snapshot = snapshot_of(&[("k", 1)]);
        let parent = CommitId::new("00000001AABBCCDD".to_string());
        let base = derive_commit_id(2, Some(&parent), "msg", 100, &snapshot);

        assert_ne!(base, derive_commit_id(2, None, "msg", 100, &snapshot));
        assert_ne!(
            base,
            derive_commit_id(2, Some(&parent), "other", 100, &snapshot)
        );
        assert_ne!(base, derive_commit_id(2, Some(&parent), "msg", 101, &snapshot));
        assert_ne!(
            base,
            derive_commit_id(2, Some(&parent), "msg", 100, &snapshot_of(&[("k", 2)]))
        );
    }

    #[test]
    fn test_walk_newest_first() {
        let mut log = CommitLog::new();
        let c1 = commit_with(&mut log, None, "first", 1);
        let c2 = commit_with(&mut log, Some(c1.clone()), "second", 2);
        let c3 = commit_with(&mut log, Some(c2.clone()), "third", 3);

        let history = log.walk(c3.as_str());
        let messages: Vec<_> = history.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
        assert!(history.last().unwrap().is_root());
    }

    #[test]
    fn test_walk_ignores_side_branches() {
        let mut log = CommitLog::new();
        let root = commit_with(&mut log, None, "root", 1);
        let left = commit_with(&mut log, Some(root.clone()), "left", 2);
        let _right = commit_with(&mut log, Some(root.clone()), "right", 3);

        let history = log.walk(left.as_str());
        let messages: Vec<_> = history.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["left", "root"]);
    }

    #[test]
    fn test_find_unknown() {
        let log = CommitLog::new();
        assert!(log.find("0000000000000000").is_none());
        assert!(log.walk("0000000000000000").is_empty());
    }

    #[test]
    fn test_summary() {
        let mut log = CommitLog::new();
        let id = commit_with(&mut log, None, "headline\nbody text", 1);
        assert_eq!(log.find(id.as_str()).unwrap().summary(), "headline");
    }
}
