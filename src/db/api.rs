//! Database API - the high-level handle for BlueCrab.
//!
//! Every operation funnels through this type. The handle owns the live
//! entry set, the commit log, and the branch/tag registries outright;
//! dropping it releases everything. The engine is single-writer and
//! synchronous: callers serialize access, and each operation either
//! fully succeeds or leaves the database observationally unchanged.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::db::events::{stderr_sink, DbEvent, EventSink};
use crate::storage::{
    derive_commit_id, diff_snapshots, load_database, merge_snapshots, now_nanos, save_database,
    BranchRegistry, Commit, CommitId, CommitLog, DiffReport, Entry, EntryStore, SetOutcome,
    StorageError, TagRegistry,
};
use crate::value::Value;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Check if this error indicates something doesn't exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            DatabaseError::NotFound(_) => true,
            DatabaseError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a merge conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Storage(e) if e.is_conflict())
    }
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the database file.
    pub path: PathBuf,
    /// Start empty if the file doesn't exist yet.
    pub create_if_missing: bool,
    /// Install a stderr event sink on open.
    pub verbose: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bluecrab.bcdb"),
            create_if_missing: true,
            verbose: false,
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set verbose flag.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }
}

/// The main database handle.
pub struct Database {
    config: DatabaseConfig,
    store: EntryStore,
    commits: CommitLog,
    branches: BranchRegistry,
    tags: TagRegistry,
    current_commit: Option<CommitId>,
    tx_snapshot: Option<Vec<Entry>>,
    sink: Option<EventSink>,
    // Keeps the backing directory alive for in_memory() handles.
    _tempdir: Option<tempfile::TempDir>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("current_commit", &self.current_commit)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Create an empty database bound to `path`. Nothing touches the
    /// filesystem until `save`.
    pub fn init(path: impl Into<PathBuf>) -> Self {
        Self {
            config: DatabaseConfig::new(path),
            store: EntryStore::new(),
            commits: CommitLog::new(),
            branches: BranchRegistry::new(),
            tags: TagRegistry::new(),
            current_commit: None,
            tx_snapshot: None,
            sink: None,
            _tempdir: None,
        }
    }

    /// Open a database at the given path, loading it if the file exists.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    /// Open a database with custom configuration.
    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        let exists = config.path.exists();
        if !exists && !config.create_if_missing {
            return Err(DatabaseError::NotFound(config.path));
        }

        let verbose = config.verbose;
        let mut db = Self::init(config.path.clone());
        db.config = config;
        if verbose {
            db.sink = Some(stderr_sink());
        }
        if exists {
            db.load()?;
        }
        Ok(db)
    }

    /// Create a throwaway database backed by a temporary directory
    /// (for testing).
    pub fn in_memory() -> DatabaseResult<Self> {
        let dir = tempfile::TempDir::new()?;
        let mut db = Self::init(dir.path().join("bluecrab.bcdb"));
        db._tempdir = Some(dir);
        Ok(db)
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Install an event sink; every engine notification goes through it.
    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    /// Remove the installed event sink.
    pub fn clear_event_sink(&mut self) {
        self.sink = None;
    }

    fn emit(&self, event: DbEvent) {
        if let Some(sink) = &self.sink {
            sink(&event);
        }
    }

    // ==================== CRUD ====================

    /// Insert or update a key. Duplicate keys update in place.
    pub fn set(&mut self, key: &str, value: Value) -> DatabaseResult<SetOutcome> {
        Ok(self.store.set(key, value)?)
    }

    /// Deep copy of the stored value.
    pub fn get(&self, key: &str) -> DatabaseResult<Value> {
        Ok(self.store.get(key)?)
    }

    /// Remove an entry, preserving the order of the rest.
    pub fn delete(&mut self, key: &str) -> DatabaseResult<()> {
        Ok(self.store.delete(key)?)
    }

    /// Membership check; never fails.
    pub fn has(&self, key: &str) -> bool {
        self.store.has(key)
    }

    /// Remove every live entry. History is untouched.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Attach a free-form annotation to an entry. The annotation
    /// participates in the entry hash.
    pub fn set_metadata(&mut self, key: &str, metadata: &str) -> DatabaseResult<()> {
        Ok(self.store.set_metadata(key, metadata)?)
    }

    /// Read an entry's annotation, if any.
    pub fn get_metadata(&self, key: &str) -> DatabaseResult<Option<String>> {
        Ok(self.store.get_metadata(key)?.map(str::to_string))
    }

    /// The live entries in insertion order.
    pub fn entries(&self) -> &[Entry] {
        self.store.entries()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // ==================== Search ====================

    /// Keys matching a pattern, in insertion order.
    pub fn find_keys(&self, pattern: &str) -> Vec<String> {
        self.store.find_keys(pattern)
    }

    /// Deep copies of the entries whose keys match a pattern.
    pub fn find_entries(&self, pattern: &str) -> Vec<Entry> {
        self.store.find_entries(pattern)
    }

    // ==================== History ====================

    /// Freeze the live set into a new commit on the current branch.
    pub fn commit(&mut self, message: &str) -> DatabaseResult<CommitId> {
        if message.is_empty() {
            return Err(StorageError::InvalidArg(
                "commit message cannot be empty".to_string(),
            )
            .into());
        }

        let snapshot = self.store.snapshot();
        let timestamp = now_nanos();
        let parent = self.current_commit.clone();
        let id = derive_commit_id(
            self.commits.next_sequence(),
            parent.as_ref(),
            message,
            timestamp,
            &snapshot,
        );

        self.commits.append(Commit {
            id: id.clone(),
            parent_id: parent,
            branch: self.branches.current().name.clone(),
            message: message.to_string(),
            timestamp,
            snapshot,
        });
        self.branches.advance(id.clone());
        self.current_commit = Some(id.clone());

        self.emit(DbEvent::Committed {
            id: id.to_string(),
            message: message.to_string(),
        });
        Ok(id)
    }

    /// Replace the live set with a commit's snapshot. Moves the current
    /// commit pointer; the current branch stays where it is.
    pub fn checkout(&mut self, commit_id: &str) -> DatabaseResult<()> {
        let commit = self
            .commits
            .find(commit_id)
            .ok_or_else(|| StorageError::CommitNotFound(commit_id.to_string()))?;
        let id = commit.id.clone();
        let snapshot = commit.snapshot.clone();

        self.store.replace_all(snapshot);
        self.current_commit = Some(id.clone());

        self.emit(DbEvent::CheckedOut { id: id.to_string() });
        Ok(())
    }

    /// Switch to a branch, creating it at the current commit if absent.
    /// Switching back to an existing branch restores its tip.
    pub fn branch(&mut self, name: &str) -> DatabaseResult<()> {
        let start = self.current_commit.clone();
        let created = self.branches.switch(name, start)?;
        self.current_commit = self.branches.current().head.clone();

        self.emit(DbEvent::BranchSwitched {
            name: name.to_string(),
            created,
        });
        Ok(())
    }

    /// Name of the current branch.
    pub fn current_branch(&self) -> &str {
        &self.branches.current().name
    }

    /// Id of the current commit, if any commit has been made or checked
    /// out.
    pub fn current_commit(&self) -> Option<&CommitId> {
        self.current_commit.as_ref()
    }

    /// Commits on the current branch, newest first.
    pub fn log(&self) -> Vec<&Commit> {
        match &self.branches.current().head {
            Some(tip) => self.commits.walk(tip.as_str()),
            None => Vec::new(),
        }
    }

    /// Look up a commit by id.
    pub fn find_commit(&self, commit_id: &str) -> Option<&Commit> {
        self.commits.find(commit_id)
    }

    // ==================== Tags ====================

    /// Bind a tag name to a commit. Re-binding replaces.
    pub fn tag_commit(&mut self, commit_id: &str, tag_name: &str) -> DatabaseResult<()> {
        let id = self
            .commits
            .find(commit_id)
            .ok_or_else(|| StorageError::CommitNotFound(commit_id.to_string()))?
            .id
            .clone();
        self.tags.bind(tag_name, id.clone())?;

        self.emit(DbEvent::Tagged {
            name: tag_name.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    /// Resolve a tag to its commit id.
    pub fn get_tagged_commit(&self, tag_name: &str) -> DatabaseResult<CommitId> {
        self.tags
            .resolve(tag_name)
            .cloned()
            .ok_or_else(|| StorageError::TagNotFound(tag_name.to_string()).into())
    }

    // ==================== Diff & Merge ====================

    /// Compare two commits by key set: removed, modified, added.
    pub fn diff(&self, commit_a: &str, commit_b: &str) -> DatabaseResult<DiffReport> {
        let a = self
            .commits
            .find(commit_a)
            .ok_or_else(|| StorageError::CommitNotFound(commit_a.to_string()))?;
        let b = self
            .commits
            .find(commit_b)
            .ok_or_else(|| StorageError::CommitNotFound(commit_b.to_string()))?;
        Ok(diff_snapshots(&a.snapshot, &b.snapshot))
    }

    /// Merge `source` into `target` and commit the result.
    ///
    /// The live set is reset to the target snapshot, source-only entries
    /// are installed verbatim, and conflicting keys either resolve in the
    /// source's favour (`auto_resolve`) or abort the merge with the live
    /// set left equal to the target snapshot.
    pub fn merge(
        &mut self,
        source: &str,
        target: &str,
        auto_resolve: bool,
    ) -> DatabaseResult<CommitId> {
        let source_snapshot = self
            .commits
            .find(source)
            .ok_or_else(|| StorageError::CommitNotFound(source.to_string()))?
            .snapshot
            .clone();
        let target_snapshot = self
            .commits
            .find(target)
            .ok_or_else(|| StorageError::CommitNotFound(target.to_string()))?
            .snapshot
            .clone();

        match merge_snapshots(&source_snapshot, &target_snapshot, auto_resolve) {
            Ok(outcome) => {
                self.store.replace_all(outcome.entries);
                for key in outcome.merged_keys {
                    self.emit(DbEvent::EntryMerged { key });
                }
                for key in outcome.resolved_keys {
                    self.emit(DbEvent::ConflictResolved { key });
                }

                let commit_id = self.commit("merge commit")?;
                self.emit(DbEvent::Merged {
                    source: source.to_string(),
                    target: target.to_string(),
                    commit: commit_id.to_string(),
                });
                Ok(commit_id)
            }
            Err(err) => {
                // A refused merge still lands on the target snapshot,
                // never on a half-applied state.
                if err.is_conflict() {
                    self.store.replace_all(target_snapshot);
                }
                Err(err.into())
            }
        }
    }

    // ==================== Verification ====================

    /// True iff the entry exists and its stored hash matches a fresh
    /// recomputation.
    pub fn verify_entry(&self, key: &str) -> bool {
        self.store.find(key).map(Entry::verify).unwrap_or(false)
    }

    /// True iff every live entry verifies.
    pub fn verify_db(&self) -> bool {
        self.store.iter().all(Entry::verify)
    }

    // ==================== Transactions ====================

    /// Begin a transaction by snapshotting the live set. Nested
    /// transactions are refused.
    pub fn begin_transaction(&mut self) -> DatabaseResult<()> {
        if self.tx_snapshot.is_some() {
            return Err(
                StorageError::InvalidArg("transaction already active".to_string()).into(),
            );
        }
        self.tx_snapshot = Some(self.store.snapshot());
        Ok(())
    }

    /// Keep everything done since `begin_transaction`.
    pub fn commit_transaction(&mut self) -> DatabaseResult<()> {
        self.tx_snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::InvalidArg("no active transaction".to_string()).into())
    }

    /// Restore the live set captured by `begin_transaction`.
    pub fn rollback_transaction(&mut self) -> DatabaseResult<()> {
        let snapshot = self
            .tx_snapshot
            .take()
            .ok_or_else(|| StorageError::InvalidArg("no active transaction".to_string()))?;
        self.store.replace_all(snapshot);
        Ok(())
    }

    /// Whether a transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.tx_snapshot.is_some()
    }

    // ==================== Persistence ====================

    /// Write the whole database to its path, atomically.
    pub fn save(&self) -> DatabaseResult<()> {
        save_database(
            &self.config.path,
            self.store.entries(),
            self.commits.commits(),
            &self.branches.current().name,
            self.current_commit.as_ref(),
            self.tags.tags(),
        )?;
        self.emit(DbEvent::Saved {
            path: self.config.path.clone(),
            entries: self.store.len(),
        });
        Ok(())
    }

    /// Read the database back from its path, replacing all state.
    pub fn load(&mut self) -> DatabaseResult<()> {
        let loaded = load_database(&self.config.path)?;

        self.store.replace_all(loaded.entries);
        self.commits.replace_all(loaded.commits);
        self.branches =
            BranchRegistry::from_current(loaded.branch, loaded.current_commit.clone());
        self.tags.replace_all(loaded.tags);
        self.current_commit = loaded.current_commit;
        self.tx_snapshot = None;

        self.emit(DbEvent::Loaded {
            path: self.config.path.clone(),
            entries: self.store.len(),
        });
        Ok(())
    }

    // ==================== Introspection ====================

    /// Get database statistics.
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            entries: self.store.len(),
            commits: self.commits.len(),
            branches: self.branches.len(),
            tags: self.tags.len(),
            current_branch: self.branches.current().name.clone(),
            current_commit: self.current_commit.as_ref().map(|c| c.to_string()),
        }
    }

    /// Render the live set and history heads as pretty JSON.
    pub fn export_json(&self) -> DatabaseResult<String> {
        let export = DatabaseExport {
            path: self.config.path.display().to_string(),
            branch: self.current_branch(),
            current_commit: self.current_commit.as_ref().map(CommitId::as_str),
            entries: self.store.entries(),
            commits: self
                .commits
                .iter()
                .map(|c| CommitSummary {
                    id: c.id.as_str(),
                    parent: c.parent_id.as_ref().map(CommitId::as_str),
                    branch: &c.branch,
                    message: &c.message,
                    timestamp: c.timestamp,
                    entries: c.snapshot.len(),
                })
                .collect(),
            tags: self
                .tags
                .tags()
                .iter()
                .map(|t| TagSummary {
                    name: &t.name,
                    commit: t.commit_id.as_str(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }
}

/// Database statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    /// Number of live entries.
    pub entries: usize,
    /// Number of commits in the log.
    pub commits: usize,
    /// Number of known branches.
    pub branches: usize,
    /// Number of tag bindings.
    pub tags: usize,
    /// Name of the current branch.
    pub current_branch: String,
    /// Current commit id, if any.
    pub current_commit: Option<String>,
}

#[derive(Serialize)]
struct DatabaseExport<'a> {
    path: String,
    branch: &'a str,
    current_commit: Option<&'a str>,
    entries: &'a [Entry],
    commits: Vec<CommitSummary<'a>>,
    tags: Vec<TagSummary<'a>>,
}

#[derive(Serialize)]
struct CommitSummary<'a> {
    id: &'a str,
    parent: Option<&'a str>,
    branch: &'a str,
    message: &'a str,
    timestamp: u64,
    entries: usize,
}

#[derive(Serialize)]
struct TagSummary<'a> {
    name: &'a str,
    commit: &'a str,
}
