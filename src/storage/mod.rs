//! Storage engine for BlueCrab.
//!
//! This module owns everything below the public `Database` handle. The
//! upper layer orchestrates; nothing here touches the filesystem except
//! the codec.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │     (High-level API: CRUD, history, search, persistence)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    entry    │       │   commit    │       │    refs     │
//!  │ (live set)  │       │ (snapshots) │       │(branch/tag) │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │                     │
//!         └─────────────────────┼─────────────────────┘
//!                               │
//!                ┌──────────────┼──────────────┐
//!                ▼              ▼              ▼
//!          ┌──────────┐   ┌──────────┐   ┌──────────┐
//!          │ pattern  │   │   diff   │   │  codec   │
//!          │ (search) │   │ (merge)  │   │  (disk)  │
//!          └──────────┘   └──────────┘   └──────────┘
//! ```

mod codec;
mod commit;
mod diff;
mod entry;
mod error;
mod pattern;
mod refs;

// Re-export public API
pub use codec::{load_database, save_database, LoadedDatabase, FORMAT_VERSION, MAGIC};
pub use commit::{derive_commit_id, Commit, CommitId, CommitLog};
pub use diff::{diff_snapshots, merge_snapshots, ChangeStatus, DiffRecord, DiffReport, MergeOutcome};
pub use entry::{find_entry, Entry, EntryStore, SetOutcome, MAX_PAYLOAD_BYTES};
pub use error::{StorageError, StorageResult};
pub use pattern::key_matches;
pub use refs::{Branch, BranchRegistry, Tag, TagRegistry, MAIN_BRANCH};

// Re-export for internal use by the db layer
pub(crate) use entry::now_nanos;
