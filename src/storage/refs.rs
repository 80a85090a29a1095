//! Branch and tag registries.
//!
//! Branches are named, movable pointers into the commit log; exactly one
//! is current at any time. Tags bind a name to a fixed commit. Both
//! registries are fields of the database handle - there is no
//! process-wide state, and destroying the handle destroys them.

use crate::storage::commit::CommitId;
use crate::storage::error::{StorageError, StorageResult};

/// Name of the branch every database starts on.
pub const MAIN_BRANCH: &str = "main";

/// A named pointer to a commit. `head` is `None` until the first commit
/// lands on the branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub name: String,
    pub head: Option<CommitId>,
}

/// All known branches plus the current one.
#[derive(Debug, Clone)]
pub struct BranchRegistry {
    branches: Vec<Branch>,
    current: usize,
}

impl BranchRegistry {
    /// A fresh registry: `main`, pointing at nothing.
    pub fn new() -> Self {
        Self {
            branches: vec![Branch {
                name: MAIN_BRANCH.to_string(),
                head: None,
            }],
            current: 0,
        }
    }

    /// Rebuild from persisted state (the format keeps only the current
    /// branch).
    pub(crate) fn from_current(name: String, head: Option<CommitId>) -> Self {
        Self {
            branches: vec![Branch { name, head }],
            current: 0,
        }
    }

    /// The branch the database is currently on.
    pub fn current(&self) -> &Branch {
        &self.branches[self.current]
    }

    fn current_mut(&mut self) -> &mut Branch {
        &mut self.branches[self.current]
    }

    /// Look up a branch by name.
    pub fn find(&self, name: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Switch to `name`, creating it lazily at `start` if absent.
    ///
    /// An existing branch keeps the tip it had when we left it. Returns
    /// whether the branch was created.
    pub fn switch(&mut self, name: &str, start: Option<CommitId>) -> StorageResult<bool> {
        if name.is_empty() {
            return Err(StorageError::InvalidArg(
                "branch name cannot be empty".to_string(),
            ));
        }

        if let Some(index) = self.branches.iter().position(|b| b.name == name) {
            self.current = index;
            return Ok(false);
        }

        self.branches.push(Branch {
            name: name.to_string(),
            head: start,
        });
        self.current = self.branches.len() - 1;
        Ok(true)
    }

    /// Move the current branch's tip to a new commit.
    pub fn advance(&mut self, id: CommitId) {
        self.current_mut().head = Some(id);
    }

    /// Number of known branches.
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branch names in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|b| b.name.as_str())
    }
}

impl Default for BranchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A name bound to a specific commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub commit_id: CommitId,
}

/// Tag bindings, insertion order. Names are unique; re-binding replaces.
#[derive(Debug, Default, Clone)]
pub struct TagRegistry {
    tags: Vec<Tag>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a commit, replacing any previous binding.
    pub fn bind(&mut self, name: &str, commit_id: CommitId) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidArg(
                "tag name cannot be empty".to_string(),
            ));
        }
        if let Some(tag) = self.tags.iter_mut().find(|t| t.name == name) {
            tag.commit_id = commit_id;
        } else {
            self.tags.push(Tag {
                name: name.to_string(),
                commit_id,
            });
        }
        Ok(())
    }

    /// Resolve a tag to its commit.
    pub fn resolve(&self, name: &str) -> Option<&CommitId> {
        self.tags.iter().find(|t| t.name == name).map(|t| &t.commit_id)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub(crate) fn replace_all(&mut self, tags: Vec<Tag>) {
        self.tags = tags;
    }
}
