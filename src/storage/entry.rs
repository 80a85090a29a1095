//! Entries and the live entry set.
//!
//! The entry store is an insertion-ordered sequence with unique keys.
//! Updates keep an entry at its original position; deletes preserve the
//! relative order of everything else. Every mutation recomputes the
//! entry's canonical hash, so a stored entry always verifies against its
//! own fields.

use serde::Serialize;

use crate::hash;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::pattern;
use crate::value::Value;

/// Documented cap on heap-backed payloads (strings, blobs, metadata).
/// Oversize inputs are rejected, never truncated.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Current wall-clock time as a nanosecond epoch.
pub(crate) fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX) as u64
}

/// One key/value row with timestamps, an optional annotation, and the
/// canonical integrity hash over all of the above.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub key: String,
    pub value: Value,
    pub created_at: u64,
    pub updated_at: u64,
    pub metadata: Option<String>,
    pub hash: String,
}

impl Entry {
    /// Create a fresh entry with both timestamps set to `now`.
    pub(crate) fn new(key: String, value: Value, now: u64) -> Self {
        let mut entry = Self {
            key,
            value,
            created_at: now,
            updated_at: now,
            metadata: None,
            hash: String::new(),
        };
        entry.rehash();
        entry
    }

    /// Recompute the canonical hash from the entry's current fields.
    pub(crate) fn rehash(&mut self) {
        self.hash = hash::hash_entry(
            &self.key,
            &self.value,
            self.metadata.as_deref(),
            self.created_at,
            self.updated_at,
        );
    }

    /// True iff the stored hash matches a fresh recomputation.
    pub fn verify(&self) -> bool {
        let computed = hash::hash_entry(
            &self.key,
            &self.value,
            self.metadata.as_deref(),
            self.created_at,
            self.updated_at,
        );
        computed == self.hash
    }
}

/// Linear scan of a snapshot by key.
pub fn find_entry<'a>(entries: &'a [Entry], key: &str) -> Option<&'a Entry> {
    entries.iter().find(|e| e.key == key)
}

/// Outcome of a `set`: duplicate keys update in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Inserted,
    Updated,
}

/// The live, insertion-ordered entry set.
#[derive(Debug, Default, Clone)]
pub struct EntryStore {
    entries: Vec<Entry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in insertion order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Look up an entry by key.
    pub fn find(&self, key: &str) -> Option<&Entry> {
        find_entry(&self.entries, key)
    }

    /// Insert or update. New keys append; existing keys are updated in
    /// place, keeping their position and `created_at`.
    pub fn set(&mut self, key: &str, value: Value) -> StorageResult<SetOutcome> {
        validate_key(key)?;
        validate_payload(&value)?;

        let now = now_nanos();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.value = value;
            // Wall clocks can step backwards; updated_at must not.
            entry.updated_at = now.max(entry.created_at);
            entry.rehash();
            return Ok(SetOutcome::Updated);
        }

        self.entries.push(Entry::new(key.to_string(), value, now));
        Ok(SetOutcome::Inserted)
    }

    /// Deep copy of the stored value.
    pub fn get(&self, key: &str) -> StorageResult<Value> {
        self.find(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    /// Remove an entry, preserving the relative order of the rest.
    pub fn delete(&mut self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let position = self
            .entries
            .iter()
            .position(|e| e.key == key)
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))?;
        self.entries.remove(position);
        Ok(())
    }

    /// Membership check; never fails.
    pub fn has(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Attach a free-form annotation. The annotation participates in the
    /// canonical hash, so the entry is rehashed; the value and its
    /// timestamps are untouched.
    pub fn set_metadata(&mut self, key: &str, metadata: &str) -> StorageResult<()> {
        validate_key(key)?;
        if metadata.len() > MAX_PAYLOAD_BYTES {
            return Err(StorageError::InvalidArg(format!(
                "metadata exceeds {} bytes",
                MAX_PAYLOAD_BYTES
            )));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.key == key)
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))?;
        entry.metadata = Some(metadata.to_string());
        entry.rehash();
        Ok(())
    }

    /// Read back the annotation, if any.
    pub fn get_metadata(&self, key: &str) -> StorageResult<Option<&str>> {
        self.find(key)
            .map(|e| e.metadata.as_deref())
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    /// Keys matching a pattern, in insertion order.
    pub fn find_keys(&self, pat: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| pattern::key_matches(&e.key, pat))
            .map(|e| e.key.clone())
            .collect()
    }

    /// Deep copies of the entries whose keys match a pattern.
    pub fn find_entries(&self, pat: &str) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| pattern::key_matches(&e.key, pat))
            .cloned()
            .collect()
    }

    /// Deep copy of the whole live set, for commit snapshots.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.clone()
    }

    /// Swap in a new entry set wholesale (checkout, merge, load).
    pub fn replace_all(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidArg("key cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_payload(value: &Value) -> StorageResult<()> {
    if value.payload_len() > MAX_PAYLOAD_BYTES {
        return Err(StorageError::InvalidArg(format!(
            "value payload exceeds {} bytes",
            MAX_PAYLOAD_BYTES
        )));
    }
    Ok(())
}
