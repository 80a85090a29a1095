//! Binary persistence codec.
//!
//! The whole database round-trips through one length-prefixed,
//! little-endian layout: a magic/version header, the live entries, the
//! commit log (each commit with its full snapshot), the current branch,
//! the current commit, and the tag table. Strings are length-prefixed
//! *including* their trailing NUL, a legacy-compatibility quirk the
//! format keeps.
//!
//! Writes are all-or-nothing: the file is assembled in a sibling
//! temporary, fsynced, then renamed over the target. A crash leaves
//! either the old database or the complete new one, never a torn file.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::storage::commit::{Commit, CommitId};
use crate::storage::entry::{Entry, MAX_PAYLOAD_BYTES};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::Tag;
use crate::value::{TypeTag, Value};

/// File magic, first four bytes of every database file.
pub const MAGIC: [u8; 4] = *b"BCRB";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Counts above this are treated as corruption rather than allocated.
const MAX_COUNT: u64 = u32::MAX as u64;

/// Everything `load` recovers from a database file.
#[derive(Debug)]
pub struct LoadedDatabase {
    pub entries: Vec<Entry>,
    pub commits: Vec<Commit>,
    pub branch: String,
    pub current_commit: Option<CommitId>,
    pub tags: Vec<Tag>,
}

/// Serialize the database to `path` atomically.
pub fn save_database(
    path: &Path,
    entries: &[Entry],
    commits: &[Commit],
    branch: &str,
    current_commit: Option<&CommitId>,
    tags: &[Tag],
) -> StorageResult<()> {
    let tmp = tmp_path(path);
    if let Err(err) = write_database(&tmp, entries, commits, branch, current_commit, tags) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_database(
    tmp: &Path,
    entries: &[Entry],
    commits: &[Commit],
    branch: &str,
    current_commit: Option<&CommitId>,
    tags: &[Tag],
) -> StorageResult<()> {
    let file = File::create(tmp)?;
    let mut enc = Encoder {
        w: io::BufWriter::new(file),
    };

    enc.w.write_all(&MAGIC)?;
    enc.write_u32(FORMAT_VERSION)?;

    enc.write_u64(entries.len() as u64)?;
    for entry in entries {
        enc.write_entry(entry)?;
    }

    enc.write_u64(commits.len() as u64)?;
    for commit in commits {
        enc.write_commit(commit)?;
    }

    enc.write_nul_string(branch)?;
    enc.write_opt_nul_string(current_commit.map(CommitId::as_str))?;

    enc.write_u64(tags.len() as u64)?;
    for tag in tags {
        enc.write_nul_string(&tag.name)?;
        enc.write_nul_string(tag.commit_id.as_str())?;
    }

    let file = enc.w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Deserialize a database file written by [`save_database`].
pub fn load_database(path: &Path) -> StorageResult<LoadedDatabase> {
    let file = File::open(path)?;
    let mut dec = Decoder {
        r: io::BufReader::new(file),
        offset: 0,
    };

    let mut magic = [0u8; 4];
    dec.read_exact(&mut magic, "file magic")?;
    if magic != MAGIC {
        return Err(dec.corrupt("bad file magic"));
    }
    let version = dec.read_u32("format version")?;
    if version > FORMAT_VERSION {
        return Err(StorageError::Unsupported(version));
    }

    let entry_count = dec.read_count("entry count")?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        entries.push(dec.read_entry()?);
    }

    let commit_count = dec.read_count("commit count")?;
    let mut commits = Vec::new();
    for _ in 0..commit_count {
        commits.push(dec.read_commit()?);
    }

    let branch = dec.read_nul_string("branch name")?;
    let current_commit = dec
        .read_opt_nul_string("current commit")?
        .map(CommitId::new);

    let tag_count = dec.read_count("tag count")?;
    let mut tags = Vec::new();
    for _ in 0..tag_count {
        let name = dec.read_nul_string("tag name")?;
        let commit_id = CommitId::new(dec.read_nul_string("tag target")?);
        tags.push(Tag { name, commit_id });
    }

    dec.expect_eof()?;

    // The format persists a single branch; every stored commit belongs
    // to it as far as a fresh handle can tell.
    for commit in &mut commits {
        commit.branch = branch.clone();
    }

    Ok(LoadedDatabase {
        entries,
        commits,
        branch,
        current_commit,
        tags,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "bluecrab".into());
    name.push(".tmp");
    path.with_file_name(name)
}

// ==================== Encoder ====================

struct Encoder<W: Write> {
    w: W,
}

impl<W: Write> Encoder<W> {
    fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.w.write_all(&v.to_le_bytes())
    }

    fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.w.write_all(&v.to_le_bytes())
    }

    fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.w.write_all(&v.to_le_bytes())
    }

    /// Length (including the trailing NUL), bytes, NUL.
    fn write_nul_string(&mut self, s: &str) -> io::Result<()> {
        self.write_u64(s.len() as u64 + 1)?;
        self.w.write_all(s.as_bytes())?;
        self.w.write_all(&[0])
    }

    /// Absent strings are a bare zero length.
    fn write_opt_nul_string(&mut self, s: Option<&str>) -> io::Result<()> {
        match s {
            Some(s) => self.write_nul_string(s),
            None => self.write_u64(0),
        }
    }

    fn write_value(&mut self, value: &Value) -> io::Result<()> {
        self.write_u16(value.tag() as u16)?;
        match value {
            Value::I8(v) => self.w.write_all(&[*v as u8]),
            Value::U8(v) => self.w.write_all(&[*v]),
            Value::Char(v) => self.w.write_all(&[*v]),
            Value::Bool(v) => self.w.write_all(&[u8::from(*v)]),
            Value::I16(v) => self.w.write_all(&v.to_le_bytes()),
            Value::U16(v) => self.w.write_all(&v.to_le_bytes()),
            Value::I32(v) => self.w.write_all(&v.to_le_bytes()),
            Value::U32(v) => self.w.write_all(&v.to_le_bytes()),
            Value::F32(v) => self.w.write_all(&v.to_bits().to_le_bytes()),
            Value::I64(v) => self.w.write_all(&v.to_le_bytes()),
            Value::U64(v) => self.w.write_all(&v.to_le_bytes()),
            Value::F64(v) => self.w.write_all(&v.to_bits().to_le_bytes()),
            Value::Size(v) => self.w.write_all(&v.to_le_bytes()),
            Value::Datetime(v) => self.w.write_all(&v.to_le_bytes()),
            Value::Duration(v) => self.w.write_all(&v.to_le_bytes()),
            Value::Cstr(s) | Value::Hex(s) | Value::Oct(s) | Value::Bin(s) => {
                self.write_nul_string(s)
            }
            Value::Any(b) => {
                self.write_u64(b.len() as u64)?;
                self.w.write_all(b)
            }
            Value::Null => Ok(()),
        }
    }

    fn write_entry(&mut self, entry: &Entry) -> io::Result<()> {
        self.write_nul_string(&entry.key)?;
        self.write_value(&entry.value)?;
        self.write_u64(entry.created_at)?;
        self.write_u64(entry.updated_at)?;
        self.write_opt_nul_string(if entry.hash.is_empty() {
            None
        } else {
            Some(&entry.hash)
        })?;
        self.write_opt_nul_string(entry.metadata.as_deref())
    }

    fn write_commit(&mut self, commit: &Commit) -> io::Result<()> {
        self.write_nul_string(commit.id.as_str())?;
        self.write_nul_string(&commit.message)?;
        self.write_u64(commit.timestamp)?;
        self.write_opt_nul_string(commit.parent_id.as_ref().map(CommitId::as_str))?;
        self.write_u64(commit.snapshot.len() as u64)?;
        for entry in &commit.snapshot {
            self.write_entry(entry)?;
        }
        Ok(())
    }
}

// ==================== Decoder ====================

struct Decoder<R: Read> {
    r: R,
    offset: u64,
}

impl<R: Read> Decoder<R> {
    fn corrupt(&self, reason: impl Into<String>) -> StorageError {
        StorageError::Corrupt {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> StorageResult<()> {
        match self.r.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.corrupt(format!("truncated while reading {what}")))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn read_u8(&mut self, what: &str) -> StorageResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf, what)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, what: &str) -> StorageResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf, what)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self, what: &str) -> StorageResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, what)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, what: &str) -> StorageResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf, what)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_count(&mut self, what: &str) -> StorageResult<u64> {
        let count = self.read_u64(what)?;
        if count > MAX_COUNT {
            return Err(self.corrupt(format!("implausible {what}: {count}")));
        }
        Ok(count)
    }

    /// Read `len` raw bytes in bounded chunks, so a corrupt length can't
    /// trigger a huge up-front allocation.
    fn read_vec(&mut self, len: u64, what: &str) -> StorageResult<Vec<u8>> {
        if len > MAX_PAYLOAD_BYTES as u64 + 1 {
            return Err(self.corrupt(format!("{what} length {len} exceeds cap")));
        }
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64 * 1024];
        let mut remaining = len as usize;
        while remaining > 0 {
            let take = remaining.min(chunk.len());
            self.read_exact(&mut chunk[..take], what)?;
            buf.extend_from_slice(&chunk[..take]);
            remaining -= take;
        }
        Ok(buf)
    }

    fn read_nul_string(&mut self, what: &str) -> StorageResult<String> {
        let len = self.read_u64(what)?;
        if len == 0 {
            return Err(self.corrupt(format!("missing required {what}")));
        }
        self.read_nul_string_body(len, what)
    }

    fn read_opt_nul_string(&mut self, what: &str) -> StorageResult<Option<String>> {
        let len = self.read_u64(what)?;
        if len == 0 {
            return Ok(None);
        }
        self.read_nul_string_body(len, what).map(Some)
    }

    fn read_nul_string_body(&mut self, len: u64, what: &str) -> StorageResult<String> {
        let mut bytes = self.read_vec(len, what)?;
        if bytes.pop() != Some(0) {
            return Err(self.corrupt(format!("{what} is not NUL-terminated")));
        }
        String::from_utf8(bytes).map_err(|_| self.corrupt(format!("{what} is not valid UTF-8")))
    }

    fn read_value(&mut self) -> StorageResult<Value> {
        let tag_offset = self.offset;
        let raw = self.read_u16("type tag")?;
        let tag = TypeTag::from_u16(raw).ok_or(StorageError::TypeMismatch {
            tag: raw,
            offset: tag_offset,
        })?;

        Ok(match tag {
            TypeTag::I8 => Value::I8(self.read_u8("i8 value")? as i8),
            TypeTag::U8 => Value::U8(self.read_u8("u8 value")?),
            TypeTag::Char => Value::Char(self.read_u8("char value")?),
            TypeTag::Bool => Value::Bool(self.read_u8("bool value")? != 0),
            TypeTag::I16 => Value::I16(self.read_u16("i16 value")? as i16),
            TypeTag::U16 => Value::U16(self.read_u16("u16 value")?),
            TypeTag::I32 => Value::I32(self.read_u32("i32 value")? as i32),
            TypeTag::U32 => Value::U32(self.read_u32("u32 value")?),
            TypeTag::F32 => Value::F32(f32::from_bits(self.read_u32("f32 value")?)),
            TypeTag::I64 => Value::I64(self.read_u64("i64 value")? as i64),
            TypeTag::U64 => Value::U64(self.read_u64("u64 value")?),
            TypeTag::F64 => Value::F64(f64::from_bits(self.read_u64("f64 value")?)),
            TypeTag::Size => Value::Size(self.read_u64("size value")?),
            TypeTag::Datetime => Value::Datetime(self.read_u64("datetime value")?),
            TypeTag::Duration => Value::Duration(self.read_u64("duration value")? as i64),
            TypeTag::Cstr => Value::Cstr(self.read_nul_string("string value")?),
            TypeTag::Hex => Value::Hex(self.read_nul_string("hex value")?),
            TypeTag::Oct => Value::Oct(self.read_nul_string("oct value")?),
            TypeTag::Bin => Value::Bin(self.read_nul_string("bin value")?),
            TypeTag::Any => {
                let len = self.read_u64("blob length")?;
                Value::Any(self.read_vec(len, "blob value")?)
            }
            TypeTag::Null => Value::Null,
        })
    }

    fn read_entry(&mut self) -> StorageResult<Entry> {
        let key = self.read_nul_string("entry key")?;
        let value = self.read_value()?;
        let created_at = self.read_u64("created_at")?;
        let updated_at = self.read_u64("updated_at")?;
        let hash = self.read_opt_nul_string("entry hash")?.unwrap_or_default();
        let metadata = self.read_opt_nul_string("entry metadata")?;

        Ok(Entry {
            key,
            value,
            created_at,
            updated_at,
            metadata,
            hash,
        })
    }

    fn read_commit(&mut self) -> StorageResult<Commit> {
        let id = CommitId::new(self.read_nul_string("commit id")?);
        let message = self.read_nul_string("commit message")?;
        let timestamp = self.read_u64("commit timestamp")?;
        let parent_id = self.read_opt_nul_string("parent id")?.map(CommitId::new);

        let snapshot_count = self.read_count("snapshot count")?;
        let mut snapshot = Vec::new();
        for _ in 0..snapshot_count {
            snapshot.push(self.read_entry()?);
        }

        Ok(Commit {
            id,
            parent_id,
            branch: String::new(),
            message,
            timestamp,
            snapshot,
        })
    }

    fn expect_eof(&mut self) -> StorageResult<()> {
        let mut buf = [0u8; 1];
        match self.r.read(&mut buf) {
            Ok(0) => Ok(()),
            Ok(_) => Err(self.corrupt("trailing bytes after database payload")),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::derive_commit_id;
    use crate::storage::entry::EntryStore;
    use tempfile::TempDir;

    fn all_variant_entries() -> Vec<Entry> {
        let mut store = EntryStore::new();
        store.set("v_i8", Value::I8(-8)).unwrap();
        store.set("v_i16", Value::I16(-1600)).unwrap();
        store.set("v_i32", Value::I32(-320_000)).unwrap();
        store.set("v_i64", Value::I64(i64::MIN)).unwrap();
        store.set("v_u8", Value::U8(200)).unwrap();
        store.set("v_u16", Value::U16(60_000)).unwrap();
        store.set("v_u32", Value::U32(4_000_000_000)).unwrap();
        store.set("v_u64", Value::U64(u64::MAX)).unwrap();
        store.set("v_f32", Value::F32(1.5)).unwrap();
        store.set("v_f64", Value::F64(-0.0)).unwrap();
        store.set("v_cstr", Value::Cstr("hello".into())).unwrap();
        store.set("v_char", Value::Char(b'x')).unwrap();
        store.set("v_bool", Value::Bool(true)).unwrap();
        store.set("v_hex", Value::Hex("0xDEAD".into())).unwrap();
        store.set("v_oct", Value::Oct("0o755".into())).unwrap();
        store.set("v_bin", Value::Bin("0b1010".into())).unwrap();
        store.set("v_size", Value::Size(4096)).unwrap();
        store.set("v_datetime", Value::Datetime(1_700_000_000_000_000_000)).unwrap();
        store.set("v_duration", Value::Duration(-5_000_000_000)).unwrap();
        store.set("v_any", Value::Any(vec![0, 1, 2, 255])).unwrap();
        store.set("v_null", Value::Null).unwrap();
        store.set_metadata("v_cstr", "greeting").unwrap();
        store.snapshot()
    }

    fn db_file(dir: &TempDir) -> PathBuf {
        dir.path().join("test.bcdb")
    }

    #[test]
    fn test_roundtrip_every_value_variant() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        let entries = all_variant_entries();

        save_database(&path, &entries, &[], "main", None, &[]).unwrap();
        let loaded = load_database(&path).unwrap();

        assert_eq!(loaded.entries, entries);
        assert!(loaded.entries.iter().all(Entry::verify));
        assert_eq!(loaded.branch, "main");
        assert_eq!(loaded.current_commit, None);
        assert!(loaded.tags.is_empty());
    }

    #[test]
    fn test_roundtrip_empty_database() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);

        save_database(&path, &[], &[], "main", None, &[]).unwrap();
        let loaded = load_database(&path).unwrap();

        assert!(loaded.entries.is_empty());
        assert!(loaded.commits.is_empty());
        assert_eq!(loaded.branch, "main");
    }

    #[test]
    fn test_roundtrip_commits_and_tags() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);

        let snapshot = all_variant_entries();
        let c1 = derive_commit_id(1, None, "first", 100, &snapshot);
        let c2 = derive_commit_id(2, Some(&c1), "second", 200, &snapshot);
        let commits = vec![
            Commit {
                id: c1.clone(),
                parent_id: None,
                branch: "main".to_string(),
                message: "first".to_string(),
                timestamp: 100,
                snapshot: snapshot.clone(),
            },
            Commit {
                id: c2.clone(),
                parent_id: Some(c1.clone()),
                branch: "main".to_string(),
                message: "second".to_string(),
                timestamp: 200,
                snapshot: snapshot.clone(),
            },
        ];
        let tags = vec![Tag {
            name: "release".to_string(),
            commit_id: c2.clone(),
        }];

        save_database(&path, &snapshot, &commits, "main", Some(&c2), &tags).unwrap();
        let loaded = load_database(&path).unwrap();

        assert_eq!(loaded.commits, commits);
        assert_eq!(loaded.current_commit, Some(c2));
        assert_eq!(loaded.tags, tags);
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        save_database(&path, &all_variant_entries(), &[], "main", None, &[]).unwrap();

        let bytes = fs::read(&path).unwrap();
        for cut in [3, 7, 20, bytes.len() / 2, bytes.len() - 1] {
            fs::write(&path, &bytes[..cut]).unwrap();
            let err = load_database(&path).unwrap_err();
            assert!(err.is_corrupt(), "cut at {cut} gave {err:?}");
        }
    }

    #[test]
    fn test_unknown_type_tag_is_type_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        let mut store = EntryStore::new();
        store.set("k", Value::I32(1)).unwrap();
        save_database(&path, &store.snapshot(), &[], "main", None, &[]).unwrap();

        // Header (8) + entry count (8) + key_len (8) + "k\0" (2) puts the
        // type tag at byte 26.
        let mut bytes = fs::read(&path).unwrap();
        bytes[26] = 0xFF;
        bytes[27] = 0xFF;
        fs::write(&path, &bytes).unwrap();

        let err = load_database(&path).unwrap_err();
        assert!(matches!(
            err,
            StorageError::TypeMismatch { tag: 0xFFFF, offset: 26 }
        ));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        save_database(&path, &[], &[], "main", None, &[]).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();

        assert!(load_database(&path).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_future_version_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        save_database(&path, &[], &[], "main", None, &[]).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            load_database(&path).unwrap_err(),
            StorageError::Unsupported(v) if v == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        save_database(&path, &[], &[], "main", None, &[]).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.push(0xAB);
        fs::write(&path, &bytes).unwrap();

        assert!(load_database(&path).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);
        save_database(&path, &[], &[], "main", None, &[]).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["test.bcdb"]);
    }

    #[test]
    fn test_save_overwrites_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = db_file(&dir);

        let mut store = EntryStore::new();
        store.set("old", Value::I32(1)).unwrap();
        save_database(&path, &store.snapshot(), &[], "main", None, &[]).unwrap();

        store.clear();
        store.set("new", Value::I32(2)).unwrap();
        save_database(&path, &store.snapshot(), &[], "dev", None, &[]).unwrap();

        let loaded = load_database(&path).unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].key, "new");
        assert_eq!(loaded.branch, "dev");
    }

    #[test]
    fn test_missing_file_is_io() {
        let dir = TempDir::new().unwrap();
        let err = load_database(&dir.path().join("absent.bcdb")).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
