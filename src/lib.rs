//! BlueCrab - an embedded key/value store with Git-style history
//!
//! This crate provides a single-process, typed key/value store whose
//! distinguishing feature is a tamper-evident, versioned history: every
//! entry carries a canonical content hash, and the database can freeze
//! deep-copied snapshots into commits, move between them, diff them, and
//! merge them - much like a tiny Git for records.
//!
//! # Example
//!
//! ```no_run
//! use bluecrab::db::Database;
//! use bluecrab::value::Value;
//!
//! let mut db = Database::open("./my_database.bcdb").unwrap();
//! db.set("user_1", Value::Cstr("Alice".to_string())).unwrap();
//! let id = db.commit("add alice").unwrap();
//! db.tag_commit(id.as_str(), "v1").unwrap();
//! db.save().unwrap();
//! ```

pub mod db;
pub mod hash;
pub mod storage;
pub mod value;
