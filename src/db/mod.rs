//! High-level database interface.

mod api;
mod events;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseStats};
pub use events::{stderr_sink, DbEvent, EventSink};
