//! Directory Module
//!
//! In-memory index of the key-value area.
//!
//! ## Responsibilities
//! - Rebuild from a linear scan of the committed area (crash recovery)
//! - Exact lookup and wildcard Find with a stable cursor
//! - Two-phase delete: hide immediately, reclaim at flush
//! - Per-entry reference counts for open handles
//!
//! ## Data Structure Choice
//! BTreeMap keyed by insertion id plus a HashMap name index:
//! - Find walks entries in insertion order
//! - Cursors (insertion ids) never shift when entries are removed

mod pattern;
mod table;

pub use pattern::Pattern;
pub use table::Directory;

use crate::record::KeyRecord;

/// Insertion id of a directory entry
pub type EntryId = u64;

/// One record plus its runtime bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub record: KeyRecord,
    /// Open handles referencing this entry
    pub refcount: u32,
}
