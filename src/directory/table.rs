//! Directory implementation
//!
//! Insertion-ordered map of entries with a name index over live entries.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::error::{CfstoreError, Result};
use crate::record::{decode_area, KeyRecord};

use super::{Entry, EntryId, Pattern};

/// In-memory index of every record in the area
///
/// ## Ordering
/// Entries are keyed by an insertion id that only ever grows, so a Find
/// cursor (the id of the last match) stays meaningful across inserts and
/// removals.
#[derive(Debug, Default)]
pub struct Directory {
    /// All entries (live and deleting), oldest first
    entries: BTreeMap<EntryId, Entry>,

    /// Name → id, live entries only
    names: HashMap<String, EntryId>,

    /// Next insertion id
    next_id: EntryId,
}

impl Directory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            names: HashMap::new(),
            next_id: 1,
        }
    }

    /// Rebuild the directory from a committed area blob
    pub fn scan(area: &[u8], program_unit: usize) -> Result<Self> {
        let records = decode_area(area, program_unit).map_err(|e| {
            tracing::warn!(error = %e, bytes = area.len(), "area scan failed");
            e
        })?;
        let directory = Self::from_records(records)?;

        tracing::debug!(
            records = directory.len(),
            bytes = area.len(),
            "directory scan complete"
        );
        Ok(directory)
    }

    /// Build a directory from records in area order.
    ///
    /// If the same name shows up twice, the later record wins.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = KeyRecord>,
    {
        let mut directory = Self::new();

        for record in records {
            if let Some(old) = directory.lookup_id(record.name.as_str()) {
                tracing::warn!(key = %record.name, "duplicate key in area, keeping the later record");
                directory.entries.remove(&old);
                directory.names.remove(record.name.as_str());
            }
            directory.insert(record)?;
        }

        Ok(directory)
    }

    /// Exact lookup of a live entry
    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.lookup_id(name).and_then(|id| self.entries.get(&id))
    }

    /// Id of the live entry called `name`
    pub fn lookup_id(&self, name: &str) -> Option<EntryId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// First live entry after `after` (exclusive) whose name matches
    pub fn find(&self, pattern: &Pattern, after: Option<EntryId>) -> Option<&Entry> {
        if pattern.is_exact() {
            return self
                .names
                .get(pattern.prefix())
                .filter(|id| after.map_or(true, |after| **id > after))
                .and_then(|id| self.entries.get(id))
                .filter(|entry| !entry.record.deleting);
        }

        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .map(|(_, entry)| entry)
            .find(|entry| !entry.record.deleting && pattern.matches(entry.record.name.as_str()))
    }

    /// Add a new live record
    pub fn insert(&mut self, record: KeyRecord) -> Result<EntryId> {
        if self.names.contains_key(record.name.as_str()) {
            return Err(CfstoreError::PreexistingKey);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.names.insert(record.name.as_str().to_string(), id);
        self.entries.insert(
            id,
            Entry {
                id,
                record,
                refcount: 0,
            },
        );
        Ok(id)
    }

    /// First phase of delete: hide the entry from lookups and Find.
    ///
    /// The entry stays in the table until it is reclaimed.
    pub fn mark_deleting(&mut self, id: EntryId) -> Result<()> {
        let entry = self.entries.get_mut(&id).ok_or(CfstoreError::KeyNotFound)?;
        if entry.record.deleting {
            return Err(CfstoreError::KeyNotFound);
        }
        entry.record.deleting = true;
        self.names.remove(entry.record.name.as_str());
        Ok(())
    }

    /// Drop an entry outright
    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        if self.names.get(entry.record.name.as_str()) == Some(&id) {
            self.names.remove(entry.record.name.as_str());
        }
        Some(entry)
    }

    /// Second phase of delete: drop the given deleting entries that no
    /// handle still references. Returns how many were dropped.
    pub fn reclaim(&mut self, ids: &[EntryId]) -> usize {
        let mut dropped = 0;
        for id in ids {
            let reclaimable = self
                .entries
                .get(id)
                .map(|e| e.record.deleting && e.refcount == 0)
                .unwrap_or(false);
            if reclaimable {
                self.entries.remove(id);
                dropped += 1;
            }
        }
        dropped
    }

    /// Take a reference on an entry (a handle was opened on it)
    pub fn acquire(&mut self, id: EntryId) -> Result<()> {
        let entry = self.entries.get_mut(&id).ok_or(CfstoreError::KeyNotFound)?;
        entry.refcount += 1;
        Ok(())
    }

    /// Drop a reference. A deleting entry whose last reference goes away
    /// leaves memory; its bytes leave the media at the next flush.
    pub fn release(&mut self, id: EntryId) {
        let drop_entry = match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.refcount = entry.refcount.saturating_sub(1);
                entry.record.deleting && entry.refcount == 0
            }
            None => false,
        };
        if drop_entry {
            self.entries.remove(&id);
        }
    }

    /// Live records in insertion order
    pub fn live_records(&self) -> impl Iterator<Item = &KeyRecord> {
        self.entries
            .values()
            .filter(|e| !e.record.deleting)
            .map(|e| &e.record)
    }

    /// Ids of entries currently marked deleting
    pub fn deleting_ids(&self) -> Vec<EntryId> {
        self.entries
            .values()
            .filter(|e| e.record.deleting)
            .map(|e| e.id)
            .collect()
    }

    /// Bytes the live records would take up in an area
    pub fn area_size(&self, program_unit: usize) -> usize {
        self.live_records()
            .map(|r| r.encoded_len(program_unit))
            .sum()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of entries including ones waiting to be reclaimed
    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }
}
