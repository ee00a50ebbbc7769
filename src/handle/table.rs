//! Handle table
//!
//! Fixed-capacity arena of handle slots with a free list.

use crate::directory::EntryId;
use crate::error::{CfstoreError, Result};

use super::{Handle, HandleState, OpenMode};

/// Per-handle state
#[derive(Debug, Clone)]
pub struct HandleSlot {
    pub generation: u32,
    pub state: HandleState,
    /// Directory entry this handle refers to
    pub entry: EntryId,
    pub mode: OpenMode,
    /// Offset of the next Read
    pub read_cursor: usize,
    /// Offset of the next Write
    pub write_cursor: usize,
    /// Set once any Write succeeded through this handle
    pub dirty: bool,
}

impl HandleSlot {
    fn vacant() -> Self {
        Self {
            generation: 0,
            state: HandleState::Closed,
            entry: 0,
            mode: OpenMode::ReadOnly,
            read_cursor: 0,
            write_cursor: 0,
            dirty: false,
        }
    }
}

/// Allocates, validates and releases handles
pub struct HandleTable {
    slots: Vec<HandleSlot>,
    /// Indices of closed slots ready for reuse
    free: Vec<u32>,
    /// Max simultaneously open handles
    capacity: usize,
    open: usize,
}

impl HandleTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            open: 0,
        }
    }

    /// Open a new handle on `entry`
    pub fn allocate(&mut self, entry: EntryId, mode: OpenMode) -> Result<Handle> {
        if self.open >= self.capacity {
            return Err(CfstoreError::OutOfMemory(format!(
                "all {} handles in use",
                self.capacity
            )));
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(HandleSlot::vacant());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.state = HandleState::Opening;
        slot.entry = entry;
        slot.mode = mode;
        slot.read_cursor = 0;
        slot.write_cursor = 0;
        slot.dirty = false;
        slot.state = HandleState::Open;
        self.open += 1;

        tracing::trace!(index, generation = slot.generation, entry, ?mode, "handle opened");
        Ok(Handle::new(index, slot.generation))
    }

    /// Resolve an open handle
    pub fn get(&self, handle: Handle) -> Result<&HandleSlot> {
        match self.slots.get(handle.index()) {
            Some(slot) if slot.generation == handle.generation() && slot.state == HandleState::Open => {
                Ok(slot)
            }
            _ => Err(CfstoreError::InvalidHandle),
        }
    }

    /// Resolve an open handle for mutation
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut HandleSlot> {
        match self.slots.get_mut(handle.index()) {
            Some(slot) if slot.generation == handle.generation() && slot.state == HandleState::Open => {
                Ok(slot)
            }
            _ => Err(CfstoreError::InvalidHandle),
        }
    }

    /// Move an open handle into a transient state (Reading, Writing, Seeking)
    pub fn enter(&mut self, handle: Handle, state: HandleState) -> Result<&mut HandleSlot> {
        let slot = self.get_mut(handle)?;
        slot.state = state;
        Ok(slot)
    }

    /// Return a handle from a transient state to Open
    pub fn leave(&mut self, handle: Handle) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            if slot.generation == handle.generation()
                && matches!(
                    slot.state,
                    HandleState::Reading | HandleState::Writing | HandleState::Seeking
                )
            {
                slot.state = HandleState::Open;
            }
        }
    }

    /// Close a handle. Returns the slot as it was so the caller can release
    /// the directory reference and act on `dirty`.
    pub fn release(&mut self, handle: Handle) -> Result<HandleSlot> {
        let slot = self.get_mut(handle)?;
        slot.state = HandleState::Closing;
        let closed = slot.clone();

        slot.state = HandleState::Closed;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index() as u32);
        self.open -= 1;

        tracing::trace!(index = handle.index(), "handle closed");
        Ok(closed)
    }

    /// Close every open handle, returning the entries they referenced
    pub fn release_all(&mut self) -> Vec<EntryId> {
        let mut entries = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state != HandleState::Closed {
                entries.push(slot.entry);
                slot.state = HandleState::Closed;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.open = 0;
        entries
    }

    /// Pull the cursors of every handle on `entry` back inside `len` bytes
    pub fn clamp_cursors(&mut self, entry: EntryId, len: usize) {
        for slot in self.slots.iter_mut() {
            if slot.state != HandleState::Closed && slot.entry == entry {
                slot.read_cursor = slot.read_cursor.min(len);
                slot.write_cursor = slot.write_cursor.min(len);
            }
        }
    }

    /// Number of open handles
    pub fn open_count(&self) -> usize {
        self.open
    }
}
