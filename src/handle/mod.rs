//! Handle Module
//!
//! Opaque client references to open key-value contexts.
//!
//! ## Representation
//! A handle is an arena index plus a generation counter. Releasing a slot
//! bumps its generation, so a handle kept after Close no longer resolves.
//!
//! ## Buffer Format
//! Callers that keep handles in fixed caller-owned storage can export them:
//! ```text
//! ┌──────────┬───────────┬────────────────┬──────────────┐
//! │ Tag (4)  │ Index (4) │ Generation (4) │ Reserved (12)│
//! └──────────┴───────────┴────────────────┴──────────────┘
//! ```
//! A zeroed buffer holds no handle.

mod table;

pub use table::{HandleSlot, HandleTable};

/// Size of the caller-owned handle buffer
pub const HANDLE_BUFFER_SIZE: usize = 24;

const HANDLE_TAG: &[u8; 4] = b"CFSH";

/// Opaque reference to an open key (or a Find cursor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }

    /// Write this handle into a caller-owned buffer
    pub fn to_bytes(self) -> [u8; HANDLE_BUFFER_SIZE] {
        let mut buf = [0u8; HANDLE_BUFFER_SIZE];
        buf[0..4].copy_from_slice(HANDLE_TAG);
        buf[4..8].copy_from_slice(&self.index.to_le_bytes());
        buf[8..12].copy_from_slice(&self.generation.to_le_bytes());
        buf
    }

    /// Read a handle back out of a caller-owned buffer
    pub fn from_bytes(buf: &[u8; HANDLE_BUFFER_SIZE]) -> Option<Self> {
        if &buf[0..4] != HANDLE_TAG {
            return None;
        }
        let index = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let generation = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        Some(Self { index, generation })
    }

    /// Wipe the tag so stale reuse of the buffer is detectable
    pub fn neutralize(buf: &mut [u8; HANDLE_BUFFER_SIZE]) {
        buf.fill(0);
    }
}

/// How a handle may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    /// Handed out by Find; read-only until the key is re-opened
    FoundReadOnly,
}

impl OpenMode {
    pub fn can_read(self) -> bool {
        !matches!(self, OpenMode::WriteOnly)
    }

    pub fn can_write(self) -> bool {
        matches!(self, OpenMode::WriteOnly | OpenMode::ReadWrite)
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, OpenMode::ReadOnly | OpenMode::FoundReadOnly)
    }
}

/// Lifecycle state of a handle slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Closed,
    Opening,
    Open,
    Reading,
    Writing,
    Seeking,
    Closing,
}
