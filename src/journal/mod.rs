//! Journal Module
//!
//! The durable backing store: an append-only log whose committed blob is the
//! key-value area.
//!
//! ## Responsibilities
//! - `initialize` the media and report whether it holds a formatted journal
//! - `read` the committed blob
//! - `log` bytes into the next blob, `commit` it atomically
//! - `reset` the journal to an empty committed blob
//!
//! ## Completion Model
//! Every I/O call returns `Poll::Ready(value)` when it finished synchronously
//! or `Poll::Pending` when the result will be produced later by
//! `poll_completion`. Completions come out in the order the calls were made.
//!
//! The journal keeps its own format/init state; the engine only sees these
//! calls and their completions.

mod file;
mod memory;

use std::task::Poll;

use bytes::Bytes;

pub use file::FileJournal;
pub use memory::{CompletionMode, MemoryJournal, MemoryMedia};

use crate::error::JournalError;
use crate::record::SecurityFeatures;

/// Result of a journal call: ready now, pending, or failed immediately
pub type JournalResult<T> = std::result::Result<Poll<T>, JournalError>;

/// What `initialize` and `info` report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalInfo {
    /// Size of the committed blob in bytes
    pub blob_size: usize,
    /// False on first run: the media holds no journal yet and needs a reset
    pub formatted: bool,
    /// Largest blob the media can hold
    pub capacity: usize,
}

/// Static properties of a journal implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalCapabilities {
    pub asynchronous_ops: bool,
    /// Smallest programmable unit in bytes
    pub program_unit: usize,
    /// Security properties of the backing media
    pub security: SecurityFeatures,
}

/// Which journal call a completion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOpcode {
    Initialize,
    Read,
    Log,
    Commit,
    Reset,
}

/// Deferred result of a journal call that returned `Poll::Pending`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalCompletion {
    Initialized(std::result::Result<JournalInfo, JournalError>),
    Read(std::result::Result<Bytes, JournalError>),
    Logged(std::result::Result<usize, JournalError>),
    Committed(std::result::Result<usize, JournalError>),
    Reset(std::result::Result<(), JournalError>),
}

impl JournalCompletion {
    pub fn opcode(&self) -> JournalOpcode {
        match self {
            JournalCompletion::Initialized(_) => JournalOpcode::Initialize,
            JournalCompletion::Read(_) => JournalOpcode::Read,
            JournalCompletion::Logged(_) => JournalOpcode::Log,
            JournalCompletion::Committed(_) => JournalOpcode::Commit,
            JournalCompletion::Reset(_) => JournalOpcode::Reset,
        }
    }
}

/// Append-only journal consumed by the store
pub trait Journal {
    fn capabilities(&self) -> JournalCapabilities;

    /// Bring the media up and describe what is on it
    fn initialize(&mut self) -> JournalResult<JournalInfo>;

    /// Current state without I/O
    fn info(&self) -> std::result::Result<JournalInfo, JournalError>;

    /// Read up to `len` bytes from the start of the committed blob
    fn read(&mut self, len: usize) -> JournalResult<Bytes>;

    /// Append bytes to the blob being built
    fn log(&mut self, data: &[u8]) -> JournalResult<usize>;

    /// Make the logged bytes the committed blob; returns its size
    fn commit(&mut self) -> JournalResult<usize>;

    /// Replace the committed blob with an empty one
    fn reset(&mut self) -> JournalResult<()>;

    /// Next completion of an earlier `Poll::Pending` call, if any
    fn poll_completion(&mut self) -> Option<JournalCompletion>;
}

impl<J: Journal + ?Sized> Journal for Box<J> {
    fn capabilities(&self) -> JournalCapabilities {
        (**self).capabilities()
    }

    fn initialize(&mut self) -> JournalResult<JournalInfo> {
        (**self).initialize()
    }

    fn info(&self) -> std::result::Result<JournalInfo, JournalError> {
        (**self).info()
    }

    fn read(&mut self, len: usize) -> JournalResult<Bytes> {
        (**self).read(len)
    }

    fn log(&mut self, data: &[u8]) -> JournalResult<usize> {
        (**self).log(data)
    }

    fn commit(&mut self) -> JournalResult<usize> {
        (**self).commit()
    }

    fn reset(&mut self) -> JournalResult<()> {
        (**self).reset()
    }

    fn poll_completion(&mut self) -> Option<JournalCompletion> {
        (**self).poll_completion()
    }
}
