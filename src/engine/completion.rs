//! Completion types
//!
//! What every store operation hands back, either directly or through the
//! registered callback.

use crate::error::Result;
use crate::handle::Handle;

/// Which operation a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Close = 1,
    Create = 2,
    Delete = 3,
    Find = 4,
    Flush = 5,
    GetKeyName = 6,
    GetStatus = 7,
    GetValueLen = 8,
    Initialize = 9,
    Open = 10,
    PowerControl = 11,
    Read = 12,
    Rseek = 13,
    Uninitialize = 14,
    Write = 15,
}

/// Opaque value supplied at Initialize and echoed in every completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientContext(pub u64);

/// Immediate result of an accepted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finished. `value` is operation specific (bytes read or written,
    /// value length, name length including terminator, ...).
    Complete {
        value: usize,
        handle: Option<Handle>,
    },
    /// Accepted; exactly one [`Completion`] will follow through the callback
    Pending,
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    pub fn value(&self) -> Option<usize> {
        match self {
            Outcome::Complete { value, .. } => Some(*value),
            Outcome::Pending => None,
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            Outcome::Complete { handle, .. } => *handle,
            Outcome::Pending => None,
        }
    }
}

/// Deferred result delivered to the callback
#[derive(Debug)]
pub struct Completion {
    pub status: Result<usize>,
    pub opcode: Opcode,
    pub context: ClientContext,
    pub handle: Option<Handle>,
}

/// The single callback registered at Initialize
pub type Callback = Box<dyn FnMut(Completion)>;

/// Driver power states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    Off,
    Low,
    #[default]
    Full,
}

/// What GetStatus reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    /// Some accepted operation has not delivered its completion yet
    pub in_progress: bool,
    /// The most recent completion carried an error
    pub error: bool,
}

/// What GetCapabilities reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub asynchronous_ops: bool,
    pub uvisor_support_enabled: bool,
}
