//! Error types for CFSTORE
//!
//! Provides a unified error type for all operations, plus the journal and
//! codec error types it wraps.

use thiserror::Error;

/// Result type alias using CfstoreError
pub type Result<T> = std::result::Result<T, CfstoreError>;

/// Unified error type for CFSTORE operations
#[derive(Debug, Error)]
pub enum CfstoreError {
    // -------------------------------------------------------------------------
    // Validation Errors (never touch storage)
    // -------------------------------------------------------------------------
    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    #[error("Invalid key descriptor: {0}")]
    InvalidKeyDescriptor(String),

    #[error("Value size too large: {requested} bytes (max {max})")]
    ValueSizeTooLarge { requested: usize, max: usize },

    #[error("Invalid write buffer")]
    InvalidWriteBuffer,

    #[error("Buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("Invalid handle")]
    InvalidHandle,

    #[error("Key is read-only for this handle")]
    KeyReadOnly,

    #[error("Invalid seek")]
    InvalidSeek,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Operation in progress")]
    Busy,

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key already exists")]
    PreexistingKey,

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("No space: area of {needed} bytes exceeds capacity of {capacity}")]
    NoSpace { needed: usize, capacity: usize },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Corrupt(#[from] CorruptRecord),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CfstoreError {
    /// Legacy numeric status code (always negative).
    ///
    /// Journal errors map into their own range below -100 so that callers
    /// comparing raw codes can tell media failures from engine failures.
    pub fn code(&self) -> i32 {
        match self {
            CfstoreError::InvalidKeyName(_) => -3,
            CfstoreError::InvalidKeyDescriptor(_) => -4,
            CfstoreError::ValueSizeTooLarge { .. } => -5,
            CfstoreError::InvalidWriteBuffer => -6,
            CfstoreError::BufferTooSmall { .. } => -7,
            CfstoreError::InvalidHandle => -8,
            CfstoreError::KeyReadOnly => -9,
            CfstoreError::InvalidSeek => -10,
            CfstoreError::PermissionDenied(_) => -11,
            CfstoreError::NotInitialized => -12,
            CfstoreError::Busy => -13,
            CfstoreError::KeyNotFound => -14,
            CfstoreError::PreexistingKey => -15,
            CfstoreError::OutOfMemory(_) => -16,
            CfstoreError::NoSpace { .. } => -17,
            CfstoreError::Corrupt(_) => -18,
            CfstoreError::Io(_) => -19,
            CfstoreError::Config(_) => -20,
            CfstoreError::Journal(e) => e.code(),
        }
    }

    /// True for errors that end a Find iteration rather than signal a fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, CfstoreError::KeyNotFound)
    }
}

/// Errors reported by a journal implementation.
///
/// The engine never retries these; they are surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("journal busy")]
    Busy,

    #[error("journal operation timed out")]
    Timeout,

    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("journal not initialized")]
    NotInitialized,

    #[error("journal empty")]
    Empty,

    #[error("log request smaller than the program unit")]
    SmallLogRequest,

    #[error("journal out of space")]
    NoSpace,

    #[error("journal corrupt: {0}")]
    Corrupt(String),
}

impl JournalError {
    pub fn code(&self) -> i32 {
        match self {
            JournalError::Busy => -101,
            JournalError::Timeout => -102,
            JournalError::StorageIo(_) => -103,
            JournalError::NotInitialized => -104,
            JournalError::Empty => -105,
            JournalError::SmallLogRequest => -106,
            JournalError::NoSpace => -107,
            JournalError::Corrupt(_) => -108,
        }
    }
}

impl From<std::io::Error> for JournalError {
    fn from(e: std::io::Error) -> Self {
        JournalError::StorageIo(e.to_string())
    }
}

/// A record in the stored area could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptRecord {
    #[error("corrupt record at offset {offset}: zero key length")]
    ZeroKeyLength { offset: usize },

    #[error("corrupt record at offset {offset}: key length {len} exceeds maximum")]
    KeyTooLong { offset: usize, len: usize },

    #[error("corrupt record at offset {offset}: value length {len} exceeds maximum")]
    ValueTooLong { offset: usize, len: usize },

    #[error("corrupt record at offset {offset}: needs {needed} bytes, {available} available")]
    Overrun {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("corrupt record at offset {offset}: invalid key name")]
    BadKeyName { offset: usize },

    #[error("corrupt record at offset {offset}: unknown retention level {value}")]
    BadRetention { offset: usize, value: u8 },
}
