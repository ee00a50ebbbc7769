//! In-memory journal
//!
//! Simulated flash for tests and tooling. The media outlives any journal or
//! store built on it, so dropping a store without flushing and opening a new
//! one on the same media behaves like a power cut.

use std::collections::VecDeque;
use std::sync::Arc;
use std::task::Poll;

use bytes::{Bytes, BytesMut};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::JournalError;
use crate::record::SecurityFeatures;

use super::{
    Journal, JournalCapabilities, JournalCompletion, JournalInfo, JournalOpcode, JournalResult,
};

/// Shared simulated media
///
/// Cheap to clone; all clones see the same bytes.
#[derive(Debug, Clone)]
pub struct MemoryMedia {
    inner: Arc<Mutex<MediaState>>,
}

#[derive(Debug)]
struct MediaState {
    /// None until the journal is first reset (unformatted media)
    committed: Option<Bytes>,
    capacity: usize,
    /// Failures to hand out to the next media operations, oldest first
    faults: VecDeque<(Option<JournalOpcode>, JournalError)>,
    commits: u64,
}

impl MemoryMedia {
    /// Blank, unformatted media of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MediaState {
                committed: None,
                capacity,
                faults: VecDeque::new(),
                commits: 0,
            })),
        }
    }

    /// The committed blob, or None if the media was never formatted
    pub fn committed(&self) -> Option<Bytes> {
        self.inner.lock().committed.clone()
    }

    /// Overwrite the committed blob directly (corruption tests)
    pub fn set_committed(&self, blob: Bytes) {
        self.inner.lock().committed = Some(blob);
    }

    /// Make the next media operation fail with `error`
    pub fn inject_fault(&self, error: JournalError) {
        self.inner.lock().faults.push_back((None, error));
    }

    /// Make the next media operation of kind `opcode` fail with `error`
    pub fn inject_fault_on(&self, opcode: JournalOpcode, error: JournalError) {
        self.inner.lock().faults.push_back((Some(opcode), error));
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    fn take_fault(&self, opcode: JournalOpcode) -> Option<JournalError> {
        let mut state = self.inner.lock();
        let pos = state
            .faults
            .iter()
            .position(|(target, _)| target.map_or(true, |t| t == opcode))?;
        state.faults.remove(pos).map(|(_, e)| e)
    }
}

/// How the journal reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Every call finishes before returning
    Sync,
    /// Every I/O call returns Pending; results come from `poll_completion`
    Async,
}

/// Journal over a [`MemoryMedia`]
pub struct MemoryJournal {
    media: MemoryMedia,
    mode: CompletionMode,
    program_unit: usize,
    security: SecurityFeatures,
    initialized: bool,
    /// Bytes logged since the last commit
    staged: BytesMut,
    tx: Sender<JournalCompletion>,
    rx: Receiver<JournalCompletion>,
    /// Completions sent but not yet polled
    in_flight: usize,
}

impl MemoryJournal {
    /// Synchronous journal
    pub fn new(media: MemoryMedia, program_unit: usize) -> Self {
        Self::with_mode(media, program_unit, CompletionMode::Sync)
    }

    /// Asynchronous journal
    pub fn new_async(media: MemoryMedia, program_unit: usize) -> Self {
        Self::with_mode(media, program_unit, CompletionMode::Async)
    }

    pub fn with_mode(media: MemoryMedia, program_unit: usize, mode: CompletionMode) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            media,
            mode,
            program_unit,
            security: SecurityFeatures::empty()
                .with(SecurityFeatures::ACLS, true)
                .with(SecurityFeatures::INTERNAL_FLASH, true),
            initialized: false,
            staged: BytesMut::new(),
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Override the security features the media advertises
    pub fn with_security(mut self, security: SecurityFeatures) -> Self {
        self.security = security;
        self
    }

    pub fn media(&self) -> &MemoryMedia {
        &self.media
    }

    fn check_ready(&self) -> Result<(), JournalError> {
        if self.in_flight > 0 {
            return Err(JournalError::Busy);
        }
        if !self.initialized {
            return Err(JournalError::NotInitialized);
        }
        Ok(())
    }

    /// Hand a computed result back: directly in sync mode, via the
    /// completion channel in async mode.
    fn complete<T>(
        &mut self,
        result: Result<T, JournalError>,
        wrap: fn(Result<T, JournalError>) -> JournalCompletion,
    ) -> JournalResult<T> {
        match self.mode {
            CompletionMode::Sync => result.map(Poll::Ready),
            CompletionMode::Async => {
                // The receiver lives in self, so the channel cannot be closed.
                let _ = self.tx.send(wrap(result));
                self.in_flight += 1;
                Ok(Poll::Pending)
            }
        }
    }

    fn current_info(&self) -> JournalInfo {
        let state = self.media.inner.lock();
        JournalInfo {
            blob_size: state.committed.as_ref().map_or(0, |b| b.len()),
            formatted: state.committed.is_some(),
            capacity: state.capacity,
        }
    }
}

impl Journal for MemoryJournal {
    fn capabilities(&self) -> JournalCapabilities {
        JournalCapabilities {
            asynchronous_ops: self.mode == CompletionMode::Async,
            program_unit: self.program_unit,
            security: self.security,
        }
    }

    fn initialize(&mut self) -> JournalResult<JournalInfo> {
        if self.in_flight > 0 {
            return Err(JournalError::Busy);
        }
        let result = match self.media.take_fault(JournalOpcode::Initialize) {
            Some(e) => Err(e),
            None => {
                self.initialized = true;
                self.staged.clear();
                Ok(self.current_info())
            }
        };
        self.complete(result, JournalCompletion::Initialized)
    }

    fn info(&self) -> Result<JournalInfo, JournalError> {
        if !self.initialized {
            return Err(JournalError::NotInitialized);
        }
        Ok(self.current_info())
    }

    fn read(&mut self, len: usize) -> JournalResult<Bytes> {
        self.check_ready()?;
        let result = match self.media.take_fault(JournalOpcode::Read) {
            Some(e) => Err(e),
            None => match self.media.committed() {
                Some(blob) if !blob.is_empty() => Ok(blob.slice(..len.min(blob.len()))),
                _ => Err(JournalError::Empty),
            },
        };
        self.complete(result, JournalCompletion::Read)
    }

    fn log(&mut self, data: &[u8]) -> JournalResult<usize> {
        self.check_ready()?;
        if !data.is_empty() && data.len() < self.program_unit {
            return Err(JournalError::SmallLogRequest);
        }
        let result = match self.media.take_fault(JournalOpcode::Log) {
            Some(e) => Err(e),
            None if self.staged.len() + data.len() > self.media.capacity() => {
                Err(JournalError::NoSpace)
            }
            None => {
                self.staged.extend_from_slice(data);
                Ok(data.len())
            }
        };
        self.complete(result, JournalCompletion::Logged)
    }

    fn commit(&mut self) -> JournalResult<usize> {
        self.check_ready()?;
        let result = match self.media.take_fault(JournalOpcode::Commit) {
            Some(e) => {
                self.staged.clear();
                Err(e)
            }
            None => {
                let blob = self.staged.split().freeze();
                let size = blob.len();
                let mut state = self.media.inner.lock();
                state.committed = Some(blob);
                state.commits += 1;
                Ok(size)
            }
        };
        self.complete(result, JournalCompletion::Committed)
    }

    fn reset(&mut self) -> JournalResult<()> {
        self.check_ready()?;
        let result = match self.media.take_fault(JournalOpcode::Reset) {
            Some(e) => Err(e),
            None => {
                self.staged.clear();
                self.media.inner.lock().committed = Some(Bytes::new());
                Ok(())
            }
        };
        self.complete(result, JournalCompletion::Reset)
    }

    fn poll_completion(&mut self) -> Option<JournalCompletion> {
        let completion = self.rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(completion)
    }
}
