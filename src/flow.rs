//! Example flow
//!
//! A scripted client that walks one key through its whole life:
//!
//! ```text
//! init ─► create ─► write ─► close ─► flush ─► open ─► read ─► rseek ─► read
//!   ─► close ─► find ─► get name ─► get len ─► delete ─► find (miss) ─► flush
//!   ─► uninit
//! ```
//!
//! Each step is a "doing" state paired with a "done" state. On entering a
//! doing state the flow calls the store. A result that is already complete
//! moves straight to the done state; a pending one waits for its completion
//! (pumping [`Cfstore::process_events`]) first. The same script therefore
//! runs unchanged over synchronous and asynchronous journals.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::{Callback, Cfstore, ClientContext, Completion, Opcode, Outcome};
use crate::error::{CfstoreError, JournalError, Result};
use crate::handle::Handle;
use crate::record::{KeyDescriptor, KeyFlags};

/// Key the flow creates
pub const FLOW_KEY: &str = "cfstore.example.flow{0}@key";

/// Find query that matches [`FLOW_KEY`]
pub const FLOW_QUERY: &str = "cfstore.example.*";

/// Value written to [`FLOW_KEY`]
pub const FLOW_VALUE: &[u8] = b"configuration store example value";

/// Where the second Read starts
pub const FLOW_SEEK_OFFSET: usize = 14;

const FLOW_CONTEXT: ClientContext = ClientContext(0xCF57);

/// One state per logical step, doing and done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Initializing,
    InitDone,
    Creating,
    CreateDone,
    Writing,
    WriteDone,
    Closing,
    CloseDone,
    Flushing,
    FlushDone,
    Opening,
    OpenDone,
    Reading,
    ReadDone,
    Seeking,
    SeekDone,
    Finding,
    FindDone,
    GettingName,
    GetNameDone,
    GettingLen,
    GetLenDone,
    Deleting,
    DeleteDone,
    Uninitializing,
    UninitDone,
}

impl FlowState {
    /// The done state paired with a doing state
    pub fn done(self) -> FlowState {
        match self {
            FlowState::Initializing => FlowState::InitDone,
            FlowState::Creating => FlowState::CreateDone,
            FlowState::Writing => FlowState::WriteDone,
            FlowState::Closing => FlowState::CloseDone,
            FlowState::Flushing => FlowState::FlushDone,
            FlowState::Opening => FlowState::OpenDone,
            FlowState::Reading => FlowState::ReadDone,
            FlowState::Seeking => FlowState::SeekDone,
            FlowState::Finding => FlowState::FindDone,
            FlowState::GettingName => FlowState::GetNameDone,
            FlowState::GettingLen => FlowState::GetLenDone,
            FlowState::Deleting => FlowState::DeleteDone,
            FlowState::Uninitializing => FlowState::UninitDone,
            done => done,
        }
    }

    fn opcode(self) -> Opcode {
        match self {
            FlowState::Initializing | FlowState::InitDone => Opcode::Initialize,
            FlowState::Creating | FlowState::CreateDone => Opcode::Create,
            FlowState::Writing | FlowState::WriteDone => Opcode::Write,
            FlowState::Closing | FlowState::CloseDone => Opcode::Close,
            FlowState::Flushing | FlowState::FlushDone => Opcode::Flush,
            FlowState::Opening | FlowState::OpenDone => Opcode::Open,
            FlowState::Reading | FlowState::ReadDone => Opcode::Read,
            FlowState::Seeking | FlowState::SeekDone => Opcode::Rseek,
            FlowState::Finding | FlowState::FindDone => Opcode::Find,
            FlowState::GettingName | FlowState::GetNameDone => Opcode::GetKeyName,
            FlowState::GettingLen | FlowState::GetLenDone => Opcode::GetValueLen,
            FlowState::Deleting | FlowState::DeleteDone => Opcode::Delete,
            FlowState::Uninitializing | FlowState::UninitDone => Opcode::Uninitialize,
        }
    }
}

/// The doing states in script order
const SCRIPT: &[FlowState] = &[
    FlowState::Initializing,
    FlowState::Creating,
    FlowState::Writing,
    FlowState::Closing,
    FlowState::Flushing,
    FlowState::Opening,
    FlowState::Reading,
    FlowState::Seeking,
    FlowState::Reading,
    FlowState::Closing,
    FlowState::Finding,
    FlowState::GettingName,
    FlowState::GettingLen,
    FlowState::Deleting,
    FlowState::Finding,
    FlowState::Flushing,
    FlowState::Uninitializing,
];

/// What a finished run observed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowReport {
    /// Every state entered, in order
    pub transitions: Vec<FlowState>,
    /// Bytes returned by the first (full) Read
    pub value_read: Vec<u8>,
    /// Bytes returned by the Read after the seek
    pub tail_read: Vec<u8>,
    /// Name reported by GetKeyName, terminator stripped
    pub key_name: String,
    /// Length reported by GetValueLen
    pub value_len: usize,
    /// Completions that arrived through the callback
    pub callbacks: usize,
}

/// Runs the scripted flow against one store
pub struct ExampleFlow {
    store: Cfstore,
    completions: Rc<RefCell<VecDeque<Completion>>>,
    handle: Option<Handle>,
    /// Index of the next Find in the script
    finds: usize,
    report: FlowReport,
}

impl ExampleFlow {
    /// Wrap an uninitialized store
    pub fn new(store: Cfstore) -> Self {
        Self {
            store,
            completions: Rc::new(RefCell::new(VecDeque::new())),
            handle: None,
            finds: 0,
            report: FlowReport::default(),
        }
    }

    /// Run the whole script; the first unexpected error stops it
    pub fn run(mut self) -> Result<(FlowReport, Cfstore)> {
        for &doing in SCRIPT {
            self.enter(doing);
            self.step(doing)?;
            self.enter(doing.done());
        }
        Ok((self.report, self.store))
    }

    fn enter(&mut self, state: FlowState) {
        tracing::debug!(?state, "flow transition");
        self.report.transitions.push(state);
    }

    fn step(&mut self, doing: FlowState) -> Result<()> {
        match doing {
            FlowState::Initializing => {
                let queue = Rc::clone(&self.completions);
                let callback: Callback = Box::new(move |c: Completion| queue.borrow_mut().push_back(c));
                let outcome = self.store.initialize(Some(callback), FLOW_CONTEXT)?;
                self.settle(doing, outcome)?;
            }
            FlowState::Creating => {
                let descriptor = KeyDescriptor::new();
                let outcome = self.store.create(FLOW_KEY, FLOW_VALUE.len(), Some(&descriptor))?;
                let (_, handle) = self.settle(doing, outcome)?;
                self.handle = handle;
            }
            FlowState::Writing => {
                let handle = self.current()?;
                let outcome = self.store.write(handle, FLOW_VALUE)?;
                self.settle(doing, outcome)?;
            }
            FlowState::Closing => {
                let handle = self.current()?;
                let outcome = self.store.close(handle)?;
                self.settle(doing, outcome)?;
                self.handle = None;
            }
            FlowState::Flushing => {
                let outcome = self.store.flush()?;
                self.settle(doing, outcome)?;
            }
            FlowState::Opening => {
                let outcome = self.store.open(FLOW_KEY, KeyFlags::read_only())?;
                let (_, handle) = self.settle(doing, outcome)?;
                self.handle = handle;
            }
            FlowState::Reading => {
                let handle = self.current()?;
                let mut buf = vec![0u8; FLOW_VALUE.len()];
                let outcome = self.store.read(handle, &mut buf)?;
                let (count, _) = self.settle(doing, outcome)?;
                buf.truncate(count);
                if self.report.value_read.is_empty() {
                    self.report.value_read = buf;
                } else {
                    self.report.tail_read = buf;
                }
            }
            FlowState::Seeking => {
                let handle = self.current()?;
                let outcome = self.store.rseek(handle, FLOW_SEEK_OFFSET)?;
                self.settle(doing, outcome)?;
            }
            FlowState::Finding => {
                self.finds += 1;
                let prev = self.handle.take();
                match self.store.find(FLOW_QUERY, prev) {
                    Ok(outcome) => {
                        let (_, handle) = self.settle(doing, outcome)?;
                        self.handle = handle;
                    }
                    // The key was deleted, so the second walk comes up empty
                    Err(e) if e.is_not_found() && self.finds > 1 => {
                        tracing::debug!("find exhausted");
                    }
                    Err(e) => return Err(e),
                }
            }
            FlowState::GettingName => {
                let handle = self.current()?;
                let mut buf = [0u8; 256];
                let outcome = self.store.get_key_name(handle, &mut buf)?;
                let (len, _) = self.settle(doing, outcome)?;
                let name = &buf[..len.saturating_sub(1)];
                self.report.key_name = String::from_utf8_lossy(name).into_owned();
            }
            FlowState::GettingLen => {
                let handle = self.current()?;
                let outcome = self.store.get_value_len(handle)?;
                let (len, _) = self.settle(doing, outcome)?;
                self.report.value_len = len;
            }
            FlowState::Deleting => {
                let handle = self.current()?;
                let outcome = self.store.delete(handle)?;
                self.settle(doing, outcome)?;
            }
            FlowState::Uninitializing => {
                let outcome = self.store.uninitialize()?;
                self.settle(doing, outcome)?;
            }
            done => {
                tracing::warn!(state = ?done, "done state in script");
            }
        }
        Ok(())
    }

    /// Resolve an outcome: complete now, or wait for its callback
    fn settle(&mut self, doing: FlowState, outcome: Outcome) -> Result<(usize, Option<Handle>)> {
        if let Outcome::Complete { value, handle } = outcome {
            return Ok((value, handle));
        }

        loop {
            let delivered = self.store.process_events();
            let next = self.completions.borrow_mut().pop_front();
            if let Some(completion) = next {
                self.report.callbacks += 1;
                if completion.opcode != doing.opcode() {
                    tracing::warn!(
                        expected = ?doing.opcode(),
                        got = ?completion.opcode,
                        "completion for the wrong operation"
                    );
                    return Err(CfstoreError::Busy);
                }
                let value = completion.status?;
                return Ok((value, completion.handle.or(self.handle)));
            }
            if delivered == 0 {
                // Nothing left to pump; the journal never answered
                return Err(CfstoreError::Journal(JournalError::Timeout));
            }
        }
    }

    fn current(&self) -> Result<Handle> {
        self.handle.ok_or(CfstoreError::InvalidHandle)
    }
}
