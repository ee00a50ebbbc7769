//! Journal-backed operation state machine
//!
//! Initialize, Flush and a flushing Close talk to the journal. Each of them is
//! a short chain of journal calls; every call may finish at once (fall
//! through to the next step) or suspend until its completion arrives.
//!
//! ```text
//! Initialize:  Initialize ─► [Reset] ─► [Read] ─► done
//! Flush/Close: Log ─► Commit ─► done
//! ```

use std::task::Poll;

use bytes::Bytes;

use crate::directory::{Directory, EntryId};
use crate::error::{CfstoreError, JournalError, Result};
use crate::handle::Handle;
use crate::journal::{Journal, JournalCompletion, JournalInfo, JournalResult};

use super::{Cfstore, Lifecycle, Opcode};

/// Next journal call of a suspended operation
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Initialize,
    Reset,
    Read { len: usize },
    Log { area: Bytes, reclaim: Vec<EntryId> },
    Commit { reclaim: Vec<EntryId> },
}

/// An accepted journal-backed operation
#[derive(Debug)]
pub(crate) struct PendingOp {
    pub opcode: Opcode,
    pub handle: Option<Handle>,
    pub step: Step,
}

/// Where `drive` left an operation
pub(crate) enum Progress {
    Done(Result<usize>),
    Suspended(PendingOp),
}

enum Next {
    Step(Step),
    Finish(usize),
}

impl Cfstore {
    /// Run `op` until it finishes or a journal call suspends.
    ///
    /// `resumed` is the completion of the call `op.step` was waiting on.
    pub(crate) fn drive(
        &mut self,
        mut op: PendingOp,
        mut resumed: Option<JournalCompletion>,
    ) -> Progress {
        loop {
            let next = match op.step.clone() {
                Step::Initialize => {
                    match self.issue(resumed.take(), |j| j.initialize(), |c| match c {
                        JournalCompletion::Initialized(r) => Some(r),
                        _ => None,
                    }) {
                        Ok(Poll::Ready(info)) => self.after_journal_init(info),
                        Ok(Poll::Pending) => return Progress::Suspended(op),
                        Err(e) => Err(e),
                    }
                }
                Step::Reset => {
                    match self.issue(resumed.take(), |j| j.reset(), |c| match c {
                        JournalCompletion::Reset(r) => Some(r),
                        _ => None,
                    }) {
                        Ok(Poll::Ready(())) => {
                            tracing::info!("journal formatted");
                            Ok(Next::Finish(self.finish_init(Directory::new())))
                        }
                        Ok(Poll::Pending) => return Progress::Suspended(op),
                        Err(e) => Err(e),
                    }
                }
                Step::Read { len } => {
                    match self.issue(resumed.take(), move |j| j.read(len), |c| match c {
                        JournalCompletion::Read(r) => Some(r),
                        _ => None,
                    }) {
                        Ok(Poll::Ready(area)) => Directory::scan(&area, self.config.program_unit)
                            .map(|directory| Next::Finish(self.finish_init(directory))),
                        Ok(Poll::Pending) => return Progress::Suspended(op),
                        Err(e) => Err(e),
                    }
                }
                Step::Log { area, reclaim } => {
                    if area.is_empty() && resumed.is_none() {
                        Ok(Next::Step(Step::Commit { reclaim }))
                    } else {
                        match self.issue(resumed.take(), |j| j.log(&area), |c| match c {
                            JournalCompletion::Logged(r) => Some(r),
                            _ => None,
                        }) {
                            Ok(Poll::Ready(_)) => Ok(Next::Step(Step::Commit { reclaim })),
                            Ok(Poll::Pending) => return Progress::Suspended(op),
                            Err(e) => Err(e),
                        }
                    }
                }
                Step::Commit { reclaim } => {
                    match self.issue(resumed.take(), |j| j.commit(), |c| match c {
                        JournalCompletion::Committed(r) => Some(r),
                        _ => None,
                    }) {
                        Ok(Poll::Ready(size)) => {
                            let dropped = self.directory.reclaim(&reclaim);
                            tracing::info!(
                                bytes = size,
                                records = self.directory.len(),
                                reclaimed = dropped,
                                "area committed"
                            );
                            Ok(Next::Finish(size))
                        }
                        Ok(Poll::Pending) => return Progress::Suspended(op),
                        Err(e) => Err(e),
                    }
                }
            };

            match next {
                Ok(Next::Step(step)) => op.step = step,
                Ok(Next::Finish(value)) => return Progress::Done(Ok(value)),
                Err(e) => {
                    tracing::warn!(opcode = ?op.opcode, error = %e, "journal operation failed");
                    if op.opcode == Opcode::Initialize {
                        self.lifecycle = Lifecycle::Uninitialized;
                        self.init_refs = 0;
                    }
                    return Progress::Done(Err(e));
                }
            }
        }
    }

    /// Either consume the completion we were waiting for or make the call
    fn issue<T>(
        &mut self,
        resumed: Option<JournalCompletion>,
        call: impl FnOnce(&mut dyn Journal) -> JournalResult<T>,
        extract: fn(JournalCompletion) -> Option<std::result::Result<T, JournalError>>,
    ) -> Result<Poll<T>> {
        match resumed {
            Some(completion) => {
                let opcode = completion.opcode();
                match extract(completion) {
                    Some(result) => Ok(Poll::Ready(result?)),
                    None => Err(CfstoreError::Journal(JournalError::StorageIo(format!(
                        "unexpected {:?} completion",
                        opcode
                    )))),
                }
            }
            None => Ok(call(&mut *self.journal)?),
        }
    }

    /// First-run media needs a reset; an empty blob needs no read
    fn after_journal_init(&mut self, info: JournalInfo) -> Result<Next> {
        self.media_capacity = info.capacity;
        if !info.formatted {
            tracing::info!("journal not formatted, resetting");
            return Ok(Next::Step(Step::Reset));
        }
        if info.blob_size == 0 {
            return Ok(Next::Finish(self.finish_init(Directory::new())));
        }
        Ok(Next::Step(Step::Read {
            len: info.blob_size,
        }))
    }

    fn finish_init(&mut self, directory: Directory) -> usize {
        tracing::info!(records = directory.len(), "store initialized");
        self.directory = directory;
        self.lifecycle = Lifecycle::Ready;
        0
    }
}
