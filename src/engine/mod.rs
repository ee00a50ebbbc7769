//! Engine Module
//!
//! The operation dispatcher that coordinates all components.
//!
//! ## Responsibilities
//! - Validate every request against directory and handle state
//! - Apply key-value mutations to the in-memory area
//! - Turn Initialize/Flush into journal calls and resume them on completion
//! - Route every deferred result through the single client callback, in order
//!
//! ## Completion Contract
//! Every operation returns `Result<Outcome>`:
//! - `Err(e)`: failed on the spot, no callback follows
//! - `Ok(Outcome::Complete { .. })`: finished (synchronous journal)
//! - `Ok(Outcome::Pending)`: accepted (asynchronous journal); exactly one
//!   [`Completion`] follows when [`Cfstore::process_events`] runs
//!
//! Validation and state errors are always reported immediately.

mod completion;
mod pending;

use std::collections::VecDeque;

use crate::config::Config;
use crate::directory::{Directory, Pattern};
use crate::error::{CfstoreError, Result};
use crate::handle::{Handle, HandleState, HandleTable, OpenMode};
use crate::journal::{Journal, JournalCapabilities};
use crate::record::{
    encode_area, encoded_len, KeyDescriptor, KeyFlags, KeyName, KeyRecord, MAX_VALUE_SIZE,
};

pub use completion::{
    Callback, Capabilities, ClientContext, Completion, Opcode, Outcome, PowerState, Status,
};

use pending::{PendingOp, Progress, Step};

/// Where the store is in its init/teardown lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
}

/// Work accepted but not yet reported to the client
enum Deferred {
    /// Result known, waiting for its turn
    Ready(Completion),
    /// Waiting on the journal
    Journal(PendingOp),
}

/// The configuration store
///
/// ## Concurrency Model: single-threaded, callback driven
///
/// - Operations mutate the in-memory area immediately
/// - At most one journal-backed operation (Initialize, Flush, flushing Close)
///   is outstanding at a time; another one gets `Busy`
/// - Deferred results sit in one FIFO queue, so completions are delivered in
///   the order the operations were issued
pub struct Cfstore {
    /// Store configuration
    config: Config,

    /// Durable backing store
    journal: Box<dyn Journal>,

    /// Cached journal capabilities (async mode is a journal property)
    caps: JournalCapabilities,

    /// Largest blob the media accepts, learned at initialize
    media_capacity: usize,

    lifecycle: Lifecycle,

    /// Initialize calls not yet matched by Uninitialize
    init_refs: u32,

    callback: Option<Callback>,
    context: ClientContext,

    /// In-memory index of the area
    directory: Directory,

    /// Open handles
    handles: HandleTable,

    /// Deferred results, oldest first
    queue: VecDeque<Deferred>,

    power: PowerState,

    /// Latched by a failed completion, cleared by a successful one
    error: bool,
}

impl Cfstore {
    /// Build a store over `journal`. Nothing touches the media until
    /// [`Cfstore::initialize`].
    pub fn new(config: Config, journal: Box<dyn Journal>) -> Result<Self> {
        config.validate()?;

        let caps = journal.capabilities();
        if caps.program_unit == 0 || config.program_unit % caps.program_unit != 0 {
            return Err(CfstoreError::Config(format!(
                "program unit {} is not a multiple of the media program unit {}",
                config.program_unit, caps.program_unit
            )));
        }

        let handles = HandleTable::new(config.max_open_handles);
        let media_capacity = config.max_area_size;

        Ok(Self {
            config,
            journal,
            caps,
            media_capacity,
            lifecycle: Lifecycle::Uninitialized,
            init_refs: 0,
            callback: None,
            context: ClientContext::default(),
            directory: Directory::new(),
            handles,
            queue: VecDeque::new(),
            power: PowerState::default(),
            error: false,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bring the store up: initialize the journal (resetting it on first run)
    /// and rebuild the directory from the committed area.
    ///
    /// Calling it again on an initialized store only bumps a reference count.
    pub fn initialize(
        &mut self,
        callback: Option<Callback>,
        context: ClientContext,
    ) -> Result<Outcome> {
        match self.lifecycle {
            Lifecycle::Ready => {
                self.init_refs += 1;
                tracing::debug!(refs = self.init_refs, "initialize: already initialized");
                return self.complete(Opcode::Initialize, 0, None);
            }
            Lifecycle::Initializing => return Err(CfstoreError::Busy),
            Lifecycle::Uninitialized => {}
        }

        self.callback = callback;
        self.context = context;
        self.lifecycle = Lifecycle::Initializing;
        self.init_refs = 1;
        self.error = false;

        tracing::debug!(asynchronous = self.caps.asynchronous_ops, "initialize");
        self.start_journal_op(Opcode::Initialize, None, Step::Initialize)
    }

    /// Undo one Initialize. The last one closes every handle and drops the
    /// in-memory area; anything not flushed is lost.
    pub fn uninitialize(&mut self) -> Result<Outcome> {
        self.ensure_ready()?;
        if self.journal_busy() {
            return Err(CfstoreError::Busy);
        }

        self.init_refs -= 1;
        if self.init_refs > 0 {
            tracing::debug!(refs = self.init_refs, "uninitialize: still referenced");
            return self.complete(Opcode::Uninitialize, 0, None);
        }

        let closed = self.handles.release_all();
        if !closed.is_empty() {
            tracing::warn!(handles = closed.len(), "uninitialize closed open handles");
        }
        self.directory = Directory::new();
        self.lifecycle = Lifecycle::Uninitialized;
        tracing::info!("store uninitialized");

        self.complete(Opcode::Uninitialize, 0, None)
    }

    /// Record the requested power state
    pub fn power_control(&mut self, state: PowerState) -> Result<Outcome> {
        tracing::debug!(?state, "power control");
        self.power = state;
        self.complete(Opcode::PowerControl, 0, None)
    }

    pub fn get_status(&self) -> Status {
        Status {
            in_progress: !self.queue.is_empty() || self.lifecycle == Lifecycle::Initializing,
            error: self.error,
        }
    }

    pub fn get_capabilities(&self) -> Capabilities {
        Capabilities {
            asynchronous_ops: self.caps.asynchronous_ops,
            uvisor_support_enabled: false,
        }
    }

    // =========================================================================
    // Key-Value Operations
    // =========================================================================

    /// Create a key, resize an existing one, or probe whether a create would
    /// succeed.
    ///
    /// - new key + descriptor: allocate `value_len` zeroed bytes
    /// - existing key + no descriptor: resize, keeping name, ACL, retention
    ///   and the value prefix
    /// - existing key + descriptor: `PreexistingKey`
    /// - descriptor with `storage_detect`: check only, no handle
    ///
    /// The returned handle is open read-write.
    pub fn create(
        &mut self,
        key_name: &str,
        value_len: usize,
        descriptor: Option<&KeyDescriptor>,
    ) -> Result<Outcome> {
        self.ensure_ready()?;
        let name = KeyName::parse(key_name)?;
        if value_len > MAX_VALUE_SIZE {
            return Err(CfstoreError::ValueSizeTooLarge {
                requested: value_len,
                max: MAX_VALUE_SIZE,
            });
        }

        let existing = self.directory.lookup_id(name.as_str());
        let pu = self.config.program_unit;

        match (existing, descriptor) {
            (Some(_), Some(_)) => Err(CfstoreError::PreexistingKey),
            (None, Some(desc)) if desc.flags.storage_detect() => {
                self.check_security(desc)?;
                self.check_space(encoded_len(name.len(), value_len, pu), 0)?;
                tracing::debug!(key = %name, value_len, "create: storage detect ok");
                self.complete(Opcode::Create, value_len, None)
            }
            (None, None) => Err(CfstoreError::InvalidKeyDescriptor(
                "a new key needs a descriptor".to_string(),
            )),
            (None, Some(desc)) => {
                self.check_security(desc)?;
                self.check_space(encoded_len(name.len(), value_len, pu), 0)?;

                let mut record = KeyRecord::new(name, value_len);
                record.acl = desc.acl;
                record.retention = desc.retention;
                record.flags = KeyFlags::empty()
                    .with(KeyFlags::LAZY_FLUSH, desc.flags.lazy_flush())
                    .with(KeyFlags::FLUSH_ON_CLOSE, desc.flags.flush_on_close());

                tracing::debug!(key = %record.name, value_len, "create");
                let id = self.directory.insert(record)?;
                let handle = match self.handles.allocate(id, OpenMode::ReadWrite) {
                    Ok(handle) => handle,
                    Err(e) => {
                        self.directory.remove(id);
                        return Err(e);
                    }
                };
                self.directory.acquire(id)?;
                self.complete(Opcode::Create, value_len, Some(handle))
            }
            (Some(id), None) => {
                let entry = self.directory.get(id).ok_or(CfstoreError::KeyNotFound)?;
                if !entry.record.acl.owner_write() {
                    return Err(CfstoreError::PermissionDenied(format!(
                        "{} is not writable",
                        name
                    )));
                }
                let current = entry.record.encoded_len(pu);
                self.check_space(encoded_len(name.len(), value_len, pu), current)?;

                let handle = self.handles.allocate(id, OpenMode::ReadWrite)?;
                if let Some(entry) = self.directory.get_mut(id) {
                    entry.record.value.resize(value_len, 0);
                }
                self.handles.clamp_cursors(id, value_len);
                self.directory.acquire(id)?;

                tracing::debug!(key = %name, value_len, "create: resized existing key");
                self.complete(Opcode::Create, value_len, Some(handle))
            }
        }
    }

    /// Open an existing key. No read/write flags means read-only.
    pub fn open(&mut self, key_name: &str, flags: KeyFlags) -> Result<Outcome> {
        self.ensure_ready()?;
        let name = KeyName::parse(key_name)?;
        let entry = self
            .directory
            .lookup(name.as_str())
            .ok_or(CfstoreError::KeyNotFound)?;

        let mode = match (flags.read(), flags.write()) {
            (_, false) => OpenMode::ReadOnly,
            (false, true) => OpenMode::WriteOnly,
            (true, true) => OpenMode::ReadWrite,
        };
        if mode.can_write() && !entry.record.acl.owner_write() {
            return Err(CfstoreError::PermissionDenied(format!(
                "{} is not writable",
                name
            )));
        }
        if mode.can_read() && !entry.record.acl.owner_read() {
            return Err(CfstoreError::PermissionDenied(format!(
                "{} is not readable",
                name
            )));
        }

        let (id, value_len) = (entry.id, entry.record.value.len());
        let handle = self.handles.allocate(id, mode)?;
        self.directory.acquire(id)?;

        tracing::debug!(key = %name, ?mode, "open");
        self.complete(Opcode::Open, value_len, Some(handle))
    }

    /// Read from the handle's read cursor into `buf`; returns bytes read
    pub fn read(&mut self, handle: Handle, buf: &mut [u8]) -> Result<Outcome> {
        self.ensure_ready()?;
        let slot = self.handles.enter(handle, HandleState::Reading)?;

        let result = match self.directory.get(slot.entry) {
            _ if !slot.mode.can_read() => Err(CfstoreError::PermissionDenied(
                "handle was opened write-only".to_string(),
            )),
            None => Err(CfstoreError::InvalidHandle),
            Some(entry) => {
                let value = &entry.record.value;
                let start = slot.read_cursor.min(value.len());
                let count = buf.len().min(value.len() - start);
                buf[..count].copy_from_slice(&value[start..start + count]);
                slot.read_cursor = start + count;
                Ok(count)
            }
        };
        self.handles.leave(handle);

        let count = result?;
        self.complete(Opcode::Read, count, Some(handle))
    }

    /// Append `data` at the handle's write cursor; returns bytes written.
    ///
    /// Writes are sequential and never partial: a write that would run past
    /// the value's capacity fails as a whole.
    pub fn write(&mut self, handle: Handle, data: &[u8]) -> Result<Outcome> {
        self.ensure_ready()?;
        if data.is_empty() {
            return Err(CfstoreError::InvalidWriteBuffer);
        }
        let slot = self.handles.enter(handle, HandleState::Writing)?;

        let result = match self.directory.get_mut(slot.entry) {
            _ if !slot.mode.can_write() => Err(CfstoreError::KeyReadOnly),
            None => Err(CfstoreError::InvalidHandle),
            Some(entry) => {
                let value = &mut entry.record.value;
                let end = slot.write_cursor + data.len();
                if end > value.len() {
                    Err(CfstoreError::ValueSizeTooLarge {
                        requested: end,
                        max: value.len(),
                    })
                } else {
                    value[slot.write_cursor..end].copy_from_slice(data);
                    slot.write_cursor = end;
                    slot.dirty = true;
                    Ok(data.len())
                }
            }
        };
        self.handles.leave(handle);

        let count = result?;
        self.complete(Opcode::Write, count, Some(handle))
    }

    /// Move the read cursor. Only read-only handles may seek.
    pub fn rseek(&mut self, handle: Handle, offset: usize) -> Result<Outcome> {
        self.ensure_ready()?;
        let slot = self.handles.enter(handle, HandleState::Seeking)?;

        let result = match self.directory.get(slot.entry) {
            _ if !slot.mode.is_read_only() => Err(CfstoreError::InvalidSeek),
            None => Err(CfstoreError::InvalidHandle),
            Some(entry) if offset > entry.record.value.len() => Err(CfstoreError::InvalidSeek),
            Some(_) => {
                slot.read_cursor = offset;
                Ok(offset)
            }
        };
        self.handles.leave(handle);

        let offset = result?;
        self.complete(Opcode::Rseek, offset, Some(handle))
    }

    /// Close a handle. If it wrote to a key created with `flush_on_close`,
    /// the close also flushes the area.
    pub fn close(&mut self, handle: Handle) -> Result<Outcome> {
        self.ensure_ready()?;
        let flush = self.flushes_on_close(handle)?;
        if flush && self.journal_busy() {
            return Err(CfstoreError::Busy);
        }

        let slot = self.handles.release(handle)?;
        self.directory.release(slot.entry);

        if flush {
            tracing::debug!("close: flush on close");
            let step = self.flush_step();
            return self.start_journal_op(Opcode::Close, Some(handle), step);
        }
        self.complete(Opcode::Close, 0, Some(handle))
    }

    /// Delete the key behind `handle`.
    ///
    /// The key disappears from Find/Open at once; its bytes leave the media
    /// at the next Flush. The handle stays open until closed.
    pub fn delete(&mut self, handle: Handle) -> Result<Outcome> {
        self.ensure_ready()?;
        let slot = self.handles.get(handle)?;
        let entry = self
            .directory
            .get(slot.entry)
            .ok_or(CfstoreError::InvalidHandle)?;
        if entry.record.deleting {
            return Err(CfstoreError::KeyNotFound);
        }
        if !entry.record.acl.owner_write() {
            return Err(CfstoreError::PermissionDenied(format!(
                "{} is not deletable",
                entry.record.name
            )));
        }

        let id = entry.id;
        tracing::debug!(key = %entry.record.name, "delete");
        self.directory.mark_deleting(id)?;
        self.complete(Opcode::Delete, 0, Some(handle))
    }

    /// Find the next key matching `query` after `prev`.
    ///
    /// `prev` is consumed (closed) whether or not a match is found, so the
    /// usual walk is `prev = Some(next)` until `KeyNotFound`. The returned
    /// handle is read-only.
    ///
    /// A `prev` whose close would flush (dirty, `flush_on_close`) is refused
    /// and left open; close it explicitly instead.
    pub fn find(&mut self, query: &str, prev: Option<Handle>) -> Result<Outcome> {
        self.ensure_ready()?;
        let pattern = Pattern::parse(query)?;

        let after = match prev {
            Some(prev) => {
                if self.flushes_on_close(prev)? {
                    return Err(CfstoreError::PermissionDenied(
                        "prev has unflushed writes to a flush-on-close key".to_string(),
                    ));
                }
                Some(self.handles.get(prev)?.entry)
            }
            None => None,
        };
        let found = self
            .directory
            .find(&pattern, after)
            .map(|e| (e.id, e.record.value.len()));

        if let Some(prev) = prev {
            let slot = self.handles.release(prev)?;
            self.directory.release(slot.entry);
        }

        let (id, value_len) = found.ok_or(CfstoreError::KeyNotFound)?;
        let handle = self.handles.allocate(id, OpenMode::FoundReadOnly)?;
        self.directory.acquire(id)?;
        self.complete(Opcode::Find, value_len, Some(handle))
    }

    /// Persist the area: log every live record, then commit.
    /// Keys deleted before the flush are dropped from the media.
    pub fn flush(&mut self) -> Result<Outcome> {
        self.ensure_ready()?;
        if self.journal_busy() {
            return Err(CfstoreError::Busy);
        }
        tracing::debug!(records = self.directory.len(), "flush");
        let step = self.flush_step();
        self.start_journal_op(Opcode::Flush, None, step)
    }

    /// Copy the key name plus a NUL terminator into `buf`; the value is the
    /// number of bytes copied.
    pub fn get_key_name(&mut self, handle: Handle, buf: &mut [u8]) -> Result<Outcome> {
        self.ensure_ready()?;
        let slot = self.handles.get(handle)?;
        let entry = self
            .directory
            .get(slot.entry)
            .ok_or(CfstoreError::InvalidHandle)?;

        let name = entry.record.name.as_bytes();
        let needed = name.len() + 1;
        if buf.len() < needed {
            return Err(CfstoreError::BufferTooSmall {
                needed,
                got: buf.len(),
            });
        }
        buf[..name.len()].copy_from_slice(name);
        buf[name.len()] = 0;

        self.complete(Opcode::GetKeyName, needed, Some(handle))
    }

    /// Value capacity of the key behind `handle`
    pub fn get_value_len(&mut self, handle: Handle) -> Result<Outcome> {
        self.ensure_ready()?;
        let slot = self.handles.get(handle)?;
        let value_len = self
            .directory
            .get(slot.entry)
            .ok_or(CfstoreError::InvalidHandle)?
            .record
            .value
            .len();
        self.complete(Opcode::GetValueLen, value_len, Some(handle))
    }

    // =========================================================================
    // Completion Routing
    // =========================================================================

    /// Deliver deferred completions to the callback, oldest first, resuming
    /// journal-backed operations as their journal calls complete.
    ///
    /// Stops at the first operation still waiting on the journal. Returns
    /// the number of completions delivered.
    pub fn process_events(&mut self) -> usize {
        let mut delivered = 0;

        loop {
            let waiting_on_journal = match self.queue.front() {
                None => break,
                Some(deferred) => matches!(deferred, Deferred::Journal(_)),
            };

            if !waiting_on_journal {
                if let Some(Deferred::Ready(completion)) = self.queue.pop_front() {
                    self.notify(completion);
                    delivered += 1;
                }
                continue;
            }

            let Some(journal_completion) = self.journal.poll_completion() else {
                break;
            };
            let Some(Deferred::Journal(op)) = self.queue.pop_front() else {
                break;
            };
            let (opcode, handle) = (op.opcode, op.handle);

            match self.drive(op, Some(journal_completion)) {
                Progress::Done(status) => {
                    let completion = Completion {
                        status,
                        opcode,
                        context: self.context,
                        handle,
                    };
                    self.notify(completion);
                    delivered += 1;
                }
                Progress::Suspended(op) => self.queue.push_front(Deferred::Journal(op)),
            }
        }

        delivered
    }

    /// Finish an operation whose result is already known
    fn complete(
        &mut self,
        opcode: Opcode,
        value: usize,
        handle: Option<Handle>,
    ) -> Result<Outcome> {
        if !self.caps.asynchronous_ops {
            self.error = false;
            return Ok(Outcome::Complete { value, handle });
        }
        self.queue.push_back(Deferred::Ready(Completion {
            status: Ok(value),
            opcode,
            context: self.context,
            handle,
        }));
        Ok(Outcome::Pending)
    }

    /// Start a journal-backed operation and run it as far as it goes
    fn start_journal_op(
        &mut self,
        opcode: Opcode,
        handle: Option<Handle>,
        step: Step,
    ) -> Result<Outcome> {
        let op = PendingOp {
            opcode,
            handle,
            step,
        };
        match self.drive(op, None) {
            Progress::Done(Ok(value)) => self.complete(opcode, value, handle),
            Progress::Done(Err(e)) => {
                self.error = true;
                Err(e)
            }
            Progress::Suspended(op) => {
                self.queue.push_back(Deferred::Journal(op));
                Ok(Outcome::Pending)
            }
        }
    }

    fn notify(&mut self, completion: Completion) {
        self.error = completion.status.is_err();
        tracing::trace!(opcode = ?completion.opcode, ok = !self.error, "completion");
        if let Some(callback) = self.callback.as_mut() {
            callback(completion);
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_ready(&self) -> Result<()> {
        if self.lifecycle == Lifecycle::Ready {
            Ok(())
        } else {
            Err(CfstoreError::NotInitialized)
        }
    }

    fn journal_busy(&self) -> bool {
        self.queue.iter().any(|d| matches!(d, Deferred::Journal(_)))
    }

    /// True if closing `handle` must flush: it wrote to a live
    /// `flush_on_close` key
    fn flushes_on_close(&self, handle: Handle) -> Result<bool> {
        let slot = self.handles.get(handle)?;
        Ok(slot.dirty
            && self
                .directory
                .get(slot.entry)
                .map_or(false, |e| !e.record.deleting && e.record.flags.flush_on_close()))
    }

    /// Snapshot the live area for a flush
    fn flush_step(&self) -> Step {
        Step::Log {
            area: encode_area(self.directory.live_records(), self.config.program_unit),
            reclaim: self.directory.deleting_ids(),
        }
    }

    /// Would the area still fit with a record of `new_len` replacing one of
    /// `old_len` encoded bytes?
    fn check_space(&self, new_len: usize, old_len: usize) -> Result<()> {
        let capacity = self.config.max_area_size.min(self.media_capacity);
        let needed = self.directory.area_size(self.config.program_unit) - old_len + new_len;
        if needed > capacity {
            return Err(CfstoreError::NoSpace { needed, capacity });
        }
        Ok(())
    }

    /// The media must offer every security feature the key asks for
    fn check_security(&self, desc: &KeyDescriptor) -> Result<()> {
        if !self.caps.security.contains(desc.security) {
            return Err(CfstoreError::InvalidKeyDescriptor(format!(
                "media lacks requested security features {:#04x}",
                desc.security.bits()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.directory.len()
    }

    /// Number of open handles
    pub fn open_handles(&self) -> usize {
        self.handles.open_count()
    }

    pub fn power_state(&self) -> PowerState {
        self.power
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
