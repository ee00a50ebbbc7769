//! Tests for the Cfstore engine over an asynchronous journal
//!
//! These tests verify:
//! - Accepted operations return Pending and complete through the callback
//! - Completions arrive in issue order, each exactly once
//! - Validation errors are still reported immediately
//! - Journal-backed operations are serialized (Busy)
//! - Journal failures arrive in the completion status

use std::cell::RefCell;
use std::rc::Rc;

use cfstore::config::Config;
use cfstore::engine::{Callback, Cfstore, ClientContext, Completion, Opcode, Outcome};
use cfstore::error::{CfstoreError, JournalError};
use cfstore::handle::Handle;
use cfstore::journal::{JournalOpcode, MemoryJournal, MemoryMedia};
use cfstore::record::{KeyDescriptor, KeyFlags};

const CONTEXT: ClientContext = ClientContext(42);

type CompletionLog = Rc<RefCell<Vec<Completion>>>;

// =============================================================================
// Helper Functions
// =============================================================================

fn new_async_store(media: &MemoryMedia) -> (Cfstore, CompletionLog) {
    let journal = MemoryJournal::new_async(media.clone(), 8);
    let store = Cfstore::new(Config::default(), Box::new(journal)).unwrap();
    (store, Rc::new(RefCell::new(Vec::new())))
}

fn callback(log: &CompletionLog) -> Callback {
    let log = Rc::clone(log);
    Box::new(move |c: Completion| log.borrow_mut().push(c))
}

fn open_async(media: &MemoryMedia) -> (Cfstore, CompletionLog) {
    let (mut store, log) = new_async_store(media);
    let outcome = store.initialize(Some(callback(&log)), CONTEXT).unwrap();
    assert!(outcome.is_pending());
    assert_eq!(store.process_events(), 1);

    let init = log.borrow_mut().remove(0);
    assert_eq!(init.opcode, Opcode::Initialize);
    assert!(init.status.is_ok());
    (store, log)
}

fn setup_async() -> (MemoryMedia, Cfstore, CompletionLog) {
    let media = MemoryMedia::new(64 * 1024);
    let (store, log) = open_async(&media);
    (media, store, log)
}

/// Deliver everything outstanding and hand back what arrived
fn pump(store: &mut Cfstore, log: &CompletionLog) -> Vec<Completion> {
    store.process_events();
    log.borrow_mut().drain(..).collect()
}

fn created_handle(store: &mut Cfstore, log: &CompletionLog, key: &str, len: usize) -> Handle {
    assert!(store.create(key, len, Some(&KeyDescriptor::new())).unwrap().is_pending());
    let done = pump(store, log);
    assert_eq!(done.len(), 1);
    done[0].handle.unwrap()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_initialize_completes_through_callback() {
    let media = MemoryMedia::new(1024);
    let (mut store, log) = new_async_store(&media);

    assert_eq!(store.initialize(Some(callback(&log)), CONTEXT).unwrap(), Outcome::Pending);
    assert!(!store.is_initialized());
    assert!(store.get_status().in_progress);

    assert_eq!(store.process_events(), 1);
    let done = log.borrow();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].opcode, Opcode::Initialize);
    assert_eq!(done[0].context, CONTEXT);
    assert!(done[0].handle.is_none());
    assert!(store.is_initialized());
    assert!(!store.get_status().in_progress);
}

#[test]
fn test_initialize_while_initializing_is_busy() {
    let media = MemoryMedia::new(1024);
    let (mut store, log) = new_async_store(&media);

    store.initialize(Some(callback(&log)), CONTEXT).unwrap();
    assert!(matches!(
        store.initialize(None, CONTEXT),
        Err(CfstoreError::Busy)
    ));
    assert!(matches!(
        store.create("early", 1, Some(&KeyDescriptor::new())),
        Err(CfstoreError::NotInitialized)
    ));
}

#[test]
fn test_initialize_failure_arrives_in_completion() {
    let media = MemoryMedia::new(1024);
    media.inject_fault_on(JournalOpcode::Initialize, JournalError::Timeout);
    let (mut store, log) = new_async_store(&media);

    assert!(store.initialize(Some(callback(&log)), CONTEXT).unwrap().is_pending());
    let done = pump(&mut store, &log);

    assert_eq!(done.len(), 1);
    assert!(matches!(
        done[0].status,
        Err(CfstoreError::Journal(JournalError::Timeout))
    ));
    assert!(!store.is_initialized());
    assert!(store.get_status().error);
}

#[test]
fn test_capabilities_report_async() {
    let (_media, store, _log) = setup_async();
    assert!(store.get_capabilities().asynchronous_ops);
}

// =============================================================================
// Completion Ordering Tests
// =============================================================================

#[test]
fn test_memory_operations_pend_until_processed() {
    let (_media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "a.b.c", 5);

    assert!(store.write(h, b"hello").unwrap().is_pending());
    assert!(store.close(h).unwrap().is_pending());
    assert!(log.borrow().is_empty());
    assert!(store.get_status().in_progress);

    let done = pump(&mut store, &log);
    let opcodes: Vec<Opcode> = done.iter().map(|c| c.opcode).collect();
    assert_eq!(opcodes, vec![Opcode::Write, Opcode::Close]);
    assert_eq!(*done[0].status.as_ref().unwrap(), 5);
    assert!(done.iter().all(|c| c.context == CONTEXT && c.handle == Some(h)));
    assert!(!store.get_status().in_progress);
}

#[test]
fn test_completions_follow_issue_order_across_flush() {
    let (media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "ordered", 4);

    store.write(h, b"abcd").unwrap();
    store.flush().unwrap();
    store.get_value_len(h).unwrap();
    store.close(h).unwrap();

    let done = pump(&mut store, &log);
    let opcodes: Vec<Opcode> = done.iter().map(|c| c.opcode).collect();
    assert_eq!(
        opcodes,
        vec![Opcode::Write, Opcode::Flush, Opcode::GetValueLen, Opcode::Close]
    );
    assert!(done.iter().all(|c| c.status.is_ok()));
    assert_eq!(*done[2].status.as_ref().unwrap(), 4);
    assert_eq!(media.commit_count(), 1);
}

#[test]
fn test_each_operation_completes_once() {
    let (_media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "once", 1);
    store.close(h).unwrap();

    assert_eq!(pump(&mut store, &log).len(), 1);
    assert_eq!(store.process_events(), 0);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_read_fills_buffer_before_completion() {
    let (_media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "eager", 3);
    store.write(h, b"xyz").unwrap();
    store.close(h).unwrap();
    pump(&mut store, &log);

    store.open("eager", KeyFlags::read_only()).unwrap();
    let h = pump(&mut store, &log)[0].handle.unwrap();
    let mut buf = [0u8; 3];
    store.read(h, &mut buf).unwrap();
    assert_eq!(&buf, b"xyz");

    let done = pump(&mut store, &log);
    assert_eq!(done[0].opcode, Opcode::Read);
    assert_eq!(*done[0].status.as_ref().unwrap(), 3);
}

// =============================================================================
// Immediate Error Tests
// =============================================================================

#[test]
fn test_validation_errors_are_immediate() {
    let (_media, mut store, log) = setup_async();

    assert!(matches!(
        store.create(".bad", 1, Some(&KeyDescriptor::new())),
        Err(CfstoreError::InvalidKeyName(_))
    ));
    assert!(matches!(
        store.open("missing", KeyFlags::read_only()),
        Err(CfstoreError::KeyNotFound)
    ));
    assert!(matches!(store.find("none*", None), Err(CfstoreError::KeyNotFound)));

    assert_eq!(store.process_events(), 0);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_find_exhaustion_releases_prev() {
    let (_media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "only", 1);
    store.close(h).unwrap();
    pump(&mut store, &log);

    store.find("only", None).unwrap();
    let found = pump(&mut store, &log)[0].handle.unwrap();
    assert_eq!(store.open_handles(), 1);

    assert!(matches!(store.find("only", Some(found)), Err(CfstoreError::KeyNotFound)));
    assert_eq!(store.open_handles(), 0);
}

// =============================================================================
// Journal Serialization Tests
// =============================================================================

#[test]
fn test_second_flush_is_busy() {
    let (_media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "busy", 1);

    assert!(store.flush().unwrap().is_pending());
    assert!(matches!(store.flush(), Err(CfstoreError::Busy)));
    assert!(matches!(store.uninitialize(), Err(CfstoreError::Busy)));

    // Memory operations are still accepted while the flush is in flight
    assert!(store.write(h, b"w").unwrap().is_pending());

    let done = pump(&mut store, &log);
    assert_eq!(done.len(), 2);
    assert!(store.flush().unwrap().is_pending());
    pump(&mut store, &log);
    assert!(store.uninitialize().unwrap().is_pending());
}

#[test]
fn test_flush_on_close_is_busy_during_flush() {
    let (_media, mut store, log) = setup_async();
    let desc = KeyDescriptor::new().flags(KeyFlags::empty().with(KeyFlags::FLUSH_ON_CLOSE, true));
    store.create("auto", 1, Some(&desc)).unwrap();
    let h = pump(&mut store, &log)[0].handle.unwrap();
    store.write(h, b"a").unwrap();

    store.flush().unwrap();
    assert!(matches!(store.close(h), Err(CfstoreError::Busy)));
    pump(&mut store, &log);

    assert!(store.close(h).unwrap().is_pending());
    let done = pump(&mut store, &log);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].opcode, Opcode::Close);
    assert!(done[0].status.is_ok());
}

#[test]
fn test_flush_failure_in_completion() {
    let (media, mut store, log) = setup_async();
    let h = created_handle(&mut store, &log, "fail", 1);
    store.close(h).unwrap();
    pump(&mut store, &log);

    media.inject_fault_on(JournalOpcode::Commit, JournalError::StorageIo("commit".into()));
    assert!(store.flush().unwrap().is_pending());
    let done = pump(&mut store, &log);

    assert_eq!(done[0].opcode, Opcode::Flush);
    assert!(matches!(
        done[0].status,
        Err(CfstoreError::Journal(JournalError::StorageIo(_)))
    ));
    assert!(store.get_status().error);
    assert_eq!(media.commit_count(), 0);

    store.flush().unwrap();
    pump(&mut store, &log);
    assert!(!store.get_status().error);
    assert_eq!(media.commit_count(), 1);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_async_flush_persists() {
    let media = MemoryMedia::new(64 * 1024);
    {
        let (mut store, log) = open_async(&media);
        let h = created_handle(&mut store, &log, "durable", 2);
        store.write(h, b"ok").unwrap();
        store.close(h).unwrap();
        store.flush().unwrap();
        pump(&mut store, &log);
    }

    let (mut store, log) = open_async(&media);
    store.open("durable", KeyFlags::read_only()).unwrap();
    let h = pump(&mut store, &log)[0].handle.unwrap();
    let mut buf = [0u8; 2];
    store.read(h, &mut buf).unwrap();
    assert_eq!(&buf, b"ok");
}

#[test]
fn test_unprocessed_flush_is_not_committed() {
    let media = MemoryMedia::new(64 * 1024);
    {
        let (mut store, log) = open_async(&media);
        let h = created_handle(&mut store, &log, "pending", 1);
        store.close(h).unwrap();
        store.flush().unwrap();
        // Power cut before the journal completions are processed
    }

    let (mut store, _log) = open_async(&media);
    assert_eq!(store.key_count(), 0);
    assert!(matches!(
        store.open("pending", KeyFlags::read_only()),
        Err(CfstoreError::KeyNotFound)
    ));
}
