//! Tests for the example flow
//!
//! These tests verify:
//! - The scripted flow runs to completion over both journal modes
//! - Both modes pass through the same states and observe the same data
//! - Callbacks are used only in asynchronous mode

use cfstore::config::Config;
use cfstore::engine::Cfstore;
use cfstore::flow::{ExampleFlow, FlowReport, FlowState, FLOW_KEY, FLOW_SEEK_OFFSET, FLOW_VALUE};
use cfstore::journal::{CompletionMode, MemoryJournal, MemoryMedia};

// =============================================================================
// Helper Functions
// =============================================================================

fn run_flow(mode: CompletionMode) -> (FlowReport, MemoryMedia, Cfstore) {
    let media = MemoryMedia::new(64 * 1024);
    let config = Config::default();
    let journal = MemoryJournal::with_mode(media.clone(), config.program_unit, mode);
    let store = Cfstore::new(config, Box::new(journal)).unwrap();

    let (report, store) = ExampleFlow::new(store).run().unwrap();
    (report, media, store)
}

// =============================================================================
// Flow Tests
// =============================================================================

#[test]
fn test_sync_flow_completes() {
    let (report, media, store) = run_flow(CompletionMode::Sync);

    assert_eq!(report.value_read, FLOW_VALUE);
    assert_eq!(report.tail_read, &FLOW_VALUE[FLOW_SEEK_OFFSET..]);
    assert_eq!(report.key_name, FLOW_KEY);
    assert_eq!(report.value_len, FLOW_VALUE.len());
    assert_eq!(report.callbacks, 0);

    assert!(!store.is_initialized());
    assert_eq!(media.commit_count(), 2);
}

#[test]
fn test_async_flow_completes_through_callbacks() {
    let (report, _media, store) = run_flow(CompletionMode::Async);

    assert_eq!(report.value_read, FLOW_VALUE);
    assert_eq!(report.key_name, FLOW_KEY);
    // Every step but the exhausted Find completes through the callback
    assert_eq!(report.callbacks, 16);
    assert!(!store.is_initialized());
}

#[test]
fn test_sync_and_async_flows_match() {
    let (sync_report, sync_media, _) = run_flow(CompletionMode::Sync);
    let (async_report, async_media, _) = run_flow(CompletionMode::Async);

    assert_eq!(sync_report.transitions, async_report.transitions);
    assert_eq!(sync_report.value_read, async_report.value_read);
    assert_eq!(sync_report.tail_read, async_report.tail_read);
    assert_eq!(sync_report.key_name, async_report.key_name);
    assert_eq!(sync_report.value_len, async_report.value_len);
    assert_eq!(sync_media.committed(), async_media.committed());
}

#[test]
fn test_flow_transitions_pair_doing_and_done() {
    let (report, _media, _store) = run_flow(CompletionMode::Sync);

    assert_eq!(report.transitions.len(), 34);
    assert_eq!(report.transitions.first(), Some(&FlowState::Initializing));
    assert_eq!(report.transitions.last(), Some(&FlowState::UninitDone));
    for pair in report.transitions.chunks(2) {
        assert_eq!(pair[0].done(), pair[1]);
    }
}

#[test]
fn test_flow_leaves_empty_committed_area() {
    let (_report, media, _store) = run_flow(CompletionMode::Sync);

    // The key was deleted and flushed, so the last commit holds nothing
    assert_eq!(media.committed().map(|b| b.len()), Some(0));
}
