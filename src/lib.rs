//! # CFSTORE
//!
//! A small configuration store for devices with constrained flash:
//! - Named key-value records with fixed value capacity
//! - One contiguous area persisted through an append-only journal
//! - Crash recovery by rescanning the last committed area
//! - Identical API over synchronous and asynchronous journals
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Client                              │
//! │           (Outcome now, or Completion via callback)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Operation Dispatcher                       │
//! │              (Cfstore, FIFO completion queue)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────┐
//!          │            │                 │
//!          ▼            ▼                 ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │   Handles   │ │  Directory  │ │   Journal   │
//!   │   (arena)   │ │  (records)  │ │ (log/commit)│
//!   └─────────────┘ └──────┬──────┘ └──────▲──────┘
//!                          │               │
//!                          └── area blob ──┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod directory;
pub mod handle;
pub mod journal;
pub mod engine;
pub mod flow;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CfstoreError, JournalError, Result};
pub use config::Config;
pub use engine::{Cfstore, ClientContext, Completion, Opcode, Outcome};
pub use handle::Handle;
pub use record::{KeyDescriptor, KeyFlags};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CFSTORE
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
