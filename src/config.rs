//! Configuration for CFSTORE
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CfstoreError, Result};

/// Main configuration for a CFSTORE instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Area Configuration
    // -------------------------------------------------------------------------
    /// Media program unit in bytes. Every encoded record is zero-padded to a
    /// multiple of this, and so is the area handed to the journal.
    pub program_unit: usize,

    /// Largest encoded area the store will accept (bytes)
    pub max_area_size: usize,

    // -------------------------------------------------------------------------
    // Handle Configuration
    // -------------------------------------------------------------------------
    /// Max handles open at the same time (Create/Open/Find)
    pub max_open_handles: usize,

    // -------------------------------------------------------------------------
    // File Journal Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the file journal
    /// Internal structure:
    ///   {data_dir}/
    ///     └── cfstore.journal
    pub data_dir: PathBuf,

    /// Sync strategy: whether a commit fsyncs before returning
    pub journal_sync: SyncStrategy,
}

/// File journal sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// fsync every committed blob (safest)
    EveryCommit,

    /// Leave syncing to the OS (tests, tooling)
    Never,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program_unit: 8,
            max_area_size: 64 * 1024, // 64 KB
            max_open_handles: 64,
            data_dir: PathBuf::from("./cfstore_data"),
            journal_sync: SyncStrategy::EveryCommit,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.program_unit == 0 || !self.program_unit.is_power_of_two() {
            return Err(CfstoreError::Config(format!(
                "program unit must be a non-zero power of two, got {}",
                self.program_unit
            )));
        }
        if self.max_area_size < self.program_unit {
            return Err(CfstoreError::Config(format!(
                "max area size {} is smaller than the program unit {}",
                self.max_area_size, self.program_unit
            )));
        }
        if self.max_open_handles == 0 {
            return Err(CfstoreError::Config(
                "max open handles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the media program unit (bytes)
    pub fn program_unit(mut self, bytes: usize) -> Self {
        self.config.program_unit = bytes;
        self
    }

    /// Set the maximum encoded area size (bytes)
    pub fn max_area_size(mut self, bytes: usize) -> Self {
        self.config.max_area_size = bytes;
        self
    }

    /// Set the maximum number of simultaneously open handles
    pub fn max_open_handles(mut self, count: usize) -> Self {
        self.config.max_open_handles = count;
        self
    }

    /// Set the data directory (root for the file journal)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the file journal sync strategy
    pub fn journal_sync(mut self, strategy: SyncStrategy) -> Self {
        self.config.journal_sync = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
