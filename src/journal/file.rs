//! File journal
//!
//! Synchronous journal keeping the committed blob in a single file.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (26 bytes, bincode)                                  │
//! │   Magic: "CFSJ" (4) | Version: u16 (2) | Sequence: u64 (8)  │
//! │   Length: u64 (8) | CRC32 of blob: u32 (4)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Blob (Length bytes)                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//! A commit writes `cfstore.journal.tmp` and renames it over
//! `cfstore.journal`, so a crash leaves either the old or the new blob.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::task::Poll;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::config::{Config, SyncStrategy};
use crate::error::JournalError;
use crate::record::SecurityFeatures;

use super::{Journal, JournalCapabilities, JournalCompletion, JournalInfo, JournalResult};

const MAGIC: [u8; 4] = *b"CFSJ";
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Sequence (8) + Length (8) + CRC (4)
const HEADER_SIZE: usize = 26;

const JOURNAL_FILENAME: &str = "cfstore.journal";
const TEMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobHeader {
    magic: [u8; 4],
    version: u16,
    sequence: u64,
    length: u64,
    crc: u32,
}

/// File-backed journal
pub struct FileJournal {
    path: PathBuf,
    program_unit: usize,
    capacity: usize,
    sync: SyncStrategy,
    initialized: bool,
    /// Sequence number of the committed blob
    sequence: u64,
    /// Committed blob, loaded at initialize
    committed: Option<Bytes>,
    /// Bytes logged since the last commit
    staged: BytesMut,
}

impl FileJournal {
    /// Journal living in `config.data_dir`
    pub fn open(config: &Config) -> std::result::Result<Self, JournalError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            path: config.data_dir.join(JOURNAL_FILENAME),
            program_unit: config.program_unit,
            capacity: config.max_area_size,
            sync: config.journal_sync,
            initialized: false,
            sequence: 0,
            committed: None,
            staged: BytesMut::new(),
        })
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension(format!("journal.{}", TEMP_SUFFIX))
    }

    /// Load and verify the committed blob; None if no journal file exists
    fn load(&self) -> std::result::Result<Option<(u64, Bytes)>, JournalError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.path)?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        if raw.len() < HEADER_SIZE {
            return Err(JournalError::Corrupt(format!(
                "journal file is {} bytes, shorter than its header",
                raw.len()
            )));
        }

        let header: BlobHeader = bincode::deserialize(&raw[..HEADER_SIZE])
            .map_err(|e| JournalError::Corrupt(format!("bad header: {}", e)))?;

        if header.magic != MAGIC {
            return Err(JournalError::Corrupt(format!(
                "invalid magic: expected CFSJ, got {:?}",
                header.magic
            )));
        }
        if header.version != VERSION {
            return Err(JournalError::Corrupt(format!(
                "unsupported journal version: {}",
                header.version
            )));
        }

        let body = &raw[HEADER_SIZE..];
        if body.len() as u64 != header.length {
            return Err(JournalError::Corrupt(format!(
                "blob length mismatch: header says {}, file holds {}",
                header.length,
                body.len()
            )));
        }
        if crc32fast::hash(body) != header.crc {
            return Err(JournalError::Corrupt("blob CRC mismatch".to_string()));
        }

        Ok(Some((header.sequence, Bytes::copy_from_slice(body))))
    }

    /// Atomically replace the journal file with `blob`
    fn store(&mut self, blob: Bytes) -> std::result::Result<usize, JournalError> {
        let sequence = self.sequence + 1;
        let header = BlobHeader {
            magic: MAGIC,
            version: VERSION,
            sequence,
            length: blob.len() as u64,
            crc: crc32fast::hash(&blob),
        };
        let header_bytes = bincode::serialize(&header)
            .map_err(|e| JournalError::StorageIo(format!("header encode failed: {}", e)))?;

        let temp = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(&header_bytes)?;
            file.write_all(&blob)?;
            if self.sync == SyncStrategy::EveryCommit {
                file.sync_all()?;
            }
        }
        fs::rename(&temp, &self.path)?;

        let size = blob.len();
        self.sequence = sequence;
        self.committed = Some(blob);
        tracing::debug!(sequence, bytes = size, path = %self.path.display(), "journal blob committed");
        Ok(size)
    }

    fn check_initialized(&self) -> std::result::Result<(), JournalError> {
        if self.initialized {
            Ok(())
        } else {
            Err(JournalError::NotInitialized)
        }
    }
}

impl Journal for FileJournal {
    fn capabilities(&self) -> JournalCapabilities {
        JournalCapabilities {
            asynchronous_ops: false,
            program_unit: self.program_unit,
            security: SecurityFeatures::empty().with(SecurityFeatures::ACLS, true),
        }
    }

    fn initialize(&mut self) -> JournalResult<JournalInfo> {
        match self.load() {
            Ok(Some((sequence, blob))) => {
                self.sequence = sequence;
                self.committed = Some(blob);
            }
            Ok(None) => {
                self.sequence = 0;
                self.committed = None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "journal load failed");
                return Err(e);
            }
        }
        self.initialized = true;
        self.staged.clear();
        self.info().map(Poll::Ready)
    }

    fn info(&self) -> std::result::Result<JournalInfo, JournalError> {
        self.check_initialized()?;
        Ok(JournalInfo {
            blob_size: self.committed.as_ref().map_or(0, |b| b.len()),
            formatted: self.committed.is_some(),
            capacity: self.capacity,
        })
    }

    fn read(&mut self, len: usize) -> JournalResult<Bytes> {
        self.check_initialized()?;
        match &self.committed {
            Some(blob) if !blob.is_empty() => Ok(Poll::Ready(blob.slice(..len.min(blob.len())))),
            _ => Err(JournalError::Empty),
        }
    }

    fn log(&mut self, data: &[u8]) -> JournalResult<usize> {
        self.check_initialized()?;
        if !data.is_empty() && data.len() < self.program_unit {
            return Err(JournalError::SmallLogRequest);
        }
        if self.staged.len() + data.len() > self.capacity {
            return Err(JournalError::NoSpace);
        }
        self.staged.extend_from_slice(data);
        Ok(Poll::Ready(data.len()))
    }

    fn commit(&mut self) -> JournalResult<usize> {
        self.check_initialized()?;
        let blob = self.staged.split().freeze();
        self.store(blob).map(Poll::Ready)
    }

    fn reset(&mut self) -> JournalResult<()> {
        self.check_initialized()?;
        self.staged.clear();
        self.store(Bytes::new())?;
        Ok(Poll::Ready(()))
    }

    fn poll_completion(&mut self) -> Option<JournalCompletion> {
        None
    }
}
