//! Record codec
//!
//! Encoding and decoding of key-value records into the flat area blob that
//! the journal persists.
//!
//! ## Record Format
//! ```text
//! ┌──────────────┬─────────┬─────────┬──────────┬─────────┬─────┬───────┬─────────┐
//! │ ValueLen (4) │ KeyLen  │ ACL (1) │ RefCnt   │ Flags   │ Key │ Value │ Padding │
//! │   u32 LE     │  (1)    │         │  (1)     │  (1)    │     │       │ (zeros) │
//! └──────────────┴─────────┴─────────┴──────────┴─────────┴─────┴───────┴─────────┘
//! ```
//! Each record is padded to a multiple of the media program unit. An area is
//! records back to back; a zero-filled tail ends it.
//!
//! ### Flags byte
//! - bit 0: deleting
//! - bits 1-2: retention level
//! - bit 3: lazy flush
//! - bit 4: flush on close

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CorruptRecord;

use super::descriptor::{AccessControl, KeyFlags, RetentionLevel};
use super::key::{KeyName, MAX_KEY_NAME_LENGTH};

/// Header size: ValueLen (4) + KeyLen (1) + ACL (1) + RefCount (1) + Flags (1)
pub const HEADER_SIZE: usize = 8;

/// Largest value a record may hold (64 MiB)
pub const MAX_VALUE_SIZE: usize = 1 << 26;

const FLAG_DELETING: u8 = 1 << 0;
const RETENTION_SHIFT: u8 = 1;
const RETENTION_MASK: u8 = 0b11 << RETENTION_SHIFT;
const FLAG_LAZY_FLUSH: u8 = 1 << 3;
const FLAG_FLUSH_ON_CLOSE: u8 = 1 << 4;

/// One persisted key-value entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub name: KeyName,
    pub acl: AccessControl,
    pub retention: RetentionLevel,
    /// Only `lazy_flush` and `flush_on_close` are persisted
    pub flags: KeyFlags,
    /// Value bytes; its length is the record's fixed capacity
    pub value: Vec<u8>,
    pub deleting: bool,
}

impl KeyRecord {
    /// New record with a zero-filled value of `capacity` bytes
    pub fn new(name: KeyName, capacity: usize) -> Self {
        Self {
            name,
            acl: AccessControl::default(),
            retention: RetentionLevel::default(),
            flags: KeyFlags::empty(),
            value: vec![0; capacity],
            deleting: false,
        }
    }

    /// Size this record takes up in an area padded to `program_unit`
    pub fn encoded_len(&self, program_unit: usize) -> usize {
        encoded_len(self.name.len(), self.value.len(), program_unit)
    }
}

/// Padded size of a record with the given key and value lengths
pub fn encoded_len(key_len: usize, value_len: usize, program_unit: usize) -> usize {
    pad_to(HEADER_SIZE + key_len + value_len, program_unit)
}

/// Round `len` up to the next multiple of `unit`
pub fn pad_to(len: usize, unit: usize) -> usize {
    if unit <= 1 {
        return len;
    }
    len.div_ceil(unit) * unit
}

fn flags_byte(record: &KeyRecord) -> u8 {
    let mut bits = (record.retention as u8) << RETENTION_SHIFT;
    if record.deleting {
        bits |= FLAG_DELETING;
    }
    if record.flags.lazy_flush() {
        bits |= FLAG_LAZY_FLUSH;
    }
    if record.flags.flush_on_close() {
        bits |= FLAG_FLUSH_ON_CLOSE;
    }
    bits
}

/// Append one record (header, key, value, padding) to `buf`
pub fn encode_into(record: &KeyRecord, program_unit: usize, buf: &mut BytesMut) {
    let total = record.encoded_len(program_unit);
    let start = buf.len();
    buf.reserve(total);

    buf.put_u32_le(record.value.len() as u32);
    buf.put_u8(record.name.len() as u8);
    buf.put_u8(record.acl.bits());
    buf.put_u8(0); // open-handle count is runtime state
    buf.put_u8(flags_byte(record));
    buf.put_slice(record.name.as_bytes());
    buf.put_slice(&record.value);

    let written = buf.len() - start;
    buf.put_bytes(0, total - written);
}

/// Encode a single record
pub fn encode(record: &KeyRecord, program_unit: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(record.encoded_len(program_unit));
    encode_into(record, program_unit, &mut buf);
    buf.freeze()
}

/// Encode a whole area from records in order
pub fn encode_area<'a, I>(records: I, program_unit: usize) -> Bytes
where
    I: IntoIterator<Item = &'a KeyRecord>,
{
    let mut buf = BytesMut::new();
    for record in records {
        encode_into(record, program_unit, &mut buf);
    }
    buf.freeze()
}

/// Decode the record at the start of `bytes`.
///
/// `offset` is only used for error reporting. Returns the record and the
/// number of bytes it occupies including padding (clamped to what is left).
pub fn decode(
    bytes: &[u8],
    offset: usize,
    program_unit: usize,
) -> Result<(KeyRecord, usize), CorruptRecord> {
    if bytes.len() < HEADER_SIZE {
        return Err(CorruptRecord::Overrun {
            offset,
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let value_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let key_len = bytes[4] as usize;
    let acl = AccessControl::from_bits(bytes[5]);
    let flags = bytes[7];

    if key_len == 0 {
        return Err(CorruptRecord::ZeroKeyLength { offset });
    }
    if key_len > MAX_KEY_NAME_LENGTH {
        return Err(CorruptRecord::KeyTooLong {
            offset,
            len: key_len,
        });
    }
    if value_len > MAX_VALUE_SIZE {
        return Err(CorruptRecord::ValueTooLong {
            offset,
            len: value_len,
        });
    }

    let unpadded = HEADER_SIZE + key_len + value_len;
    if bytes.len() < unpadded {
        return Err(CorruptRecord::Overrun {
            offset,
            needed: unpadded,
            available: bytes.len(),
        });
    }

    let key_bytes = &bytes[HEADER_SIZE..HEADER_SIZE + key_len];
    let name = std::str::from_utf8(key_bytes)
        .ok()
        .filter(|s| !s.contains('\0'))
        .and_then(|s| KeyName::parse(s).ok())
        .ok_or(CorruptRecord::BadKeyName { offset })?;

    let retention_bits = (flags & RETENTION_MASK) >> RETENTION_SHIFT;
    let retention = RetentionLevel::from_bits(retention_bits).ok_or(CorruptRecord::BadRetention {
        offset,
        value: retention_bits,
    })?;

    let key_flags = KeyFlags::empty()
        .with(KeyFlags::LAZY_FLUSH, flags & FLAG_LAZY_FLUSH != 0)
        .with(KeyFlags::FLUSH_ON_CLOSE, flags & FLAG_FLUSH_ON_CLOSE != 0);

    let value = bytes[HEADER_SIZE + key_len..unpadded].to_vec();
    let consumed = pad_to(unpadded, program_unit).min(bytes.len());

    Ok((
        KeyRecord {
            name,
            acl,
            retention,
            flags: key_flags,
            value,
            deleting: flags & FLAG_DELETING != 0,
        },
        consumed,
    ))
}

/// Decode every live record in an area.
///
/// Records persisted with the deleting bit are skipped. A zero-filled tail
/// (erased or padded media) ends the scan.
pub fn decode_area(area: &[u8], program_unit: usize) -> Result<Vec<KeyRecord>, CorruptRecord> {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < area.len() {
        let rest = &area[pos..];
        if rest.iter().all(|&b| b == 0) {
            break;
        }

        let (record, consumed) = decode(rest, pos, program_unit)?;
        pos += consumed;

        if !record.deleting {
            records.push(record);
        }
    }

    Ok(records)
}
