// src/core/persistence/rdb.rs

//! A minimal RDB snapshot reader, sufficient to warm-load the string
//! keyspace at startup.
//!
//! Supported: the `REDIS` header, metadata skipping, database select and
//! resize opcodes, millisecond and second expiry tags, and string values
//! with the standard length encodings. Anything else is a snapshot error;
//! the caller treats that as a warning and keeps whatever loaded.

use bytes::Bytes;
use std::path::Path;
use tracing::debug;

use crate::core::storage::StringStore;
use crate::core::CitrineError;

/// A valid empty snapshot, transmitted as the `PSYNC` full-resync body.
pub const EMPTY_SNAPSHOT: &[u8] =
    b"REDIS0011\xfa\x09redis-ver\x057.2.0\xfa\x0aredis-bits\xc0\x40\
\xfa\x05ctime\xc2\x6d\x08\xbc\x65\xfa\x08used-mem\xc2\xb0\xc4\x10\x00\
\xfa\x08aof-base\xc0\x00\xff\xf0\x6e\x3b\xfe\xc0\xff\x5a\xa2";

const MAGIC: &[u8] = b"REDIS";
const VERSION_LEN: usize = 4;
const MAX_METADATA_SKIP: usize = 1024;

const OPCODE_EOF: u8 = 0xFF;
const OPCODE_SELECTDB: u8 = 0xFE;
const OPCODE_EXPIRETIME: u8 = 0xFD;
const OPCODE_EXPIRETIME_MS: u8 = 0xFC;
const OPCODE_RESIZEDB: u8 = 0xFB;

const VALUE_TYPE_STRING: u8 = 0;

/// Reads the snapshot at `path` into the string keyspace. Returns the number
/// of keys loaded.
pub fn load_file(path: &Path, store: &StringStore) -> Result<usize, CitrineError> {
    let data = std::fs::read(path)?;
    load_bytes(&data, store)
}

/// Decodes an in-memory snapshot into the string keyspace.
pub fn load_bytes(data: &[u8], store: &StringStore) -> Result<usize, CitrineError> {
    let mut reader = SnapshotReader::new(data);
    reader.check_header()?;
    reader.skip_metadata()?;
    // The byte after the metadata skip is the selected database id.
    reader.read_u8()?;

    let mut loaded = 0usize;
    let mut pending_expiry_ms: Option<u64> = None;

    loop {
        let opcode = reader.read_u8()?;
        match opcode {
            OPCODE_EOF => break,
            OPCODE_SELECTDB => {
                let db_index = reader.read_u8()?;
                debug!("Snapshot selects database {db_index}");
            }
            OPCODE_RESIZEDB => {
                let num_keys = reader.read_length()?;
                let num_expiring = reader.read_length()?;
                debug!("Snapshot resize hint: {num_keys} keys, {num_expiring} expiring");
            }
            OPCODE_EXPIRETIME_MS => {
                pending_expiry_ms = Some(u64::from_le_bytes(reader.read_array::<8>()?));
            }
            OPCODE_EXPIRETIME => {
                let seconds = u32::from_le_bytes(reader.read_array::<4>()?);
                pending_expiry_ms = Some(u64::from(seconds) * 1000);
            }
            VALUE_TYPE_STRING => {
                let key = reader.read_string()?;
                let value = reader.read_string()?;
                if store.load_snapshot(key, value, pending_expiry_ms.take()) {
                    loaded += 1;
                }
            }
            other => {
                return Err(CitrineError::SnapshotError(format!(
                    "unsupported value type 0x{other:02x}"
                )));
            }
        }
    }

    Ok(loaded)
}

struct SnapshotReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, CitrineError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| CitrineError::SnapshotError("truncated snapshot".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], CitrineError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CitrineError::SnapshotError("truncated snapshot".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CitrineError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    /// Validates the `REDIS` magic and skips the 4-byte version text.
    fn check_header(&mut self) -> Result<(), CitrineError> {
        let header = self.read_slice(MAGIC.len() + VERSION_LEN).map_err(|_| {
            CitrineError::SnapshotError("file too short for header".to_string())
        })?;
        if &header[..MAGIC.len()] != MAGIC {
            return Err(CitrineError::SnapshotError("bad magic number".to_string()));
        }
        Ok(())
    }

    /// Skips metadata bytes up to and including the first SELECTDB opcode.
    /// Refuses after 1024 skipped bytes, or if the file ends first.
    fn skip_metadata(&mut self) -> Result<(), CitrineError> {
        for _ in 0..MAX_METADATA_SKIP {
            match self.read_u8()? {
                OPCODE_SELECTDB => return Ok(()),
                OPCODE_EOF => {
                    return Err(CitrineError::SnapshotError(
                        "end of file before any database section".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Err(CitrineError::SnapshotError(
            "no database section within metadata limit".to_string(),
        ))
    }

    /// Decodes a length-encoded integer. The top two bits of the first byte
    /// select the format:
    /// `00` six-bit length, `01` 14-bit big-endian length, `10` 32-bit
    /// big-endian length, `11` special integer encodings 0/1/2.
    fn read_length(&mut self) -> Result<u64, CitrineError> {
        let first = self.read_u8()?;
        match first >> 6 {
            0b00 => Ok(u64::from(first & 0x3F)),
            0b01 => {
                let next = self.read_u8()?;
                Ok((u64::from(first & 0x3F) << 8) | u64::from(next))
            }
            0b10 => Ok(u64::from(u32::from_be_bytes(self.read_array::<4>()?))),
            _ => match first & 0x3F {
                0 => Ok(u64::from(self.read_u8()?)),
                1 => Ok(u64::from(u16::from_le_bytes(self.read_array::<2>()?))),
                2 => Ok(u64::from(u32::from_le_bytes(self.read_array::<4>()?))),
                other => Err(CitrineError::SnapshotError(format!(
                    "unsupported special length encoding {other}"
                ))),
            },
        }
    }

    /// Reads a length-encoded byte string.
    fn read_string(&mut self) -> Result<Bytes, CitrineError> {
        let len = self.read_length()? as usize;
        Ok(Bytes::copy_from_slice(self.read_slice(len)?))
    }
}
