//! Persistent calibration record.
//!
//! Layout (little-endian, 32 bytes, padded with 0xFF to the sector):
//!
//! | bytes  | field                              |
//! |--------|------------------------------------|
//! | 0..4   | magic `0x48583133`                 |
//! | 4..28  | 3 x (i32 offset, f32 counts/gram)  |
//! | 28..32 | CRC-32/ISO-HDLC over bytes 0..28   |
//!
//! The record lives in the top sector of the device. A record whose magic or CRC does
//! not match is treated as absent.

use crc::{CRC_32_ISO_HDLC, Crc};
use loadcell_traits::BlockStorage;
use tracing::{debug, info, warn};

use crate::calibration::ScaleEntry;
use crate::error::{Result, StoreError};
use crate::hw_error::map_storage_error;

pub const MAGIC: u32 = 0x4858_3133;
pub const ENTRY_COUNT: usize = 3;
pub const RECORD_LEN: usize = 32;
const CRC_OFFSET: usize = RECORD_LEN - 4;
const ERASED: u8 = 0xFF;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 (reflected, poly 0xEDB88320, init and xorout 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigRecord {
    pub magic: u32,
    pub entries: [ScaleEntry; ENTRY_COUNT],
    pub crc32: u32,
}

impl ConfigRecord {
    /// Build a record with the magic set and the CRC computed.
    pub fn new(entries: [ScaleEntry; ENTRY_COUNT]) -> Self {
        let mut rec = Self {
            magic: MAGIC,
            entries,
            crc32: 0,
        };
        rec.crc32 = crc32(&rec.encode()[..CRC_OFFSET]);
        rec
    }

    /// Serialize as stored; the `crc32` field is written as is.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        for (i, e) in self.entries.iter().enumerate() {
            let at = 4 + i * 8;
            out[at..at + 4].copy_from_slice(&e.offset_counts.to_le_bytes());
            out[at + 4..at + 8].copy_from_slice(&e.counts_per_gram.to_le_bytes());
        }
        out[CRC_OFFSET..].copy_from_slice(&self.crc32.to_le_bytes());
        out
    }

    /// Parse and validate. `None` for short input, wrong magic or CRC mismatch.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; RECORD_LEN] = bytes.get(..RECORD_LEN)?.try_into().ok()?;
        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];

        let magic = u32::from_le_bytes(word(0));
        if magic != MAGIC {
            return None;
        }
        let stored = u32::from_le_bytes(word(CRC_OFFSET));
        if crc32(&bytes[..CRC_OFFSET]) != stored {
            return None;
        }

        let mut entries = [ScaleEntry::default(); ENTRY_COUNT];
        for (i, e) in entries.iter_mut().enumerate() {
            let at = 4 + i * 8;
            e.offset_counts = i32::from_le_bytes(word(at));
            e.counts_per_gram = f32::from_le_bytes(word(at + 4));
        }
        Some(Self {
            magic,
            entries,
            crc32: stored,
        })
    }
}

/// Calibration store over a block device.
#[derive(Debug)]
pub struct ConfigStore<F> {
    flash: F,
    offset: u32,
}

impl<F: BlockStorage> ConfigStore<F> {
    pub fn new(flash: F) -> Result<Self, StoreError> {
        let sector = flash.sector_size();
        let capacity = flash.capacity();
        if (sector as usize) < RECORD_LEN {
            return Err(StoreError::Geometry("sector smaller than the record"));
        }
        if capacity < sector {
            return Err(StoreError::Geometry("device smaller than one sector"));
        }
        let offset = (capacity / sector - 1) * sector;
        debug!(offset, sector, capacity, "config store opened");
        Ok(Self { flash, offset })
    }

    /// Start of the sector holding the record.
    pub fn sector_offset(&self) -> u32 {
        self.offset
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Erase and program the record sector, then read it back. A read-back that does
    /// not match is `VerifyFailed`; there is no retry.
    pub fn save(&mut self, entries: &[ScaleEntry; ENTRY_COUNT]) -> Result<(), StoreError> {
        let record = ConfigRecord::new(*entries);
        let bytes = record.encode();
        let mut image = vec![ERASED; self.flash.sector_size() as usize];
        image[..RECORD_LEN].copy_from_slice(&bytes);

        let offset = self.offset;
        let flash = &mut self.flash;
        critical_section::with(|_| {
            flash.erase(offset)?;
            flash.program(offset, &image)
        })
        .map_err(|e| map_storage_error(e.as_ref()))?;

        let mut readback = [0u8; RECORD_LEN];
        self.flash
            .read(offset, &mut readback)
            .map_err(|e| map_storage_error(e.as_ref()))?;
        if readback != bytes || ConfigRecord::decode(&readback).is_none() {
            warn!(offset, "config record read-back mismatch");
            return Err(StoreError::VerifyFailed);
        }
        info!(offset, crc = record.crc32, "config record saved");
        Ok(())
    }

    /// `Ok(None)` when the sector holds no valid record.
    pub fn load(&mut self) -> Result<Option<[ScaleEntry; ENTRY_COUNT]>, StoreError> {
        let mut buf = [0u8; RECORD_LEN];
        self.flash
            .read(self.offset, &mut buf)
            .map_err(|e| map_storage_error(e.as_ref()))?;
        match ConfigRecord::decode(&buf) {
            Some(rec) => {
                debug!(offset = self.offset, "config record loaded");
                Ok(Some(rec.entries))
            }
            None => {
                if buf.iter().all(|&b| b == ERASED) {
                    debug!(offset = self.offset, "config sector blank");
                } else {
                    warn!(offset = self.offset, "config record invalid (magic or crc)");
                }
                Ok(None)
            }
        }
    }

    /// Return the record sector to the erased state.
    pub fn erase(&mut self) -> Result<(), StoreError> {
        let offset = self.offset;
        let flash = &mut self.flash;
        critical_section::with(|_| flash.erase(offset))
            .map_err(|e| map_storage_error(e.as_ref()))?;
        info!(offset, "config sector erased");
        Ok(())
    }
}
