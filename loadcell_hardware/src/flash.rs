//! Block storage devices with NOR-flash semantics: erase sets a whole sector to 0xFF,
//! program can only clear bits.

use std::path::{Path, PathBuf};

use loadcell_traits::{BlockStorage, BoxError};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::write_atomic;

/// Erased flash byte.
pub const ERASED: u8 = 0xFF;

/// Minimum erasable unit on the usual SPI NOR parts.
pub const DEFAULT_SECTOR_SIZE: u32 = 4096;

#[derive(Debug, Clone)]
struct Image {
    bytes: Vec<u8>,
    sector_size: u32,
}

impl Image {
    fn erased(capacity: u32, sector_size: u32) -> Self {
        Self {
            bytes: vec![ERASED; capacity as usize],
            sector_size,
        }
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(HwError::OutOfBounds { offset, len })?;
        Ok(start..end)
    }

    fn erase(&mut self, offset: u32) -> Result<()> {
        if offset % self.sector_size != 0 {
            return Err(HwError::Unaligned(offset));
        }
        let r = self.range(offset, self.sector_size as usize)?;
        self.bytes[r].fill(ERASED);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let r = self.range(offset, data.len())?;
        for (cell, &b) in self.bytes[r].iter_mut().zip(data) {
            *cell &= b;
        }
        Ok(())
    }

    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<()> {
        let r = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[r]);
        Ok(())
    }
}

/// In-memory flash for tests and simulation.
#[derive(Debug, Clone)]
pub struct MemFlash {
    image: Image,
    erase_counts: Vec<u32>,
    drop_next_program: bool,
}

impl MemFlash {
    pub fn new(capacity: u32, sector_size: u32) -> Self {
        let sectors = (capacity / sector_size.max(1)) as usize;
        Self {
            image: Image::erased(capacity, sector_size.max(1)),
            erase_counts: vec![0; sectors],
            drop_next_program: false,
        }
    }

    /// Raw contents, for test assertions.
    pub fn contents(&self, offset: u32, len: usize) -> Vec<u8> {
        let start = offset as usize;
        self.image.bytes[start..start + len].to_vec()
    }

    /// Overwrite bytes directly, bypassing program semantics.
    pub fn inject_corruption(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        self.image.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// XOR one byte in place.
    pub fn flip_bits(&mut self, offset: u32, mask: u8) {
        self.image.bytes[offset as usize] ^= mask;
    }

    /// The next program call reports success but writes nothing (a torn write).
    pub fn drop_next_program(&mut self) {
        self.drop_next_program = true;
    }

    pub fn erase_count(&self, offset: u32) -> u32 {
        self.erase_counts
            .get((offset / self.image.sector_size) as usize)
            .copied()
            .unwrap_or(0)
    }
}

impl BlockStorage for MemFlash {
    fn sector_size(&self) -> u32 {
        self.image.sector_size
    }

    fn capacity(&self) -> u32 {
        self.image.bytes.len() as u32
    }

    fn erase(&mut self, offset: u32) -> std::result::Result<(), BoxError> {
        self.image.erase(offset)?;
        if let Some(c) = self
            .erase_counts
            .get_mut((offset / self.image.sector_size) as usize)
        {
            *c += 1;
        }
        trace!(offset, "mem flash sector erased");
        Ok(())
    }

    fn program(&mut self, offset: u32, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        if std::mem::take(&mut self.drop_next_program) {
            debug!(offset, "mem flash dropping program");
            return Ok(());
        }
        self.image.program(offset, bytes)?;
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> std::result::Result<(), BoxError> {
        Ok(self.image.read(offset, buf)?)
    }
}

/// Flash image persisted to a file; every erase/program rewrites it atomically.
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    image: Image,
}

impl FileFlash {
    /// Open an existing image or create an erased one. An image of the wrong size is
    /// treated as blank.
    pub fn open(path: impl AsRef<Path>, capacity: u32, sector_size: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sector_size = sector_size.max(1);
        let image = match std::fs::read(&path) {
            Ok(bytes) if bytes.len() == capacity as usize => Image { bytes, sector_size },
            Ok(bytes) => {
                debug!(
                    path = %path.display(),
                    found = bytes.len(),
                    expected = capacity,
                    "flash image size mismatch; starting blank"
                );
                Image::erased(capacity, sector_size)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Image::erased(capacity, sector_size)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        write_atomic(&self.path, &self.image.bytes)?;
        Ok(())
    }
}

impl BlockStorage for FileFlash {
    fn sector_size(&self) -> u32 {
        self.image.sector_size
    }

    fn capacity(&self) -> u32 {
        self.image.bytes.len() as u32
    }

    fn erase(&mut self, offset: u32) -> std::result::Result<(), BoxError> {
        self.image.erase(offset)?;
        self.persist()?;
        Ok(())
    }

    fn program(&mut self, offset: u32, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        self.image.program(offset, bytes)?;
        self.persist()?;
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> std::result::Result<(), BoxError> {
        Ok(self.image.read(offset, buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_only_clears_bits() {
        let mut f = MemFlash::new(8192, 4096);
        f.program(0, &[0x0F]).unwrap();
        f.program(0, &[0xF0]).unwrap();
        assert_eq!(f.contents(0, 1), vec![0x00]);
        f.erase(0).unwrap();
        assert_eq!(f.contents(0, 1), vec![ERASED]);
        assert_eq!(f.erase_count(0), 1);
    }

    #[test]
    fn rejects_unaligned_erase_and_out_of_bounds() {
        let mut f = MemFlash::new(8192, 4096);
        let e = f.erase(100).unwrap_err();
        assert!(matches!(e.downcast_ref::<HwError>(), Some(HwError::Unaligned(100))));
        let e = f.program(8190, &[0, 0, 0]).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<HwError>(),
            Some(HwError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn dropped_program_leaves_sector_erased() {
        let mut f = MemFlash::new(4096, 4096);
        f.drop_next_program();
        f.program(0, &[1, 2, 3]).unwrap();
        assert_eq!(f.contents(0, 3), vec![ERASED; 3]);
        f.program(0, &[1, 2, 3]).unwrap();
        assert_eq!(f.contents(0, 3), vec![1, 2, 3]);
    }

    #[test]
    fn file_flash_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        {
            let mut f = FileFlash::open(&path, 8192, 4096).unwrap();
            f.erase(4096).unwrap();
            f.program(4096, b"HX13").unwrap();
        }
        let mut f = FileFlash::open(&path, 8192, 4096).unwrap();
        let mut buf = [0u8; 4];
        f.read(4096, &mut buf).unwrap();
        assert_eq!(&buf, b"HX13");
    }

    #[test]
    fn file_flash_wrong_size_starts_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        std::fs::write(&path, [0u8; 10]).unwrap();
        let mut f = FileFlash::open(&path, 4096, 4096).unwrap();
        let mut buf = [0u8; 2];
        f.read(0, &mut buf).unwrap();
        assert_eq!(buf, [ERASED, ERASED]);
    }
}
