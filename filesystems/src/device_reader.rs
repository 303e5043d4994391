// Partition-relative sector reading
// Bounds are checked before every read and short reads are caught before
// anything gets decoded, so detectors only ever see complete buffers

use log::trace;
use relic_core::{Partition, ProbeError, SectorAccessor};

/// Sub-offsets inside the first physical sectors of optical media where a
/// structure documented for 512-byte sectors may sit
pub const OPTICAL_SUB_OFFSETS: [usize; 6] = [0x000, 0x200, 0x400, 0x600, 0x800, 0xA00];

/// Physical sector sizes of optical media (cooked, raw, raw + subchannel)
pub const OPTICAL_SECTOR_SIZES: [u32; 3] = [2048, 2352, 2448];

/// Reads from one partition of one image. Cheap to construct, holds no
/// buffers between calls.
#[derive(Clone, Copy)]
pub struct PartitionReader<'a> {
    image: &'a dyn SectorAccessor,
    partition: &'a Partition,
}

impl<'a> PartitionReader<'a> {
    pub fn new(image: &'a dyn SectorAccessor, partition: &'a Partition) -> Self {
        Self { image, partition }
    }

    pub fn partition(&self) -> &Partition {
        self.partition
    }

    /// Physical sector size of the medium, exactly as the image reads it
    pub fn sector_size(&self) -> u32 {
        self.image.sector_size()
    }

    fn nonzero_sector_size(&self) -> Result<u64, ProbeError> {
        match self.sector_size() {
            0 => Err(ProbeError::malformed("medium reports a zero sector size")),
            size => Ok(size as u64),
        }
    }

    /// Partition length in sectors, clipped to what the image really holds
    pub fn sectors(&self) -> u64 {
        let available = self.image.total_sectors().saturating_sub(self.partition.start);
        self.partition.length.min(available)
    }

    /// Partition length in bytes
    pub fn byte_len(&self) -> u64 {
        self.sectors().saturating_mul(self.sector_size() as u64)
    }

    pub fn is_optical(&self) -> bool {
        OPTICAL_SECTOR_SIZES.contains(&self.sector_size())
    }

    /// Read `count` sectors starting at partition-relative `lba`
    pub fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>, ProbeError> {
        let end = lba.checked_add(count).ok_or(ProbeError::OutOfRange {
            lba,
            end: u64::MAX,
            bound: self.partition.length,
        })?;
        if count == 0 || end > self.partition.length {
            return Err(ProbeError::OutOfRange {
                lba,
                end,
                bound: self.partition.length,
            });
        }

        let sector_size = self.nonzero_sector_size()?;
        let image_sectors = self.image.total_sectors();
        let absolute = self.partition.start.checked_add(lba);
        let absolute_end = absolute.and_then(|absolute| absolute.checked_add(count));
        let (absolute, absolute_end) = match (absolute, absolute_end) {
            (Some(absolute), Some(absolute_end)) if absolute_end <= image_sectors => {
                (absolute, absolute_end)
            }
            _ => {
                return Err(ProbeError::OutOfRange {
                    lba: absolute.unwrap_or(u64::MAX),
                    end: absolute_end.unwrap_or(u64::MAX),
                    bound: image_sectors,
                })
            }
        };

        trace!(
            "Reading {} sectors at partition LBA {} (absolute {}..{})",
            count,
            lba,
            absolute,
            absolute_end
        );

        let expected = usize::try_from(count.saturating_mul(sector_size)).unwrap_or(usize::MAX);
        let buffer = self.image.read_sectors(absolute, count)?;
        if buffer.len() < expected {
            return Err(ProbeError::ShortRead {
                lba: absolute,
                expected,
                actual: buffer.len(),
            });
        }
        Ok(buffer)
    }

    pub fn read_sector(&self, lba: u64) -> Result<Vec<u8>, ProbeError> {
        self.read_sectors(lba, 1)
    }

    /// Read `len` bytes at a partition-relative byte offset.
    ///
    /// The offset is split into a sector and a remainder against the real
    /// sector size; enough whole sectors are read to cover
    /// `remainder + len` and the structure is copied out at `remainder`.
    pub fn read_at(&self, byte_offset: u64, len: usize) -> Result<Vec<u8>, ProbeError> {
        let sector_size = self.nonzero_sector_size()?;
        let target = byte_offset / sector_size;
        let remainder = (byte_offset % sector_size) as usize;
        let count = (remainder as u64 + len as u64).div_ceil(sector_size);

        let buffer = self.read_sectors(target, count.max(1))?;
        Ok(buffer[remainder..remainder + len].to_vec())
    }

    /// Probe `len`-byte windows at each sub-offset of a multi-sector read,
    /// in order, returning the first one the predicate accepts together
    /// with its byte offset in the partition.
    pub fn find_at_sub_offsets<T, F>(
        &self,
        lba: u64,
        count: u64,
        sub_offsets: &[usize],
        len: usize,
        mut accept: F,
    ) -> Result<Option<(u64, T)>, ProbeError>
    where
        F: FnMut(&[u8]) -> Option<T>,
    {
        let buffer = self.read_sectors(lba, count)?;
        let base = lba.saturating_mul(self.sector_size() as u64);

        for &offset in sub_offsets {
            let Some(window) = buffer.get(offset..offset + len) else {
                continue;
            };
            if let Some(found) = accept(window) {
                trace!("Structure accepted at sub-offset {:#x}", offset);
                return Ok(Some((base.saturating_add(offset as u64), found)));
            }
        }
        Ok(None)
    }

    /// Partition-relative bound check for a byte extent, used to reject
    /// headers whose declared size exceeds the medium
    pub fn check_extent(&self, what: &str, offset: u64, bytes: u64) -> Result<(), ProbeError> {
        let end = offset
            .checked_add(bytes)
            .ok_or_else(|| ProbeError::malformed(format!("{} extent overflows", what)))?;
        if end > self.byte_len() {
            return Err(ProbeError::malformed(format!(
                "{} extends to byte {} but the partition holds {}",
                what,
                end,
                self.byte_len()
            )));
        }
        Ok(())
    }
}
