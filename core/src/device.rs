use serde::{Deserialize, Serialize};
use std::io;

/// A contiguous run of sectors on an image, as handed over by the
/// partition-table layer. All LBAs are absolute (relative to the image).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// First sector of the partition
    pub start: u64,
    /// Last sector of the partition (inclusive)
    pub end: u64,
    /// Length in sectors
    pub length: u64,
    /// Sector size reported by the partition table, 0 when unknown
    pub sector_size_hint: u32,
}

impl Partition {
    /// `end` saturates at the top of the address space; reads past it are
    /// rejected by the reader, not here
    pub fn new(start: u64, length: u64, sector_size_hint: u32) -> Self {
        let end = match length {
            0 => start.saturating_sub(1),
            _ => start.saturating_add(length - 1),
        };
        Self {
            start,
            end,
            length,
            sector_size_hint,
        }
    }

    /// A partition spanning the whole image, used for unpartitioned media
    pub fn whole(image: &dyn SectorAccessor) -> Self {
        Self::new(0, image.total_sectors(), image.sector_size())
    }

    /// Number of sectors from `lba` (partition-relative) to the end
    pub fn remaining_from(&self, lba: u64) -> u64 {
        self.length.saturating_sub(lba)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Read-only sector access supplied by the image-container layer.
///
/// Implementations must tolerate concurrent reads: probes of different
/// partitions may run on different threads against the same accessor.
/// A read past the end of the medium may return fewer bytes than asked
/// for; callers check lengths before decoding.
pub trait SectorAccessor: Send + Sync {
    /// Physical sector size in bytes
    fn sector_size(&self) -> u32;

    /// Total number of sectors on the medium
    fn total_sectors(&self) -> u64;

    /// Read one sector at an absolute LBA
    fn read_sector(&self, lba: u64) -> io::Result<Vec<u8>>;

    /// Read `count` consecutive sectors into one buffer
    fn read_sectors(&self, lba: u64, count: u64) -> io::Result<Vec<u8>> {
        let capacity = count.saturating_mul(self.sector_size() as u64).min(1 << 24);
        let mut buffer = Vec::with_capacity(capacity as usize);
        for i in 0..count {
            let at = lba.checked_add(i).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "sector address overflow")
            })?;
            let sector = self.read_sector(at)?;
            let short = sector.len() < self.sector_size() as usize;
            buffer.extend_from_slice(&sector);
            if short {
                break;
            }
        }
        Ok(buffer)
    }

    /// Total size of the medium in bytes
    fn total_bytes(&self) -> u64 {
        self.total_sectors().saturating_mul(self.sector_size() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_bounds() {
        let partition = Partition::new(63, 100, 512);
        assert_eq!(partition.end, 162);
        assert_eq!(partition.remaining_from(0), 100);
        assert_eq!(partition.remaining_from(99), 1);
        assert_eq!(partition.remaining_from(150), 0);
    }

    #[test]
    fn test_empty_partition() {
        let partition = Partition::new(10, 0, 512);
        assert!(partition.is_empty());
        assert_eq!(partition.end, 9);
        assert_eq!(partition.remaining_from(0), 0);
    }

    #[test]
    fn test_partition_at_top_of_address_space() {
        let partition = Partition::new(u64::MAX, 2, 512);
        assert_eq!(partition.end, u64::MAX);
        assert_eq!(partition.length, 2);

        let partition = Partition::new(u64::MAX - 1, 8, 512);
        assert_eq!(partition.end, u64::MAX);
    }
}
