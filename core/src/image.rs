// Sector accessors for flat images
// Container formats are handled elsewhere; these cover raw dumps and buffers

use crate::device::SectorAccessor;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// An image held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryImage {
    data: Vec<u8>,
    sector_size: u32,
}

impl MemoryImage {
    /// A zero sector size falls back to [`DEFAULT_SECTOR_SIZE`]
    pub fn new(data: Vec<u8>, sector_size: u32) -> Self {
        let sector_size = match sector_size {
            0 => {
                tracing::warn!(
                    "Zero sector size for in-memory image, using {}",
                    DEFAULT_SECTOR_SIZE
                );
                DEFAULT_SECTOR_SIZE
            }
            size => size,
        };
        Self { data, sector_size }
    }

    /// A zero-filled image of `sectors` sectors
    pub fn zeroed(sectors: u64, sector_size: u32) -> Self {
        let mut image = Self::new(Vec::new(), sector_size);
        image.data = vec![0u8; sectors.saturating_mul(image.sector_size as u64) as usize];
        image
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl SectorAccessor for MemoryImage {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// A trailing partial sector still counts, reads of it come back short
    fn total_sectors(&self) -> u64 {
        let size = self.sector_size as u64;
        (self.data.len() as u64 + size - 1) / size
    }

    fn read_sector(&self, lba: u64) -> io::Result<Vec<u8>> {
        self.read_sectors(lba, 1)
    }

    fn read_sectors(&self, lba: u64, count: u64) -> io::Result<Vec<u8>> {
        let size = self.sector_size as u64;
        let start = lba.checked_mul(size).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "sector offset overflow")
        })?;
        if start >= self.data.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("sector {} is past the end of the image", lba),
            ));
        }
        let end = start
            .saturating_add(count.saturating_mul(size))
            .min(self.data.len() as u64);
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}

/// A raw (dd-style) image file read with positional reads.
///
/// The file handle sits behind a mutex so one image can serve probes
/// running on several threads.
pub struct RawImage {
    file: Mutex<File>,
    length: u64,
    sector_size: u32,
}

impl RawImage {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open_with_sector_size(path, DEFAULT_SECTOR_SIZE)
    }

    pub fn open_with_sector_size<P: AsRef<Path>>(path: P, sector_size: u32) -> io::Result<Self> {
        if sector_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "sector size must be non-zero"));
        }
        let file = File::open(path.as_ref())?;
        let length = file.metadata()?.len();
        tracing::debug!(
            "Opened raw image {} ({} bytes, {} byte sectors)",
            path.as_ref().display(),
            length,
            sector_size
        );
        Ok(Self {
            file: Mutex::new(file),
            length,
            sector_size,
        })
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl SectorAccessor for RawImage {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn total_sectors(&self) -> u64 {
        let size = self.sector_size as u64;
        (self.length + size - 1) / size
    }

    fn read_sector(&self, lba: u64) -> io::Result<Vec<u8>> {
        self.read_sectors(lba, 1)
    }

    fn read_sectors(&self, lba: u64, count: u64) -> io::Result<Vec<u8>> {
        let size = self.sector_size as u64;
        let offset = lba.checked_mul(size).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "sector offset overflow")
        })?;
        if offset >= self.length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("sector {} is past the end of the image", lba),
            ));
        }
        let wanted = count.saturating_mul(size).min(self.length - offset);

        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "image handle poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = Vec::with_capacity(wanted as usize);
        (&mut *file).take(wanted).read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}
