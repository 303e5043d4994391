/// Helpers for assembling synthetic images in tests - never touches real media
use crate::image::MemoryImage;

/// Builds a zero-filled image and patches bytes in at absolute offsets
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    data: Vec<u8>,
    sector_size: u32,
}

impl ImageBuilder {
    pub fn new(sectors: u64, sector_size: u32) -> Self {
        Self {
            data: vec![0u8; (sectors * sector_size as u64) as usize],
            sector_size,
        }
    }

    pub fn bytes(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.put(offset, bytes);
        self
    }

    pub fn u16_be(self, offset: usize, value: u16) -> Self {
        self.bytes(offset, &value.to_be_bytes())
    }

    pub fn u32_be(self, offset: usize, value: u32) -> Self {
        self.bytes(offset, &value.to_be_bytes())
    }

    pub fn u64_be(self, offset: usize, value: u64) -> Self {
        self.bytes(offset, &value.to_be_bytes())
    }

    pub fn u16_le(self, offset: usize, value: u16) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    pub fn u32_le(self, offset: usize, value: u32) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    pub fn u64_le(self, offset: usize, value: u64) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    /// Writes a length-prefixed string
    pub fn pascal(self, offset: usize, text: &str) -> Self {
        let mut encoded = vec![text.len() as u8];
        encoded.extend_from_slice(text.as_bytes());
        self.bytes(offset, &encoded)
    }

    /// Mutable view of the image for checksum patching
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn build(self) -> MemoryImage {
        MemoryImage::new(self.data, self.sector_size)
    }

    /// Re-chunk the same bytes with another physical sector size
    pub fn build_with_sector_size(self, sector_size: u32) -> MemoryImage {
        MemoryImage::new(self.data, sector_size)
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(bytes);
    }
}
