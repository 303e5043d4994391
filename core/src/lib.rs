pub mod config;
pub mod device;
pub mod error;
pub mod filesystem;
pub mod image;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::ProbeConfig;
pub use device::{Partition, SectorAccessor};
pub use error::ProbeError;
pub use filesystem::{ChecksumPolicy, Extraction, FormatId, VolumeDescriptor};
pub use image::{MemoryImage, RawImage};
