// Legacy filesystem detection and extraction
pub mod families;

pub mod checksum;
pub mod decoder;
pub mod detection;
pub mod device_reader;
pub mod registration;
pub mod registry;
pub mod timestamps;

pub use detection::{FormatDetector, LayoutDetector, Report};
pub use device_reader::PartitionReader;
pub use families::amiga::AmigaDetector;
pub use families::apple::{HfsDetector, HfsPlusDetector};
pub use registration::{builtin_detectors, builtin_registry, list_available_formats};
pub use registry::{DetectorRegistry, DetectorRegistryBuilder};

use relic_core::{Extraction, FormatId, Partition, ProbeError, SectorAccessor};

/// Identify the format of a partition with the built-in registry
pub fn try_identify(image: &dyn SectorAccessor, partition: &Partition) -> Option<FormatId> {
    builtin_registry().try_identify(image, partition)
}

/// Extract a volume descriptor with the built-in registry
pub fn extract(
    image: &dyn SectorAccessor,
    partition: &Partition,
    format: FormatId,
) -> Result<Extraction, ProbeError> {
    builtin_registry().extract(image, partition, format)
}
