// Apple HFS (Mac OS Standard)

use super::{
    has_boot_blocks, is_hfs_mdb, is_wrapper, locate_header, volume_id, Located, ATTR_UNMOUNTED,
    HFS_MDB, HFS_SECTOR_SIZE,
};
use crate::detection::{FormatDetector, Report};
use crate::device_reader::PartitionReader;
use crate::timestamps::from_mac;
use log::{debug, info};
use relic_core::{Extraction, FormatId, ProbeError, VolumeDescriptor};

const FS_TYPE: &str = "Hierarchical File System (HFS)";

#[derive(Debug, Default, Clone, Copy)]
pub struct HfsDetector;

impl HfsDetector {
    fn sanity(located: &Located) -> Result<(), ProbeError> {
        let mdb = &located.record;
        let block_size = mdb.unsigned("drAlBlkSiz")?;
        if block_size == 0 || block_size % HFS_SECTOR_SIZE != 0 {
            return Err(ProbeError::malformed(format!(
                "allocation block size {} is not a multiple of {}",
                block_size, HFS_SECTOR_SIZE
            )));
        }
        let blocks = mdb.unsigned("drNmAlBlks")?;
        if blocks == 0 {
            return Err(ProbeError::malformed("volume has no allocation blocks"));
        }
        if mdb.unsigned("drFreeBks")? > blocks {
            return Err(ProbeError::malformed("more free blocks than allocation blocks"));
        }
        Ok(())
    }

    /// Bytes from the volume start to the end of the last allocation block
    fn declared_bytes(located: &Located) -> Result<u64, ProbeError> {
        let mdb = &located.record;
        let first_block = mdb.unsigned("drAlBlSt")? * HFS_SECTOR_SIZE;
        mdb.unsigned("drNmAlBlks")?
            .checked_mul(mdb.unsigned("drAlBlkSiz")?)
            .and_then(|bytes| bytes.checked_add(first_block))
            .ok_or_else(|| ProbeError::malformed("volume size overflows"))
    }

    fn validate(reader: &PartitionReader<'_>) -> Result<Located, ProbeError> {
        let located = locate_header(reader, &HFS_MDB, is_hfs_mdb)?;
        if is_wrapper(&located.record) {
            return Err(ProbeError::malformed(
                "MDB wraps an embedded HFS+ volume, deferring to HFS+",
            ));
        }
        Self::sanity(&located)?;
        let (start, bytes) = located.volume_extent(Self::declared_bytes(&located)?);
        reader.check_extent(HFS_MDB.name, start, bytes)?;
        Ok(located)
    }

    fn describe(
        reader: &PartitionReader<'_>,
        located: &Located,
        report: &mut Report,
    ) -> VolumeDescriptor {
        let mdb = &located.record;
        let mut descriptor = VolumeDescriptor::new(FormatId::APPLE_HFS, FS_TYPE);

        descriptor.cluster_size = mdb.unsigned("drAlBlkSiz").unwrap_or(0) as u32;
        descriptor.clusters = mdb.unsigned("drNmAlBlks").unwrap_or(0);
        descriptor.free_clusters = mdb.unsigned("drFreeBks").ok();
        descriptor.files = mdb.unsigned("drFilCnt").ok();
        descriptor.volume_name = mdb
            .text("drVN")
            .ok()
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        descriptor.volume_serial = volume_id(mdb);

        let date = |field: &str| mdb.unsigned(field).ok().and_then(|v| from_mac(v as u32));
        descriptor.creation_date = date("drCrDate");
        descriptor.modification_date = date("drLsMod");
        descriptor.backup_date = date("drVolBkUp");

        descriptor.dirty = mdb.unsigned("drAtrb").unwrap_or(0) & ATTR_UNMOUNTED == 0;
        descriptor.bootable = has_boot_blocks(reader, located)
            || mdb.unsigned("blessedFolder").unwrap_or(0) != 0;

        report.field("Master directory block", format!("byte {:#x}", located.offset));
        if let Ok(folders) = mdb.unsigned("drDirCnt") {
            report.field("Folders", folders);
        }
        if let Ok(root_files) = mdb.unsigned("drNmFls") {
            report.field("Files in root folder", root_files);
        }
        if let Ok(writes) = mdb.unsigned("drWrCnt") {
            report.field("Write count", writes);
        }
        descriptor
    }
}

impl FormatDetector for HfsDetector {
    fn id(&self) -> FormatId {
        FormatId::APPLE_HFS
    }

    fn name(&self) -> &'static str {
        "Apple HFS"
    }

    fn identify(&self, reader: &PartitionReader<'_>) -> bool {
        match Self::validate(reader) {
            Ok(located) => {
                info!("HFS master directory block at byte {:#x}", located.offset);
                true
            }
            Err(e) => {
                debug!("HFS rejected: {}", e);
                false
            }
        }
    }

    fn extract(&self, reader: &PartitionReader<'_>) -> Extraction {
        let mut report = Report::new(self.name());
        match Self::validate(reader) {
            Ok(located) => {
                let descriptor = Self::describe(reader, &located, &mut report);
                report.summarize(&descriptor);
                Extraction::complete(descriptor, report.finish())
            }
            Err(e) => match locate_header(reader, &HFS_MDB, is_hfs_mdb) {
                Ok(located) => {
                    let descriptor = Self::describe(reader, &located, &mut report);
                    report.summarize(&descriptor);
                    let reason = e.to_string();
                    report.line(format!("Information may be incorrect: {}", reason));
                    Extraction {
                        descriptor,
                        report: report.finish(),
                        warnings: vec![reason],
                        complete: false,
                    }
                }
                Err(_) => Extraction::partial(
                    VolumeDescriptor::new(FormatId::APPLE_HFS, FS_TYPE),
                    e.to_string(),
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{hfs_builder, mdb_builder};
    use super::super::HFS_PLUS_SIGNATURE;
    use super::*;
    use chrono::Datelike;
    use relic_core::{MemoryImage, Partition};

    fn run(image: &MemoryImage) -> (bool, Extraction) {
        let partition = Partition::whole(image);
        let reader = PartitionReader::new(image, &partition);
        (HfsDetector.identify(&reader), HfsDetector.extract(&reader))
    }

    #[test]
    fn test_hfs_volume() {
        let (found, extraction) = run(&hfs_builder(0).build());
        assert!(found);
        assert!(extraction.complete);

        let descriptor = &extraction.descriptor;
        assert_eq!(descriptor.volume_name.as_deref(), Some("Macintosh HD"));
        assert_eq!(descriptor.cluster_size, 4096);
        assert_eq!(descriptor.clusters, 1000);
        assert_eq!(descriptor.free_clusters, Some(250));
        assert_eq!(descriptor.files, Some(42));
        assert_eq!(descriptor.creation_date.map(|d| d.year()), Some(2000));
        assert_eq!(descriptor.volume_serial.as_deref(), Some("0123456789ABCDEF"));
        assert!(!descriptor.dirty);
        assert!(!descriptor.bootable);
    }

    #[test]
    fn test_optical_matches_hard_disk() {
        let disk = run(&hfs_builder(0).build()).1;
        let optical = run(&hfs_builder(0).build_with_sector_size(2048)).1;
        assert!(optical.complete);
        assert_eq!(disk.descriptor, optical.descriptor);
    }

    #[test]
    fn test_defers_to_embedded_hfs_plus() {
        let image = hfs_builder(0).u16_be(0x47C, HFS_PLUS_SIGNATURE as u16).build();
        let (found, _) = run(&image);
        assert!(!found);
    }

    #[test]
    fn test_boot_blocks_make_it_bootable() {
        let (_, extraction) = run(&hfs_builder(0).bytes(0, b"LK").build());
        assert!(extraction.descriptor.bootable);
    }

    #[test]
    fn test_mdb_at_start_of_optical_sector() {
        // "LK" at byte 0 belongs to whatever precedes the volume, not to it
        let image = mdb_builder(0x200).bytes(0, b"LK").build_with_sector_size(2048);
        let (found, extraction) = run(&image);
        assert!(found);
        assert!(extraction.complete);
        assert!(!extraction.descriptor.bootable);
        assert_eq!(extraction.descriptor.volume_name.as_deref(), Some("Macintosh HD"));
    }

    #[test]
    fn test_block_size_not_sector_multiple() {
        let (found, extraction) = run(&hfs_builder(0).u32_be(0x414, 1000).build());
        assert!(!found);
        assert!(!extraction.complete);
        assert_eq!(extraction.descriptor.volume_name.as_deref(), Some("Macintosh HD"));
    }

    #[test]
    fn test_volume_larger_than_partition() {
        let image = hfs_builder(0).build();
        let partition = Partition::new(0, 2048, 512);
        assert!(!HfsDetector.identify(&PartitionReader::new(&image, &partition)));
    }
}
