// AmigaDOS (OFS/FFS)
// Boot block at the start of the partition, root block in the middle of the
// volume. Everything is big-endian.

use crate::checksum::{carry_around_checksum, negated_block_sum};
use crate::decoder::{Endian, FieldReader};
use crate::detection::{FormatDetector, Report};
use crate::device_reader::PartitionReader;
use crate::timestamps::from_amiga;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use relic_core::{Extraction, FormatId, ProbeError, VolumeDescriptor};

pub const AMIGA_BOOT_BLOCK_SIZE: usize = 1024;
pub const AMIGA_BOOT_CHECKSUM_OFFSET: usize = 0x04;
pub const AMIGA_ROOT_CHECKSUM_OFFSET: usize = 0x14;
pub const AMIGA_RESERVED_BLOCKS: u64 = 2;
pub const AMIGA_MIN_BLOCK_SIZE: u64 = 512;

const T_HEADER: u32 = 2;
const ST_ROOT: u32 = 1;
const BITMAP_VALID: u32 = 0xFFFF_FFFF;
const MAX_NAME_LEN: usize = 30;

// Root block fields counted back from the end of the block
const BM_FLAG_FROM_END: usize = 200;
const ROOT_ALTERED_FROM_END: usize = 92;
const NAME_FROM_END: usize = 80;
const VOLUME_ALTERED_FROM_END: usize = 40;
const CREATED_FROM_END: usize = 28;
const SEC_TYPE_FROM_END: usize = 4;

fn flavour_name(flavour: u8) -> &'static str {
    match flavour {
        0 => "Amiga Original File System",
        1 => "Amiga Fast File System",
        2 => "Amiga Original File System (international)",
        3 => "Amiga Fast File System (international)",
        4 => "Amiga Original File System (directory cache)",
        5 => "Amiga Fast File System (directory cache)",
        6 => "Amiga Original File System (long filenames)",
        _ => "Amiga Fast File System (long filenames)",
    }
}

struct BootBlock {
    flavour: u8,
    stored_checksum: u32,
    computed_checksum: u32,
    root_pointer: u32,
    has_code: bool,
}

impl BootBlock {
    fn read(reader: &PartitionReader<'_>) -> Result<Self, ProbeError> {
        let raw = reader.read_at(0, AMIGA_BOOT_BLOCK_SIZE)?;
        if &raw[0..3] != b"DOS" {
            return Err(ProbeError::malformed("no DOS signature in boot block"));
        }
        let flavour = raw[3];
        if flavour > 7 {
            return Err(ProbeError::malformed(format!("unknown DOS type {}", flavour)));
        }

        let fields = FieldReader::new(&raw, Endian::Big);
        Ok(Self {
            flavour,
            stored_checksum: fields.u32(AMIGA_BOOT_CHECKSUM_OFFSET)?,
            computed_checksum: carry_around_checksum(&raw, AMIGA_BOOT_CHECKSUM_OFFSET),
            root_pointer: fields.u32(0x08)?,
            has_code: raw[12..].iter().any(|&b| b != 0),
        })
    }

    fn checksum_valid(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}

struct RootBlock {
    block: u64,
    stored_checksum: u32,
    computed_checksum: u32,
    bitmap_valid: bool,
    name: String,
    root_altered: Option<DateTime<Utc>>,
    volume_altered: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
}

impl RootBlock {
    fn read(
        reader: &PartitionReader<'_>,
        block: u64,
        block_size: usize,
    ) -> Result<Self, ProbeError> {
        let raw = reader.read_at(block.saturating_mul(block_size as u64), block_size)?;
        let fields = FieldReader::new(&raw, Endian::Big);

        if fields.u32(0x00)? != T_HEADER || fields.u32(block_size - SEC_TYPE_FROM_END)? != ST_ROOT {
            return Err(ProbeError::malformed(format!("block {} is not a root block", block)));
        }
        if fields.u32(0x04)? != 0 || fields.u32(0x08)? != 0 {
            return Err(ProbeError::malformed("root block header key is not zero"));
        }
        let ht_size = fields.u32(0x0C)? as usize;
        if ht_size != block_size / 4 - 56 {
            return Err(ProbeError::malformed(format!(
                "root hash table size {} does not fit a {}-byte block",
                ht_size, block_size
            )));
        }

        let date = |from_end: usize| -> Result<Option<DateTime<Utc>>, ProbeError> {
            let at = block_size - from_end;
            Ok(from_amiga(fields.u32(at)?, fields.u32(at + 4)?, fields.u32(at + 8)?))
        };

        Ok(Self {
            block,
            stored_checksum: fields.u32(AMIGA_ROOT_CHECKSUM_OFFSET)?,
            computed_checksum: negated_block_sum(&raw, AMIGA_ROOT_CHECKSUM_OFFSET),
            bitmap_valid: fields.u32(block_size - BM_FLAG_FROM_END)? == BITMAP_VALID,
            name: fields.pascal_string(block_size - NAME_FROM_END, MAX_NAME_LEN)?,
            root_altered: date(ROOT_ALTERED_FROM_END)?,
            volume_altered: date(VOLUME_ALTERED_FROM_END)?,
            created: date(CREATED_FROM_END)?,
        })
    }

    fn checksum_valid(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}

struct Volume {
    boot: BootBlock,
    root: RootBlock,
    block_size: u64,
    blocks: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AmigaDetector;

impl AmigaDetector {
    fn block_size(reader: &PartitionReader<'_>) -> u64 {
        (reader.sector_size() as u64).max(AMIGA_MIN_BLOCK_SIZE)
    }

    /// Root block from the boot block pointer, or the middle of the volume
    /// when the pointer lies outside the partition
    fn root_location(boot: &BootBlock, blocks: u64) -> u64 {
        let pointer = boot.root_pointer as u64;
        if (AMIGA_RESERVED_BLOCKS..blocks).contains(&pointer) {
            pointer
        } else {
            let computed = (blocks - 1 + AMIGA_RESERVED_BLOCKS) / 2;
            debug!(
                "AmigaDOS root pointer {} outside {} blocks, using block {}",
                pointer, blocks, computed
            );
            computed
        }
    }

    /// Both blocks decoded and shape-checked; checksums are left to the caller
    fn inspect(&self, reader: &PartitionReader<'_>) -> Result<Volume, ProbeError> {
        let boot = BootBlock::read(reader)?;

        let block_size = Self::block_size(reader);
        let blocks = reader.byte_len() / block_size;
        if blocks <= AMIGA_RESERVED_BLOCKS {
            return Err(ProbeError::malformed(format!(
                "{} blocks leave no room for a root block",
                blocks
            )));
        }

        let root_block = Self::root_location(&boot, blocks);
        let root = RootBlock::read(reader, root_block, block_size as usize)?;
        Ok(Volume {
            boot,
            root,
            block_size,
            blocks,
        })
    }

    fn describe(volume: &Volume, report: &mut Report) -> VolumeDescriptor {
        let mut descriptor =
            VolumeDescriptor::new(FormatId::AMIGA_DOS, flavour_name(volume.boot.flavour));
        descriptor.cluster_size = volume.block_size as u32;
        descriptor.clusters = volume.blocks;
        descriptor.volume_name = Some(volume.root.name.clone()).filter(|name| !name.is_empty());
        descriptor.creation_date = volume.root.created;
        descriptor.modification_date = volume.root.volume_altered;
        descriptor.dirty = !volume.root.bitmap_valid;
        descriptor.bootable = volume.boot.checksum_valid() && volume.boot.has_code;

        report.field("DOS type", format!("DOS\\{}", volume.boot.flavour));
        report.field("Root block", volume.root.block);
        if let Some(date) = volume.root.root_altered {
            report.field("Root directory altered", date);
        }
        descriptor
    }
}

impl FormatDetector for AmigaDetector {
    fn id(&self) -> FormatId {
        FormatId::AMIGA_DOS
    }

    fn name(&self) -> &'static str {
        "AmigaDOS"
    }

    fn identify(&self, reader: &PartitionReader<'_>) -> bool {
        let volume = match self.inspect(reader) {
            Ok(volume) => volume,
            Err(e) => {
                debug!("AmigaDOS rejected: {}", e);
                return false;
            }
        };
        if !volume.root.checksum_valid() {
            debug!(
                "AmigaDOS rejected: root block checksum {:#010x}, expected {:#010x}",
                volume.root.stored_checksum, volume.root.computed_checksum
            );
            return false;
        }
        info!(
            "AmigaDOS DOS\\{} found, root block {}",
            volume.boot.flavour, volume.root.block
        );
        true
    }

    fn extract(&self, reader: &PartitionReader<'_>) -> Extraction {
        let volume = match self.inspect(reader) {
            Ok(volume) => volume,
            Err(e) => {
                let fs_type = BootBlock::read(reader)
                    .map(|boot| flavour_name(boot.flavour))
                    .unwrap_or("AmigaDOS");
                return Extraction::partial(
                    VolumeDescriptor::new(FormatId::AMIGA_DOS, fs_type),
                    e.to_string(),
                );
            }
        };

        let mut report = Report::new(self.name());
        let descriptor = Self::describe(&volume, &mut report);
        report.summarize(&descriptor);

        let mut warnings = Vec::new();
        if !volume.boot.checksum_valid() {
            let mismatch = ProbeError::ChecksumMismatch {
                structure: "AmigaDOS boot block",
                stored: volume.boot.stored_checksum,
                computed: volume.boot.computed_checksum,
            };
            warn!("{}, boot block may be corrupt", mismatch);
            warnings.push(format!("{}; boot block may be corrupt", mismatch));
        }
        let root_valid = volume.root.checksum_valid();
        if !root_valid {
            let mismatch = ProbeError::ChecksumMismatch {
                structure: "AmigaDOS root block",
                stored: volume.root.stored_checksum,
                computed: volume.root.computed_checksum,
            };
            warnings.push(mismatch.to_string());
        }
        for warning in &warnings {
            report.line(format!("Information may be incorrect: {}", warning));
        }

        Extraction {
            descriptor,
            report: report.finish(),
            warnings,
            complete: root_valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::{MemoryImage, Partition};

    const ROOT: usize = 880 * 512;

    /// 880 KiB double-density floppy with a valid FFS boot and root block
    fn floppy() -> ImageBuilder {
        let mut builder = ImageBuilder::new(1760, 512)
            .bytes(0, b"DOS\x01")
            .u32_be(0x08, 880)
            .bytes(0x0C, &[0x43, 0xFA, 0x00, 0x18])
            .u32_be(ROOT, T_HEADER)
            .u32_be(ROOT + 0x0C, 72)
            .u32_be(ROOT + 512 - BM_FLAG_FROM_END, BITMAP_VALID)
            .pascal(ROOT + 512 - NAME_FROM_END, "Workbench")
            .u32_be(ROOT + 512 - VOLUME_ALTERED_FROM_END, 5000)
            .u32_be(ROOT + 512 - CREATED_FROM_END, 4000)
            .u32_be(ROOT + 512 - SEC_TYPE_FROM_END, ST_ROOT);
        seal(&mut builder);
        builder
    }

    fn seal(builder: &mut ImageBuilder) {
        let boot = carry_around_checksum(&builder.data()[..1024], 4);
        builder.data_mut()[4..8].copy_from_slice(&boot.to_be_bytes());
        let root = negated_block_sum(&builder.data()[ROOT..ROOT + 512], 0x14);
        builder.data_mut()[ROOT + 0x14..ROOT + 0x18].copy_from_slice(&root.to_be_bytes());
    }

    fn run(image: &MemoryImage) -> (bool, Extraction) {
        let partition = Partition::whole(image);
        let reader = PartitionReader::new(image, &partition);
        (AmigaDetector.identify(&reader), AmigaDetector.extract(&reader))
    }

    #[test]
    fn test_floppy() {
        let (found, extraction) = run(&floppy().build());
        assert!(found);
        assert!(extraction.complete);
        assert!(extraction.warnings.is_empty());

        let descriptor = &extraction.descriptor;
        assert_eq!(descriptor.fs_type, "Amiga Fast File System");
        assert_eq!(descriptor.volume_name.as_deref(), Some("Workbench"));
        assert_eq!(descriptor.clusters, 1760);
        assert!(descriptor.bootable);
        assert!(!descriptor.dirty);
        assert!(descriptor.creation_date < descriptor.modification_date);
    }

    #[test]
    fn test_root_checksum_rejects() {
        let mut builder = floppy();
        builder.data_mut()[ROOT + 0x100] = 1;
        let (found, extraction) = run(&builder.build());

        assert!(!found);
        // Still readable, flagged as suspect
        assert!(!extraction.complete);
        assert_eq!(extraction.descriptor.volume_name.as_deref(), Some("Workbench"));
    }

    #[test]
    fn test_boot_checksum_only_warns() {
        let mut builder = floppy();
        builder.data_mut()[0x100] = 1;
        let (found, extraction) = run(&builder.build());

        assert!(found);
        assert!(extraction.complete);
        assert_eq!(extraction.warnings.len(), 1);
        assert!(!extraction.descriptor.bootable);
    }

    #[test]
    fn test_root_pointer_fallback() {
        let mut builder = floppy().u32_be(0x08, 0xFFFF);
        seal(&mut builder);
        let (found, extraction) = run(&builder.build());
        assert!(found);
        assert!(extraction.report.contains("Root block: 880"));
    }

    #[test]
    fn test_unknown_dos_type() {
        let (found, extraction) = run(&floppy().bytes(3, &[9]).build());
        assert!(!found);
        assert!(!extraction.complete);
    }

    #[test]
    fn test_boot_block_alone() {
        // Reference boot block: "DOS\0", root 880, no code
        let image = ImageBuilder::new(1760, 512)
            .bytes(0, b"DOS\0")
            .u32_be(4, 0xBBB0_A98F)
            .u32_be(8, 880)
            .build();
        let (found, extraction) = run(&image);
        assert!(!found);
        assert_eq!(extraction.descriptor.fs_type, "Amiga Original File System");
    }
}
