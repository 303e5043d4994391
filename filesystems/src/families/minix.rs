// Minix filesystem (v1, v2, v3)
// Superblock is the second 1 KiB block. Byte order follows the machine that
// created the volume, so both orders are tried against the magic.

use crate::decoder::{Endian, FieldKind, FieldSpec, Layout, Record};
use crate::detection::{ByteOrderRule, LayoutDetector, LayoutVariant, Report};
use relic_core::{FormatId, ProbeError, VolumeDescriptor};

pub const MINIX_SUPERBLOCK_OFFSET: u64 = 0x400;
pub const MINIX_BLOCK_SIZE: u64 = 1024;

pub const MINIX_V1_MAGIC: u64 = 0x137F; // 14 char names
pub const MINIX_V1_MAGIC2: u64 = 0x138F; // 30 char names
pub const MINIX_V2_MAGIC: u64 = 0x2468;
pub const MINIX_V2_MAGIC2: u64 = 0x2478;
pub const MINIX_V3_MAGIC: u64 = 0x4D5A;

const MINIX_VALID_FS: u64 = 0x0001;
const MINIX_ERROR_FS: u64 = 0x0002;
const MAX_LOG_ZONE_SIZE: u64 = 10;

pub static MINIX_V1_V2_SUPERBLOCK: Layout = Layout {
    name: "Minix v1/v2 superblock",
    size: 0x18,
    fields: &[
        FieldSpec::new("ninodes", 0x00, FieldKind::U16),
        FieldSpec::new("nzones", 0x02, FieldKind::U16),
        FieldSpec::new("imap_blocks", 0x04, FieldKind::U16),
        FieldSpec::new("zmap_blocks", 0x06, FieldKind::U16),
        FieldSpec::new("firstdatazone", 0x08, FieldKind::U16),
        FieldSpec::new("log_zone_size", 0x0A, FieldKind::U16),
        FieldSpec::new("max_size", 0x0C, FieldKind::U32),
        FieldSpec::new("magic", 0x10, FieldKind::U16),
        FieldSpec::new("state", 0x12, FieldKind::U16),
        FieldSpec::new("zones", 0x14, FieldKind::U32),
    ],
};

pub static MINIX_V3_SUPERBLOCK: Layout = Layout {
    name: "Minix v3 superblock",
    size: 0x20,
    fields: &[
        FieldSpec::new("ninodes", 0x00, FieldKind::U32),
        FieldSpec::new("imap_blocks", 0x06, FieldKind::U16),
        FieldSpec::new("zmap_blocks", 0x08, FieldKind::U16),
        FieldSpec::new("firstdatazone", 0x0A, FieldKind::U16),
        FieldSpec::new("log_zone_size", 0x0C, FieldKind::U16),
        FieldSpec::new("max_size", 0x10, FieldKind::U32),
        FieldSpec::new("zones", 0x14, FieldKind::U32),
        FieldSpec::new("magic", 0x18, FieldKind::U16),
        FieldSpec::new("blocksize", 0x1C, FieldKind::U16),
        FieldSpec::new("disk_version", 0x1E, FieldKind::U8),
    ],
};

fn is_v1(magic: u64) -> bool {
    magic == MINIX_V1_MAGIC || magic == MINIX_V1_MAGIC2
}

fn v1_v2_magic(record: &Record) -> bool {
    matches!(
        record.unsigned("magic"),
        Ok(MINIX_V1_MAGIC | MINIX_V1_MAGIC2 | MINIX_V2_MAGIC | MINIX_V2_MAGIC2)
    )
}

/// Zone count: v1 keeps it in the 16-bit field, v2 in the 32-bit one
fn v1_v2_zones(record: &Record) -> Result<u64, ProbeError> {
    if is_v1(record.unsigned("magic")?) {
        record.unsigned("nzones")
    } else {
        record.unsigned("zones")
    }
}

fn check_common(record: &Record, zones: u64) -> Result<(), ProbeError> {
    if record.unsigned("ninodes")? == 0 {
        return Err(ProbeError::malformed("Minix volume has no inodes"));
    }
    if zones == 0 {
        return Err(ProbeError::malformed("Minix volume has no zones"));
    }
    let log_zone_size = record.unsigned("log_zone_size")?;
    if log_zone_size > MAX_LOG_ZONE_SIZE {
        return Err(ProbeError::malformed(format!(
            "log zone size {} exceeds {}",
            log_zone_size, MAX_LOG_ZONE_SIZE
        )));
    }
    if record.unsigned("imap_blocks")? == 0 || record.unsigned("zmap_blocks")? == 0 {
        return Err(ProbeError::malformed("Minix bitmaps are empty"));
    }
    if record.unsigned("firstdatazone")? >= zones {
        return Err(ProbeError::malformed("first data zone lies past the last zone"));
    }
    Ok(())
}

fn v1_v2_sanity(record: &Record) -> Result<(), ProbeError> {
    check_common(record, v1_v2_zones(record)?)
}

fn v1_v2_declared_bytes(record: &Record) -> Result<u64, ProbeError> {
    let zone_size = MINIX_BLOCK_SIZE << record.unsigned("log_zone_size")?;
    v1_v2_zones(record)?
        .checked_mul(zone_size)
        .ok_or_else(|| ProbeError::malformed("volume size overflows"))
}

fn describe_common(
    record: &Record,
    report: &mut Report,
    fs_type: &str,
    block_size: u64,
    zones: u64,
) -> VolumeDescriptor {
    let mut descriptor = VolumeDescriptor::new(FormatId::MINIX, fs_type);
    let log_zone_size = record.unsigned("log_zone_size").unwrap_or(0);
    descriptor.cluster_size = (block_size << log_zone_size) as u32;
    descriptor.clusters = zones;

    if let Ok(inodes) = record.unsigned("ninodes") {
        report.field("Inodes", inodes);
    }
    if let Ok(first) = record.unsigned("firstdatazone") {
        report.field("First data zone", first);
    }
    if let Ok(max_size) = record.unsigned("max_size") {
        report.field("Maximum file size", max_size);
    }
    descriptor
}

fn v1_v2_describe(record: &Record, report: &mut Report) -> VolumeDescriptor {
    let magic = record.unsigned("magic").unwrap_or(0);
    let fs_type = match magic {
        MINIX_V1_MAGIC => "Minix v1 (14 char names)",
        MINIX_V1_MAGIC2 => "Minix v1 (30 char names)",
        MINIX_V2_MAGIC => "Minix v2 (14 char names)",
        _ => "Minix v2 (30 char names)",
    };
    let zones = v1_v2_zones(record).unwrap_or(0);
    let mut descriptor = describe_common(record, report, fs_type, MINIX_BLOCK_SIZE, zones);

    let state = record.unsigned("state").unwrap_or(MINIX_VALID_FS);
    descriptor.dirty = state & MINIX_VALID_FS == 0;
    if state & MINIX_ERROR_FS != 0 {
        report.line("Errors were detected on this volume");
    }
    descriptor
}

fn v3_magic(record: &Record) -> bool {
    record.unsigned("magic").ok() == Some(MINIX_V3_MAGIC)
}

fn v3_block_size(record: &Record) -> Result<u64, ProbeError> {
    let block_size = record.unsigned("blocksize")?;
    if !block_size.is_power_of_two() || !(1024..=32768).contains(&block_size) {
        return Err(ProbeError::malformed(format!(
            "Minix v3 block size {} is not supported",
            block_size
        )));
    }
    Ok(block_size)
}

fn v3_sanity(record: &Record) -> Result<(), ProbeError> {
    v3_block_size(record)?;
    check_common(record, record.unsigned("zones")?)
}

fn v3_declared_bytes(record: &Record) -> Result<u64, ProbeError> {
    let zone_size = v3_block_size(record)? << record.unsigned("log_zone_size")?;
    record
        .unsigned("zones")?
        .checked_mul(zone_size)
        .ok_or_else(|| ProbeError::malformed("volume size overflows"))
}

fn v3_describe(record: &Record, report: &mut Report) -> VolumeDescriptor {
    let block_size = record.unsigned("blocksize").unwrap_or(MINIX_BLOCK_SIZE);
    let zones = record.unsigned("zones").unwrap_or(0);
    if let Ok(version) = record.unsigned("disk_version") {
        report.field("Disk version", version);
    }
    describe_common(record, report, "Minix v3", block_size, zones)
}

// v3 keeps other fields at the v1/v2 magic offset, so v1/v2 goes first
pub static MINIX_VARIANTS: [LayoutVariant; 2] = [
    LayoutVariant {
        layout: &MINIX_V1_V2_SUPERBLOCK,
        byte_order: ByteOrderRule::Detect { first: Endian::Little },
        magic: v1_v2_magic,
        sanity: v1_v2_sanity,
        declared_bytes: v1_v2_declared_bytes,
        checksum: None,
        describe: v1_v2_describe,
    },
    LayoutVariant {
        layout: &MINIX_V3_SUPERBLOCK,
        byte_order: ByteOrderRule::Detect { first: Endian::Little },
        magic: v3_magic,
        sanity: v3_sanity,
        declared_bytes: v3_declared_bytes,
        checksum: None,
        describe: v3_describe,
    },
];

pub fn detector() -> LayoutDetector {
    LayoutDetector {
        id: FormatId::MINIX,
        name: "Minix filesystem",
        offsets: &[MINIX_SUPERBLOCK_OFFSET],
        variants: &MINIX_VARIANTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FormatDetector;
    use crate::device_reader::PartitionReader;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::{MemoryImage, Partition};

    /// 1440 KiB Minix v1 floppy
    fn v1_image(endian: Endian) -> MemoryImage {
        let put16 = |b: ImageBuilder, at: usize, v: u16| match endian {
            Endian::Big => b.u16_be(0x400 + at, v),
            Endian::Little => b.u16_le(0x400 + at, v),
        };
        let mut b = ImageBuilder::new(2880, 512);
        b = put16(b, 0x00, 480);
        b = put16(b, 0x02, 1440);
        b = put16(b, 0x04, 1);
        b = put16(b, 0x06, 1);
        b = put16(b, 0x08, 20);
        b = put16(b, 0x10, MINIX_V1_MAGIC2 as u16);
        put16(b, 0x12, MINIX_VALID_FS as u16).build()
    }

    fn v3_image() -> MemoryImage {
        ImageBuilder::new(8192, 512)
            .u32_le(0x400, 1024)
            .u16_le(0x406, 1)
            .u16_le(0x408, 1)
            .u16_le(0x40A, 40)
            .u32_le(0x410, 0x7FFF_FFFF)
            .u32_le(0x414, 1024)
            .u16_le(0x418, MINIX_V3_MAGIC as u16)
            .u16_le(0x41C, 4096)
            .build()
    }

    fn extract(image: &MemoryImage) -> relic_core::Extraction {
        let partition = Partition::whole(image);
        detector().extract(&PartitionReader::new(image, &partition))
    }

    #[test]
    fn test_v1_either_byte_order() {
        let little = extract(&v1_image(Endian::Little));
        let big = extract(&v1_image(Endian::Big));

        assert!(little.complete && big.complete);
        assert_eq!(little.descriptor, big.descriptor);
        assert_eq!(little.descriptor.fs_type, "Minix v1 (30 char names)");
        assert_eq!(little.descriptor.clusters, 1440);
        assert_eq!(little.descriptor.cluster_size, 1024);
        assert!(!little.descriptor.dirty);
        assert!(big.report.contains("big-endian"));
    }

    #[test]
    fn test_v3() {
        let extraction = extract(&v3_image());
        assert!(extraction.complete);
        assert_eq!(extraction.descriptor.fs_type, "Minix v3");
        assert_eq!(extraction.descriptor.cluster_size, 4096);
        assert_eq!(extraction.descriptor.total_bytes(), 4 * 1024 * 1024);
    }

    #[test]
    fn test_unmounted_cleanly_flag() {
        let image = ImageBuilder::new(2880, 512)
            .u16_le(0x400, 480)
            .u16_le(0x402, 1440)
            .u16_le(0x404, 1)
            .u16_le(0x406, 1)
            .u16_le(0x408, 20)
            .u16_le(0x410, MINIX_V1_MAGIC as u16)
            .build();
        assert!(extract(&image).descriptor.dirty);
    }

    #[test]
    fn test_magic_without_sane_fields() {
        let image = ImageBuilder::new(2880, 512)
            .u16_le(0x410, MINIX_V1_MAGIC as u16)
            .build();
        let partition = Partition::whole(&image);
        assert!(!detector().identify(&PartitionReader::new(&image, &partition)));
        assert!(!extract(&image).complete);
    }
}
