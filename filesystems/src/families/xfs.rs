// XFS
// Primary superblock at the start of allocation group 0, always big-endian.
// Version 5 superblocks carry a CRC-32C over the whole first sector.

use crate::checksum::crc32c_sector;
use crate::decoder::{Endian, FieldKind, FieldSpec, Layout, Record};
use crate::detection::{ByteOrderRule, ChecksumRule, LayoutDetector, LayoutVariant, Report};
use crate::device_reader::PartitionReader;
use relic_core::{ChecksumPolicy, FormatId, ProbeError, VolumeDescriptor};

pub const XFS_MAGIC: u64 = 0x5846_5342; // "XFSB"
pub const XFS_CRC_OFFSET: usize = 0xE0;
pub const XFS_VERSION_MASK: u64 = 0x000F;
pub const XFS_VERSION_5: u64 = 5;

pub const XFS_MIN_SECTLOG: u64 = 9;
pub const XFS_MAX_SECTLOG: u64 = 15;
pub const XFS_MIN_BLOCKLOG: u64 = 9;
pub const XFS_MAX_BLOCKLOG: u64 = 16;

pub static XFS_SUPERBLOCK: Layout = Layout {
    name: "XFS superblock",
    size: 0xE4,
    fields: &[
        FieldSpec::new("magicnum", 0x00, FieldKind::U32),
        FieldSpec::new("blocksize", 0x04, FieldKind::U32),
        FieldSpec::new("dblocks", 0x08, FieldKind::U64),
        FieldSpec::new("rblocks", 0x10, FieldKind::U64),
        FieldSpec::new("uuid", 0x20, FieldKind::Uuid),
        FieldSpec::new("logstart", 0x30, FieldKind::U64),
        FieldSpec::new("rootino", 0x38, FieldKind::U64),
        FieldSpec::new("agblocks", 0x54, FieldKind::U32),
        FieldSpec::new("agcount", 0x58, FieldKind::U32),
        FieldSpec::new("logblocks", 0x60, FieldKind::U32),
        FieldSpec::new("versionnum", 0x64, FieldKind::U16),
        FieldSpec::new("sectsize", 0x66, FieldKind::U16),
        FieldSpec::new("inodesize", 0x68, FieldKind::U16),
        FieldSpec::new("fname", 0x6C, FieldKind::CString(12)),
        FieldSpec::new("blocklog", 0x78, FieldKind::U8),
        FieldSpec::new("sectlog", 0x79, FieldKind::U8),
        FieldSpec::new("inodelog", 0x7A, FieldKind::U8),
        FieldSpec::new("inprogress", 0x7E, FieldKind::U8),
        FieldSpec::new("icount", 0x80, FieldKind::U64),
        FieldSpec::new("ifree", 0x88, FieldKind::U64),
        FieldSpec::new("fdblocks", 0x90, FieldKind::U64),
        // Little-endian on disk regardless of the superblock byte order
        FieldSpec::new("crc", 0xE0, FieldKind::Bytes(4)),
    ],
};

fn magic(record: &Record) -> bool {
    record.unsigned("magicnum").ok() == Some(XFS_MAGIC)
}

fn version(record: &Record) -> u64 {
    record.unsigned("versionnum").map(|v| v & XFS_VERSION_MASK).unwrap_or(0)
}

fn sanity(record: &Record) -> Result<(), ProbeError> {
    let sectlog = record.unsigned("sectlog")?;
    if !(XFS_MIN_SECTLOG..=XFS_MAX_SECTLOG).contains(&sectlog) {
        return Err(ProbeError::malformed(format!(
            "sector size log {} outside {}..={}",
            sectlog, XFS_MIN_SECTLOG, XFS_MAX_SECTLOG
        )));
    }
    if record.unsigned("sectsize")? != 1 << sectlog {
        return Err(ProbeError::malformed("sector size does not match its log"));
    }

    let blocklog = record.unsigned("blocklog")?;
    if !(XFS_MIN_BLOCKLOG..=XFS_MAX_BLOCKLOG).contains(&blocklog) {
        return Err(ProbeError::malformed(format!(
            "block size log {} outside {}..={}",
            blocklog, XFS_MIN_BLOCKLOG, XFS_MAX_BLOCKLOG
        )));
    }
    if record.unsigned("blocksize")? != 1 << blocklog {
        return Err(ProbeError::malformed("block size does not match its log"));
    }

    if !(1..=XFS_VERSION_5).contains(&version(record)) {
        return Err(ProbeError::malformed(format!(
            "unknown superblock version {}",
            version(record)
        )));
    }
    if record.unsigned("agcount")? == 0 || record.unsigned("agblocks")? == 0 {
        return Err(ProbeError::malformed("no allocation groups"));
    }

    let dblocks = record.unsigned("dblocks")?;
    if dblocks == 0 || record.unsigned("fdblocks")? > dblocks {
        return Err(ProbeError::malformed("free block count exceeds volume size"));
    }
    if record.unsigned("ifree")? > record.unsigned("icount")? {
        return Err(ProbeError::malformed("free inode count exceeds allocated inodes"));
    }
    Ok(())
}

fn declared_bytes(record: &Record) -> Result<u64, ProbeError> {
    record
        .unsigned("dblocks")?
        .checked_mul(record.unsigned("blocksize")?)
        .ok_or_else(|| ProbeError::malformed("volume size overflows"))
}

/// CRC-32C of the whole superblock sector; only v5 superblocks carry one
fn verify_crc(
    reader: &PartitionReader<'_>,
    offset: u64,
    record: &Record,
) -> Result<Option<(u32, u32)>, ProbeError> {
    if version(record) != XFS_VERSION_5 {
        return Ok(None);
    }
    let stored = match record.bytes("crc")? {
        &[a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
        _ => return Err(ProbeError::malformed("XFS checksum field is not 4 bytes")),
    };
    let sector = reader.read_at(offset, record.unsigned("sectsize")? as usize)?;
    Ok(Some((stored, crc32c_sector(&sector, XFS_CRC_OFFSET))))
}

fn describe(record: &Record, report: &mut Report) -> VolumeDescriptor {
    let version = version(record);
    let mut descriptor = VolumeDescriptor::new(FormatId::XFS, format!("XFS v{}", version));

    let dblocks = record.unsigned("dblocks").unwrap_or(0);
    descriptor.cluster_size = record.unsigned("blocksize").unwrap_or(0) as u32;
    descriptor.clusters = dblocks;
    descriptor.free_clusters = record.unsigned("fdblocks").ok();
    if let (Ok(icount), Ok(ifree)) = (record.unsigned("icount"), record.unsigned("ifree")) {
        descriptor.files = Some(icount.saturating_sub(ifree));
    }
    descriptor.volume_name = record
        .text("fname")
        .ok()
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    descriptor.volume_serial = record
        .uuid("uuid")
        .ok()
        .filter(|uuid| !uuid.is_nil())
        .map(|uuid| uuid.hyphenated().to_string());
    descriptor.dirty = record.unsigned("inprogress").unwrap_or(0) != 0;

    if let (Ok(count), Ok(blocks)) = (record.unsigned("agcount"), record.unsigned("agblocks")) {
        report.field("Allocation groups", format!("{} of {} blocks", count, blocks));
    }
    if let Ok(sectsize) = record.unsigned("sectsize") {
        report.field("Sector size", sectsize);
    }
    if let Ok(inodesize) = record.unsigned("inodesize") {
        report.field("Inode size", inodesize);
    }
    if let (Ok(start), Ok(blocks)) = (record.unsigned("logstart"), record.unsigned("logblocks")) {
        if start == 0 {
            report.line("Journal is on an external device");
        } else {
            report.field("Journal", format!("{} blocks at block {}", blocks, start));
        }
    }
    if record.unsigned("rblocks").unwrap_or(0) != 0 {
        report.line("Volume has a realtime section");
    }
    descriptor
}

pub static XFS_VARIANTS: [LayoutVariant; 1] = [LayoutVariant {
    layout: &XFS_SUPERBLOCK,
    byte_order: ByteOrderRule::Fixed(Endian::Big),
    magic,
    sanity,
    declared_bytes,
    checksum: Some(ChecksumRule {
        structure: "XFS superblock",
        policy: ChecksumPolicy::Warn,
        verify: verify_crc,
    }),
    describe,
}];

pub fn detector() -> LayoutDetector {
    LayoutDetector {
        id: FormatId::XFS,
        name: "XFS",
        offsets: &[0],
        variants: &XFS_VARIANTS,
    }
}
