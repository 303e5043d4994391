// Apple HFS family
// HFS and HFS+ both keep their volume header 1 KiB into the volume. An
// HFS+ volume may sit inside an HFS "wrapper", in which case the wrapper's
// MDB names the embedded volume and only the HFS+ detector may claim it.

pub mod hfs;
pub mod hfs_plus;

use crate::decoder::{decode, Endian, FieldKind, FieldSpec, Layout, Record};
use crate::device_reader::{PartitionReader, OPTICAL_SUB_OFFSETS};
use log::trace;
use relic_core::ProbeError;

pub use hfs::HfsDetector;
pub use hfs_plus::HfsPlusDetector;

/// Byte offset of the MDB / volume header from the start of the volume
pub const HFS_HEADER_OFFSET: u64 = 0x400;
/// HFS allocation block start (`drAlBlSt`) is counted in these
pub const HFS_SECTOR_SIZE: u64 = 512;

pub const HFS_SIGNATURE: u64 = 0x4244; // "BD"
pub const HFS_PLUS_SIGNATURE: u64 = 0x482B; // "H+"
pub const HFSX_SIGNATURE: u64 = 0x4858; // "HX"
pub const HFS_BOOT_SIGNATURE: &[u8; 2] = b"LK";

pub const ATTR_UNMOUNTED: u64 = 0x0100;
pub const ATTR_INCONSISTENT: u64 = 0x0800;
pub const ATTR_JOURNALED: u64 = 0x2000;

/// Master Directory Block
pub static HFS_MDB: Layout = Layout {
    name: "HFS master directory block",
    size: 0x82,
    fields: &[
        FieldSpec::new("drSigWord", 0x00, FieldKind::U16),
        FieldSpec::new("drCrDate", 0x02, FieldKind::U32),
        FieldSpec::new("drLsMod", 0x06, FieldKind::U32),
        FieldSpec::new("drAtrb", 0x0A, FieldKind::U16),
        FieldSpec::new("drNmFls", 0x0C, FieldKind::U16),
        FieldSpec::new("drNmAlBlks", 0x12, FieldKind::U16),
        FieldSpec::new("drAlBlkSiz", 0x14, FieldKind::U32),
        FieldSpec::new("drAlBlSt", 0x1C, FieldKind::U16),
        FieldSpec::new("drFreeBks", 0x22, FieldKind::U16),
        FieldSpec::new("drVN", 0x24, FieldKind::PascalString(27)),
        FieldSpec::new("drVolBkUp", 0x40, FieldKind::U32),
        FieldSpec::new("drWrCnt", 0x46, FieldKind::U32),
        FieldSpec::new("drFilCnt", 0x54, FieldKind::U32),
        FieldSpec::new("drDirCnt", 0x58, FieldKind::U32),
        FieldSpec::new("blessedFolder", 0x5C, FieldKind::U32),
        FieldSpec::new("volumeId", 0x74, FieldKind::SplitU64 { low: 0x78 }),
        FieldSpec::new("drEmbedSigWord", 0x7C, FieldKind::U16),
        FieldSpec::new("embedStartBlock", 0x7E, FieldKind::U16),
        FieldSpec::new("embedBlockCount", 0x80, FieldKind::U16),
    ],
};

/// HFS+ / HFSX volume header
pub static HFS_PLUS_HEADER: Layout = Layout {
    name: "HFS+ volume header",
    size: 0x70,
    fields: &[
        FieldSpec::new("signature", 0x00, FieldKind::U16),
        FieldSpec::new("version", 0x02, FieldKind::U16),
        FieldSpec::new("attributes", 0x04, FieldKind::U32),
        FieldSpec::new("lastMountedVersion", 0x08, FieldKind::Bytes(4)),
        FieldSpec::new("journalInfoBlock", 0x0C, FieldKind::U32),
        FieldSpec::new("createDate", 0x10, FieldKind::U32),
        FieldSpec::new("modifyDate", 0x14, FieldKind::U32),
        FieldSpec::new("backupDate", 0x18, FieldKind::U32),
        FieldSpec::new("checkedDate", 0x1C, FieldKind::U32),
        FieldSpec::new("fileCount", 0x20, FieldKind::U32),
        FieldSpec::new("folderCount", 0x24, FieldKind::U32),
        FieldSpec::new("blockSize", 0x28, FieldKind::U32),
        FieldSpec::new("totalBlocks", 0x2C, FieldKind::U32),
        FieldSpec::new("freeBlocks", 0x30, FieldKind::U32),
        FieldSpec::new("writeCount", 0x44, FieldKind::U32),
        FieldSpec::new("blessedFolder", 0x50, FieldKind::U32),
        FieldSpec::new("volumeId", 0x68, FieldKind::SplitU64 { low: 0x6C }),
    ],
};

/// A header found on the medium and the partition-relative byte offset it
/// was found at
pub struct Located {
    pub offset: u64,
    pub record: Record,
}

impl Located {
    /// Start of the volume the header belongs to. `None` when the header
    /// sits less than 1 KiB into the partition (an optical sub-offset below
    /// 0x400), so the volume and its boot blocks begin before the partition.
    pub fn volume_base(&self) -> Option<u64> {
        self.offset.checked_sub(HFS_HEADER_OFFSET)
    }

    /// Partition byte extent `(start, len)` covered by a volume of `bytes`
    /// bytes, leaving out whatever precedes the partition start
    pub fn volume_extent(&self, bytes: u64) -> (u64, u64) {
        match self.volume_base() {
            Some(base) => (base, bytes),
            None => (0, bytes.saturating_sub(HFS_HEADER_OFFSET - self.offset)),
        }
    }
}

/// Decode `layout` at `offset` and keep it only if `accept` agrees
pub fn header_at(
    reader: &PartitionReader<'_>,
    offset: u64,
    layout: &'static Layout,
    accept: fn(&Record) -> bool,
) -> Result<Located, ProbeError> {
    let raw = reader.read_at(offset, layout.size)?;
    let record = decode(&raw, layout, Endian::Big)?;
    if !accept(&record) {
        return Err(ProbeError::malformed(format!(
            "no {} signature at byte {:#x}",
            layout.name, offset
        )));
    }
    Ok(Located { offset, record })
}

/// Find the header 1 KiB into the partition.
///
/// On optical media the first two physical sectors are searched at every
/// sub-offset where a 512-byte-sector layout can land; the first accepted
/// window wins.
pub fn locate_header(
    reader: &PartitionReader<'_>,
    layout: &'static Layout,
    accept: fn(&Record) -> bool,
) -> Result<Located, ProbeError> {
    if !reader.is_optical() {
        return header_at(reader, HFS_HEADER_OFFSET, layout, accept);
    }

    let found = reader.find_at_sub_offsets(0, 2, &OPTICAL_SUB_OFFSETS, layout.size, |window| {
        decode(window, layout, Endian::Big).ok().filter(|record| accept(record))
    })?;
    match found {
        Some((offset, record)) => {
            trace!("{} at byte {:#x} of optical medium", layout.name, offset);
            Ok(Located { offset, record })
        }
        None => Err(ProbeError::malformed(format!(
            "no {} in the first two sectors",
            layout.name
        ))),
    }
}

pub fn is_hfs_mdb(record: &Record) -> bool {
    record.unsigned("drSigWord").ok() == Some(HFS_SIGNATURE)
}

/// MDB of a wrapper that embeds an HFS+ volume
pub fn is_wrapper(record: &Record) -> bool {
    is_hfs_mdb(record) && record.unsigned("drEmbedSigWord").ok() == Some(HFS_PLUS_SIGNATURE)
}

/// Finder info volume identifier, as 16 hex digits; absent when zero
pub fn volume_id(record: &Record) -> Option<String> {
    record
        .unsigned("volumeId")
        .ok()
        .filter(|&id| id != 0)
        .map(|id| hex::encode_upper(id.to_be_bytes()))
}

/// Boot blocks precede the header and start with "LK" when bootable.
/// A header with no room for them before it has none.
pub fn has_boot_blocks(reader: &PartitionReader<'_>, located: &Located) -> bool {
    let Some(base) = located.volume_base() else {
        return false;
    };
    reader
        .read_at(base, HFS_BOOT_SIGNATURE.len())
        .map(|sig| sig == HFS_BOOT_SIGNATURE)
        .unwrap_or(false)
}
