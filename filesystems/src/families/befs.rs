// Be File System
// The superblock is written in the byte order of the machine that made the
// volume (big-endian on PowerPC, little-endian on x86) so the byte order is
// found from the first magic number

use crate::decoder::{Endian, FieldKind, FieldSpec, Layout, Record};
use crate::detection::{ByteOrderRule, LayoutDetector, LayoutVariant, Report};
use relic_core::{FormatId, ProbeError, VolumeDescriptor};

pub const BEFS_MAGIC1: u64 = 0x4246_5331; // "BFS1"
pub const BEFS_MAGIC2: u64 = 0xDD12_1031;
pub const BEFS_MAGIC3: u64 = 0x15B6_830E;
pub const BEFS_ENDIAN: u64 = 0x4249_4745; // "BIGE"
pub const BEFS_CLEAN: u64 = 0x434C_454E; // "CLEN"
pub const BEFS_DIRTY: u64 = 0x4449_5254; // "DIRT"

/// Superblock sits at the start of block 0 (PowerPC) or after the x86
/// boot sector
pub const BEFS_SUPERBLOCK_OFFSETS: [u64; 2] = [0x000, 0x200];

pub static BEFS_SUPERBLOCK: Layout = Layout {
    name: "BeFS superblock",
    size: 0x84,
    fields: &[
        FieldSpec::new("name", 0x00, FieldKind::CString(32)),
        FieldSpec::new("magic1", 0x20, FieldKind::U32),
        FieldSpec::new("fs_byte_order", 0x24, FieldKind::U32),
        FieldSpec::new("block_size", 0x28, FieldKind::U32),
        FieldSpec::new("block_shift", 0x2C, FieldKind::U32),
        FieldSpec::new("num_blocks", 0x30, FieldKind::I64),
        FieldSpec::new("used_blocks", 0x38, FieldKind::I64),
        FieldSpec::new("inode_size", 0x40, FieldKind::I32),
        FieldSpec::new("magic2", 0x44, FieldKind::U32),
        FieldSpec::new("blocks_per_ag", 0x48, FieldKind::I32),
        FieldSpec::new("ag_shift", 0x4C, FieldKind::I32),
        FieldSpec::new("num_ags", 0x50, FieldKind::I32),
        FieldSpec::new("flags", 0x54, FieldKind::U32),
        FieldSpec::new("log_blocks", 0x58, FieldKind::Bytes(8)),
        FieldSpec::new("log_start", 0x60, FieldKind::I64),
        FieldSpec::new("log_end", 0x68, FieldKind::I64),
        FieldSpec::new("magic3", 0x70, FieldKind::U32),
        FieldSpec::new("root_dir", 0x74, FieldKind::Bytes(8)),
        FieldSpec::new("indices", 0x7C, FieldKind::Bytes(8)),
    ],
};

fn magic(record: &Record) -> bool {
    record.unsigned("magic1").ok() == Some(BEFS_MAGIC1)
}

fn sanity(record: &Record) -> Result<(), ProbeError> {
    if record.unsigned("magic2")? != BEFS_MAGIC2 || record.unsigned("magic3")? != BEFS_MAGIC3 {
        return Err(ProbeError::malformed("secondary BeFS magic numbers do not match"));
    }
    if record.unsigned("fs_byte_order")? != BEFS_ENDIAN {
        return Err(ProbeError::malformed("byte order marker does not match magic"));
    }

    let shift = record.unsigned("block_shift")?;
    if !(9..=16).contains(&shift) {
        return Err(ProbeError::malformed(format!("block shift {} outside 9..=16", shift)));
    }
    let block_size = record.unsigned("block_size")?;
    if block_size != 1 << shift {
        return Err(ProbeError::malformed(format!(
            "block size {} does not match shift {}",
            block_size, shift
        )));
    }

    let blocks = record.signed("num_blocks")?;
    let used = record.signed("used_blocks")?;
    if blocks <= 0 || used < 0 || used > blocks {
        return Err(ProbeError::malformed(format!(
            "{} of {} blocks in use",
            used, blocks
        )));
    }
    Ok(())
}

fn declared_bytes(record: &Record) -> Result<u64, ProbeError> {
    (record.signed("num_blocks")? as u64)
        .checked_mul(record.unsigned("block_size")?)
        .ok_or_else(|| ProbeError::malformed("volume size overflows"))
}

fn describe(record: &Record, report: &mut Report) -> VolumeDescriptor {
    let mut descriptor = VolumeDescriptor::new(FormatId::BEFS, "Be File System");

    let blocks = record.signed("num_blocks").unwrap_or(0).max(0) as u64;
    let used = record.signed("used_blocks").unwrap_or(0).max(0) as u64;
    descriptor.cluster_size = record.unsigned("block_size").unwrap_or(0) as u32;
    descriptor.clusters = blocks;
    descriptor.free_clusters = Some(blocks.saturating_sub(used));
    descriptor.volume_name = record
        .text("name")
        .ok()
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    match record.unsigned("flags") {
        Ok(BEFS_CLEAN) => {}
        Ok(BEFS_DIRTY) => descriptor.dirty = true,
        Ok(other) => report.field("Unknown volume flags", format!("{:#010x}", other)),
        Err(_) => {}
    }

    if let Ok(inode_size) = record.signed("inode_size") {
        report.field("Inode size", inode_size);
    }
    if let (Ok(ags), Ok(per_ag)) = (record.signed("num_ags"), record.signed("blocks_per_ag")) {
        report.field("Allocation groups", format!("{} of {} blocks", ags, per_ag));
    }
    if let (Ok(start), Ok(end)) = (record.signed("log_start"), record.signed("log_end")) {
        if start != end {
            report.line("Journal contains uncommitted transactions");
        }
    }
    descriptor
}

pub static BEFS_VARIANTS: [LayoutVariant; 1] = [LayoutVariant {
    layout: &BEFS_SUPERBLOCK,
    byte_order: ByteOrderRule::Detect { first: Endian::Little },
    magic,
    sanity,
    declared_bytes,
    checksum: None,
    describe,
}];

pub fn detector() -> LayoutDetector {
    LayoutDetector {
        id: FormatId::BEFS,
        name: "Be File System",
        offsets: &BEFS_SUPERBLOCK_OFFSETS,
        variants: &BEFS_VARIANTS,
    }
}
