// Apple HFS+ and HFSX (Mac OS Extended), bare or inside an HFS wrapper

use super::{
    header_at, is_wrapper, locate_header, volume_id, Located, ATTR_INCONSISTENT, ATTR_JOURNALED,
    ATTR_UNMOUNTED, HFSX_SIGNATURE, HFS_MDB, HFS_PLUS_HEADER, HFS_PLUS_SIGNATURE,
    HFS_SECTOR_SIZE,
};
use crate::decoder::Record;
use crate::detection::{FormatDetector, Report};
use crate::device_reader::PartitionReader;
use crate::timestamps::from_mac;
use log::{debug, info};
use relic_core::{Extraction, FormatId, ProbeError, VolumeDescriptor};

const HFS_PLUS_VERSION: u64 = 4;
const HFSX_VERSION: u64 = 5;

fn is_volume_header(record: &Record) -> bool {
    matches!(
        record.unsigned("signature"),
        Ok(HFS_PLUS_SIGNATURE | HFSX_SIGNATURE)
    )
}

struct Found {
    header: Located,
    /// MDB of the HFS wrapper, when the volume is embedded
    wrapper: Option<Located>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HfsPlusDetector;

impl HfsPlusDetector {
    /// The embedded volume starts `drAlBlSt` sectors plus `startBlock`
    /// allocation blocks into the wrapper
    fn embedded_header_offset(wrapper: &Located) -> Result<u64, ProbeError> {
        let mdb = &wrapper.record;
        let first_block = mdb.unsigned("drAlBlSt")? * HFS_SECTOR_SIZE;
        let start = mdb
            .unsigned("embedStartBlock")?
            .checked_mul(mdb.unsigned("drAlBlkSiz")?)
            .ok_or_else(|| ProbeError::malformed("embedded volume offset overflows"))?;
        Ok(wrapper.offset + first_block + start)
    }

    fn locate(reader: &PartitionReader<'_>) -> Result<Found, ProbeError> {
        if let Ok(header) = locate_header(reader, &HFS_PLUS_HEADER, is_volume_header) {
            return Ok(Found {
                header,
                wrapper: None,
            });
        }

        let wrapper = locate_header(reader, &HFS_MDB, is_wrapper)?;
        let offset = Self::embedded_header_offset(&wrapper)?;
        debug!(
            "HFS wrapper at byte {:#x} embeds a volume header at byte {:#x}",
            wrapper.offset, offset
        );
        let header = header_at(reader, offset, &HFS_PLUS_HEADER, is_volume_header)?;
        Ok(Found {
            header,
            wrapper: Some(wrapper),
        })
    }

    fn sanity(header: &Record) -> Result<(), ProbeError> {
        let signature = header.unsigned("signature")?;
        let version = header.unsigned("version")?;
        let expected = if signature == HFSX_SIGNATURE {
            HFSX_VERSION
        } else {
            HFS_PLUS_VERSION
        };
        if version != expected {
            return Err(ProbeError::malformed(format!(
                "volume header version {} does not match its signature",
                version
            )));
        }

        let block_size = header.unsigned("blockSize")?;
        if !block_size.is_power_of_two() || block_size < HFS_SECTOR_SIZE {
            return Err(ProbeError::malformed(format!(
                "allocation block size {} is not a power of two of at least {}",
                block_size, HFS_SECTOR_SIZE
            )));
        }
        let total = header.unsigned("totalBlocks")?;
        if total == 0 || header.unsigned("freeBlocks")? > total {
            return Err(ProbeError::malformed("free block count exceeds total blocks"));
        }
        Ok(())
    }

    fn validate(reader: &PartitionReader<'_>) -> Result<Found, ProbeError> {
        let found = Self::locate(reader)?;
        let header = &found.header.record;
        Self::sanity(header)?;

        let bytes = header
            .unsigned("totalBlocks")?
            .checked_mul(header.unsigned("blockSize")?)
            .ok_or_else(|| ProbeError::malformed("volume size overflows"))?;
        let (start, bytes) = found.header.volume_extent(bytes);
        reader.check_extent(HFS_PLUS_HEADER.name, start, bytes)?;
        Ok(found)
    }

    fn describe(found: &Found, report: &mut Report) -> VolumeDescriptor {
        let header = &found.header.record;
        let fs_type = if header.unsigned("signature").ok() == Some(HFSX_SIGNATURE) {
            "Mac OS Extended, case-sensitive (HFSX)"
        } else {
            "Mac OS Extended (HFS+)"
        };
        let mut descriptor = VolumeDescriptor::new(FormatId::APPLE_HFS_PLUS, fs_type);

        descriptor.cluster_size = header.unsigned("blockSize").unwrap_or(0) as u32;
        descriptor.clusters = header.unsigned("totalBlocks").unwrap_or(0);
        descriptor.free_clusters = header.unsigned("freeBlocks").ok();
        descriptor.files = header.unsigned("fileCount").ok();
        descriptor.volume_serial = volume_id(header);

        let date = |field: &str| header.unsigned(field).ok().and_then(|v| from_mac(v as u32));
        descriptor.creation_date = date("createDate");
        descriptor.modification_date = date("modifyDate");
        descriptor.backup_date = date("backupDate");

        let attributes = header.unsigned("attributes").unwrap_or(0);
        descriptor.dirty = attributes & ATTR_UNMOUNTED == 0 || attributes & ATTR_INCONSISTENT != 0;
        descriptor.bootable = header.unsigned("blessedFolder").unwrap_or(0) != 0;

        // The real name lives in the catalog; a wrapper carries a copy
        if let Some(wrapper) = &found.wrapper {
            descriptor.volume_name = wrapper
                .record
                .text("drVN")
                .ok()
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            report.field("HFS wrapper", format!("byte {:#x}", wrapper.offset));
        }

        report.field("Volume header", format!("byte {:#x}", found.header.offset));
        if let Ok(folders) = header.unsigned("folderCount") {
            report.field("Folders", folders);
        }
        if let Some(date) = date("checkedDate") {
            report.field("Last checked", date);
        }
        if let Ok(raw) = header.bytes("lastMountedVersion") {
            report.field("Last mounted by", String::from_utf8_lossy(raw));
        }
        if attributes & ATTR_JOURNALED != 0 {
            report.field(
                "Journal info block",
                header.unsigned("journalInfoBlock").unwrap_or(0),
            );
        }
        descriptor
    }
}

impl FormatDetector for HfsPlusDetector {
    fn id(&self) -> FormatId {
        FormatId::APPLE_HFS_PLUS
    }

    fn name(&self) -> &'static str {
        "Apple HFS+"
    }

    fn identify(&self, reader: &PartitionReader<'_>) -> bool {
        match Self::validate(reader) {
            Ok(found) => {
                info!(
                    "HFS+ volume header at byte {:#x}{}",
                    found.header.offset,
                    if found.wrapper.is_some() { " (wrapped)" } else { "" }
                );
                true
            }
            Err(e) => {
                debug!("HFS+ rejected: {}", e);
                false
            }
        }
    }

    fn extract(&self, reader: &PartitionReader<'_>) -> Extraction {
        let mut report = Report::new(self.name());
        match Self::validate(reader) {
            Ok(found) => {
                let descriptor = Self::describe(&found, &mut report);
                report.summarize(&descriptor);
                Extraction::complete(descriptor, report.finish())
            }
            Err(e) => match Self::locate(reader) {
                Ok(found) => {
                    let descriptor = Self::describe(&found, &mut report);
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
                    VolumeDescriptor::new(FormatId::APPLE_HFS_PLUS, "Mac OS Extended (HFS+)"),
                    e.to_string(),
                ),
            },
        }
    }
}
