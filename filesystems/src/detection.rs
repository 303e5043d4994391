// Format detector contract and the generic layout-driven detector

use crate::decoder::{decode, decode_either_endian, Endian, Layout, Record};
use crate::device_reader::PartitionReader;
use log::{debug, info, warn};
use relic_core::{ChecksumPolicy, Extraction, FormatId, ProbeError, VolumeDescriptor};
use std::fmt::Display;

/// One on-disk format.
///
/// `identify` must be pure and total: the same bytes always give the same
/// answer and every failure (short partition, bad read, bad field) is a
/// plain `false`. `extract` does not trust that `identify` ran; when the
/// header no longer validates it returns whatever it could still decode.
pub trait FormatDetector: Send + Sync {
    fn id(&self) -> FormatId;

    /// Human-readable format name
    fn name(&self) -> &'static str;

    fn identify(&self, reader: &PartitionReader<'_>) -> bool;

    fn extract(&self, reader: &PartitionReader<'_>) -> Extraction;
}

/// Collects the human-readable report handed to the rendering layer
#[derive(Debug, Default)]
pub struct Report {
    text: String,
}

impl Report {
    pub fn new(title: impl AsRef<str>) -> Self {
        let mut report = Self::default();
        report.line(title);
        report
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    pub fn field(&mut self, label: &str, value: impl Display) {
        self.line(format!("{}: {}", label, value));
    }

    /// Append the fields every descriptor shares
    pub fn summarize(&mut self, descriptor: &VolumeDescriptor) {
        if let Some(name) = &descriptor.volume_name {
            self.field("Volume name", name);
        }
        if let Some(serial) = &descriptor.volume_serial {
            self.field("Volume serial", serial);
        }
        self.field(
            "Volume size",
            format!(
                "{} clusters of {} bytes ({} bytes)",
                descriptor.clusters,
                descriptor.cluster_size,
                descriptor.total_bytes()
            ),
        );
        if let Some(free) = descriptor.free_clusters {
            self.field("Free clusters", free);
        }
        if let Some(files) = descriptor.files {
            self.field("Files", files);
        }
        if let Some(date) = descriptor.creation_date {
            self.field("Created", date);
        }
        if let Some(date) = descriptor.modification_date {
            self.field("Last modified", date);
        }
        if let Some(date) = descriptor.backup_date {
            self.field("Last backed up", date);
        }
        if descriptor.dirty {
            self.line("Volume is dirty");
        }
        if descriptor.bootable {
            self.line("Volume is bootable");
        }
    }

    pub fn finish(self) -> String {
        self.text
    }
}

/// How the byte order of a layout is established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrderRule {
    Fixed(Endian),
    /// Try `first`, fall back to the other order when the magic fails
    Detect { first: Endian },
}

/// Checksum carried by a layout
pub struct ChecksumRule {
    pub structure: &'static str,
    pub policy: ChecksumPolicy,
    /// `(stored, computed)` for the structure at the given byte offset, or
    /// `None` when this particular record carries no checksum
    pub verify: fn(&PartitionReader<'_>, u64, &Record) -> Result<Option<(u32, u32)>, ProbeError>,
}

/// One recognisable shape of a format's header
pub struct LayoutVariant {
    pub layout: &'static Layout,
    pub byte_order: ByteOrderRule,
    pub magic: fn(&Record) -> bool,
    /// Legal ranges of numeric header fields
    pub sanity: fn(&Record) -> Result<(), ProbeError>,
    /// Bytes the volume claims to occupy from the partition start
    pub declared_bytes: fn(&Record) -> Result<u64, ProbeError>,
    pub checksum: Option<ChecksumRule>,
    /// Field to descriptor mapping; may add format details to the report
    pub describe: fn(&Record, &mut Report) -> VolumeDescriptor,
}

/// A detector built from data: candidate offsets plus layout variants.
///
/// Offsets are tried in order and, at each offset, variants in order. The
/// first record whose magic matches and whose fields are sane wins.
pub struct LayoutDetector {
    pub id: FormatId,
    pub name: &'static str,
    pub offsets: &'static [u64],
    pub variants: &'static [LayoutVariant],
}

struct Located {
    offset: u64,
    variant: &'static LayoutVariant,
    record: Record,
}

struct Validated {
    located: Located,
    checksum_warning: Option<String>,
}

impl LayoutDetector {
    fn decode_variant(variant: &LayoutVariant, raw: &[u8]) -> Result<Record, ProbeError> {
        match variant.byte_order {
            ByteOrderRule::Fixed(endian) => {
                let record = decode(raw, variant.layout, endian)?;
                if (variant.magic)(&record) {
                    Ok(record)
                } else {
                    Err(ProbeError::malformed(format!("{} magic not found", variant.layout.name)))
                }
            }
            ByteOrderRule::Detect { first } => {
                decode_either_endian(raw, variant.layout, first, variant.magic)
            }
        }
    }

    fn locate(&self, reader: &PartitionReader<'_>) -> Result<Located, ProbeError> {
        let mut last_error = ProbeError::malformed(format!("no {} header found", self.name));

        for &offset in self.offsets {
            for variant in self.variants {
                let raw = match reader.read_at(offset, variant.layout.size) {
                    Ok(raw) => raw,
                    Err(e) => {
                        last_error = e;
                        continue;
                    }
                };
                let record = match Self::decode_variant(variant, &raw) {
                    Ok(record) => record,
                    Err(e) => {
                        last_error = e;
                        continue;
                    }
                };
                if let Err(e) = (variant.sanity)(&record) {
                    debug!("{}: magic at {:#x} but {}", self.name, offset, e);
                    last_error = e;
                    continue;
                }
                return Ok(Located {
                    offset,
                    variant,
                    record,
                });
            }
        }
        Err(last_error)
    }

    fn validate(&self, reader: &PartitionReader<'_>) -> Result<Validated, ProbeError> {
        let located = self.locate(reader)?;
        let variant = located.variant;

        let mut checksum_warning = None;
        if let Some(rule) = &variant.checksum {
            let verified = (rule.verify)(reader, located.offset, &located.record)?;
            if let Some((stored, computed)) = verified {
                if stored != computed {
                    let mismatch = ProbeError::ChecksumMismatch {
                        structure: rule.structure,
                        stored,
                        computed,
                    };
                    match rule.policy {
                        ChecksumPolicy::Reject => return Err(mismatch),
                        ChecksumPolicy::Warn => {
                            warn!("{}: {}, volume may be corrupt", self.name, mismatch);
                            checksum_warning = Some(format!("{}; volume may be corrupt", mismatch));
                        }
                    }
                }
            }
        }

        let declared = (variant.declared_bytes)(&located.record)?;
        reader.check_extent(variant.layout.name, 0, declared)?;

        Ok(Validated {
            located,
            checksum_warning,
        })
    }

    fn describe(&self, located: &Located) -> (VolumeDescriptor, Report) {
        let mut report = Report::new(self.name);
        report.field("Structure", located.variant.layout.name);
        report.field("Location", format!("byte {:#x}", located.offset));
        report.field("Byte order", located.record.endian());
        let descriptor = (located.variant.describe)(&located.record, &mut report);
        report.summarize(&descriptor);
        (descriptor, report)
    }
}

impl FormatDetector for LayoutDetector {
    fn id(&self) -> FormatId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn identify(&self, reader: &PartitionReader<'_>) -> bool {
        match self.validate(reader) {
            Ok(validated) => {
                info!(
                    "{} found at byte {:#x} ({})",
                    self.name,
                    validated.located.offset,
                    validated.located.record.endian()
                );
                true
            }
            Err(e) if e.is_non_match() => {
                debug!("{} rejected: {}", self.name, e);
                false
            }
            Err(e) => {
                warn!("{} probe failed: {}", self.name, e);
                false
            }
        }
    }

    fn extract(&self, reader: &PartitionReader<'_>) -> Extraction {
        match self.validate(reader) {
            Ok(validated) => {
                let (descriptor, mut report) = self.describe(&validated.located);
                match validated.checksum_warning {
                    Some(warning) => {
                        report.line(format!("Information may be incorrect: {}", warning));
                        Extraction::complete(descriptor, report.finish()).with_warning(warning)
                    }
                    None => Extraction::complete(descriptor, report.finish()),
                }
            }
            Err(validation_error) => match self.locate(reader) {
                // Header is recognisable but fails a later check
                Ok(located) => {
                    let (descriptor, mut report) = self.describe(&located);
                    let reason = validation_error.to_string();
                    report.line(format!("Information may be incorrect: {}", reason));
                    Extraction {
                        descriptor,
                        report: report.finish(),
                        warnings: vec![reason],
                        complete: false,
                    }
                }
                Err(e) => {
                    Extraction::partial(VolumeDescriptor::new(self.id, self.name), e.to_string())
                }
            },
        }
    }
}
