use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Stable identifier of an on-disk format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(&'static str);

impl FormatId {
    pub const AMIGA_DOS: FormatId = FormatId("amiga-dos");
    pub const APPLE_HFS: FormatId = FormatId("hfs");
    pub const APPLE_HFS_PLUS: FormatId = FormatId("hfs+");
    pub const BEFS: FormatId = FormatId("befs");
    pub const MINIX: FormatId = FormatId("minix");
    pub const XFS: FormatId = FormatId("xfs");

    /// Identifier for detectors registered outside this crate family
    pub const fn custom(id: &'static str) -> Self {
        FormatId(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for FormatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// How a detector treats a checksum that does not verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChecksumPolicy {
    /// The structure is not recognised
    Reject,
    /// The structure is recognised and reported as possibly corrupt
    Warn,
}

/// Normalized description of a recognised volume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeDescriptor {
    pub format: FormatId,
    /// Human-readable type, e.g. "Amiga Fast File System"
    pub fs_type: String,
    pub cluster_size: u32,
    pub clusters: u64,
    pub free_clusters: Option<u64>,
    pub files: Option<u64>,
    pub volume_name: Option<String>,
    pub volume_serial: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
    pub backup_date: Option<DateTime<Utc>>,
    pub dirty: bool,
    pub bootable: bool,
}

impl VolumeDescriptor {
    /// An empty descriptor carrying only the type tag
    pub fn new(format: FormatId, fs_type: impl Into<String>) -> Self {
        Self {
            format,
            fs_type: fs_type.into(),
            cluster_size: 0,
            clusters: 0,
            free_clusters: None,
            files: None,
            volume_name: None,
            volume_serial: None,
            creation_date: None,
            modification_date: None,
            backup_date: None,
            dirty: false,
            bootable: false,
        }
    }

    /// Volume size in bytes as declared by the on-disk structure
    pub fn total_bytes(&self) -> u64 {
        self.clusters.saturating_mul(self.cluster_size as u64)
    }

    pub fn free_bytes(&self) -> Option<u64> {
        self.free_clusters
            .map(|free| free.saturating_mul(self.cluster_size as u64))
    }
}

/// Result of extracting a volume: descriptor, text report and any
/// "information may be incorrect" warnings collected on the way
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub descriptor: VolumeDescriptor,
    pub report: String,
    pub warnings: Vec<String>,
    /// False when header re-validation failed and only part of the
    /// descriptor could be filled in
    pub complete: bool,
}

impl Extraction {
    pub fn complete(descriptor: VolumeDescriptor, report: String) -> Self {
        Self {
            descriptor,
            report,
            warnings: Vec::new(),
            complete: true,
        }
    }

    /// A best-effort result for a volume whose header no longer validates
    pub fn partial(descriptor: VolumeDescriptor, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            report: format!("{}\nInformation may be incorrect: {}\n", descriptor.fs_type, reason),
            descriptor,
            warnings: vec![reason],
            complete: false,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn is_suspect(&self) -> bool {
        !self.complete || !self.warnings.is_empty()
    }
}
