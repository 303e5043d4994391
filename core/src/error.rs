use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Read out of range: sectors {lba}..{end} exceed bound {bound}")]
    OutOfRange { lba: u64, end: u64, bound: u64 },

    #[error("Short read at sector {lba}: expected {expected} bytes, got {actual}")]
    ShortRead { lba: u64, expected: usize, actual: usize },

    #[error("Malformed structure: {0}")]
    MalformedStructure(String),

    #[error("Checksum mismatch in {structure}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        structure: &'static str,
        stored: u32,
        computed: u32,
    },

    #[error("Ambiguous match: {} detectors claim the partition ({})", .0.len(), .0.join(", "))]
    AmbiguousMatch(Vec<String>),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Detector fault in {0}")]
    DetectorFault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProbeError {
    /// Shorthand for a `MalformedStructure` with a formatted reason
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProbeError::MalformedStructure(reason.into())
    }

    /// True for the failure classes that simply mean "not this format"
    pub fn is_non_match(&self) -> bool {
        matches!(
            self,
            ProbeError::OutOfRange { .. }
                | ProbeError::ShortRead { .. }
                | ProbeError::MalformedStructure(_)
                | ProbeError::ChecksumMismatch { .. }
        )
    }
}
