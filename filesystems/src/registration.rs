use crate::detection::FormatDetector;
use crate::families::amiga::AmigaDetector;
use crate::families::apple::{HfsDetector, HfsPlusDetector};
use crate::families::{befs, minix, xfs};
use crate::registry::DetectorRegistry;
use once_cell::sync::Lazy;
use relic_core::{FormatId, ProbeConfig};
use std::sync::Arc;

/// Built-in detectors in dispatch order.
///
/// HFS+ comes before HFS: an HFS wrapper carrying an embedded HFS+ volume
/// is turned down by the HFS detector itself, so the order only matters for
/// the first-match mode without ambiguity detection.
pub fn builtin_detectors() -> Vec<Arc<dyn FormatDetector>> {
    vec![
        // AmigaDOS - boot block at sector 0, root block mid-volume
        Arc::new(AmigaDetector),
        // HFS+ / HFSX - volume header at 0x400, bare or wrapped
        Arc::new(HfsPlusDetector),
        // HFS - MDB at 0x400
        Arc::new(HfsDetector),
        // BeFS - superblock at 0x000 or 0x200, either byte order
        Arc::new(befs::detector()),
        // Minix v1/v2/v3 - superblock at 0x400, either byte order
        Arc::new(minix::detector()),
        // XFS - superblock at 0x000, big-endian, CRC on v5
        Arc::new(xfs::detector()),
    ]
}

static BUILTIN_REGISTRY: Lazy<DetectorRegistry> =
    Lazy::new(|| DetectorRegistry::from_config(&ProbeConfig::default()));

/// Process-wide registry with every built-in detector and default settings
pub fn builtin_registry() -> &'static DetectorRegistry {
    &BUILTIN_REGISTRY
}

/// Format id and name of every built-in detector, in dispatch order
pub fn list_available_formats() -> Vec<(FormatId, &'static str)> {
    builtin_detectors()
        .iter()
        .map(|detector| (detector.id(), detector.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let ids: Vec<_> = list_available_formats().into_iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec![
                FormatId::AMIGA_DOS,
                FormatId::APPLE_HFS_PLUS,
                FormatId::APPLE_HFS,
                FormatId::BEFS,
                FormatId::MINIX,
                FormatId::XFS,
            ]
        );
        assert_eq!(builtin_registry().formats(), ids);
    }
}
