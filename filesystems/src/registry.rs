// Detector registry and dispatcher
// Immutable once built, so one registry can serve probes on many threads

use crate::detection::FormatDetector;
use crate::device_reader::PartitionReader;
use log::{debug, error, info, warn};
use relic_core::{Extraction, FormatId, Partition, ProbeConfig, ProbeError, SectorAccessor};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Ordered set of detectors.
///
/// Every detector is asked about every partition so that a second claimant
/// surfaces as [`ProbeError::AmbiguousMatch`] rather than being hidden by
/// registration order. Generic formats that wrap more specific ones defer
/// to them inside their own `identify`; the registry never breaks ties.
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn FormatDetector>>,
    detect_ambiguity: bool,
    isolate_panics: bool,
}

pub struct DetectorRegistryBuilder {
    detectors: Vec<Arc<dyn FormatDetector>>,
    detect_ambiguity: bool,
    isolate_panics: bool,
}

impl DetectorRegistryBuilder {
    /// Append a detector. A detector with an id that is already registered
    /// replaces the earlier one in its position.
    pub fn register(mut self, detector: Arc<dyn FormatDetector>) -> Self {
        let id = detector.id();
        match self.detectors.iter().position(|d| d.id() == id) {
            Some(index) => {
                warn!("Replacing detector for {}", id);
                self.detectors[index] = detector;
            }
            None => self.detectors.push(detector),
        }
        self
    }

    pub fn detect_ambiguity(mut self, enabled: bool) -> Self {
        self.detect_ambiguity = enabled;
        self
    }

    pub fn isolate_panics(mut self, enabled: bool) -> Self {
        self.isolate_panics = enabled;
        self
    }

    pub fn build(self) -> DetectorRegistry {
        DetectorRegistry {
            detectors: self.detectors,
            detect_ambiguity: self.detect_ambiguity,
            isolate_panics: self.isolate_panics,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl DetectorRegistry {
    pub fn builder() -> DetectorRegistryBuilder {
        let defaults = ProbeConfig::default();
        DetectorRegistryBuilder {
            detectors: Vec::new(),
            detect_ambiguity: defaults.detect_ambiguity,
            isolate_panics: defaults.isolate_panics,
        }
    }

    /// Built-in detectors in their documented order, minus the ones the
    /// configuration disables
    pub fn from_config(config: &ProbeConfig) -> Self {
        let builtin = crate::registration::builtin_detectors();
        for disabled in &config.disabled_formats {
            if !builtin.iter().any(|d| d.id().as_str().eq_ignore_ascii_case(disabled)) {
                warn!("Configuration disables unknown format '{}'", disabled);
            }
        }

        let mut builder = Self::builder()
            .detect_ambiguity(config.detect_ambiguity)
            .isolate_panics(config.isolate_panics);
        for detector in builtin {
            if config.is_enabled(detector.id().as_str()) {
                builder = builder.register(detector);
            } else {
                debug!("Format {} disabled by configuration", detector.id());
            }
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Registered format ids in dispatch order
    pub fn formats(&self) -> Vec<FormatId> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    pub fn get(&self, id: FormatId) -> Option<&Arc<dyn FormatDetector>> {
        self.detectors.iter().find(|d| d.id() == id)
    }

    /// One detector's verdict; a panic inside the detector is a non-match
    fn identify_with(
        &self,
        detector: &Arc<dyn FormatDetector>,
        reader: &PartitionReader<'_>,
    ) -> bool {
        if !self.isolate_panics {
            return detector.identify(reader);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| detector.identify(reader))) {
            Ok(found) => found,
            Err(payload) => {
                error!(
                    "Detector {} faulted during identify: {}",
                    detector.name(),
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }

    /// Every format whose detector claims the partition, in dispatch order
    pub fn identify_all(&self, image: &dyn SectorAccessor, partition: &Partition) -> Vec<FormatId> {
        let reader = PartitionReader::new(image, partition);
        self.detectors
            .iter()
            .filter(|detector| {
                debug!("Trying {} on partition at sector {}", detector.name(), partition.start);
                self.identify_with(detector, &reader)
            })
            .map(|detector| detector.id())
            .collect()
    }

    /// The single format that claims the partition.
    ///
    /// `Ok(None)` when nothing matches. More than one claimant is an
    /// [`ProbeError::AmbiguousMatch`], unless ambiguity detection is off, in
    /// which case the first match in dispatch order wins.
    pub fn probe(
        &self,
        image: &dyn SectorAccessor,
        partition: &Partition,
    ) -> Result<Option<FormatId>, ProbeError> {
        if !self.detect_ambiguity {
            let reader = PartitionReader::new(image, partition);
            let found = self
                .detectors
                .iter()
                .find(|detector| self.identify_with(detector, &reader))
                .map(|detector| detector.id());
            if let Some(id) = found {
                info!("Partition at sector {} identified as {}", partition.start, id);
            }
            return Ok(found);
        }

        let matches = self.identify_all(image, partition);
        match matches.as_slice() {
            [] => {
                debug!("No detector claims partition at sector {}", partition.start);
                Ok(None)
            }
            [id] => {
                info!("Partition at sector {} identified as {}", partition.start, id);
                Ok(Some(*id))
            }
            _ => Err(ProbeError::AmbiguousMatch(
                matches.iter().map(|id| id.to_string()).collect(),
            )),
        }
    }

    /// Like [`probe`](Self::probe) but ambiguity is logged and treated as
    /// no answer
    pub fn try_identify(
        &self,
        image: &dyn SectorAccessor,
        partition: &Partition,
    ) -> Option<FormatId> {
        match self.probe(image, partition) {
            Ok(found) => found,
            Err(e) => {
                error!("Partition at sector {}: {}", partition.start, e);
                None
            }
        }
    }

    /// Run the extractor of `id`. Always yields an extraction for a
    /// registered format, partial when the header no longer validates.
    pub fn extract(
        &self,
        image: &dyn SectorAccessor,
        partition: &Partition,
        id: FormatId,
    ) -> Result<Extraction, ProbeError> {
        let detector = self
            .get(id)
            .ok_or_else(|| ProbeError::UnknownFormat(id.to_string()))?;
        let reader = PartitionReader::new(image, partition);

        if !self.isolate_panics {
            return Ok(detector.extract(&reader));
        }
        panic::catch_unwind(AssertUnwindSafe(|| detector.extract(&reader))).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            error!("Detector {} faulted during extract: {}", detector.name(), message);
            ProbeError::DetectorFault(format!("{}: {}", detector.name(), message))
        })
    }

    pub fn probe_and_extract(
        &self,
        image: &dyn SectorAccessor,
        partition: &Partition,
    ) -> Result<Option<Extraction>, ProbeError> {
        match self.probe(image, partition)? {
            Some(id) => self.extract(image, partition, id).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Report;
    use relic_core::{MemoryImage, VolumeDescriptor};

    /// Claims any partition whose first byte equals `marker`
    struct Marker {
        id: FormatId,
        marker: u8,
    }

    impl FormatDetector for Marker {
        fn id(&self) -> FormatId {
            self.id
        }

        fn name(&self) -> &'static str {
            self.id.as_str()
        }

        fn identify(&self, reader: &PartitionReader<'_>) -> bool {
            reader.read_at(0, 1).map(|b| b[0] == self.marker).unwrap_or(false)
        }

        fn extract(&self, _reader: &PartitionReader<'_>) -> Extraction {
            let descriptor = VolumeDescriptor::new(self.id, "marker");
            let mut report = Report::new("marker");
            report.summarize(&descriptor);
            Extraction::complete(descriptor, report.finish())
        }
    }

    struct Faulty;

    impl FormatDetector for Faulty {
        fn id(&self) -> FormatId {
            FormatId::custom("faulty")
        }

        fn name(&self) -> &'static str {
            "faulty"
        }

        fn identify(&self, _reader: &PartitionReader<'_>) -> bool {
            panic!("corrupt state")
        }

        fn extract(&self, _reader: &PartitionReader<'_>) -> Extraction {
            panic!("corrupt state")
        }
    }

    fn marker(id: &'static str, marker: u8) -> Arc<dyn FormatDetector> {
        Arc::new(Marker {
            id: FormatId::custom(id),
            marker,
        })
    }

    fn image(first: u8) -> MemoryImage {
        let mut data = vec![0u8; 1024];
        data[0] = first;
        MemoryImage::new(data, 512)
    }

    #[test]
    fn test_single_match() {
        let registry = DetectorRegistry::builder()
            .register(marker("a", 1))
            .register(marker("b", 2))
            .build();
        let image = image(2);
        let partition = Partition::whole(&image);

        assert_eq!(registry.probe(&image, &partition).unwrap(), Some(FormatId::custom("b")));
        let extraction = registry.probe_and_extract(&image, &partition).unwrap().unwrap();
        assert_eq!(extraction.descriptor.format, FormatId::custom("b"));
    }

    #[test]
    fn test_two_claimants_are_ambiguous() {
        let registry = DetectorRegistry::builder()
            .register(marker("a", 7))
            .register(marker("b", 7))
            .build();
        let image = image(7);
        let partition = Partition::whole(&image);

        match registry.probe(&image, &partition) {
            Err(ProbeError::AmbiguousMatch(ids)) => assert_eq!(ids, vec!["a", "b"]),
            other => panic!("expected ambiguity, got {:?}", other.map(|f| f.map(|id| id.as_str()))),
        }
        assert_eq!(registry.try_identify(&image, &partition), None);
    }

    #[test]
    fn test_first_match_without_ambiguity_detection() {
        let registry = DetectorRegistry::builder()
            .register(marker("a", 7))
            .register(marker("b", 7))
            .detect_ambiguity(false)
            .build();
        let image = image(7);
        let partition = Partition::whole(&image);
        assert_eq!(registry.try_identify(&image, &partition), Some(FormatId::custom("a")));
    }

    #[test]
    fn test_panicking_detector_is_isolated() {
        let registry = DetectorRegistry::builder()
            .register(Arc::new(Faulty))
            .register(marker("a", 3))
            .build();
        let image = image(3);
        let partition = Partition::whole(&image);

        assert_eq!(registry.probe(&image, &partition).unwrap(), Some(FormatId::custom("a")));
        assert!(matches!(
            registry.extract(&image, &partition, FormatId::custom("faulty")),
            Err(ProbeError::DetectorFault(_))
        ));
    }

    #[test]
    fn test_unknown_format() {
        let registry = DetectorRegistry::builder().register(marker("a", 1)).build();
        let image = image(1);
        let partition = Partition::whole(&image);
        assert!(matches!(
            registry.extract(&image, &partition, FormatId::XFS),
            Err(ProbeError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_register_replaces_same_id() {
        let registry = DetectorRegistry::builder()
            .register(marker("a", 1))
            .register(marker("b", 2))
            .register(marker("a", 3))
            .build();
        assert_eq!(registry.formats(), vec![FormatId::custom("a"), FormatId::custom("b")]);

        let image = image(3);
        let partition = Partition::whole(&image);
        assert_eq!(registry.try_identify(&image, &partition), Some(FormatId::custom("a")));
    }

    #[test]
    fn test_from_config_disables_formats() {
        let config = ProbeConfig {
            disabled_formats: vec!["XFS".to_string(), "minix".to_string()],
            ..ProbeConfig::default()
        };
        let registry = DetectorRegistry::from_config(&config);
        assert!(registry.get(FormatId::XFS).is_none());
        assert!(registry.get(FormatId::MINIX).is_none());
        assert_eq!(registry.len(), 4);
    }
}
