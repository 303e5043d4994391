// Probe configuration
// Read once when the detector registry is built; never consulted mid-probe

use crate::ProbeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Format ids to leave out of the registry (e.g. "minix")
    pub disabled_formats: Vec<String>,
    /// Evaluate every detector and report a second claimant as an
    /// ambiguous match instead of stopping at the first match
    pub detect_ambiguity: bool,
    /// Turn a panicking detector into a non-match
    pub isolate_panics: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            disabled_formats: Vec::new(),
            detect_ambiguity: true,
            isolate_panics: true,
        }
    }
}

impl ProbeConfig {
    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        let config: ProbeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProbeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        tracing::info!("Loaded probe configuration from {}", path.display());
        Ok(config)
    }

    /// `<config dir>/relic/probe.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relic").join("probe.json"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist. A file that exists but does not parse is an error.
    pub fn load_or_default() -> Result<Self, ProbeError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                tracing::debug!("No probe configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn is_enabled(&self, format: &str) -> bool {
        !self.disabled_formats.iter().any(|f| f.eq_ignore_ascii_case(format))
    }

    fn validate(&self) -> Result<(), ProbeError> {
        if let Some(empty) = self.disabled_formats.iter().find(|f| f.trim().is_empty()) {
            return Err(ProbeError::Configuration(format!(
                "empty format id in disabled_formats: {:?}",
                empty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert!(config.detect_ambiguity);
        assert!(config.isolate_panics);
        assert!(config.is_enabled("hfs"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProbeConfig::from_json(r#"{ "disabled_formats": ["MINIX"] }"#).unwrap();
        assert!(!config.is_enabled("minix"));
        assert!(config.is_enabled("xfs"));
        assert!(config.detect_ambiguity);
    }

    #[test]
    fn test_rejects_blank_format() {
        let result = ProbeConfig::from_json(r#"{ "disabled_formats": [" "] }"#);
        assert!(matches!(result, Err(ProbeError::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        write!(temp, r#"{{ "detect_ambiguity": false }}"#).unwrap();
        temp.flush().unwrap();

        let config = ProbeConfig::load(temp.path()).unwrap();
        assert!(!config.detect_ambiguity);
    }

    #[test]
    fn test_default_path() {
        // No config directory at all on some minimal systems
        if let Some(path) = ProbeConfig::default_path() {
            assert!(path.ends_with("relic/probe.json"));
            assert!(path.starts_with(dirs::config_dir().unwrap()));
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ProbeConfig::from_json("{ nope"),
            Err(ProbeError::Serialization(_))
        ));
    }
}
