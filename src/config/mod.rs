//! YAML configuration.

use std::fmt;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::geocode::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, GeocodeSettings};
use crate::location::WatchOptions;
use crate::overlay::{OverlayRegion, OverlaySelection};
use crate::places::{CandidateGenerator, CandidateOffset, default_offsets};
use crate::template::DEFAULT_STATUS_TEMPLATE;

/// Environment variable that overrides `geocode.api_key`.
pub const API_KEY_ENV: &str = "WHEREAMI_GEOCODE_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub geocode: GeocodeConfig,
    pub watch: WatchOptions,
    pub candidates: Vec<CandidateOffset>,
    pub overlays: OverlayConfig,
    pub display: DisplayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocode: GeocodeConfig::default(),
            watch: WatchOptions::default(),
            candidates: default_offsets(),
            overlays: OverlayConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl fmt::Debug for GeocodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodeConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl GeocodeConfig {
    /// Client settings, with the key from the environment taking precedence.
    pub fn settings(&self) -> GeocodeSettings {
        self.settings_with_key_override(std::env::var(API_KEY_ENV).ok())
    }

    pub fn settings_with_key_override(&self, key_override: Option<String>) -> GeocodeSettings {
        let api_key = key_override
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        GeocodeSettings {
            endpoint: self.endpoint.clone(),
            api_key,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Region selected at startup. Defaults to the first one.
    pub default: Option<String>,
    pub regions: Vec<OverlayRegion>,
}

impl OverlayConfig {
    /// `None` when no regions are configured.
    pub fn selection(&self) -> Result<Option<OverlaySelection>> {
        if self.regions.is_empty() {
            return Ok(None);
        }
        let mut selection = OverlaySelection::new(self.regions.clone())?;
        if let Some(default) = &self.default {
            selection.select(default)?;
        }
        Ok(Some(selection))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// One-line status printed on every update.
    pub status: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            status: DEFAULT_STATUS_TEMPLATE.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).with_context(|| "Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.geocode.timeout_ms == 0 {
            bail!("geocode.timeout_ms must be at least 1");
        }
        if !self.watch.min_distance_m.is_finite() || self.watch.min_distance_m < 0.0 {
            bail!("watch.min_distance_m must be a non-negative number");
        }
        for (i, candidate) in self.candidates.iter().enumerate() {
            if candidate.name.trim().is_empty() {
                bail!("candidates[{i}] has an empty name");
            }
            if !candidate.lat_offset.is_finite() || !candidate.lon_offset.is_finite() {
                bail!("candidates[{i}] ({}) has a non-finite offset", candidate.name);
            }
        }
        for region in &self.overlays.regions {
            if region.coordinates.len() < 3 {
                bail!(
                    "overlay region '{}' needs at least 3 vertices, got {}",
                    region.id,
                    region.coordinates.len()
                );
            }
        }
        self.overlays.selection()?;
        Ok(())
    }

    pub fn generator(&self) -> CandidateGenerator {
        CandidateGenerator::new(self.candidates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
geocode:
  api_key: from-file
  timeout_ms: 2500
watch:
  accuracy: balanced
  min_interval_ms: 1000
candidates:
  - name: Corner Store
    lat_offset: 0.001
    lon_offset: 0.0
overlays:
  default: stout
  regions:
    - id: ipa
      label: IPA Fans
      stroke_color: coral
      coordinates:
        - { latitude: 43.8486744, longitude: -79.0695283 }
        - { latitude: 43.8537168, longitude: -79.0700046 }
        - { latitude: 43.8518394, longitude: -79.0725697 }
    - id: stout
      label: Stout Fans
      stroke_color: firebrick
      stroke_width: 2
      coordinates:
        - { latitude: 43.8486744, longitude: -79.0693283 }
        - { latitude: 43.8517168, longitude: -79.0710046 }
        - { latitude: 43.8518394, longitude: -79.0715697 }
"#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.geocode.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.watch.min_interval_ms, 1000);
        assert_eq!(config.watch.min_distance_m, 10.0);
        assert_eq!(config.candidates.len(), 1);
        assert_eq!(config.generator().len(), 1);

        let selection = config.overlays.selection().unwrap().unwrap();
        assert_eq!(selection.selected().id, "stout");
        assert_eq!(selection.regions()[0].stroke_width, 4);
        assert_eq!(selection.regions()[1].stroke_width, 2);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.candidates, default_offsets());
        assert!(config.overlays.selection().unwrap().is_none());
        assert_eq!(config.display.status, DEFAULT_STATUS_TEMPLATE);
        assert_eq!(
            config.geocode.settings_with_key_override(None).timeout,
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_api_key_precedence() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let settings = config.geocode.settings_with_key_override(None);
        assert_eq!(settings.api_key.as_deref(), Some("from-file"));
        assert_eq!(settings.timeout, Duration::from_millis(2500));

        let settings = config
            .geocode
            .settings_with_key_override(Some("from-env".to_string()));
        assert_eq!(settings.api_key.as_deref(), Some("from-env"));

        let settings = config.geocode.settings_with_key_override(Some("  ".to_string()));
        assert_eq!(settings.api_key.as_deref(), Some("from-file"));

        let unconfigured = GeocodeConfig::default().settings_with_key_override(None);
        assert!(unconfigured.api_key.is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("from-file"));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(AppConfig::from_yaml("geocode: { timeout_ms: 0 }").is_err());
        assert!(
            AppConfig::from_yaml("candidates: [{ name: '', lat_offset: 0.1, lon_offset: 0.1 }]")
                .is_err()
        );
        assert!(AppConfig::from_yaml("watch: { min_distance_m: -1 }").is_err());

        let unknown_default = SAMPLE.replace("default: stout", "default: porter");
        assert!(AppConfig::from_yaml(&unknown_default).is_err());

        let bad_latitude = SAMPLE.replace(
            "latitude: 43.8486744, longitude: -79.0695283",
            "latitude: 143.0, longitude: 0.0",
        );
        assert!(AppConfig::from_yaml(&bad_latitude).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Utf8Path::new("test_data/missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_shipped_config() {
        let config = AppConfig::load(Utf8Path::new("whereami.yaml")).unwrap();
        let selection = config.overlays.selection().unwrap().unwrap();
        assert_eq!(selection.regions().len(), 2);
        assert_eq!(selection.selected().id, "ipa");
        assert_eq!(config.candidates, default_offsets());
    }
}
