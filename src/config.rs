// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Default location of the optional YAML config file.
pub const DEFAULT_CONFIG_PATH: &str = "agentdir.yaml";

/// Per-deployment settings. Every field has a default so an empty or missing
/// YAML file yields a usable config (apart from the access key).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub access: AccessConfig,
    pub server: ServerConfig,
    pub dossier: DossierConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Path or glob pattern; the first match in sorted order is loaded.
    pub source: String,
    /// Column holding the entity name used as display/uniqueness key.
    pub display_field: String,
    /// Rows whose display value contains any of these (case-insensitive) are banners.
    pub banner_patterns: Vec<String>,
    /// Group assigned to fields that precede the first group label.
    pub fallback_group: String,
    /// Column whose value is converted to a star rating on load.
    pub rating_field: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: "*.csv".into(),
            display_field: "Firm Name".into(),
            banner_patterns: vec![
                "Firm Name".into(),
                "ENRICHED".into(),
                "CONTACTS".into(),
                "ADDITIONAL".into(),
                "DATA".into(),
            ],
            fallback_group: "General Info".into(),
            rating_field: "Rating".into(),
        }
    }
}

/// Shared access key. `key_sha256` is the base64 SHA-256 digest of the key and
/// wins over `key` when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub key: Option<String>,
    pub key_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: [u8; 4],
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0],
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DossierConfig {
    pub title: String,
    /// Prefix of exported file names: `<prefix>_Dossier_<name>.txt`.
    pub file_prefix: String,
    /// Groups whose name contains this marker are highlighted and receive pinned fields.
    pub highlight_marker: String,
    pub pinned_fields: Vec<String>,
    pub phone_fields: Vec<String>,
    pub long_text_fields: Vec<String>,
    pub country_code: String,
}

impl Default for DossierConfig {
    fn default() -> Self {
        Self {
            title: "AGENT DIRECTORY".into(),
            file_prefix: "Agent".into(),
            highlight_marker: "Enriched".into(),
            pinned_fields: vec!["Address of License".into(), "Harmonized Phone Number".into()],
            phone_fields: vec![
                "Harmonized Phone Number".into(),
                "Phone".into(),
                "Mobile".into(),
            ],
            long_text_fields: vec!["Explanation".into(), "Notes".into()],
            country_code: "971".into(),
        }
    }
}

/// A named region with map coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub region_field: String,
    pub type_field: String,
    pub regions: Vec<Region>,
    /// Coordinates used for records whose region is not in `regions`.
    pub default_point: (f64, f64),
    /// Half-width of the uniform jitter applied to map points.
    pub jitter: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        let region = |name: &str, lat, lon| Region {
            name: name.into(),
            lat,
            lon,
        };
        Self {
            region_field: "Emirate".into(),
            type_field: "Firm Type".into(),
            regions: vec![
                region("Dubai", 25.2, 55.27),
                region("Abu Dhabi", 24.45, 54.37),
                region("Sharjah", 25.34, 55.42),
                region("Ajman", 25.40, 55.44),
            ],
            default_point: (25.2, 55.2),
            jitter: 0.01,
        }
    }
}

impl Config {
    /// Load `path` (or the default file if present), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = Self::from_yaml(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply_env(&mut self) {
        if let Ok(source) = env::var("AGENTDIR_SOURCE") {
            self.data.source = source;
        }
        if let Ok(key) = env::var("AGENTDIR_ACCESS_KEY") {
            if !key.is_empty() {
                self.access.key = Some(key);
            }
        }
        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}
