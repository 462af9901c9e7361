//! Configuration loading from TOML files
//!
//! Config file is selected via the `--config <path>` argument
//! (default: config/dev.toml). A missing or unparsable file falls back to
//! defaults with a warning.
//!
//! Zone polygons come either from a JSON file (list of `{name, coordinates}`)
//! or from inline `[[zones.definitions]]` tables, exactly one of the two.
//! Without a `[zones]` section the file defaults to `zones.json`.

use crate::services::zone_set::ZoneDefinition;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier stamped on audit records and metrics
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "zone-tracker".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_server_port() }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

/// Misspelled keys are rejected so a typo cannot silently drop every zone
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZonesConfig {
    /// JSON file with zone definitions
    #[serde(default)]
    pub file: Option<String>,
    /// Inline zone definitions
    #[serde(default)]
    pub definitions: Option<Vec<ZoneDefinition>>,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self { file: Some(default_zones_file()), definitions: None }
    }
}

fn default_zones_file() -> String {
    "zones.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Write transition audit records
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// File path for transition audit (JSONL format)
    #[serde(default = "default_audit_file")]
    pub file: String,
    /// Bounded channel capacity between processor and writer
    #[serde(default = "default_audit_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            file: default_audit_file(),
            channel_capacity: default_audit_channel_capacity(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_file() -> String {
    "transitions.jsonl".to_string()
}

fn default_audit_channel_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval between metrics summary log lines
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    bind_address: String,
    port: u16,
    zones_file: Option<String>,
    zone_definitions: Option<Vec<ZoneDefinition>>,
    audit_enabled: bool,
    audit_file: String,
    audit_channel_capacity: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            zones_file: toml_config.zones.file,
            zone_definitions: toml_config.zones.definitions,
            audit_enabled: toml_config.audit.enabled,
            audit_file: toml_config.audit.file,
            audit_channel_capacity: toml_config.audit.channel_capacity,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Resolve the zone definitions this config points at
    ///
    /// Reads the zones file if one is configured. Any failure here is fatal
    /// for the hosting process, including a `[zones]` section naming no source.
    pub fn zone_definitions(&self) -> anyhow::Result<Vec<ZoneDefinition>> {
        match (&self.zones_file, &self.zone_definitions) {
            (Some(file), Some(_)) => bail!(
                "zones configured both inline and in file {}; use one source",
                file
            ),
            (Some(file), None) => load_zone_file(file),
            (None, Some(definitions)) => Ok(definitions.clone()),
            (None, None) => bail!("[zones] section sets neither file nor definitions"),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn zones_file(&self) -> Option<&str> {
        self.zones_file.as_deref()
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit_enabled
    }

    pub fn audit_file(&self) -> &str {
        &self.audit_file
    }

    pub fn audit_channel_capacity(&self) -> usize {
        self.audit_channel_capacity
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder: use inline zone definitions instead of a zones file
    pub fn with_zone_definitions(mut self, definitions: Vec<ZoneDefinition>) -> Self {
        self.zones_file = None;
        self.zone_definitions = Some(definitions);
        self
    }
}

/// Parse a JSON zones file: `[{"name": "...", "coordinates": [[lon, lat], ...]}, ...]`
pub fn load_zone_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ZoneDefinition>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read zones file {}", path.display()))?;
    let definitions: Vec<ZoneDefinition> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse zones file {}", path.display()))?;
    Ok(definitions)
}
