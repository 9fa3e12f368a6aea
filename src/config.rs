//! Bridge configuration
//!
//! One document holds the engine cadence, the chair address, the binding
//! table and the custom effects. TOML is the native format; the same
//! document also loads from JSON (chosen by file extension).
//!
//! Bindings and effects are checked one by one: a broken entry is logged and
//! skipped, the rest of the file still loads.

use crate::controller::InputKind;
use crate::effects::{HapticEffect, NamedEffect};
use crate::mapping::document::{ActionDocument, BindingDocument, InputId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const APP_DIR: &str = "tactbridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Could not serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    /// How often hold gates re-check the physical input
    pub hold_poll_interval_ms: u64,
    pub haptic_app_id: String,
    pub haptic_position: u32,
    pub stats_interval_s: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            hold_poll_interval_ms: 50,
            haptic_app_id: "UniversalBridge".to_string(),
            haptic_position: 0,
            stats_interval_s: 30,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ChairSettings {
    pub enabled: bool,
    pub ip_address: String,
    pub tcp_port: u16,
    /// Lights-off datagrams go here
    pub udp_port: u16,
    pub connect_timeout_ms: u64,
    pub status_poll_ticks: u64,
}

impl Default for ChairSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_address: "127.0.0.1".to_string(),
            tcp_port: 50020,
            udp_port: 50010,
            connect_timeout_ms: 1000,
            status_poll_ticks: 20,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub chair: ChairSettings,
    #[serde(default)]
    pub bindings: Vec<BindingDocument>,
    #[serde(default)]
    pub custom_effects: Vec<NamedEffect>,
}

/// Same shape as [`AppConfig`], entries still unchecked
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    engine: EngineSettings,
    #[serde(default)]
    chair: ChairSettings,
    #[serde(default)]
    bindings: Vec<serde_json::Value>,
    #[serde(default)]
    custom_effects: Vec<serde_json::Value>,
}

fn entry_name(value: &serde_json::Value) -> &str {
    value
        .get("name")
        .and_then(|name| name.as_str())
        .unwrap_or("<unnamed>")
}

impl AppConfig {
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let document: serde_json::Value = match format {
            ConfigFormat::Toml => toml::from_str(text)?,
            ConfigFormat::Json => serde_json::from_str(text)?,
        };
        let raw: RawConfig = serde_json::from_value(document)?;

        let mut bindings = Vec::with_capacity(raw.bindings.len());
        for value in raw.bindings {
            let name = entry_name(&value).to_string();
            match serde_json::from_value::<BindingDocument>(value) {
                Ok(binding) => bindings.push(binding),
                Err(e) => warn!("Skipping malformed binding '{}': {}", name, e),
            }
        }

        let mut custom_effects = Vec::with_capacity(raw.custom_effects.len());
        for value in raw.custom_effects {
            let name = entry_name(&value).to_string();
            match serde_json::from_value::<NamedEffect>(value) {
                Ok(effect) => custom_effects.push(effect),
                Err(e) => warn!("Skipping malformed effect '{}': {}", name, e),
            }
        }

        Ok(Self {
            engine: raw.engine,
            chair: raw.chair,
            bindings,
            custom_effects,
        })
    }

    pub fn to_text(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Toml => Ok(toml::to_string_pretty(self)?),
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let text = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&text, format)?;
        info!(
            "Loaded {} bindings and {} custom effects from {}",
            config.bindings.len(),
            config.custom_effects.len(),
            path.display()
        );
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let text = self.to_text(format)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, text).await?;
        debug!("Configuration written to {}", path.display());
        Ok(())
    }

    /// Starter document written on first run
    pub fn sample() -> Self {
        let binding = |name: &str, input_type, input_id, action| BindingDocument {
            name: name.to_string(),
            device_index: 0,
            input_type,
            input_id,
            action,
            disable_others: Vec::new(),
            enable_others: Vec::new(),
            start_disabled: false,
            start_delay_ms: 0,
            hold_time_ms: 0,
            turbo_rate_ms: None,
        };

        let mut rapid_fire = binding(
            "rapid_fire",
            InputKind::Button,
            InputId::Index(5),
            ActionDocument::Button {
                button: "RIGHT_SHOULDER".to_string(),
            },
        );
        rapid_fire.turbo_rate_ms = Some(80);

        let mut park = binding(
            "park_chair",
            InputKind::Key,
            InputId::Name("P".to_string()),
            ActionDocument::Chair {
                command: "park".to_string(),
            },
        );
        park.hold_time_ms = 1000;

        let bindings = vec![
            binding(
                "jump",
                InputKind::Button,
                InputId::Index(0),
                ActionDocument::Button {
                    button: "A".to_string(),
                },
            ),
            rapid_fire,
            binding(
                "look_x",
                InputKind::Axis,
                InputId::Index(2),
                ActionDocument::Axis {
                    target_axis: "right_stick_x".to_string(),
                    tuning: Default::default(),
                },
            ),
            binding(
                "stick_pressure",
                InputKind::Axis,
                InputId::Index(1),
                ActionDocument::Haptic {
                    effect_name: "front_rear_center".to_string(),
                    base_intensity: 80,
                    response: Default::default(),
                },
            ),
            binding(
                "hit",
                InputKind::Key,
                InputId::Name("SPACE".to_string()),
                ActionDocument::Haptic {
                    effect_name: "chest_tap".to_string(),
                    base_intensity: 100,
                    response: Default::default(),
                },
            ),
            park,
        ];

        Self {
            engine: EngineSettings::default(),
            chair: ChairSettings::default(),
            bindings,
            custom_effects: vec![NamedEffect {
                name: "chest_tap".to_string(),
                effect: HapticEffect::Static {
                    motors: vec![1, 2, 5, 6],
                    intensity: 60,
                    duration_ms: 120,
                },
            }],
        }
    }
}

/// `<config_dir>/tactbridge/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push(APP_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

/// Writes the sample document if nothing exists at `path` yet.
pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
    if tokio::fs::try_exists(path).await? {
        debug!("Using existing configuration at {}", path.display());
        return Ok(());
    }
    info!("Creating default configuration at {}", path.display());
    AppConfig::sample().save(path).await
}
