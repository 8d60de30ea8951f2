use crate::messages::Presentation;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "voxmemo";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,

    #[serde(default)]
    pub presentation: Presentation,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_live_bars")]
    pub live_bars: usize,

    #[serde(default = "default_playback_bars")]
    pub playback_bars: usize,

    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_recordings_dir() -> PathBuf {
    data_home().join(APP_DIR).join("recordings")
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_live_bars() -> usize {
    50
}

fn default_playback_bars() -> usize {
    100
}

fn default_audio_extensions() -> Vec<String> {
    ["wav", "m4a", "mp3", "aac", "ogg", "flac"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn data_home() -> PathBuf {
    match std::env::var_os("XDG_DATA_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => home_dir().join(".local").join("share"),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            presentation: Presentation::default(),
            tick_interval_ms: default_tick_interval_ms(),
            live_bars: default_live_bars(),
            playback_bars: default_playback_bars(),
            audio_extensions: default_audio_extensions(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/voxmemo/config.json)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config = Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than zero");
        }

        if self.live_bars == 0 || self.playback_bars == 0 {
            bail!("live_bars and playback_bars must be greater than zero");
        }

        if self.audio_extensions.iter().all(|ext| ext.trim().is_empty()) {
            bail!("audio_extensions must list at least one extension");
        }

        if self.sample_rate == 0 || self.channels == 0 {
            bail!("sample_rate and channels must be greater than zero");
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
