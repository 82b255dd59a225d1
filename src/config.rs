//! Application configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Speech service WebSocket URL
    pub endpoint: String,
    pub audio: AudioConfig,
}

/// Capture and playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of audio sent to the service
    pub input_sample_rate: u32,
    /// Rate of audio received from the service
    pub output_sample_rate: u32,
    /// Samples per captured block
    pub block_size: usize,
    /// Captured blocks buffered ahead of the session loop
    pub block_queue_capacity: usize,
    /// Linear gain on playback, 0.0 to 1.0
    pub playback_gain: f32,
    /// Input device name; system default when unset
    pub capture_device: Option<String>,
    /// Output device name; system default when unset
    pub playback_device: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            audio: AudioConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            block_size: MIC_BUFFER_SIZE,
            block_queue_capacity: BLOCK_QUEUE_CAPACITY,
            playback_gain: DEFAULT_PLAYBACK_GAIN,
            capture_device: None,
            playback_device: None,
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Per-user config file location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "voice", "voice-client")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `path`, or the per-user file if it exists, or fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                tracing::debug!("no configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {:?}",
                self.endpoint
            )));
        }

        let audio = &self.audio;
        if audio.input_sample_rate == 0 || audio.output_sample_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".into()));
        }
        if audio.block_size == 0 {
            return Err(Error::Config("block_size must be non-zero".into()));
        }
        if audio.block_queue_capacity == 0 {
            return Err(Error::Config("block_queue_capacity must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&audio.playback_gain) {
            return Err(Error::Config(format!(
                "playback_gain must be within 0.0..=1.0, got {}",
                audio.playback_gain
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.audio.block_size, 4096);
    }

    #[test]
    fn test_partial_document() {
        let config = AppConfig::from_toml(
            r#"
            endpoint = "wss://speech.example.com/listen"

            [audio]
            playback_gain = 0.5
            capture_device = "USB Mic"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "wss://speech.example.com/listen");
        assert_eq!(config.audio.playback_gain, 0.5);
        assert_eq!(config.audio.capture_device.as_deref(), Some("USB Mic"));
        assert_eq!(config.audio.block_size, MIC_BUFFER_SIZE);
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = AppConfig::from_toml(r#"endpoint = "http://localhost:8000""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(AppConfig::from_toml("[audio]\nplayback_gain = 1.5").is_err());
        assert!(AppConfig::from_toml("[audio]\ninput_sample_rate = 0").is_err());
        assert!(AppConfig::from_toml("[audio]\nblock_size = 0").is_err());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = AppConfig::from_toml("endpoint = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/voice-client/config.toml");
        assert!(matches!(AppConfig::load(path), Err(Error::Io(_))));
    }
}
