//! Rack configuration
//!
//! Configuration is stored as YAML under the platform config directory
//! (see `paths`). Loading is tolerant: a missing or unparsable file
//! yields the defaults with a warning, so the module always boots.

mod paths;

pub use paths::{config_dir, config_file};

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::StreamConfig;
use crate::engine::DEFAULT_QUEUE_BLOCKS;

/// Root configuration for the rack front-end
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RackConfig {
    /// Output stream settings
    pub stream: StreamConfig,
    /// Synthesis voice settings
    pub synth: SynthConfig,
}

/// Synthesis configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Blocks of model audio buffered ahead of playback
    ///
    /// Deeper queues absorb more inference jitter at the cost of control
    /// latency (the pitch knob takes `queue_blocks` blocks to be heard).
    pub queue_blocks: usize,
    /// Native block length of the voice, in frames
    pub block_frames: usize,
    /// Startup pitch in Hz
    pub pitch_hz: f32,
    /// Startup loudness (0.0 - 1.0)
    pub loudness: f32,
    /// Harmonic partials of the builtin voice
    pub partials: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            queue_blocks: DEFAULT_QUEUE_BLOCKS,
            block_frames: 512,
            pitch_hz: 110.0,
            loudness: 0.5,
            partials: 8,
        }
    }
}

impl RackConfig {
    /// Load configuration from a YAML file
    ///
    /// A missing file is normal (first boot); an invalid file is logged
    /// and replaced by defaults rather than stopping the module.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::info!("Config file {:?} doesn't exist, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<Self>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a YAML file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        log::info!("Config saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BlockSize;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = RackConfig::load(Path::new("/nonexistent/path/rack.yaml"));
        assert_eq!(config.synth.queue_blocks, DEFAULT_QUEUE_BLOCKS);
        assert_eq!(config.stream.channels, 1);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rack.yaml");

        let mut config = RackConfig::default();
        config.stream = config.stream.with_sample_rate(48_000).with_block_frames(256);
        config.synth.pitch_hz = 220.0;
        config.synth.queue_blocks = 8;

        config.save(&path).unwrap();
        let loaded = RackConfig::load(&path);

        assert_eq!(loaded.stream.sample_rate, 48_000);
        assert_eq!(loaded.stream.block_size, BlockSize::Fixed(256));
        assert_eq!(loaded.synth.pitch_hz, 220.0);
        assert_eq!(loaded.synth.queue_blocks, 8);
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rack.yaml");
        std::fs::write(&path, "stream: [not, a, mapping").unwrap();

        let config = RackConfig::load(&path);
        assert_eq!(config.synth.block_frames, 512);
    }
}
