//! Stream configuration
//!
//! Defines the configuration of the output stream: sample rate, channel
//! count, block size, latency mode, and device selection. Set once at
//! stream open and immutable for the lifetime of the stream.

use serde::{Deserialize, Serialize};

use super::error::{AudioError, AudioResult};
use crate::types::MAX_BLOCK_FRAMES;

/// Default sample rate for the module (22.05kHz)
/// This matches the native rate of the synthesis voice, avoiding
/// resampling of generated blocks on their way to the output.
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Block size requested in low-latency mode (frames)
/// 256 frames at 22.05kHz is ~11.6ms, a known-good value for the module's
/// ALSA output without xruns.
pub const LOW_LATENCY_BLOCK_FRAMES: u32 = 256;

/// Smallest block size the stream layer will request from a device
pub const MIN_BLOCK_FRAMES: u32 = 32;

/// Requested block size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockSize {
    /// Let the device choose its block size
    Default,
    /// Request a specific block size in frames (clamped to sane bounds)
    Fixed(u32),
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::Default
    }
}

impl BlockSize {
    /// Get the requested block size in frames, or None for device default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BlockSize::Default => None,
            BlockSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Latency preference for the output stream
///
/// Applies when `BlockSize::Default` is configured: `Low` requests a
/// small fixed block, `High` defers to the device's own safe default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LatencyMode {
    #[default]
    Low,
    High,
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, JACK, etc.)
/// so a device can be pinned on systems with multiple audio backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "ALSA", "CoreAudio")
    /// If None, all hosts are searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the output stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Output sample rate in Hz (must be positive)
    pub sample_rate: u32,

    /// Output channel count (must be at least 1; the mono signal is
    /// fanned out to every channel)
    pub channels: u16,

    /// Requested block size
    pub block_size: BlockSize,

    /// Latency preference when no fixed block size is requested
    pub latency: LatencyMode,

    /// Output device (None = system default)
    pub device: Option<DeviceId>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            block_size: BlockSize::Default,
            latency: LatencyMode::default(),
            device: None,
        }
    }
}

impl StreamConfig {
    /// Check the config for values the stream layer cannot honor
    pub fn validate(&self) -> AudioResult<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidConfig(
                "channels must be at least 1".to_string(),
            ));
        }
        if let Some(frames) = self.block_size.as_frames() {
            if frames as usize > MAX_BLOCK_FRAMES {
                return Err(AudioError::InvalidConfig(format!(
                    "block size {} exceeds maximum {}",
                    frames, MAX_BLOCK_FRAMES
                )));
            }
        }
        Ok(())
    }

    /// Set the sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the channel count
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Request a fixed block size in frames
    pub fn with_block_frames(mut self, frames: u32) -> Self {
        self.block_size = BlockSize::Fixed(frames);
        self
    }

    /// Set the latency preference
    pub fn with_latency(mut self, latency: LatencyMode) -> Self {
        self.latency = latency;
        self
    }

    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StreamConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let config = StreamConfig::default().with_sample_rate(0);
        assert!(matches!(
            config.validate(),
            Err(AudioError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let config = StreamConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AudioError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let config = StreamConfig::default().with_block_frames(1 << 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_id_display_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        assert_eq!(
            DeviceId::with_host("hw:0,0", "ALSA").display_label(),
            "[ALSA] hw:0,0"
        );
    }
}
