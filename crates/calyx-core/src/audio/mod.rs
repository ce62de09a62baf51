//! Audio device layer
//!
//! Stream configuration, device enumeration, error taxonomy, and the
//! CPAL-backed stream plumbing used by the engine.
//!
//! The real-time callback never blocks, allocates, logs, or takes locks;
//! everything it needs crosses over on lock-free queues before the
//! stream starts. See `stream` for the callback side and
//! `engine::AudioEngine` for the control side.

mod config;
pub mod device;
mod error;
pub(crate) mod stream;

pub use config::{
    BlockSize, DeviceId, LatencyMode, StreamConfig, DEFAULT_SAMPLE_RATE, LOW_LATENCY_BLOCK_FRAMES,
};
pub use device::{
    default_input_device, default_output_device, find_output_device, get_host_apis,
    get_input_devices, get_output_devices, AudioDevice, HostApi,
};
pub use error::{AudioError, AudioResult};
