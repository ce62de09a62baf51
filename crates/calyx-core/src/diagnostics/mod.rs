//! Diagnostic surface for bench checkout and field debugging
//!
//! Everything here is built on the engine's public contract: self-test
//! playback of noise and a reference tone, input pass-through, a text
//! spectrum monitor over the capture path, and device introspection.

mod spectrum;

pub use self_test::{input_through, play_noise, play_sine};
pub use spectrum::{SpectrumAnalyzer, SpectrumConfig, SpectrumMonitor};

// Introspection passthroughs
pub use crate::audio::{get_host_apis, get_input_devices, get_output_devices, AudioDevice, HostApi};
