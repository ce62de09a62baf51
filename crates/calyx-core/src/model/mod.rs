//! Synthesis voice capability
//!
//! This module defines the `Voice` trait that abstracts over synthesis
//! backends, allowing the backend to be swapped without changing the
//! engine or the worker. A backend turns pitch/loudness control curves
//! into blocks of audio; where that computation runs (CPU, an accelerator
//! runtime, a test stub) is the backend's business.
//!
//! Backends run only on the worker thread. Nothing in this module is
//! touched by the real-time callback.

mod harmonic;
mod worker;

pub use harmonic::HarmonicVoice;
pub use worker::ModelWorker;

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::types::AudioBlock;

/// Control curve resolution per generated block
///
/// The worker samples the control state into curves of this length for
/// each `generate` call.
pub const CONTROL_FRAMES: usize = 16;

/// Errors reported by synthesis backends
#[derive(Error, Debug)]
pub enum ModelError {
    /// Backend failed to initialize; model-driven sources are unusable
    /// but the engine remains usable with the other sources
    #[error("Model failed to load: {0}")]
    Load(String),

    /// A single generate call failed; the worker skips the block and
    /// retries on its next iteration
    #[error("Model inference failed: {0}")]
    Inference(String),
}

/// A synthesis backend
///
/// Implementations are driven from the worker thread and may block or
/// compute as long as they like; the block queue absorbs the jitter.
pub trait Voice: Send {
    /// Native block length of the backend, in frames
    fn block_len(&self) -> usize;

    /// Warm up the backend (load weights, prime compute contexts)
    ///
    /// Called once before the first `generate`.
    fn preload(&mut self) -> Result<(), ModelError>;

    /// Render one block from pitch (Hz) and loudness (0..1) curves
    ///
    /// The curves have equal length; the backend spreads them over its
    /// native block.
    fn generate(&mut self, pitch: &[f32], loudness: &[f32]) -> Result<AudioBlock, ModelError>;

    /// Render `frames` of audio from self-chosen wandering controls
    fn generate_random(&mut self, frames: usize) -> Result<AudioBlock, ModelError>;
}

/// Lock-free pitch/loudness control state
///
/// Written by the front-end (CV inputs, encoders), read by the worker
/// each block. Values are f32 bit patterns in atomics so neither side
/// ever takes a lock.
#[derive(Debug)]
pub struct Controls {
    pitch_hz: AtomicU32,
    loudness: AtomicU32,
}

impl Controls {
    pub fn new(pitch_hz: f32, loudness: f32) -> Self {
        Self {
            pitch_hz: AtomicU32::new(pitch_hz.to_bits()),
            loudness: AtomicU32::new(loudness.to_bits()),
        }
    }

    #[inline]
    pub fn set_pitch(&self, hz: f32) {
        self.pitch_hz.store(hz.max(0.0).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch_hz.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_loudness(&self, loudness: f32) {
        self.loudness
            .store(loudness.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn loudness(&self) -> f32 {
        f32::from_bits(self.loudness.load(Ordering::Relaxed))
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new(110.0, 0.5)
    }
}

#[cfg(test)]
pub(crate) mod test_voice {
    use super::*;

    /// Backend whose every generate call fails
    pub struct FailingVoice {
        pub block_frames: usize,
    }

    impl Voice for FailingVoice {
        fn block_len(&self) -> usize {
            self.block_frames
        }

        fn preload(&mut self) -> Result<(), ModelError> {
            Ok(())
        }

        fn generate(&mut self, _pitch: &[f32], _loudness: &[f32]) -> Result<AudioBlock, ModelError> {
            Err(ModelError::Inference("stalled".to_string()))
        }

        fn generate_random(&mut self, _frames: usize) -> Result<AudioBlock, ModelError> {
            Err(ModelError::Inference("stalled".to_string()))
        }
    }

    /// Backend that refuses to load
    pub struct UnloadableVoice;

    impl Voice for UnloadableVoice {
        fn block_len(&self) -> usize {
            64
        }

        fn preload(&mut self) -> Result<(), ModelError> {
            Err(ModelError::Load("checkpoint missing".to_string()))
        }

        fn generate(&mut self, _pitch: &[f32], _loudness: &[f32]) -> Result<AudioBlock, ModelError> {
            Err(ModelError::Inference("not loaded".to_string()))
        }

        fn generate_random(&mut self, _frames: usize) -> Result<AudioBlock, ModelError> {
            Err(ModelError::Inference("not loaded".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controls_roundtrip() {
        let controls = Controls::default();
        controls.set_pitch(220.0);
        controls.set_loudness(0.75);
        assert_eq!(controls.pitch(), 220.0);
        assert_eq!(controls.loudness(), 0.75);
    }

    #[test]
    fn test_controls_clamping() {
        let controls = Controls::default();
        controls.set_pitch(-10.0);
        assert_eq!(controls.pitch(), 0.0);
        controls.set_loudness(3.0);
        assert_eq!(controls.loudness(), 1.0);
    }
}
