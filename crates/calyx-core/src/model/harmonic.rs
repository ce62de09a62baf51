//! Built-in additive synthesis voice
//!
//! A CPU backend that renders banded harmonics from the pitch/loudness
//! curves. It is the fallback voice when no accelerator backend is
//! configured, and the reference backend for tests.

use super::{ModelError, Voice, CONTROL_FRAMES};
use crate::types::AudioBlock;

/// Per-sample coefficient of the one-pole loudness smoother
///
/// Slow enough to remove zipper noise from stepped control curves,
/// fast enough to track an envelope at block rate.
const LEVEL_SMOOTH: f32 = 0.002;

/// Output normalization so a full-loudness 8-partial voice stays inside
/// [-1, 1] (the 1/k rolloff sums to ~2.7)
const OUTPUT_GAIN: f32 = 0.35;

/// Additive harmonic voice
pub struct HarmonicVoice {
    sample_rate: u32,
    block_frames: usize,
    /// Per-partial phase accumulators, in cycles
    phases: Vec<f32>,
    /// Smoothed loudness level
    level: f32,
    /// xorshift state for the wandering controls of `generate_random`
    rng: u64,
    loaded: bool,
}

impl HarmonicVoice {
    pub fn new(sample_rate: u32, block_frames: usize) -> Self {
        Self {
            sample_rate,
            block_frames: block_frames.max(1),
            phases: vec![0.0; 8],
            level: 0.0,
            rng: 0x853c_49e6_748f_ea9b,
            loaded: false,
        }
    }

    /// Set the number of harmonic partials
    pub fn with_partials(mut self, partials: usize) -> Self {
        self.phases = vec![0.0; partials.clamp(1, 32)];
        self
    }

    #[inline]
    fn next_random(&mut self) -> f32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        // [0.0, 1.0)
        (x >> 40) as f32 / 16_777_216.0
    }
}

impl Voice for HarmonicVoice {
    fn block_len(&self) -> usize {
        self.block_frames
    }

    fn preload(&mut self) -> Result<(), ModelError> {
        if self.sample_rate == 0 {
            return Err(ModelError::Load("sample rate is zero".to_string()));
        }
        self.loaded = true;
        log::info!(
            "Harmonic voice ready ({} partials, block {} frames at {}Hz)",
            self.phases.len(),
            self.block_frames,
            self.sample_rate
        );
        Ok(())
    }

    fn generate(&mut self, pitch: &[f32], loudness: &[f32]) -> Result<AudioBlock, ModelError> {
        if !self.loaded {
            return Err(ModelError::Inference("voice not preloaded".to_string()));
        }
        if pitch.is_empty() || pitch.len() != loudness.len() {
            return Err(ModelError::Inference(format!(
                "control curves must be non-empty and equal length (pitch {}, loudness {})",
                pitch.len(),
                loudness.len()
            )));
        }

        let mut block = AudioBlock::silence(self.block_frames);
        let out = block.as_mut_slice();
        let frames_per_step = self.block_frames.div_ceil(pitch.len());
        let nyquist = self.sample_rate as f32 / 2.0;

        for (i, slot) in out.iter_mut().enumerate() {
            let step = (i / frames_per_step).min(pitch.len() - 1);
            let f0 = pitch[step].max(0.0);
            let target = loudness[step].clamp(0.0, 1.0);
            self.level += (target - self.level) * LEVEL_SMOOTH;

            let mut sample = 0.0f32;
            for (k, phase) in self.phases.iter_mut().enumerate() {
                let harmonic = k as f32 + 1.0;
                let freq = f0 * harmonic;
                if freq >= nyquist {
                    break;
                }
                sample += (std::f32::consts::TAU * *phase).sin() / harmonic;
                *phase = (*phase + freq / self.sample_rate as f32) % 1.0;
            }
            *slot = sample * self.level * OUTPUT_GAIN;
        }

        Ok(block)
    }

    fn generate_random(&mut self, frames: usize) -> Result<AudioBlock, ModelError> {
        let mut samples = Vec::with_capacity(frames);
        let mut pitch = 110.0 + self.next_random() * 330.0;
        let mut loudness = 0.3 + self.next_random() * 0.5;

        while samples.len() < frames {
            // Random walk, clamped to a musical range
            pitch = (pitch + (self.next_random() - 0.5) * 40.0).clamp(55.0, 880.0);
            loudness = (loudness + (self.next_random() - 0.5) * 0.2).clamp(0.1, 0.9);

            let pitch_curve = [pitch; CONTROL_FRAMES];
            let loudness_curve = [loudness; CONTROL_FRAMES];
            let block = self.generate(&pitch_curve, &loudness_curve)?;

            let take = (frames - samples.len()).min(block.len());
            samples.extend_from_slice(&block.as_slice()[..take]);
        }

        Ok(AudioBlock::from_vec(samples))
    }
}
