//! Signal sources for the real-time callback
//!
//! A `SignalSource` produces one block of mono samples per request. All
//! variants are wait-free: no locks, no allocation, no I/O. Whatever
//! state a source needs (oscillator phase, RNG state, queue handles) is
//! owned by the variant itself, so independent sources never interfere.

use std::sync::Arc;

use super::ring::BlockConsumer;
use super::status::StreamStatus;
use crate::types::Sample;

/// White noise generator state
///
/// A xorshift64 step per sample keeps the callback free of heap RNG
/// machinery; the sequence does not need to be reproducible.
#[derive(Debug)]
pub struct NoiseState {
    state: u64,
}

impl NoiseState {
    fn new(seed: u64) -> Self {
        Self {
            // xorshift must not start at zero
            state: if seed == 0 { 0x9e37_79b9_7f4a_7c15 } else { seed },
        }
    }

    #[inline]
    fn next_sample(&mut self) -> Sample {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        // Top 24 bits mapped to [-1.0, 1.0)
        ((x >> 40) as f32 / 8_388_608.0) - 1.0
    }
}

/// Sine oscillator state
///
/// The phase accumulator is in cycles and advances by
/// `frequency / sample_rate` per frame, wrapped with a floating-point
/// modulo so it stays bounded. Phase is monotonic across calls: block
/// boundaries introduce no discontinuity.
#[derive(Debug)]
pub struct SineState {
    amplitude: f32,
    frequency: f32,
    sample_rate: f32,
    phase: f32,
}

impl SineState {
    fn fill(&mut self, out: &mut [Sample]) {
        let step = self.frequency / self.sample_rate;
        for slot in out.iter_mut() {
            *slot = self.amplitude * (std::f32::consts::TAU * self.phase).sin();
            self.phase = (self.phase + step) % 1.0;
        }
    }
}

/// Pass-through tap over the capture ring
///
/// With no input stream bound, behaves as silence.
pub struct CaptureTap {
    consumer: Option<rtrb::Consumer<Sample>>,
}

impl CaptureTap {
    fn fill(&mut self, out: &mut [Sample]) {
        match &mut self.consumer {
            None => out.fill(0.0),
            Some(consumer) => {
                for slot in out.iter_mut() {
                    *slot = consumer.pop().unwrap_or(0.0);
                }
            }
        }
    }
}

/// Tap over the model block queue
///
/// When the queue cannot cover the request, the remainder is silence and
/// one underflow is recorded for the callback.
pub struct ModelTap {
    consumer: BlockConsumer,
    status: Arc<StreamStatus>,
}

impl ModelTap {
    fn fill(&mut self, out: &mut [Sample]) {
        let covered = self.consumer.pop_into(out);
        if covered < out.len() {
            out[covered..].fill(0.0);
            self.status.record_underflow();
        }
    }
}

/// The active signal source of the output stream
pub enum SignalSource {
    /// Zero-filled blocks
    Silence,
    /// Uniform white noise
    Noise(NoiseState),
    /// Fixed-frequency sine oscillator
    Sine(SineState),
    /// Captured input routed to the output
    PassThrough(CaptureTap),
    /// Model audio drained from the block queue
    Model(ModelTap),
}

impl SignalSource {
    pub fn silence() -> Self {
        Self::Silence
    }

    pub fn noise(seed: u64) -> Self {
        Self::Noise(NoiseState::new(seed))
    }

    pub fn sine(amplitude: f32, frequency: f32, sample_rate: u32) -> Self {
        Self::Sine(SineState {
            amplitude,
            frequency,
            sample_rate: sample_rate as f32,
            phase: 0.0,
        })
    }

    pub fn pass_through(consumer: Option<rtrb::Consumer<Sample>>) -> Self {
        Self::PassThrough(CaptureTap { consumer })
    }

    pub fn model(consumer: BlockConsumer, status: Arc<StreamStatus>) -> Self {
        Self::Model(ModelTap { consumer, status })
    }

    /// Name for logging and status display
    pub fn name(&self) -> &'static str {
        match self {
            SignalSource::Silence => "silence",
            SignalSource::Noise(_) => "noise",
            SignalSource::Sine(_) => "sine",
            SignalSource::PassThrough(_) => "pass-through",
            SignalSource::Model(_) => "model",
        }
    }

    /// Fill `out` with the next `out.len()` frames
    ///
    /// Wait-free; always covers the whole slice.
    pub fn next_block(&mut self, out: &mut [Sample]) {
        match self {
            SignalSource::Silence => out.fill(0.0),
            SignalSource::Noise(noise) => {
                for slot in out.iter_mut() {
                    *slot = noise.next_sample();
                }
            }
            SignalSource::Sine(sine) => sine.fill(out),
            SignalSource::PassThrough(tap) => tap.fill(out),
            SignalSource::Model(tap) => tap.fill(out),
        }
    }
}
