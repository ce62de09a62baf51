//! CPAL stream construction and the real-time callback
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                      ┌─────────────────────┐
//! │  Control thread  │───push()────────────►│   Command queue     │
//! │  (AudioEngine)   │                      │  (lock-free SPSC)   │
//! └──────────────────┘                      └──────────┬──────────┘
//!         ▲                                            │ pop()
//!         │ retired sources                            ▼
//! ┌───────┴──────────┐                      ┌─────────────────────┐
//! │   Retire queue   │◄────push()───────────│  CPAL audio thread  │
//! │  (lock-free SPSC)│                      │ (owns CallbackState)│
//! └──────────────────┘                      └─────────────────────┘
//! ```
//!
//! The callback owns its state exclusively. Source switches arrive as
//! fully-constructed boxed sources over the command queue and are swapped
//! in at a block boundary, so the callback never observes a partially
//! updated source. Swapped-out sources travel back over the retire queue
//! and are dropped on the control thread; the callback never deallocates.
//!
//! The callback body lives in `fill_output`, a free function over
//! `CallbackState`, so the whole real-time path can be driven by tests
//! without audio hardware.

use std::sync::Arc;

use cpal::traits::DeviceTrait;
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig as CpalStreamConfig};

use super::config::{BlockSize, LatencyMode, StreamConfig, LOW_LATENCY_BLOCK_FRAMES, MIN_BLOCK_FRAMES};
use super::error::{AudioError, AudioResult};
use crate::engine::{SignalSource, StreamStatus};
use crate::types::{AudioBlock, Sample, MAX_BLOCK_FRAMES};

/// Capacity of the command and retire queues
///
/// Source switches are rare control operations; a handful of slots is
/// plenty, and the queue must only never be unbounded.
pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Commands processed by the callback at block boundaries
pub(crate) enum EngineCommand {
    /// Swap in a new active source
    SetSource(Box<SignalSource>),
    /// Arm (or disarm) a frame limit for finite playback
    SetFrameLimit(Option<u64>),
}

/// State owned exclusively by the output callback
pub(crate) struct CallbackState {
    /// The active signal source
    pub source: SignalSource,
    /// Commands from the control thread
    pub command_rx: rtrb::Consumer<EngineCommand>,
    /// Swapped-out sources, handed back for disposal
    pub retire_tx: rtrb::Producer<Box<SignalSource>>,
    /// Shared counters and flags
    pub status: Arc<StreamStatus>,
    /// Pre-allocated mono scratch block
    pub scratch: AudioBlock,
    /// Frames after which the callback emits silence (finite playback)
    pub frame_limit: Option<u64>,
    /// Frames emitted since the stream started
    pub frames_done: u64,
}

impl CallbackState {
    pub fn new(
        source: SignalSource,
        command_rx: rtrb::Consumer<EngineCommand>,
        retire_tx: rtrb::Producer<Box<SignalSource>>,
        status: Arc<StreamStatus>,
    ) -> Self {
        Self {
            source,
            command_rx,
            retire_tx,
            status,
            scratch: AudioBlock::silence(MAX_BLOCK_FRAMES),
            frame_limit: None,
            frames_done: 0,
        }
    }
}

/// Render one callback's worth of output
///
/// This is the real-time path: wait-free end to end. `data` is the
/// interleaved device buffer; the mono source block is fanned out to
/// every channel.
pub(crate) fn fill_output(state: &mut CallbackState, data: &mut [Sample], channels: usize) {
    state.status.begin_callback();

    // Drain control commands at the block boundary
    while let Ok(command) = state.command_rx.pop() {
        match command {
            EngineCommand::SetSource(new_source) => {
                let old = std::mem::replace(&mut state.source, *new_source);
                // Hand the old source back; if the retire queue is full
                // the box is dropped here, which only happens when the
                // control thread has stopped draining (engine teardown)
                let _ = state.retire_tx.push(Box::new(old));
            }
            EngineCommand::SetFrameLimit(limit) => {
                state.frame_limit = limit;
                state.frames_done = 0;
            }
        }
    }

    let n_frames = (data.len() / channels).min(MAX_BLOCK_FRAMES);

    // Frames still inside the finite-playback budget
    let live_frames = match state.frame_limit {
        Some(limit) => limit.saturating_sub(state.frames_done).min(n_frames as u64) as usize,
        None => n_frames,
    };

    state.scratch.set_len_from_capacity(n_frames);
    let scratch = state.scratch.as_mut_slice();
    if live_frames > 0 {
        state.source.next_block(&mut scratch[..live_frames]);
    }
    scratch[live_frames..].fill(0.0);

    for (frame, &sample) in data.chunks_mut(channels).zip(scratch.iter()) {
        for channel in frame.iter_mut() {
            *channel = sample;
        }
    }
    // Frames beyond the scratch capacity (oversized device request)
    for frame in data.chunks_mut(channels).skip(n_frames) {
        for channel in frame.iter_mut() {
            *channel = 0.0;
        }
    }

    state.frames_done += n_frames as u64;
    state.status.record_callback(n_frames as u64);
}

/// Output configuration negotiated with a device
#[derive(Clone)]
pub(crate) struct NegotiatedConfig {
    /// Stream config handed to CPAL
    pub stream: CpalStreamConfig,
    /// Negotiated sample rate
    pub sample_rate: u32,
    /// Device channel count
    pub channels: u16,
    /// Fixed block size in frames, None when the device decides
    pub block_frames: Option<u32>,
}

/// Pick the best f32 output configuration for a device
///
/// Samples are f32 on the wire; a device without any f32 output
/// configuration is rejected.
pub(crate) fn negotiate_output_config(
    device: &cpal::Device,
    config: &StreamConfig,
) -> AudioResult<NegotiatedConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigQuery(e.to_string()))?
        .collect();

    if supported.is_empty() {
        return Err(AudioError::ConfigQuery(
            "No supported output configurations".to_string(),
        ));
    }

    let float_configs: Vec<_> = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if float_configs.is_empty() {
        let formats: Vec<String> = supported
            .iter()
            .map(|c| format!("{:?}", c.sample_format()))
            .collect();
        return Err(AudioError::UnsupportedFormat(formats.join(", ")));
    }

    // Prefer a config that covers the requested channel count and rate
    let best = float_configs
        .iter()
        .filter(|c| c.channels() >= config.channels)
        .find(|c| {
            config.sample_rate >= c.min_sample_rate().0
                && config.sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| float_configs.iter().find(|c| c.channels() >= config.channels))
        .or_else(|| float_configs.first())
        .copied();

    let best = match best {
        Some(b) => b,
        None => {
            return Err(AudioError::ConfigQuery(
                "No suitable output configuration found".to_string(),
            ))
        }
    };

    let sample_rate = if config.sample_rate >= best.min_sample_rate().0
        && config.sample_rate <= best.max_sample_rate().0
    {
        config.sample_rate
    } else {
        let fallback = best.max_sample_rate().0;
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            config.sample_rate,
            fallback
        );
        fallback
    };

    let supported_config = best.clone().with_sample_rate(cpal::SampleRate(sample_rate));
    let mut stream = supported_config.config();

    let block_frames = match config.block_size {
        BlockSize::Fixed(frames) => {
            Some(frames.clamp(MIN_BLOCK_FRAMES, MAX_BLOCK_FRAMES as u32))
        }
        BlockSize::Default => match config.latency {
            // Low latency wants a known-small block; high latency defers
            // to the device's own safe default
            LatencyMode::Low => Some(LOW_LATENCY_BLOCK_FRAMES),
            LatencyMode::High => None,
        },
    };
    stream.buffer_size = match block_frames {
        Some(frames) => CpalBufferSize::Fixed(frames),
        None => CpalBufferSize::Default,
    };

    log::debug!(
        "Negotiated output config: {} channels, {}Hz, block {:?}",
        stream.channels,
        sample_rate,
        block_frames
    );

    Ok(NegotiatedConfig {
        channels: stream.channels,
        stream,
        sample_rate,
        block_frames,
    })
}

/// Pick an f32 input configuration, preferring the output's sample rate
pub(crate) fn negotiate_input_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> AudioResult<(CpalStreamConfig, u32)> {
    let supported: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigQuery(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let best = supported
        .iter()
        .find(|c| sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0)
        .or_else(|| supported.first());

    let best = match best {
        Some(b) => b,
        None => {
            return Err(AudioError::UnsupportedFormat(
                "no f32 input configuration".to_string(),
            ))
        }
    };

    let rate = if sample_rate >= best.min_sample_rate().0 && sample_rate <= best.max_sample_rate().0
    {
        sample_rate
    } else {
        best.max_sample_rate().0
    };

    let stream = best.clone().with_sample_rate(cpal::SampleRate(rate)).config();
    Ok((stream, rate))
}

/// Build the output stream around a callback state
///
/// The state moves into the callback closure; afterwards the engine talks
/// to it only through the command and retire queues.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &CpalStreamConfig,
    mut state: CallbackState,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let status = Arc::clone(&state.status);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                fill_output(&mut state, data, channels);
            },
            move |err| {
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    status.record_device_lost();
                }
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

    Ok(stream)
}

/// Build a capture stream feeding the given ring
///
/// Channel 0 of the input is captured as the module's mono feed. When the
/// ring is full, incoming samples are dropped and the overflow counter
/// records it; dropping is correct for a monitoring path.
pub(crate) fn build_capture_stream(
    device: &cpal::Device,
    config: &CpalStreamConfig,
    mut producer: rtrb::Producer<Sample>,
    status: Arc<StreamStatus>,
) -> AudioResult<Stream> {
    let channels = (config.channels as usize).max(1);
    let error_status = Arc::clone(&status);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mut dropped = false;
                for frame in data.chunks(channels) {
                    if producer.push(frame[0]).is_err() {
                        dropped = true;
                        break;
                    }
                }
                if dropped {
                    status.record_capture_overflow();
                }
            },
            move |err| {
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    error_status.record_device_lost();
                }
                log::error!("Capture stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ring::block_queue;

    fn make_state(
        source: SignalSource,
    ) -> (
        CallbackState,
        rtrb::Producer<EngineCommand>,
        rtrb::Consumer<Box<SignalSource>>,
        Arc<StreamStatus>,
    ) {
        let (command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let (retire_tx, retire_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let status = Arc::new(StreamStatus::new());
        let state = CallbackState::new(source, command_rx, retire_tx, Arc::clone(&status));
        (state, command_tx, retire_rx, status)
    }

    /// One second of 512-frame callbacks with a full-scale sine: no
    /// underflows, every sample within [-1, 1].
    #[test]
    fn test_sine_scenario_one_second() {
        let sample_rate = 22_050u32;
        let block = 512usize;
        let source = SignalSource::sine(1.0, 440.0, sample_rate);
        let (mut state, _command_tx, _retire_rx, status) = make_state(source);

        let callbacks = (sample_rate as usize).div_ceil(block);
        let mut data = vec![0.0f32; block];
        for _ in 0..callbacks {
            fill_output(&mut state, &mut data, 1);
            assert!(data.iter().all(|&s| s.abs() <= 1.0));
        }

        assert_eq!(status.underflow_count(), 0);
        assert_eq!(status.callback_count(), callbacks as u64);
        assert_eq!(status.frames_emitted(), (callbacks * block) as u64);
    }

    /// Ten callback cycles against a starved model queue: ten underflows,
    /// all-silent output, and the callback keeps running.
    #[test]
    fn test_stalled_model_scenario() {
        let (_command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let (retire_tx, _retire_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let status = Arc::new(StreamStatus::new());
        let (_producer, consumer) = block_queue(4, 512);
        let source = SignalSource::model(consumer, Arc::clone(&status));
        let mut state = CallbackState::new(source, command_rx, retire_tx, Arc::clone(&status));

        let mut data = vec![0.5f32; 512];
        for _ in 0..10 {
            fill_output(&mut state, &mut data, 1);
            assert!(data.iter().all(|&s| s == 0.0));
        }

        assert_eq!(status.underflow_count(), 10);
        assert_eq!(status.callback_count(), 10);
    }

    /// A source swap command takes effect at the next block boundary and
    /// the old source comes back over the retire queue.
    #[test]
    fn test_source_swap_at_block_boundary() {
        let (mut state, mut command_tx, mut retire_rx, _status) =
            make_state(SignalSource::silence());

        let mut data = vec![0.0f32; 64];
        fill_output(&mut state, &mut data, 1);
        assert!(data.iter().all(|&s| s == 0.0));

        command_tx
            .push(EngineCommand::SetSource(Box::new(SignalSource::sine(
                1.0, 440.0, 22_050,
            ))))
            .ok()
            .unwrap();

        fill_output(&mut state, &mut data, 1);
        assert!(data.iter().any(|&s| s != 0.0));
        assert_eq!(state.source.name(), "sine");

        let retired = retire_rx.pop().expect("old source retired");
        assert_eq!(retired.name(), "silence");
    }

    /// After the armed frame limit is reached the callback emits silence
    /// but keeps counting.
    #[test]
    fn test_frame_limit_silences_tail() {
        let (mut state, mut command_tx, _retire_rx, status) =
            make_state(SignalSource::noise(1234));

        command_tx
            .push(EngineCommand::SetFrameLimit(Some(700)))
            .ok()
            .unwrap();

        let mut data = vec![0.0f32; 512];
        fill_output(&mut state, &mut data, 1);
        assert!(data.iter().any(|&s| s != 0.0));

        // Second callback covers frames 512..1024; only 700-512=188 live
        fill_output(&mut state, &mut data, 1);
        assert!(data[..188].iter().any(|&s| s != 0.0));
        assert!(data[188..].iter().all(|&s| s == 0.0));

        // Third callback is entirely past the limit
        fill_output(&mut state, &mut data, 1);
        assert!(data.iter().all(|&s| s == 0.0));

        assert_eq!(status.frames_emitted(), 3 * 512);
    }

    /// The mono block is fanned out to every device channel.
    #[test]
    fn test_multichannel_fan_out() {
        let (mut state, _command_tx, _retire_rx, _status) =
            make_state(SignalSource::sine(0.9, 330.0, 22_050));

        let mut data = vec![0.0f32; 256];
        fill_output(&mut state, &mut data, 2);

        for frame in data.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(data.iter().any(|&s| s != 0.0));
    }

    /// Model audio pushed by a producer flows through the callback intact.
    #[test]
    fn test_model_audio_flows_through() {
        let (mut producer, consumer) = block_queue(4, 8);
        let (mut state, _command_tx, _retire_rx, status) = make_state(SignalSource::silence());
        state.source = SignalSource::model(consumer, Arc::clone(&status));

        producer.push(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);

        let mut data = vec![0.0f32; 8];
        fill_output(&mut state, &mut data, 1);
        assert_eq!(data, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        assert_eq!(status.underflow_count(), 0);
    }
}
