//! The audio engine
//!
//! Owns the device stream and the active signal source, and coordinates
//! the synthesis worker that feeds model audio ahead of playback need.
//!
//! # State machine
//!
//! ```text
//! Closed ──open()──► Open ──start()──► Streaming
//!   ▲                 │ ▲                  │
//!   └────close()──────┘ └─────stop()───────┘
//! ```
//!
//! All engine methods run on the control thread. The real-time callback
//! communicates with the engine only through lock-free queues and the
//! shared `StreamStatus`; see `audio::stream` for the callback side.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::Stream;

use super::ring::{block_queue, DEFAULT_QUEUE_BLOCKS};
use super::source::SignalSource;
use super::status::{StatusSnapshot, StreamStatus};
use crate::audio::device;
use crate::audio::{AudioError, AudioResult, StreamConfig};
use crate::audio::stream::{
    self, CallbackState, EngineCommand, NegotiatedConfig, COMMAND_QUEUE_CAPACITY,
};
use crate::model::{Controls, ModelWorker, Voice};
use crate::types::{Sample, MAX_BLOCK_FRAMES};

/// Poll interval for scoped blocking waits
const WAIT_POLL: Duration = Duration::from_millis(5);

/// Capture ring depth for the pass-through source, in samples
const CAPTURE_QUEUE_SAMPLES: usize = 4 * MAX_BLOCK_FRAMES;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No device resources held
    #[default]
    Closed,
    /// Device acquired and config negotiated, no stream running
    Open,
    /// Output stream running
    Streaming,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Closed => "Closed",
            EngineState::Open => "Open",
            EngineState::Streaming => "Streaming",
        }
    }
}

/// Description of the source to stream
///
/// Realized into a running `SignalSource` by `start`/`set_source`; the
/// model variant carries the synthesis backend the engine should drive.
pub enum SourceSpec {
    /// Zero output
    Silence,
    /// White noise (seed 0 picks a fixed default)
    Noise { seed: u64 },
    /// Fixed sine tone
    Sine { amplitude: f32, frequency: f32 },
    /// Route captured input to the output
    PassThrough,
    /// Stream the synthesis backend through the block queue
    Model(Box<dyn Voice>),
}

impl SourceSpec {
    pub fn name(&self) -> &'static str {
        match self {
            SourceSpec::Silence => "silence",
            SourceSpec::Noise { .. } => "noise",
            SourceSpec::Sine { .. } => "sine",
            SourceSpec::PassThrough => "pass-through",
            SourceSpec::Model(_) => "model",
        }
    }
}

/// Negotiated stream parameters for introspection
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Fixed block size in frames, None when the device decides
    pub block_frames: Option<u32>,
}

impl StreamInfo {
    /// One-way output latency in milliseconds, when the block size is known
    pub fn latency_ms(&self) -> Option<f32> {
        self.block_frames
            .map(|frames| (frames as f32 / self.sample_rate as f32) * 1000.0)
    }
}

fn invalid_state(expected: &'static str, actual: EngineState) -> AudioError {
    AudioError::InvalidState {
        expected,
        actual: actual.name(),
    }
}

/// The audio engine
///
/// One engine per output stream; engines hold no global state, so
/// multiple independent engines can coexist.
pub struct AudioEngine {
    state: EngineState,
    config: StreamConfig,
    device: Option<cpal::Device>,
    negotiated: Option<NegotiatedConfig>,
    output_stream: Option<Stream>,
    capture_stream: Option<Stream>,
    status: Arc<StreamStatus>,
    controls: Arc<Controls>,
    command_tx: Option<rtrb::Producer<EngineCommand>>,
    retire_rx: Option<rtrb::Consumer<Box<SignalSource>>>,
    worker: Option<ModelWorker>,
    queue_blocks: usize,
    /// Armed finite playback: (frames baseline at start, frame budget)
    finite: Option<(u64, u64)>,
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Closed,
            config: StreamConfig::default(),
            device: None,
            negotiated: None,
            output_stream: None,
            capture_stream: None,
            status: Arc::new(StreamStatus::new()),
            controls: Arc::new(Controls::default()),
            command_tx: None,
            retire_rx: None,
            worker: None,
            queue_blocks: DEFAULT_QUEUE_BLOCKS,
            finite: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Snapshot of the stream counters and flags
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// The stream config supplied at open (defaults while Closed)
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Lock-free pitch/loudness control state shared with the worker
    pub fn controls(&self) -> Arc<Controls> {
        Arc::clone(&self.controls)
    }

    /// Negotiated stream parameters (None while Closed)
    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.negotiated.as_ref().map(|n| StreamInfo {
            sample_rate: n.sample_rate,
            channels: n.channels,
            block_frames: n.block_frames,
        })
    }

    /// Set the model block queue depth for subsequent starts
    pub fn set_queue_blocks(&mut self, blocks: usize) {
        self.queue_blocks = blocks.max(1);
    }

    /// Acquire the device and negotiate the stream configuration
    ///
    /// Transitions Closed -> Open. Fails with `DeviceUnavailable` or
    /// `DeviceNotFound` when no device matches the config.
    pub fn open(&mut self, config: StreamConfig) -> AudioResult<()> {
        if self.state != EngineState::Closed {
            return Err(invalid_state("Closed", self.state));
        }
        config.validate()?;

        let device = match &config.device {
            Some(id) => device::find_output_device(id)?,
            None => device::default_output_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let negotiated = stream::negotiate_output_config(&device, &config)?;
        log::info!(
            "Opened output device: {} ({} channels, {}Hz, block {:?})",
            device_name,
            negotiated.channels,
            negotiated.sample_rate,
            negotiated.block_frames
        );

        self.device = Some(device);
        self.negotiated = Some(negotiated);
        self.config = config;
        self.state = EngineState::Open;
        Ok(())
    }

    /// Start streaming the given source
    ///
    /// Transitions Open -> Streaming. For a model source this preloads
    /// the voice, creates the block queue, and spawns the worker; a
    /// preload failure leaves the engine Open and the other sources
    /// usable.
    pub fn start(&mut self, spec: SourceSpec) -> AudioResult<()> {
        self.start_inner(spec, None)
    }

    /// Start streaming a finite test signal
    ///
    /// After `duration` worth of frames the callback emits silence;
    /// `wait_for_completion` observes the boundary.
    pub fn start_for(&mut self, spec: SourceSpec, duration: Duration) -> AudioResult<()> {
        if self.state != EngineState::Open {
            return Err(invalid_state("Open", self.state));
        }
        let sample_rate = match &self.negotiated {
            Some(n) => n.sample_rate,
            None => return Err(invalid_state("Open", self.state)),
        };
        let frames = (duration.as_secs_f64() * sample_rate as f64).round() as u64;
        self.start_inner(spec, Some(frames))
    }

    fn start_inner(&mut self, spec: SourceSpec, limit: Option<u64>) -> AudioResult<()> {
        if self.state != EngineState::Open {
            return Err(invalid_state("Open", self.state));
        }
        let negotiated = match self.negotiated.clone() {
            Some(n) => n,
            None => return Err(invalid_state("Open", self.state)),
        };

        let source_name = spec.name();
        let source = match self.realize(spec, &negotiated) {
            Ok(source) => source,
            Err(e) => {
                self.teardown_source_support();
                return Err(e);
            }
        };

        let (command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        let (retire_tx, retire_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);

        let mut callback_state =
            CallbackState::new(source, command_rx, retire_tx, Arc::clone(&self.status));
        callback_state.frame_limit = limit;

        let baseline = self.status.frames_emitted();

        let device = match &self.device {
            Some(d) => d,
            None => return Err(invalid_state("Open", self.state)),
        };

        let output = match stream::build_output_stream(device, &negotiated.stream, callback_state)
        {
            Ok(stream) => stream,
            Err(e) => {
                self.teardown_source_support();
                return Err(e);
            }
        };
        if let Err(e) = output.play() {
            self.teardown_source_support();
            return Err(AudioError::StreamPlay(e.to_string()));
        }

        self.output_stream = Some(output);
        self.command_tx = Some(command_tx);
        self.retire_rx = Some(retire_rx);
        self.finite = limit.map(|frames| (baseline, frames));
        self.state = EngineState::Streaming;
        log::info!("Streaming started ({} source)", source_name);
        Ok(())
    }

    /// Realize a source spec, wiring up workers and capture streams
    fn realize(
        &mut self,
        spec: SourceSpec,
        negotiated: &NegotiatedConfig,
    ) -> AudioResult<SignalSource> {
        Ok(match spec {
            SourceSpec::Silence => SignalSource::silence(),
            SourceSpec::Noise { seed } => SignalSource::noise(seed),
            SourceSpec::Sine {
                amplitude,
                frequency,
            } => SignalSource::sine(amplitude, frequency, negotiated.sample_rate),
            SourceSpec::PassThrough => match self.bind_capture(negotiated) {
                Ok(consumer) => SignalSource::pass_through(Some(consumer)),
                Err(e) => {
                    log::warn!(
                        "No input stream for pass-through ({}), falling back to silence",
                        e
                    );
                    SignalSource::pass_through(None)
                }
            },
            SourceSpec::Model(mut voice) => {
                voice.preload()?;
                let block_frames = voice.block_len();
                let (producer, consumer) = block_queue(self.queue_blocks, block_frames);
                let worker = ModelWorker::spawn(voice, producer, Arc::clone(&self.controls));
                self.worker = Some(worker);
                SignalSource::model(consumer, Arc::clone(&self.status))
            }
        })
    }

    /// Bind the default input device and start a capture stream
    fn bind_capture(
        &mut self,
        negotiated: &NegotiatedConfig,
    ) -> AudioResult<rtrb::Consumer<Sample>> {
        let input_device = device::default_input_device()?;
        let (input_config, capture_rate) =
            stream::negotiate_input_config(&input_device, negotiated.sample_rate)?;
        if capture_rate != negotiated.sample_rate {
            log::warn!(
                "Capture runs at {}Hz against a {}Hz output",
                capture_rate,
                negotiated.sample_rate
            );
        }

        let (producer, consumer) = rtrb::RingBuffer::new(CAPTURE_QUEUE_SAMPLES);
        let capture = stream::build_capture_stream(
            &input_device,
            &input_config,
            producer,
            Arc::clone(&self.status),
        )?;
        capture
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        self.capture_stream = Some(capture);
        Ok(consumer)
    }

    /// Switch the active source without stopping the stream
    ///
    /// The swap happens at a callback block boundary; the callback never
    /// observes a partially constructed source.
    pub fn set_source(&mut self, spec: SourceSpec) -> AudioResult<()> {
        if self.state != EngineState::Streaming {
            return Err(invalid_state("Streaming", self.state));
        }
        let negotiated = match self.negotiated.clone() {
            Some(n) => n,
            None => return Err(invalid_state("Streaming", self.state)),
        };

        // Detach the outgoing source's support first so realize() can
        // install replacements
        let old_worker = self.worker.take();
        let old_capture = self.capture_stream.take();

        let source_name = spec.name();
        let source = match self.realize(spec, &negotiated) {
            Ok(source) => source,
            Err(e) => {
                self.worker = old_worker;
                self.capture_stream = old_capture;
                return Err(e);
            }
        };

        let command_tx = match self.command_tx.as_mut() {
            Some(tx) => tx,
            None => return Err(invalid_state("Streaming", self.state)),
        };
        if command_tx
            .push(EngineCommand::SetSource(Box::new(source)))
            .is_err()
        {
            self.teardown_source_support();
            self.worker = old_worker;
            self.capture_stream = old_capture;
            return Err(AudioError::CommandBacklog);
        }
        // A source switch ends any armed finite playback
        if self.finite.is_some() {
            let _ = command_tx.push(EngineCommand::SetFrameLimit(None));
            self.finite = None;
        }

        if let Some(worker) = old_worker {
            worker.stop();
        }
        drop(old_capture);
        self.drain_retired();

        log::info!("Active source switched to {}", source_name);
        Ok(())
    }

    /// Stop streaming
    ///
    /// Transitions Streaming -> Open: stops the worker, drops the
    /// streams, and releases the block queue. Bounded time even while the
    /// worker is blocked on backpressure.
    pub fn stop(&mut self) -> AudioResult<()> {
        if self.state != EngineState::Streaming {
            return Err(invalid_state("Streaming", self.state));
        }

        self.teardown_source_support();
        self.output_stream = None;
        self.command_tx = None;
        self.drain_retired();
        self.retire_rx = None;
        self.finite = None;
        self.state = EngineState::Open;
        log::info!("Streaming stopped");
        Ok(())
    }

    /// Release all device resources
    ///
    /// Transitions to Closed from any state; implies `stop` while
    /// Streaming. Idempotent.
    pub fn close(&mut self) -> AudioResult<()> {
        if self.state == EngineState::Streaming {
            self.stop()?;
        }
        self.device = None;
        self.negotiated = None;
        self.state = EngineState::Closed;
        log::info!("Engine closed");
        Ok(())
    }

    /// Wait for an armed finite playback to run its course
    ///
    /// Returns Ok(true) once all frames have been emitted, Ok(false) on
    /// timeout or when no finite playback is armed while streaming.
    /// Scoped: never waits longer than `timeout`.
    pub fn wait_for_completion(&self, timeout: Duration) -> AudioResult<bool> {
        let (baseline, frames) = match self.finite {
            Some(finite) => finite,
            None => return Ok(self.state != EngineState::Streaming),
        };

        let deadline = Instant::now() + timeout;
        loop {
            if self.status.device_lost() {
                return Err(AudioError::DeviceLost);
            }
            if self.status.frames_emitted().saturating_sub(baseline) >= frames {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(WAIT_POLL);
        }
    }

    /// Surface a device loss latched by the stream error callback
    ///
    /// A lost device is fatal to the stream: the engine is forced Closed
    /// and `DeviceLost` is returned. The engine never reconnects on its
    /// own.
    pub fn poll_health(&mut self) -> AudioResult<()> {
        if !self.status.device_lost() {
            return Ok(());
        }
        log::error!("Audio device lost, closing engine");
        self.teardown_source_support();
        self.output_stream = None;
        self.command_tx = None;
        self.retire_rx = None;
        self.finite = None;
        self.device = None;
        self.negotiated = None;
        self.state = EngineState::Closed;
        Err(AudioError::DeviceLost)
    }

    /// Stop the worker and capture stream backing the active source
    fn teardown_source_support(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        self.capture_stream = None;
    }

    /// Drop sources the callback has swapped out
    ///
    /// Deallocation of retired sources happens here, on the control
    /// thread, never in the callback.
    fn drain_retired(&mut self) {
        if let Some(retire_rx) = self.retire_rx.as_mut() {
            while retire_rx.pop().is_ok() {}
        }
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.state == EngineState::Streaming {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_voice::UnloadableVoice;

    #[test]
    fn test_new_engine_is_closed() {
        let engine = AudioEngine::new();
        assert_eq!(engine.state(), EngineState::Closed);
        assert!(engine.stream_info().is_none());
    }

    #[test]
    fn test_start_before_open_fails() {
        let mut engine = AudioEngine::new();
        let result = engine.start(SourceSpec::Silence);
        assert!(matches!(
            result,
            Err(AudioError::InvalidState {
                expected: "Open",
                actual: "Closed"
            })
        ));
    }

    #[test]
    fn test_stop_when_not_streaming_fails() {
        let mut engine = AudioEngine::new();
        assert!(matches!(
            engine.stop(),
            Err(AudioError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_device_lookup() {
        let mut engine = AudioEngine::new();
        let config = StreamConfig::default().with_sample_rate(0);
        assert!(matches!(
            engine.open(config),
            Err(AudioError::InvalidConfig(_))
        ));
        assert_eq!(engine.state(), EngineState::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut engine = AudioEngine::new();
        assert!(engine.close().is_ok());
        assert!(engine.close().is_ok());
        assert_eq!(engine.state(), EngineState::Closed);
    }

    #[test]
    fn test_wait_for_completion_without_finite_playback() {
        let engine = AudioEngine::new();
        // Nothing armed and nothing streaming: trivially complete
        assert_eq!(
            engine.wait_for_completion(Duration::from_millis(10)).ok(),
            Some(true)
        );
    }

    #[test]
    fn test_poll_health_without_loss() {
        let mut engine = AudioEngine::new();
        assert!(engine.poll_health().is_ok());
    }

    /// Full lifecycle against real hardware; skipped gracefully when the
    /// machine has no audio device.
    #[test]
    fn test_lifecycle_with_device_if_available() {
        let mut engine = AudioEngine::new();
        match engine.open(StreamConfig::default()) {
            Ok(()) => {}
            Err(e) => {
                println!("No usable audio device ({}), skipping", e);
                return;
            }
        }
        assert_eq!(engine.state(), EngineState::Open);
        assert!(engine.stream_info().is_some());

        if let Err(e) = engine.start(SourceSpec::Silence) {
            println!("Could not start stream ({}), skipping", e);
            return;
        }
        assert_eq!(engine.state(), EngineState::Streaming);

        // A preload failure must not tear down the running stream state
        let result = engine.set_source(SourceSpec::Model(Box::new(UnloadableVoice)));
        assert!(matches!(result, Err(AudioError::Model(_))));
        assert_eq!(engine.state(), EngineState::Streaming);

        let started = Instant::now();
        engine.close().unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(engine.state(), EngineState::Closed);
    }

    /// Open with a model voice that refuses to load: the engine stays
    /// Open and other sources remain usable.
    #[test]
    fn test_model_load_failure_leaves_engine_open() {
        let mut engine = AudioEngine::new();
        if engine.open(StreamConfig::default()).is_err() {
            println!("No usable audio device, skipping");
            return;
        }

        let result = engine.start(SourceSpec::Model(Box::new(UnloadableVoice)));
        assert!(matches!(result, Err(AudioError::Model(_))));
        assert_eq!(engine.state(), EngineState::Open);

        if engine.start(SourceSpec::Sine {
            amplitude: 0.5,
            frequency: 440.0,
        }).is_ok() {
            assert_eq!(engine.state(), EngineState::Streaming);
            engine.close().unwrap();
        }
    }
}
