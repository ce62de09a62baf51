//! Text spectrum monitor
//!
//! Renders the magnitude spectrum of the live input as one gradient text
//! row per captured block. The FFT length is derived from the requested
//! column count and frequency range so that adjacent columns map to
//! adjacent FFT bins.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::StreamTrait;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::audio::device;
use crate::audio::{stream, AudioResult};
use crate::engine::StreamStatus;
use crate::types::Sample;

/// Gradient from silence to full scale, one character per level
const LEVELS: &[char] = &[' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Magnitude that maps to the top of the gradient
///
/// Spectral magnitudes of real signals are far below the time-domain
/// peak; this gain spreads the usual range over the gradient.
const DISPLAY_GAIN: f32 = 200.0;

/// Poll interval while waiting for a captured block
const CAPTURE_POLL: Duration = Duration::from_millis(2);

/// Configuration for the spectrum display
#[derive(Debug, Clone)]
pub struct SpectrumConfig {
    /// Number of text columns (frequency bins shown)
    pub columns: usize,
    /// Capture block duration in milliseconds
    pub block_ms: u32,
    /// Displayed frequency range in Hz (low, high)
    pub freq_range: (f32, f32),
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            columns: 24,
            block_ms: 50,
            freq_range: (100.0, 2000.0),
        }
    }
}

/// Magnitude-spectrum renderer over fixed-size sample windows
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    fft_len: usize,
    low_bin: usize,
    columns: usize,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32, config: &SpectrumConfig) -> Self {
        let columns = config.columns.max(2);
        let (low, high) = config.freq_range;
        // Bin spacing such that `columns` bins span the frequency range
        let delta_f = (high - low).max(1.0) / (columns as f32 - 1.0);
        let fft_len = (sample_rate as f32 / delta_f).ceil() as usize;
        let low_bin = (low / delta_f).floor() as usize;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        Self {
            fft,
            input,
            output,
            scratch,
            fft_len,
            low_bin,
            columns,
        }
    }

    /// Render one gradient row from a window of samples
    ///
    /// Windows shorter than the FFT length are zero-padded, longer ones
    /// truncated.
    pub fn render(&mut self, samples: &[Sample]) -> String {
        let n = samples.len().min(self.fft_len);
        self.input[..n].copy_from_slice(&samples[..n]);
        self.input[n..].fill(0.0);

        if self
            .fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .is_err()
        {
            return String::new();
        }

        let scale = 1.0 / self.fft_len as f32;
        let mut line = String::with_capacity(self.columns * 3);
        for column in 0..self.columns {
            let magnitude = self
                .output
                .get(self.low_bin + column)
                .map(|c| c.norm() * scale)
                .unwrap_or(0.0);
            line.push(level_char(magnitude));
        }
        line
    }
}

fn level_char(magnitude: f32) -> char {
    let level = (magnitude * DISPLAY_GAIN).clamp(0.0, 1.0);
    let index = (level * (LEVELS.len() - 1) as f32).round() as usize;
    LEVELS[index]
}

/// Live spectrum monitor over the default input device
pub struct SpectrumMonitor {
    _stream: cpal::Stream,
    consumer: rtrb::Consumer<Sample>,
    analyzer: SpectrumAnalyzer,
    block_frames: usize,
    window: Vec<Sample>,
    /// Frames of the current window already captured
    filled: usize,
}

impl SpectrumMonitor {
    /// Bind the default input device and start capturing
    pub fn bind(config: &SpectrumConfig) -> AudioResult<Self> {
        let input_device = device::default_input_device()?;
        let (input_config, sample_rate) =
            stream::negotiate_input_config(&input_device, crate::audio::DEFAULT_SAMPLE_RATE)?;

        let block_frames = (sample_rate as u64 * config.block_ms as u64 / 1000).max(1) as usize;
        let status = Arc::new(StreamStatus::new());

        let (producer, consumer) = rtrb::RingBuffer::new(block_frames * 8);
        let capture =
            stream::build_capture_stream(&input_device, &input_config, producer, status)?;
        capture
            .play()
            .map_err(|e| crate::audio::AudioError::StreamPlay(e.to_string()))?;

        log::info!(
            "Spectrum monitor bound ({}Hz, {} frame blocks, {} columns)",
            sample_rate,
            block_frames,
            config.columns
        );

        Ok(Self {
            _stream: capture,
            consumer,
            analyzer: SpectrumAnalyzer::new(sample_rate, config),
            block_frames,
            window: vec![0.0; block_frames],
            filled: 0,
        })
    }

    /// Wait for the next captured block and render it
    ///
    /// Returns None when no block arrives within the timeout. A block of
    /// pure silence renders as "no input", matching an unplugged jack.
    pub fn next_line(&mut self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            while self.filled < self.block_frames {
                match self.consumer.pop() {
                    Ok(sample) => {
                        self.window[self.filled] = sample;
                        self.filled += 1;
                    }
                    Err(_) => break,
                }
            }
            if self.filled == self.block_frames {
                self.filled = 0;
                if self.window.iter().all(|&s| s == 0.0) {
                    return Some("no input".to_string());
                }
                return Some(self.analyzer.render(&self.window));
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(CAPTURE_POLL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_width_matches_columns() {
        let config = SpectrumConfig::default();
        let mut analyzer = SpectrumAnalyzer::new(22_050, &config);
        let window = vec![0.0f32; 1024];
        let line = analyzer.render(&window);
        assert_eq!(line.chars().count(), config.columns);
    }

    #[test]
    fn test_silence_renders_blank() {
        let config = SpectrumConfig::default();
        let mut analyzer = SpectrumAnalyzer::new(22_050, &config);
        let window = vec![0.0f32; 2048];
        let line = analyzer.render(&window);
        assert!(line.chars().all(|c| c == ' '));
    }

    #[test]
    fn test_tone_lights_up_its_column() {
        let sample_rate = 22_050u32;
        let config = SpectrumConfig {
            columns: 24,
            block_ms: 100,
            freq_range: (100.0, 2000.0),
        };
        let mut analyzer = SpectrumAnalyzer::new(sample_rate, &config);

        // Tone placed exactly on FFT bin 12 (integer cycles per window,
        // no leakage into neighboring columns)
        let frames = analyzer.fft_len;
        let bin = 12usize;
        let freq = bin as f32 * sample_rate as f32 / frames as f32;
        let window: Vec<f32> = (0..frames)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect();

        let line = analyzer.render(&window);
        assert!(
            line.chars().any(|c| c != ' '),
            "tone produced a blank spectrum: {:?}",
            line
        );

        let expected = bin - analyzer.low_bin;
        let hottest = line
            .chars()
            .enumerate()
            .max_by_key(|(_, c)| LEVELS.iter().position(|l| l == c).unwrap_or(0))
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            hottest.abs_diff(expected) <= 1,
            "hottest column {} expected near {}",
            hottest,
            expected
        );
    }
}
