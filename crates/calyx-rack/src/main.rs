//! Calyx rack front-end
//!
//! Boots the module: loads the rack configuration, opens the audio
//! engine, and streams the synthesis voice continuously. Control inputs
//! (pitch/loudness CV) write into the engine's lock-free control state;
//! this binary seeds them from the configuration.

use std::time::Duration;

use calyx_core::config::{config_file, RackConfig};
use calyx_core::engine::{AudioEngine, SourceSpec};
use calyx_core::model::HarmonicVoice;

/// Interval between status log lines
const STATUS_PERIOD: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = config_file();
    let config = RackConfig::load(&config_path);

    let mut engine = AudioEngine::new();
    engine.set_queue_blocks(config.synth.queue_blocks);
    engine.open(config.stream.clone())?;

    let sample_rate = engine
        .stream_info()
        .map(|info| info.sample_rate)
        .unwrap_or(calyx_core::audio::DEFAULT_SAMPLE_RATE);

    let voice = HarmonicVoice::new(sample_rate, config.synth.block_frames)
        .with_partials(config.synth.partials);

    let controls = engine.controls();
    controls.set_pitch(config.synth.pitch_hz);
    controls.set_loudness(config.synth.loudness);

    engine.start(SourceSpec::Model(Box::new(voice)))?;
    log::info!(
        "Calyx rack streaming (pitch {}Hz, loudness {:.2})",
        config.synth.pitch_hz,
        config.synth.loudness
    );

    loop {
        std::thread::sleep(STATUS_PERIOD);

        if let Err(e) = engine.poll_health() {
            log::error!("Stream terminated: {}", e);
            return Err(e.into());
        }

        let status = engine.status();
        log::info!(
            "status: {} callbacks, {} frames, {} underflows, {} overflows",
            status.callbacks,
            status.frames,
            status.underflows,
            status.overflows
        );
    }
}
