//! Bench checkout: plays white noise then a reference tone on the
//! default output and reports the stream counters.
//!
//! Usage: calyx-selftest [seconds]

use calyx_core::audio::StreamConfig;
use calyx_core::diagnostics;
use calyx_core::engine::AudioEngine;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let seconds: f32 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(2.0);

    let mut engine = AudioEngine::new();
    engine.open(StreamConfig::default())?;

    if let Some(info) = engine.stream_info() {
        println!(
            "Output: {}Hz, {} channels, block {:?} (latency {:?} ms)",
            info.sample_rate,
            info.channels,
            info.block_frames,
            info.latency_ms()
        );
    }

    diagnostics::play_noise(&mut engine, seconds, true)?;
    diagnostics::play_sine(&mut engine, 0.8, 440.0, seconds, true)?;
    engine.close()?;

    let status = engine.status();
    println!(
        "Self-test complete: {} callbacks, {} frames, {} underflows, {} overflows",
        status.callbacks, status.frames, status.underflows, status.overflows
    );
    Ok(())
}
