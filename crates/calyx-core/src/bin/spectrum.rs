//! Live text spectrum of the default input device.
//!
//! Usage: calyx-spectrum [seconds] [columns]

use std::time::{Duration, Instant};

use calyx_core::diagnostics::{SpectrumConfig, SpectrumMonitor};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let seconds: f32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(10.0);
    let columns: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(24);

    let config = SpectrumConfig {
        columns,
        ..Default::default()
    };
    let mut monitor = SpectrumMonitor::bind(&config)?;

    println!(
        "Spectrum {}..{} Hz, {} columns, {}ms blocks",
        config.freq_range.0, config.freq_range.1, config.columns, config.block_ms
    );

    let deadline = Instant::now() + Duration::from_secs_f32(seconds);
    while Instant::now() < deadline {
        match monitor.next_line(Duration::from_millis(500)) {
            Some(line) => println!("|{}|", line),
            None => println!("(no capture data)"),
        }
    }
    Ok(())
}
