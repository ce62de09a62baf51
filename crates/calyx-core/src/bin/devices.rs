//! List audio devices and host APIs.

use calyx_core::audio::AudioError;
use calyx_core::diagnostics::{get_host_apis, get_input_devices, get_output_devices};

fn main() {
    env_logger::init();

    println!("Host APIs:");
    for api in get_host_apis() {
        println!("  {}", api);
    }

    println!("\nOutput devices:");
    match get_output_devices() {
        Ok(devices) => {
            for device in devices {
                println!(
                    "  {}{} (channels: {}, rates: {:?})",
                    device,
                    if device.is_default { " [default]" } else { "" },
                    device.max_channels,
                    device.sample_rates
                );
            }
        }
        Err(AudioError::NoDevices) => println!("  none"),
        Err(e) => println!("  error: {}", e),
    }

    println!("\nInput devices:");
    match get_input_devices() {
        Ok(devices) => {
            for device in devices {
                println!(
                    "  {}{} (channels: {}, rates: {:?})",
                    device,
                    if device.is_default { " [default]" } else { "" },
                    device.max_channels,
                    device.sample_rates
                );
            }
        }
        Err(AudioError::NoDevices) => println!("  none"),
        Err(e) => println!("  error: {}", e),
    }
}
