//! Audio device enumeration and lookup
//!
//! Provides functionality to list available audio devices and host APIs
//! and to resolve a configured `DeviceId` to a concrete device.
//!
//! Devices are enumerated from ALL available audio hosts. On the module
//! itself there is normally a single ALSA host, but on dev machines the
//! same firmware runs against whatever hosts the platform exposes.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    // Use the debug representation which gives us the variant name
    let name = format!("{:?}", host_id);
    // Capitalize common names for better display
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "CoreAudio")
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    /// Maximum channel count
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// Information about an audio host API
#[derive(Debug, Clone)]
pub struct HostApi {
    /// Host backend name (e.g., "ALSA")
    pub name: String,
    /// Number of output devices the host exposes
    pub output_devices: usize,
    /// Number of input devices the host exposes
    pub input_devices: usize,
    /// Name of the host's default output device, if any
    pub default_output: Option<String>,
    /// Name of the host's default input device, if any
    pub default_input: Option<String>,
}

impl std::fmt::Display for HostApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} out, {} in, default out: {})",
            self.name,
            self.output_devices,
            self.input_devices,
            self.default_output.as_deref().unwrap_or("none")
        )
    }
}

/// Direction of a device query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Output,
    Input,
}

/// Enumerate devices of one direction from all hosts
fn enumerate_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_name_str = host_name(host_id);

        let default_device_name = match direction {
            Direction::Output => host
                .default_output_device()
                .and_then(|d: cpal::Device| d.name().ok()),
            Direction::Input => host
                .default_input_device()
                .and_then(|d: cpal::Device| d.name().ok()),
        };

        let devices_iter: Vec<cpal::Device> = match direction {
            Direction::Output => match host.output_devices() {
                Ok(d) => d.collect(),
                Err(e) => {
                    log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                    continue;
                }
            },
            Direction::Input => match host.input_devices() {
                Ok(d) => d.collect(),
                Err(e) => {
                    log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                    continue;
                }
            },
        };

        for device in devices_iter {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };

            let is_default = default_device_name.as_ref() == Some(&name);

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;

            let ranges: Vec<(u32, u32, u16)> = match direction {
                Direction::Output => match device.supported_output_configs() {
                    Ok(c) => c
                        .map(|r| (r.min_sample_rate().0, r.max_sample_rate().0, r.channels()))
                        .collect(),
                    Err(_) => continue,
                },
                Direction::Input => match device.supported_input_configs() {
                    Ok(c) => c
                        .map(|r| (r.min_sample_rate().0, r.max_sample_rate().0, r.channels()))
                        .collect(),
                    Err(_) => continue,
                },
            };

            if ranges.is_empty() {
                continue;
            }

            for (min_rate, max_rate, channels) in &ranges {
                max_channels = max_channels.max(*channels);

                // Report common sample rates that fall within the supported range
                for rate in [22050, 44100, 48000, 88200, 96000] {
                    if rate >= *min_rate && rate <= *max_rate && !sample_rates.contains(&rate) {
                        sample_rates.push(rate);
                    }
                }
            }

            sample_rates.sort();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                name: name.clone(),
                host: host_name_str.clone(),
                is_default,
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    // Sort: default devices first, then by host, then by name
    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(all_devices)
}

/// Get all available audio output devices from ALL hosts
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let devices = enumerate_devices(Direction::Output)?;
    log::info!(
        "Enumerated {} output devices from {} hosts",
        devices.len(),
        cpal::available_hosts().len()
    );
    Ok(devices)
}

/// Get all available audio input devices from ALL hosts
pub fn get_input_devices() -> AudioResult<Vec<AudioDevice>> {
    let devices = enumerate_devices(Direction::Input)?;
    log::info!(
        "Enumerated {} input devices from {} hosts",
        devices.len(),
        cpal::available_hosts().len()
    );
    Ok(devices)
}

/// Get all available host APIs with their device counts
pub fn get_host_apis() -> Vec<HostApi> {
    let mut apis = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let output_devices = host.output_devices().map(|d| d.count()).unwrap_or(0);
        let input_devices = host.input_devices().map(|d| d.count()).unwrap_or(0);

        apis.push(HostApi {
            name: host_name(host_id),
            output_devices,
            input_devices,
            default_output: host
                .default_output_device()
                .and_then(|d: cpal::Device| d.name().ok()),
            default_input: host
                .default_input_device()
                .and_then(|d: cpal::Device| d.name().ok()),
        });
    }

    apis
}

/// Find an output device by its ID
///
/// Uses the host specified in the DeviceId if available, otherwise
/// searches all available hosts.
pub fn find_output_device(id: &DeviceId) -> AudioResult<cpal::Device> {
    // If a host is specified, use that specific host
    if let Some(ref host_name) = id.host {
        if let Some(host) = get_host_by_name(host_name) {
            return host
                .output_devices()
                .map_err(|e| AudioError::ConfigQuery(e.to_string()))?
                .find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
                .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
        }
    }

    // Otherwise, search all hosts for the device by name
    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(mut devices) = host.output_devices() {
                if let Some(device) =
                    devices.find(|d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name))
                {
                    return Ok(device);
                }
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Get the default output device from the default host
pub fn default_output_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string()))
}

/// Get the default input device from the default host
pub fn default_input_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // This test may find nothing on CI machines without audio hardware
        match get_output_devices() {
            Ok(devices) => {
                println!("Found {} output devices:", devices.len());
                for device in &devices {
                    println!(
                        "  - {} (default: {}, channels: {}, rates: {:?})",
                        device, device.is_default, device.max_channels, device.sample_rates
                    );
                }
            }
            Err(AudioError::NoDevices) => {
                println!("No audio devices available (expected in CI)");
            }
            Err(e) => {
                println!("Error enumerating devices: {}", e);
            }
        }
    }

    #[test]
    fn test_host_api_listing() {
        for api in get_host_apis() {
            println!("{}", api);
        }
    }
}
