//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for listing output devices and choosing one by
//! substring match, plus a config picker that prefers the track's own
//! sample rate.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};

pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());
    for device in host.output_devices().context("no output devices")? {
        let name = device.name().unwrap_or_else(|_| "<unknown>".into());
        if Some(&name) == default_name.as_ref() {
            println!("{name} (default)");
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

/// Pick the first output device whose name contains `needle`
/// (case-insensitive), or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("no output devices")?
        .collect();

    if let Some(needle) = needle {
        let needle_lc = needle.to_lowercase();
        if let Some(d) = devices.drain(..).find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&needle_lc))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("no output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}

/// Choose an output config for the track's sample rate.
///
/// Prefers a range that matches the channel count and contains the rate;
/// falls back to any range containing the rate, then to the device default.
pub fn pick_output_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let target = cpal::SampleRate(rate);
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();

    let fits = |r: &cpal::SupportedStreamConfigRange| {
        r.min_sample_rate() <= target && target <= r.max_sample_rate()
    };
    if let Some(r) = ranges.iter().find(|r| r.channels() == channels && fits(r)) {
        return Ok(r.clone().with_sample_rate(target));
    }
    if let Some(r) = ranges.iter().find(|r| fits(r)) {
        return Ok(r.clone().with_sample_rate(target));
    }
    device
        .default_output_config()
        .context("no usable output config")
}
