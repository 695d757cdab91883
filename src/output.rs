//! CPAL-backed frame sink.
//!
//! `write_frame` pushes interleaved `f32` samples into a bounded ring; the
//! CPAL callback drains the ring without blocking and fills underruns with
//! silence. CPAL streams are not `Send`, so each sink parks its stream on a
//! dedicated thread and holds only the ring and a stop handle. The engine's
//! frame pacing keeps the ring shallow, so pause and skip take effect within
//! a frame or two of audio.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::device;
use crate::ring::SampleRing;
use deck_player::FrameSink;

/// Open a sink playing at `rate`/`channels` on the selected device.
pub fn open_sink(
    device_needle: Option<&str>,
    rate: u32,
    channels: usize,
) -> io::Result<Box<dyn FrameSink>> {
    build_sink(device_needle, rate, channels)
        .map(|s| Box::new(s) as Box<dyn FrameSink>)
        .map_err(|e| io::Error::other(format!("{e:#}")))
}

pub struct DeviceSink {
    ring: Arc<SampleRing>,
    stop_tx: Sender<()>,
    stream_thread: Option<JoinHandle<()>>,
}

impl FrameSink for DeviceSink {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.ring.push_blocking(&bytes_to_samples(frame));
        Ok(frame.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.ring.close();
        self.ring.wait_drained(Duration::from_secs(2));
        self.shutdown();
        Ok(())
    }
}

impl DeviceSink {
    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        if self.stream_thread.is_some() {
            // let the tail play out before the stream is torn down
            self.ring.close();
            self.ring.wait_drained(Duration::from_millis(500));
            self.shutdown();
        }
    }
}

fn build_sink(needle: Option<&str>, rate: u32, channels: usize) -> Result<DeviceSink> {
    // half a second of slack on top of the engine's own pacing
    let ring = Arc::new(SampleRing::new((rate as usize * channels / 2).max(channels)));
    let (ready_tx, ready_rx) = bounded(1);
    let (stop_tx, stop_rx) = bounded(1);

    let needle = needle.map(str::to_string);
    let thread_ring = ring.clone();
    let handle =
        thread::spawn(move || stream_thread(needle, rate, channels, thread_ring, ready_tx, stop_rx));

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(DeviceSink {
            ring,
            stop_tx,
            stream_thread: Some(handle),
        }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("output stream thread died during setup"))
        }
    }
}

/// Owns the CPAL stream for the sink's lifetime; the stream is created and
/// dropped on this thread because it is not `Send`.
fn stream_thread(
    needle: Option<String>,
    rate: u32,
    channels: usize,
    ring: Arc<SampleRing>,
    ready_tx: Sender<Result<()>>,
    stop_rx: Receiver<()>,
) {
    match open_stream(needle.as_deref(), rate, channels, ring) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            // parked until the sink closes or is dropped
            let _ = stop_rx.recv();
            drop(stream);
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn open_stream(
    needle: Option<&str>,
    rate: u32,
    channels: usize,
    ring: Arc<SampleRing>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, needle)?;
    let supported = device::pick_output_config(&device, rate, channels as u16)?;
    let stream_config: cpal::StreamConfig = supported.clone().into();

    let stream = build_stream(
        &device,
        &stream_config,
        supported.sample_format(),
        ring,
        channels,
    )?;
    stream.play().context("start output stream")?;
    Ok(stream)
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: Arc<SampleRing>,
    src_channels: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => stream_for::<f32>(device, config, ring, src_channels),
        cpal::SampleFormat::I16 => stream_for::<i16>(device, config, ring, src_channels),
        cpal::SampleFormat::I32 => stream_for::<i32>(device, config, ring, src_channels),
        cpal::SampleFormat::U16 => stream_for::<u16>(device, config, ring, src_channels),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

fn stream_for<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<SampleRing>,
    src_channels: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let out_channels = config.channels as usize;
    let err_fn = |err| tracing::warn!("output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| fill_output(data, out_channels, src_channels, &ring),
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Drain the ring into one output buffer, mapping channels best-effort and
/// padding underruns with silence.
fn fill_output<T>(data: &mut [T], out_channels: usize, src_channels: usize, ring: &SampleRing)
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let frames = data.len() / out_channels;
    let samples = ring.try_pop_up_to(frames * src_channels, src_channels);
    let avail = if src_channels > 0 {
        samples.len() / src_channels
    } else {
        0
    };

    for frame in 0..frames {
        for ch in 0..out_channels {
            let v = if frame < avail {
                map_sample(&samples, frame, src_channels, ch)
            } else {
                0.0
            };
            data[frame * out_channels + ch] = <T as cpal::Sample>::from_sample::<f32>(v);
        }
    }
}

fn map_sample(samples: &[f32], frame: usize, src_channels: usize, dst_ch: usize) -> f32 {
    let base = frame * src_channels;
    match src_channels {
        0 => 0.0,
        1 => samples[base],
        _ => samples[base + dst_ch.min(src_channels - 1)],
    }
}

/// Little-endian bytes → interleaved `f32`, the CLI's opaque frame format.
pub fn bytes_to_samples(frame: &[u8]) -> Vec<f32> {
    frame
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
