//! Symphonia-backed frame source.
//!
//! A background thread decodes packets into interleaved `f32` samples and
//! fills a bounded ring; [`FileSource`] slices the ring into fixed-duration
//! frames for the playback engine. A decode fault is remembered so the
//! engine can attach it to the read error as diagnostics.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::ring::SampleRing;
use deck_player::FrameSource;

/// What the CLI needs to know about a track before enqueueing it.
pub struct TrackSpec {
    pub rate: u32,
    pub channels: usize,
    pub duration: Option<Duration>,
}

/// Probe `path` without starting a decode.
pub fn probe(path: &Path) -> Result<TrackSpec> {
    let (_, params) = open_format(path)?;
    spec_from_params(&params)
}

/// Open `path` and start its decode thread; returns the engine-facing
/// source. Frames carry `frame_ms` of interleaved little-endian `f32`.
pub fn open_source(path: &Path, frame_ms: u64) -> io::Result<Box<dyn FrameSource>> {
    start_source(path, frame_ms).map_err(|e| io::Error::other(format!("{e:#}")))
}

pub struct FileSource {
    ring: Arc<SampleRing>,
    frame_dur: Duration,
    samples_per_frame: usize,
    fault: Arc<Mutex<Option<String>>>,
}

impl FrameSource for FileSource {
    fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        match self.ring.pop_exact(self.samples_per_frame) {
            Some(samples) => Ok(samples_to_bytes(&samples)),
            None => match self.fault.lock().unwrap().clone() {
                Some(msg) => Err(io::Error::other(msg)),
                None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")),
            },
        }
    }

    fn frame_duration(&self) -> Duration {
        self.frame_dur
    }

    fn diagnostics(&self) -> Option<String> {
        self.fault.lock().unwrap().clone()
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        // unblock the decode thread if playback ended early
        self.ring.close();
    }
}

fn start_source(path: &Path, frame_ms: u64) -> Result<Box<dyn FrameSource>> {
    let (format, params) = open_format(path)?;
    let spec = spec_from_params(&params)?;

    let frame_ms = frame_ms.max(1);
    let samples_per_frame =
        (spec.rate as u64 * frame_ms / 1000).max(1) as usize * spec.channels;
    // about two seconds of decoded audio between the decoder and the pump
    let ring = Arc::new(SampleRing::new(spec.rate as usize * spec.channels * 2));
    let fault = Arc::new(Mutex::new(None));

    let decode_ring = ring.clone();
    let decode_fault = fault.clone();
    thread::spawn(move || {
        if let Err(e) = decode_loop(format, params, &decode_ring) {
            tracing::warn!("decode thread: {e:#}");
            *decode_fault.lock().unwrap() = Some(format!("{e:#}"));
        }
        decode_ring.close();
    });

    Ok(Box::new(FileSource {
        ring,
        frame_dur: Duration::from_millis(frame_ms),
        samples_per_frame,
        fault,
    }))
}

fn open_format(path: &Path) -> Result<(Box<dyn FormatReader>, CodecParameters)> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    let params = track.codec_params.clone();
    Ok((format, params))
}

fn decode_loop(
    mut format: Box<dyn FormatReader>,
    params: CodecParameters,
    ring: &SampleRing,
) -> Result<()> {
    let mut decoder =
        symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        ring.push_blocking(buf.samples());
    }

    Ok(())
}

fn spec_from_params(params: &CodecParameters) -> Result<TrackSpec> {
    let rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    let channels = params
        .channels
        .ok_or_else(|| anyhow!("unknown channel layout"))?
        .count();
    let duration = params
        .n_frames
        .map(|frames| Duration::from_secs_f64(frames as f64 / rate as f64));
    Ok(TrackSpec {
        rate,
        channels,
        duration,
    })
}

/// Interleaved `f32` → little-endian bytes, the CLI's opaque frame format.
pub fn samples_to_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_round_trip_through_bytes() {
        let samples = [0.0f32, -1.0, 0.5, 127.25];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(bytes.len(), 16);
        let back = crate::output::bytes_to_samples(&bytes);
        assert_eq!(back, samples);
    }
}
