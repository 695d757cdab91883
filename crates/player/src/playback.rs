//! The scheduler loop and the per-item frame pump.
//!
//! One scheduler thread serves a player for its whole life: it polls the
//! queue, opens the sink and source for each item, runs the frame pump, and
//! fires the item's terminal callback. The pump paces reads with a ticker at
//! half the frame duration so control signals are observed between frames
//! without a busy loop.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, tick};

use crate::config::IdleFn;
use crate::error::Error;
use crate::item::{Callbacks, Item};
use crate::player::{Control, PollError, Shared};
use crate::sink::FrameSink;
use crate::source::{CodecHints, FrameSource, Transcoder};

/// Long-lived worker: poll, play, repeat until the player closes.
pub(crate) fn scheduler_loop(
    shared: &Arc<Shared>,
    mut on_idle: IdleFn,
    transcoder: Option<Box<dyn Transcoder>>,
) {
    let mut poll_timeout = shared.idle_timeout;
    let mut sink: Option<Box<dyn FrameSink>> = None;

    loop {
        let item = match shared.poll(poll_timeout) {
            Ok(item) => item,
            Err(PollError::Timeout) => {
                // block indefinitely from now on so the idle action runs
                // once per idle stretch, not once per poll
                poll_timeout = None;
                on_idle();
                continue;
            }
            Err(PollError::Closed) => {
                if let Some(mut sink) = sink.take() {
                    if let Err(e) = sink.close() {
                        tracing::warn!("closing sink on shutdown: {e}");
                    }
                }
                return;
            }
        };
        poll_timeout = shared.idle_timeout;

        let (mut callbacks, elapsed, err) =
            open_and_play(shared, item, transcoder.as_deref(), &mut sink);
        (callbacks.on_end)(elapsed, err);
    }
}

/// Open the item's sink and source, then pump frames until a terminal
/// outcome. Always returns the callbacks so the caller can fire `on_end`.
fn open_and_play(
    shared: &Shared,
    item: Item,
    transcoder: Option<&dyn Transcoder>,
    sink_slot: &mut Option<Box<dyn FrameSink>>,
) -> (Callbacks, Duration, Error) {
    let Item {
        channel_id,
        title,
        open_source,
        open_sink,
        duration,
        hints,
        pre_encoded,
        mut callbacks,
    } = item;

    tracing::debug!(title = %title, channel = %channel_id, "opening playback");

    let mut sink = match open_sink(&channel_id) {
        Ok(sink) => sink,
        Err(e) => return (callbacks, Duration::ZERO, Error::OpenSink(e)),
    };

    let (elapsed, err) = match open_source_for(open_source, pre_encoded, &hints, transcoder) {
        Ok(mut src) => play(shared, src.as_mut(), sink.as_mut(), &mut callbacks, duration),
        Err(err) => (Duration::ZERO, err),
    };

    // the sink outlives the item; the most recently opened one is closed
    // when the scheduler exits
    *sink_slot = Some(sink);

    (callbacks, elapsed, err)
}

fn open_source_for(
    open_source: crate::source::SourceOpener,
    pre_encoded: bool,
    hints: &CodecHints,
    transcoder: Option<&dyn Transcoder>,
) -> Result<Box<dyn FrameSource>, Error> {
    let src = open_source().map_err(Error::OpenSource)?;
    if pre_encoded {
        return Ok(src);
    }
    match transcoder {
        Some(t) => t.transcode(src, hints).map_err(Error::Transcode),
        None => Ok(src),
    }
}

/// Per-item state machine: a multi-way wait over quit, control, and the
/// frame ticker.
///
/// While paused the ticker arm is swapped out for a channel that never
/// fires, so only quit and control can wake the loop; a Skip received while
/// paused ends the item immediately and the pump never advances.
fn play(
    shared: &Shared,
    src: &mut dyn FrameSource,
    dst: &mut dyn FrameSink,
    cb: &mut Callbacks,
    duration: Option<Duration>,
) -> (Duration, Error) {
    let frame_dur = src.frame_duration();
    let mut n_writes: u32 = 0;
    let mut elapsed = Duration::ZERO;

    // progress window in whole frames; zero-width windows disable sampling
    let window = cb
        .progress_interval
        .filter(|_| !frame_dur.is_zero())
        .map(|interval| (interval.as_nanos() / frame_dur.as_nanos()) as usize)
        .filter(|w| *w > 0);
    let mut latencies: Vec<Duration> = Vec::with_capacity(window.unwrap_or(0));
    let mut prev_write: Option<Instant> = None;

    // a Skip or Pause sent before this item began must not apply to it
    while shared.ctrl_rx.try_recv().is_ok() {}

    let ticker = tick(frame_dur / 2);
    let parked = never();
    let mut paused = false;

    (cb.on_start)();
    loop {
        let ready = if paused { &parked } else { &ticker };
        select! {
            recv(shared.quit) -> _ => return (elapsed, Error::Closed),
            recv(shared.ctrl_rx) -> sig => match sig {
                Ok(Control::Skip) => return (elapsed, Error::Skipped),
                Ok(Control::Pause) => {
                    if paused {
                        (cb.on_resume)(elapsed);
                    } else {
                        (cb.on_pause)(elapsed);
                    }
                    paused = !paused;
                }
                Err(_) => return (elapsed, Error::Closed),
            },
            recv(ready) -> _ => {
                let frame = match src.read_frame() {
                    Ok(frame) => frame,
                    Err(e) => return (elapsed, read_error(src, duration, elapsed, e)),
                };
                if let Err(e) = dst.write_frame(&frame) {
                    return (elapsed, Error::WriteFrame(e));
                }
                n_writes += 1;
                elapsed = frame_dur * n_writes;

                if let Some(window) = window {
                    let now = Instant::now();
                    if let Some(prev) = prev_write {
                        latencies.push(now - prev);
                    }
                    prev_write = Some(now);
                    if n_writes as usize % window == 0 {
                        (cb.on_progress)(elapsed, latencies.clone());
                        latencies.clear();
                    }
                }
            }
        }
    }
}

/// Attach decoder diagnostics when the stream dies well before its declared
/// duration.
fn read_error(
    src: &dyn FrameSource,
    duration: Option<Duration>,
    elapsed: Duration,
    e: io::Error,
) -> Error {
    let early = duration
        .map(|d| d.saturating_sub(elapsed) > Duration::from_secs(1))
        .unwrap_or(false);
    if early {
        if let Some(details) = src.diagnostics() {
            return Error::ReadFrame(io::Error::new(e.kind(), format!("{details}: {e}")));
        }
    }
    Error::ReadFrame(e)
}
