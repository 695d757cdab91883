//! Audio Deck: queued playback of local audio files.
//!
//! Every file becomes one item in a [`deck_player::Player`] queue:
//!
//! 1. **Decode**: a background thread uses Symphonia to decode the track
//!    into interleaved `f32`, sliced into fixed-duration frames.
//! 2. **Engine**: the player paces frames from the source to the sink and
//!    applies pause/skip/clear between frames.
//! 3. **Output**: a CPAL stream drains the sink's ring without blocking.
//!
//! Stdin control while playing: `p` pause/resume, `s` skip, `c` clear the
//! queue, `q` quit.

mod cli;
mod decode;
mod device;
mod output;
mod ring;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use tracing_subscriber::EnvFilter;

use deck_player::{ItemOptions, Player, PlayerConfig, SinkOpener, SourceOpener};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list_devices {
        return device::list_devices(&cpal::default_host());
    }
    if args.files.is_empty() {
        bail!("no input files (see --help)");
    }

    let player = Arc::new(Player::new(PlayerConfig {
        queue_length: args.queue_length,
        idle_timeout: (args.idle_timeout_ms > 0)
            .then(|| Duration::from_millis(args.idle_timeout_ms)),
        on_idle: Some(Box::new(|| tracing::info!("queue idle"))),
        transcoder: None,
    }));

    let (done_tx, done_rx) = crossbeam_channel::bounded(args.files.len());
    let mut accepted = 0;
    for path in &args.files {
        match queue_track(&player, &args, path.clone(), done_tx.clone()) {
            Ok(()) => accepted += 1,
            Err(e) => tracing::warn!("skipping {:?}: {e:#}", path),
        }
    }
    if accepted == 0 {
        bail!("no playable files");
    }

    spawn_stdin_control(player.clone());

    for _ in 0..accepted {
        done_rx.recv().context("player stopped unexpectedly")?;
    }
    let _ = player.close();
    Ok(())
}

/// Probe one file and enqueue it with logging callbacks wired up.
fn queue_track(
    player: &Player,
    args: &cli::Args,
    path: PathBuf,
    done: Sender<()>,
) -> Result<()> {
    let spec = decode::probe(&path)?;
    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let frame_ms = args.frame_ms.max(1);
    let src_path = path.clone();
    let open_source: SourceOpener = Box::new(move || decode::open_source(&src_path, frame_ms));

    let device_needle = args.device.clone();
    let (rate, channels) = (spec.rate, spec.channels);
    let open_sink: SinkOpener =
        Box::new(move |_channel| output::open_sink(device_needle.as_deref(), rate, channels));

    // sources hand the engine raw frames; no transcoder is configured
    let mut opts = ItemOptions::new().pre_encoded();
    if let Some(d) = spec.duration {
        opts = opts.duration(d);
    }

    let track = title.clone();
    opts = opts.on_start(move || tracing::info!(track = %track, "playing"));
    let track = title.clone();
    opts = opts.on_pause(move |elapsed| tracing::info!(track = %track, ?elapsed, "paused"));
    let track = title.clone();
    opts = opts.on_resume(move |elapsed| tracing::info!(track = %track, ?elapsed, "resumed"));
    if args.progress_secs > 0 {
        let track = title.clone();
        opts = opts.on_progress(
            move |elapsed, latencies| {
                let worst = latencies.iter().max().copied().unwrap_or_default();
                tracing::debug!(track = %track, ?elapsed, ?worst, "progress");
            },
            Duration::from_secs(args.progress_secs),
        );
    }
    let track = title.clone();
    opts = opts.on_end(move |elapsed, err| {
        if err.is_eof() {
            tracing::info!(track = %track, ?elapsed, "finished");
        } else {
            tracing::warn!(track = %track, ?elapsed, error = %err, "stopped");
        }
        let _ = done.send(());
    });

    let channel_id = args.device.clone().unwrap_or_else(|| "default".into());
    player.enqueue(channel_id, title, open_source, open_sink, opts)?;
    Ok(())
}

fn spawn_stdin_control(player: Arc<Player>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => return, // EOF: playback continues unattended
                Ok(_) => {}
            }
            match line.trim() {
                "p" => player.pause(),
                "s" => player.skip(),
                "c" => player.clear(),
                "q" => {
                    player.clear();
                    player.skip();
                }
                "" => {}
                other => {
                    tracing::info!("unknown command {other:?} (p=pause s=skip c=clear q=quit)")
                }
            }
        }
    });
}
