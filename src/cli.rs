use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "audio-deck", about = "Queued playback of local audio files")]
pub struct Args {
    /// Audio files to queue, in play order
    pub files: Vec<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Maximum queued tracks (0 = unbounded)
    #[arg(long, default_value_t = 100)]
    pub queue_length: usize,

    /// Idle log after this many milliseconds without a track (0 disables)
    #[arg(long, default_value_t = 300)]
    pub idle_timeout_ms: u64,

    /// Frame size in milliseconds
    #[arg(long, default_value_t = 20)]
    pub frame_ms: u64,

    /// Progress report interval in seconds (0 disables)
    #[arg(long, default_value_t = 10)]
    pub progress_secs: u64,
}
