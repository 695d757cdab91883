use std::io;

use thiserror::Error;

/// Terminal outcomes and admission failures surfaced by the player.
///
/// `Full` and `Closed` are returned synchronously from `enqueue`; everything
/// else reaches the caller through an item's `on_end` callback. Playback has
/// no silent success path: even a stream that plays to completion ends with
/// an EOF-flavored [`Error::ReadFrame`].
#[derive(Debug, Error)]
pub enum Error {
    /// The queue is at its configured bound.
    #[error("queue is full")]
    Full,

    /// The player was closed.
    #[error("player is closed")]
    Closed,

    /// The item was removed from the queue by `clear`.
    #[error("cleared")]
    Cleared,

    /// The item was skipped while playing or paused.
    #[error("skipped")]
    Skipped,

    /// The sink opener failed; playback never started.
    #[error("failed to open sink")]
    OpenSink(#[source] io::Error),

    /// The source opener failed; playback never started.
    #[error("failed to open source")]
    OpenSource(#[source] io::Error),

    /// The configured transcoder rejected the source.
    #[error("failed to start transcoder")]
    Transcode(#[source] io::Error),

    /// A frame read failed. End-of-stream lands here too.
    #[error("failed to read frame")]
    ReadFrame(#[source] io::Error),

    /// A frame write to the sink failed.
    #[error("failed to write frame")]
    WriteFrame(#[source] io::Error),
}

impl Error {
    /// Whether this is the normal end of a stream rather than a fault.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::ReadFrame(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}
