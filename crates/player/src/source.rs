//! Source side of the playback contract.
//!
//! A [`FrameSource`] yields opaque frames with a fixed per-frame duration;
//! the engine never inspects frame contents. Sources that hold resources
//! release them in `Drop`.

use std::io;
use std::time::Duration;

/// Lazy sequence of opaque frames for one playback.
pub trait FrameSource: Send {
    /// Read the next frame.
    ///
    /// End of stream is reported as an error of kind
    /// [`io::ErrorKind::UnexpectedEof`] and terminates playback normally.
    fn read_frame(&mut self) -> io::Result<Vec<u8>>;

    /// Duration covered by every frame. Must be positive and constant over a
    /// single open.
    fn frame_duration(&self) -> Duration;

    /// Extra decoder context, attached to the error when a read fails well
    /// before the item's declared duration.
    fn diagnostics(&self) -> Option<String> {
        None
    }
}

/// Factory producing the source for one item, invoked when playback begins.
pub type SourceOpener = Box<dyn FnOnce() -> io::Result<Box<dyn FrameSource>> + Send + Sync>;

/// Codec hints carried by an item. Opaque to the engine; forwarded verbatim
/// to the configured [`Transcoder`].
#[derive(Clone, Debug, Default)]
pub struct CodecHints {
    /// Free-form filter expression.
    pub filter: Option<String>,
    /// Loudness normalization target, already range-validated.
    pub loudness: Option<f64>,
}

/// Wraps an opened source before playback.
///
/// Applied to every item that is not marked pre-encoded. A transcode failure
/// is a transport fault delivered through the item's `on_end`.
pub trait Transcoder: Send {
    fn transcode(
        &self,
        src: Box<dyn FrameSource>,
        hints: &CodecHints,
    ) -> io::Result<Box<dyn FrameSource>>;
}
