//! Sink side of the playback contract.

use std::io;

/// Accepts whole frames produced by a source.
///
/// The engine makes no assumption about framing on the wire; it writes each
/// frame exactly as the source produced it.
pub trait FrameSink: Send {
    /// Write one frame, returning the number of bytes accepted.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Release the sink. Called once, on player shutdown, for the most
    /// recently opened sink.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Factory producing the sink for one item.
///
/// Receives the item's opaque `channel_id` routing key. The factory may hand
/// out writers backed by a resource shared across items; the engine opens a
/// sink per item and never closes it between items.
pub type SinkOpener = Box<dyn FnOnce(&str) -> io::Result<Box<dyn FrameSink>> + Send + Sync>;
