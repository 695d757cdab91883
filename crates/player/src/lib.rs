//! Controllable queued playback of opaque audio frames.
//!
//! A [`Player`] accepts playback requests through a bounded queue and drives
//! each one as a timed stream of frames from a pluggable [`FrameSource`] to
//! a pluggable [`FrameSink`], under live control (pause, resume, skip,
//! clear, close) issued concurrently from other threads.
//!
//! The engine knows nothing about audio formats, transports, or decoders;
//! those live entirely behind the source and sink contracts. What it does
//! guarantee:
//!
//! - every accepted item gets exactly one terminal `on_end` callback,
//! - control signals are observed between frames, including while paused,
//! - items handed directly to a parked poller keep enrollment order, and
//!   queued items are delivered FIFO,
//! - [`Player::close`] drains the queue and returns only after the in-flight
//!   item and all callbacks have finished.

pub mod config;
pub mod error;
pub mod item;
mod playback;
pub mod player;
pub mod sink;
pub mod source;
#[cfg(test)]
mod testutil;

pub use config::{IdleFn, PlayerConfig};
pub use error::Error;
pub use item::ItemOptions;
pub use player::Player;
pub use sink::{FrameSink, SinkOpener};
pub use source::{CodecHints, FrameSource, SourceOpener, Transcoder};
