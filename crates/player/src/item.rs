//! One playback request and its lifecycle callbacks.

use std::time::Duration;

use crate::error::Error;
use crate::sink::SinkOpener;
use crate::source::{CodecHints, SourceOpener};

pub(crate) type StartFn = Box<dyn FnMut() + Send + Sync>;
pub(crate) type ElapsedFn = Box<dyn FnMut(Duration) + Send + Sync>;
pub(crate) type ProgressFn = Box<dyn FnMut(Duration, Vec<Duration>) + Send + Sync>;
pub(crate) type EndFn = Box<dyn FnMut(Duration, Error) + Send + Sync>;

/// Lifecycle callbacks with no-op defaults.
///
/// All callbacks run on the scheduler thread. `on_end` fires exactly once
/// per accepted item; `on_start` at most once, and only if playback actually
/// began; `on_pause`/`on_resume` strictly alternate starting with pause.
pub(crate) struct Callbacks {
    pub(crate) on_start: StartFn,
    pub(crate) on_pause: ElapsedFn,
    pub(crate) on_resume: ElapsedFn,
    pub(crate) on_progress: ProgressFn,
    pub(crate) progress_interval: Option<Duration>,
    pub(crate) on_end: EndFn,
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("channel_id", &self.channel_id)
            .field("title", &self.title)
            .field("duration", &self.duration)
            .field("hints", &self.hints)
            .field("pre_encoded", &self.pre_encoded)
            .finish_non_exhaustive()
    }
}

/// Immutable descriptor of one accepted playback request.
pub(crate) struct Item {
    pub(crate) channel_id: String,
    pub(crate) title: String,
    pub(crate) open_source: SourceOpener,
    pub(crate) open_sink: SinkOpener,
    pub(crate) duration: Option<Duration>,
    pub(crate) hints: CodecHints,
    pub(crate) pre_encoded: bool,
    pub(crate) callbacks: Callbacks,
}

/// Options applied to one enqueued item.
///
/// Builder-style; every option is optional and `enqueue` installs safe
/// defaults for the rest.
#[derive(Default)]
pub struct ItemOptions {
    pre_encoded: bool,
    filter: Option<String>,
    loudness: Option<f64>,
    duration: Option<Duration>,
    on_start: Option<StartFn>,
    on_pause: Option<ElapsedFn>,
    on_resume: Option<ElapsedFn>,
    on_progress: Option<(ProgressFn, Duration)>,
    on_end: Option<EndFn>,
}

impl ItemOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The source already produces frames directly; bypass any configured
    /// transcoder.
    pub fn pre_encoded(mut self) -> Self {
        self.pre_encoded = true;
        self
    }

    /// Free-form filter hint forwarded to the transcoder.
    pub fn filter(mut self, af: impl Into<String>) -> Self {
        self.filter = Some(af.into());
        self
    }

    /// Loudness normalization target. Higher is louder. Values outside
    /// `[-70.0, -5.0]` are ignored.
    pub fn loudness(mut self, target: f64) -> Self {
        if (-70.0..=-5.0).contains(&target) {
            self.loudness = Some(target);
        }
        self
    }

    /// Expected length of the item. Used only to decide whether a read
    /// failure happened suspiciously early.
    pub fn duration(mut self, d: Duration) -> Self {
        self.duration = Some(d);
        self
    }

    pub fn on_start(mut self, f: impl FnMut() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_pause(mut self, f: impl FnMut(Duration) + Send + Sync + 'static) -> Self {
        self.on_pause = Some(Box::new(f));
        self
    }

    pub fn on_resume(mut self, f: impl FnMut(Duration) + Send + Sync + 'static) -> Self {
        self.on_resume = Some(Box::new(f));
        self
    }

    /// Install a progress callback invoked roughly every `interval`,
    /// quantized down to a whole number of frames. Receives the elapsed
    /// playback time and the wall-clock latencies between the batched frame
    /// writes.
    pub fn on_progress(
        mut self,
        f: impl FnMut(Duration, Vec<Duration>) + Send + Sync + 'static,
        interval: Duration,
    ) -> Self {
        self.on_progress = Some((Box::new(f), interval));
        self
    }

    pub fn on_end(mut self, f: impl FnMut(Duration, Error) + Send + Sync + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    pub(crate) fn into_item(
        self,
        channel_id: String,
        title: String,
        open_source: SourceOpener,
        open_sink: SinkOpener,
    ) -> Item {
        let (on_progress, progress_interval) = match self.on_progress {
            Some((f, interval)) => (f, Some(interval)),
            None => (Box::new(|_, _| {}) as ProgressFn, None),
        };
        Item {
            channel_id,
            title,
            open_source,
            open_sink,
            duration: self.duration,
            hints: CodecHints {
                filter: self.filter,
                loudness: self.loudness,
            },
            pre_encoded: self.pre_encoded,
            callbacks: Callbacks {
                on_start: self.on_start.unwrap_or_else(|| Box::new(|| {})),
                on_pause: self.on_pause.unwrap_or_else(|| Box::new(|_| {})),
                on_resume: self.on_resume.unwrap_or_else(|| Box::new(|_| {})),
                on_progress,
                progress_interval,
                on_end: self.on_end.unwrap_or_else(|| Box::new(|_, _| {})),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loudness_outside_range_is_ignored() {
        let opts = ItemOptions::new().loudness(-80.0);
        assert!(opts.loudness.is_none());
        let opts = ItemOptions::new().loudness(0.0);
        assert!(opts.loudness.is_none());
        let opts = ItemOptions::new().loudness(-18.0);
        assert_eq!(opts.loudness, Some(-18.0));
    }

    #[test]
    fn into_item_installs_default_callbacks() {
        let item = ItemOptions::new().into_item(
            "ch".into(),
            "title".into(),
            Box::new(|| Err(std::io::Error::other("unused"))),
            Box::new(|_| Err(std::io::Error::other("unused"))),
        );
        let mut cb = item.callbacks;
        (cb.on_start)();
        (cb.on_pause)(Duration::ZERO);
        (cb.on_resume)(Duration::ZERO);
        (cb.on_progress)(Duration::ZERO, Vec::new());
        (cb.on_end)(Duration::ZERO, Error::Cleared);
        assert!(cb.progress_interval.is_none());
    }
}
