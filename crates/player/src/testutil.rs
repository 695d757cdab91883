//! Helpers shared by the unit tests: canned sources, sinks, and a callback
//! recorder.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::error::Error;
use crate::item::{Item, ItemOptions};
use crate::sink::{FrameSink, SinkOpener};
use crate::source::{FrameSource, SourceOpener};

/// Source producing `frames` opaque frames of `frame_dur` each, then EOF.
pub(crate) struct FiniteSource {
    remaining: usize,
    frame_dur: Duration,
    diagnostics: Option<String>,
}

impl FrameSource for FiniteSource {
    fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream"));
        }
        self.remaining -= 1;
        Ok(vec![0u8; 8])
    }

    fn frame_duration(&self) -> Duration {
        self.frame_dur
    }

    fn diagnostics(&self) -> Option<String> {
        self.diagnostics.clone()
    }
}

pub(crate) fn finite_source(frames: usize, frame_dur: Duration) -> SourceOpener {
    Box::new(move || {
        Ok(Box::new(FiniteSource {
            remaining: frames,
            frame_dur,
            diagnostics: None,
        }) as Box<dyn FrameSource>)
    })
}

pub(crate) fn source_with_diagnostics(
    frames: usize,
    frame_dur: Duration,
    diagnostics: &str,
) -> SourceOpener {
    let diagnostics = diagnostics.to_string();
    Box::new(move || {
        Ok(Box::new(FiniteSource {
            remaining: frames,
            frame_dur,
            diagnostics: Some(diagnostics),
        }) as Box<dyn FrameSource>)
    })
}

/// A source that never yields a frame within any reasonable test run; used
/// to park the scheduler on one item.
pub(crate) fn slow_source() -> SourceOpener {
    finite_source(usize::MAX, Duration::from_secs(10))
}

/// Sink that counts frames and optionally fails after `fail_after` writes.
pub(crate) struct CountingSink {
    pub(crate) writes: Arc<AtomicUsize>,
    pub(crate) fail_after: Option<usize>,
}

impl FrameSink for CountingSink {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if n >= limit {
                return Err(io::Error::other("sink went away"));
            }
        }
        Ok(frame.len())
    }
}

pub(crate) fn null_sink() -> SinkOpener {
    Box::new(|_| {
        Ok(Box::new(CountingSink {
            writes: Arc::new(AtomicUsize::new(0)),
            fail_after: None,
        }) as Box<dyn FrameSink>)
    })
}

/// Everything an item reported through its callbacks, in order.
#[derive(Debug)]
pub(crate) enum Event {
    Start,
    Pause(Duration),
    Resume(Duration),
    Progress(Duration, Vec<Duration>),
    End(Duration, Error),
}

/// Wires every lifecycle callback of an item to a channel.
pub(crate) struct Recorder {
    pub(crate) rx: Receiver<Event>,
    tx: Sender<Event>,
}

impl Recorder {
    pub(crate) fn new() -> Recorder {
        let (tx, rx) = crossbeam_channel::unbounded();
        Recorder { rx, tx }
    }

    pub(crate) fn wrap(&self, opts: ItemOptions) -> ItemOptions {
        let (start, pause, resume, end) = (
            self.tx.clone(),
            self.tx.clone(),
            self.tx.clone(),
            self.tx.clone(),
        );
        opts.on_start(move || {
            let _ = start.send(Event::Start);
        })
        .on_pause(move |elapsed| {
            let _ = pause.send(Event::Pause(elapsed));
        })
        .on_resume(move |elapsed| {
            let _ = resume.send(Event::Resume(elapsed));
        })
        .on_end(move |elapsed, error| {
            let _ = end.send(Event::End(elapsed, error));
        })
    }

    /// Additionally report progress every `interval`.
    pub(crate) fn with_progress(&self, opts: ItemOptions, interval: Duration) -> ItemOptions {
        let progress = self.tx.clone();
        opts.on_progress(
            move |elapsed, latencies| {
                let _ = progress.send(Event::Progress(elapsed, latencies));
            },
            interval,
        )
    }

    /// Next event, failing the test if none arrives in time.
    pub(crate) fn next(&self) -> Event {
        self.rx
            .recv_timeout(Duration::from_secs(5))
            .expect("no callback within 5s")
    }
}

/// Terminal callback capture for queue-level tests.
pub(crate) struct ItemEnd {
    pub(crate) elapsed: Duration,
    pub(crate) error: Error,
}

#[derive(Clone)]
pub(crate) struct EndCell(Arc<Mutex<Option<ItemEnd>>>);

impl EndCell {
    pub(crate) fn take(&self) -> Option<ItemEnd> {
        self.0.lock().unwrap().take()
    }
}

/// A minimal item for broker-level tests: three short frames, null sink.
pub(crate) fn test_item(title: &str) -> Item {
    ItemOptions::new().into_item(
        "test-channel".into(),
        title.into(),
        finite_source(3, Duration::from_millis(5)),
        null_sink(),
    )
}

pub(crate) fn test_item_with_end(title: &str) -> (Item, EndCell) {
    let cell = EndCell(Arc::new(Mutex::new(None)));
    let slot = cell.clone();
    let item = ItemOptions::new()
        .on_end(move |elapsed, error| {
            *slot.0.lock().unwrap() = Some(ItemEnd { elapsed, error });
        })
        .into_item(
            "test-channel".into(),
            title.into(),
            finite_source(3, Duration::from_millis(5)),
            null_sink(),
        );
    (item, cell)
}

/// Spin until `cond` holds, failing the test after five seconds.
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        std::thread::sleep(Duration::from_millis(1));
    }
}
