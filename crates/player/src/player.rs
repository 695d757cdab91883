//! The player: bounded queue, waiter broker, control mailbox, and the
//! public control surface.
//!
//! One scheduler thread per player polls the queue and drives playback; any
//! number of producer threads enqueue items and send control signals. The
//! queue and waiter list live behind a reader-writer lock; the quit channel
//! and the single-slot control mailbox are plain crossbeam channels, so
//! signalling never needs the lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{after, bounded, never, select, Receiver, SendError, Sender};

use crate::config::PlayerConfig;
use crate::error::Error;
use crate::item::{Item, ItemOptions};
use crate::playback;
use crate::sink::SinkOpener;
use crate::source::SourceOpener;

/// Control signal for the currently playing item.
///
/// Carried in a single-slot mailbox; a signal arriving while one is already
/// pending is dropped. Callers observe the effect through lifecycle
/// callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    Skip,
    Pause,
}

/// A parked poller awaiting a direct item hand-off.
///
/// `input` is a rendezvous channel: a send can only complete while the
/// poller is still blocked receiving. `dead` is the poller's cancellation
/// signal; the poller drops its end on timeout or shutdown, and a pending
/// `enqueue` observes the disconnect and moves on to the next waiter. Giving
/// `input` any buffer would let an item land in the slot of a poller that
/// already gave up.
pub(crate) struct Waiter {
    input: Sender<Item>,
    dead: Receiver<()>,
}

pub(crate) struct State {
    pub(crate) closed: bool,
    pub(crate) queue: VecDeque<Item>,
    pub(crate) waiters: VecDeque<Waiter>,
    /// Dropped on close; every blocked select observes the disconnect.
    quit_tx: Option<Sender<()>>,
}

/// State shared between the public handle and the scheduler thread.
pub(crate) struct Shared {
    pub(crate) queue_length: usize,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) state: RwLock<State>,
    pub(crate) quit: Receiver<()>,
    pub(crate) ctrl_tx: Sender<Control>,
    pub(crate) ctrl_rx: Receiver<Control>,
}

/// Why an internal poll returned without an item.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PollError {
    Timeout,
    Closed,
}

impl Shared {
    pub(crate) fn new(queue_length: usize, idle_timeout: Option<Duration>) -> Shared {
        let (quit_tx, quit_rx) = bounded::<()>(0);
        // one slot so skip/pause never wait on a pump busy reading or writing
        let (ctrl_tx, ctrl_rx) = bounded(1);
        Shared {
            queue_length,
            idle_timeout,
            state: RwLock::new(State {
                closed: false,
                queue: VecDeque::new(),
                waiters: VecDeque::new(),
                quit_tx: Some(quit_tx),
            }),
            quit: quit_rx,
            ctrl_tx,
            ctrl_rx,
        }
    }

    /// Accept `item` or fail with `Full`/`Closed`.
    ///
    /// Prefers handing the item straight to the first poller that is still
    /// waiting; only appends to the queue when no live waiter takes it.
    pub(crate) fn enqueue_item(&self, item: Item) -> Result<(), Error> {
        let mut st = self.state.write().unwrap();
        if st.closed {
            return Err(Error::Closed);
        }
        if self.queue_length > 0 && st.queue.len() >= self.queue_length {
            return Err(Error::Full);
        }

        let mut item = item;
        while let Some(w) = st.waiters.pop_front() {
            select! {
                recv(self.quit) -> _ => return Err(Error::Closed),
                send(w.input, item) -> res => match res {
                    Ok(()) => return Ok(()),
                    // poller already returned; take the item back and retry
                    Err(SendError(back)) => item = back,
                },
                recv(w.dead) -> _ => {
                    // poller gave up; try the next one
                }
            }
        }

        st.queue.push_back(item);
        Ok(())
    }

    /// Block until an item is available, the player closes, or `timeout`
    /// passes (`None` blocks indefinitely).
    pub(crate) fn poll(&self, timeout: Option<Duration>) -> Result<Item, PollError> {
        let (input, dead_tx) = {
            let mut st = self.state.write().unwrap();
            if st.closed {
                return Err(PollError::Closed);
            }
            if let Some(item) = st.queue.pop_front() {
                return Ok(item);
            }
            let (input_tx, input_rx) = bounded(0);
            let (dead_tx, dead_rx) = bounded::<()>(0);
            st.waiters.push_back(Waiter {
                input: input_tx,
                dead: dead_rx,
            });
            (input_rx, dead_tx)
        };

        let deadline = match timeout {
            Some(t) => after(t),
            None => never(),
        };
        select! {
            recv(self.quit) -> _ => {
                drop(dead_tx);
                Err(PollError::Closed)
            }
            recv(deadline) -> _ => {
                // stop a concurrent enqueue from considering us eligible
                drop(dead_tx);
                Err(PollError::Timeout)
            }
            recv(input) -> item => match item {
                Ok(item) => Ok(item),
                // our waiter entry was discarded during shutdown
                Err(_) => Err(PollError::Closed),
            }
        }
    }

    /// End every queued item with `reason` and empty the queue. Leaves the
    /// currently playing item alone.
    pub(crate) fn clear_with(&self, reason: fn() -> Error) {
        let mut st = self.state.write().unwrap();
        end_queued(&mut st, reason);
    }
}

fn end_queued(st: &mut State, reason: fn() -> Error) {
    for mut item in st.queue.drain(..) {
        (item.callbacks.on_end)(Duration::ZERO, reason());
    }
}

/// Controllable queued playback of opaque frames to a pluggable sink.
///
/// Safe to share across threads. Every accepted item gets exactly one
/// terminal `on_end` callback; see [`ItemOptions`] for the full callback
/// surface.
pub struct Player {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Create a player and start its scheduler thread.
    ///
    /// The idle action, if any, runs once here and again whenever the
    /// scheduler waits `idle_timeout` without receiving an item. Call
    /// [`Player::close`] to release the scheduler and the last opened sink.
    pub fn new(mut config: PlayerConfig) -> Player {
        let shared = Arc::new(Shared::new(config.queue_length, config.idle_timeout));

        let mut on_idle = config.on_idle.take().unwrap_or_else(|| Box::new(|| {}));
        on_idle();

        let transcoder = config.transcoder.take();
        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || playback::scheduler_loop(&shared, on_idle, transcoder))
        };

        Player {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Put one playback request at the end of the queue.
    ///
    /// `channel_id` is an opaque routing key passed to `open_sink` when the
    /// item starts. Fails with [`Error::Full`] when the queue is at its
    /// bound and [`Error::Closed`] after [`Player::close`]; rejected items
    /// fire no callbacks.
    pub fn enqueue(
        &self,
        channel_id: impl Into<String>,
        title: impl Into<String>,
        open_source: SourceOpener,
        open_sink: SinkOpener,
        opts: ItemOptions,
    ) -> Result<(), Error> {
        let item = opts.into_item(channel_id.into(), title.into(), open_source, open_sink);
        self.shared.enqueue_item(item)
    }

    /// Titles of the queued items, in play order. Does not include the
    /// currently playing item.
    pub fn playlist(&self) -> Vec<String> {
        let st = self.shared.state.read().unwrap();
        st.queue.iter().map(|item| item.title.clone()).collect()
    }

    /// Remove all queued items; each fires `on_end` with [`Error::Cleared`].
    /// The currently playing item is not affected.
    pub fn clear(&self) {
        self.shared.clear_with(|| Error::Cleared);
    }

    /// Skip the currently playing or paused item. Best-effort: dropped if a
    /// control signal is already pending.
    pub fn skip(&self) {
        let _ = self.shared.ctrl_tx.try_send(Control::Skip);
    }

    /// Pause the currently playing item, or resume it when paused.
    /// Best-effort: dropped if a control signal is already pending.
    pub fn pause(&self) {
        let _ = self.shared.ctrl_tx.try_send(Control::Pause);
    }

    /// Close the player.
    ///
    /// Ends every queued item and the currently playing item with
    /// [`Error::Closed`], then blocks until the scheduler thread and all
    /// outstanding `on_end` callbacks have returned. A second call fails
    /// with [`Error::Closed`].
    pub fn close(&self) -> Result<(), Error> {
        {
            let mut st = self.shared.state.write().unwrap();
            if st.closed {
                return Err(Error::Closed);
            }
            st.closed = true;
            st.quit_tx.take();
            end_queued(&mut st, || Error::Closed);
        }
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_item, test_item_with_end, ItemEnd};
    use std::thread;
    use std::time::Instant;

    fn bare_shared(queue_length: usize) -> Arc<Shared> {
        Arc::new(Shared::new(queue_length, None))
    }

    #[test]
    fn poll_returns_queued_item_first() {
        let shared = bare_shared(0);
        shared.enqueue_item(test_item("a")).unwrap();
        shared.enqueue_item(test_item("b")).unwrap();

        let a = shared.poll(Some(Duration::from_millis(10))).unwrap();
        let b = shared.poll(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(a.title, "a");
        assert_eq!(b.title, "b");
        assert_eq!(
            shared.poll(Some(Duration::from_millis(10))).unwrap_err(),
            PollError::Timeout
        );
    }

    #[test]
    fn enqueue_respects_queue_bound() {
        let shared = bare_shared(2);
        shared.enqueue_item(test_item("a")).unwrap();
        shared.enqueue_item(test_item("b")).unwrap();
        assert!(matches!(
            shared.enqueue_item(test_item("c")),
            Err(Error::Full)
        ));
        let st = shared.state.read().unwrap();
        assert_eq!(st.queue.len(), 2);
    }

    #[test]
    fn direct_handoff_preserves_waiter_order() {
        let shared = bare_shared(0);

        let s1 = shared.clone();
        let p1 = thread::spawn(move || s1.poll(Some(Duration::from_secs(5))).unwrap().title);
        wait_for_waiters(&shared, 1);

        let s2 = shared.clone();
        let p2 = thread::spawn(move || s2.poll(Some(Duration::from_secs(5))).unwrap().title);
        wait_for_waiters(&shared, 2);

        shared.enqueue_item(test_item("x")).unwrap();
        shared.enqueue_item(test_item("y")).unwrap();

        assert_eq!(p1.join().unwrap(), "x");
        assert_eq!(p2.join().unwrap(), "y");
        // both items bypassed the queue
        let st = shared.state.read().unwrap();
        assert!(st.queue.is_empty());
    }

    #[test]
    fn dead_waiter_does_not_receive() {
        let shared = bare_shared(0);

        assert_eq!(
            shared.poll(Some(Duration::from_millis(1))).unwrap_err(),
            PollError::Timeout
        );

        // the timed-out waiter must be bypassed, not handed the item
        shared.enqueue_item(test_item("z")).unwrap();
        let st = shared.state.read().unwrap();
        assert_eq!(st.queue.len(), 1);
    }

    #[test]
    fn poll_timeout_is_roughly_honored() {
        let shared = bare_shared(0);
        let start = Instant::now();
        assert_eq!(
            shared.poll(Some(Duration::from_millis(30))).unwrap_err(),
            PollError::Timeout
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn clear_ends_queued_items_only() {
        let shared = bare_shared(0);
        let (item, end) = test_item_with_end("a");
        shared.enqueue_item(item).unwrap();
        let (item, end2) = test_item_with_end("b");
        shared.enqueue_item(item).unwrap();

        shared.clear_with(|| Error::Cleared);

        for end in [end, end2] {
            match end.take() {
                Some(ItemEnd { elapsed, error }) => {
                    assert_eq!(elapsed, Duration::ZERO);
                    assert!(matches!(error, Error::Cleared));
                }
                None => panic!("queued item did not end"),
            }
        }
        let st = shared.state.read().unwrap();
        assert!(st.queue.is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let player = Player::new(PlayerConfig {
            queue_length: 0,
            idle_timeout: None,
            ..Default::default()
        });
        player.close().unwrap();
        assert!(matches!(player.close(), Err(Error::Closed)));
    }

    #[test]
    fn enqueue_after_close_fails() {
        let player = Player::new(PlayerConfig {
            queue_length: 0,
            idle_timeout: None,
            ..Default::default()
        });
        player.close().unwrap();

        let res = player.enqueue(
            "ch",
            "late",
            Box::new(|| Err(std::io::Error::other("unused"))),
            Box::new(|_| Err(std::io::Error::other("unused"))),
            ItemOptions::new(),
        );
        assert!(matches!(res, Err(Error::Closed)));
    }

    #[test]
    fn close_wakes_blocked_poller() {
        let shared = bare_shared(0);
        let s = shared.clone();
        let poller = thread::spawn(move || s.poll(None));
        wait_for_waiters(&shared, 1);

        {
            let mut st = shared.state.write().unwrap();
            st.closed = true;
            st.quit_tx.take();
        }
        assert_eq!(poller.join().unwrap().unwrap_err(), PollError::Closed);
    }

    #[test]
    fn playlist_lists_queued_titles() {
        let player = Player::new(PlayerConfig {
            queue_length: 0,
            idle_timeout: None,
            ..Default::default()
        });
        // park the scheduler on a first item so the rest stay queued
        player
            .enqueue(
                "ch",
                "blocker",
                crate::testutil::slow_source(),
                crate::testutil::null_sink(),
                ItemOptions::new(),
            )
            .unwrap();
        player
            .enqueue(
                "ch",
                "a",
                crate::testutil::finite_source(1, Duration::from_millis(2)),
                crate::testutil::null_sink(),
                ItemOptions::new(),
            )
            .unwrap();
        player
            .enqueue(
                "ch",
                "b",
                crate::testutil::finite_source(1, Duration::from_millis(2)),
                crate::testutil::null_sink(),
                ItemOptions::new(),
            )
            .unwrap();

        crate::testutil::wait_until(|| player.playlist().len() == 2);
        assert_eq!(player.playlist(), vec!["a".to_string(), "b".to_string()]);
        player.close().unwrap();
    }

    fn wait_for_waiters(shared: &Shared, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let st = shared.state.read().unwrap();
                if st.waiters.len() >= n {
                    return;
                }
            }
            assert!(Instant::now() < deadline, "waiters never reached {n}");
            thread::sleep(Duration::from_millis(1));
        }
    }
}
