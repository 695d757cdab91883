//! Bounded ring of interleaved `f32` samples.
//!
//! Links the decode thread, the engine's paced frame writes, and the CPAL
//! output callback. Closing wakes every waiter; a closed ring accepts no
//! more samples but drains what it already holds.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct SampleRing {
    inner: Mutex<RingState>,
    cv: Condvar,
    capacity: usize,
}

struct RingState {
    buf: VecDeque<f32>,
    closed: bool,
}

impl SampleRing {
    /// `capacity` is in samples, not frames.
    pub fn new(capacity: usize) -> SampleRing {
        SampleRing {
            inner: Mutex::new(RingState {
                buf: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Stop accepting samples and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Append samples, blocking while the ring is full. Once the ring is
    /// closed the remainder is dropped.
    pub fn push_blocking(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.buf.len() >= self.capacity && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return;
            }
            while offset < samples.len() && g.buf.len() < self.capacity {
                g.buf.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Remove exactly `n` samples, blocking until they are available.
    ///
    /// Returns `None` when the ring is closed holding fewer than `n`
    /// samples; the short tail is discarded.
    pub fn pop_exact(&self, n: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        while g.buf.len() < n && !g.closed {
            g = self.cv.wait(g).unwrap();
        }
        if g.buf.len() < n {
            return None;
        }
        let out: Vec<f32> = g.buf.drain(..n).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Remove up to `max` samples without blocking, rounded down to a
    /// multiple of `align` so interleaved frames are never split.
    pub fn try_pop_up_to(&self, max: usize, align: usize) -> Vec<f32> {
        let align = align.max(1);
        let mut g = self.inner.lock().unwrap();
        let take = (g.buf.len().min(max) / align) * align;
        let out: Vec<f32> = g.buf.drain(..take).collect();
        drop(g);
        if !out.is_empty() {
            self.cv.notify_all();
        }
        out
    }

    /// Block until the ring is empty or `timeout` passes. Returns `true`
    /// when the ring drained.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        loop {
            if g.buf.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _) = self.cv.wait_timeout(g, deadline - now).unwrap();
            g = ng;
        }
    }
}
