//! Wall-clock pacing for the scheduler loop.
//!
//! A [`TickSource`] thread advances an atomic tick counter once per period
//! and unparks the emulation thread. [`Throttle::wait`] parks until a tick
//! newer than the last one it consumed arrives, then absorbs the whole
//! backlog, so a slow host never bursts to catch up.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Failure to start pacing.
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The tick thread could not be spawned.
    #[error("failed to spawn the tick thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Background thread counting wall-clock periods.
#[derive(Debug)]
pub struct TickSource {
    ticks: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickSource {
    /// Starts counting every `period`, unparking `waiter` on each tick.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::Spawn`] when the thread cannot be created.
    pub fn start(period: Duration, waiter: Option<Thread>) -> Result<Self, ThrottleError> {
        let ticks = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let ticks = Arc::clone(&ticks);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("pxa-tick".into())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        let deadline = Instant::now() + period;
                        loop {
                            let now = Instant::now();
                            if now >= deadline || !running.load(Ordering::Acquire) {
                                break;
                            }
                            thread::park_timeout(deadline - now);
                        }
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        ticks.fetch_add(1, Ordering::AcqRel);
                        if let Some(waiter) = &waiter {
                            waiter.unpark();
                        }
                    }
                })?
        };
        Ok(Self {
            ticks,
            running,
            handle: Some(handle),
        })
    }

    /// Ticks counted so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Stops and joins the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            // A panicked tick thread has nothing left to clean up.
            let _ = handle.join();
        }
    }
}

impl Drop for TickSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Paces the emulation loop to the configured tick rate.
#[derive(Debug)]
pub struct Throttle {
    period: Duration,
    source: Option<TickSource>,
    consumed: u64,
    skip: bool,
}

impl Throttle {
    /// Creates a stopped throttle ticking `ticks_per_second` times a second.
    #[must_use]
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / ticks_per_second.max(1),
            source: None,
            consumed: 0,
            skip: false,
        }
    }

    /// Wall-clock length of one tick.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Returns `true` while the tick source runs.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.source.is_some()
    }

    /// Starts the tick source; the calling thread becomes the waiter.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::Spawn`] when the tick thread cannot start.
    pub fn start(&mut self) -> Result<(), ThrottleError> {
        if self.source.is_none() {
            self.source = Some(TickSource::start(self.period, Some(thread::current()))?);
            self.consumed = 0;
            self.skip = false;
        }
        Ok(())
    }

    /// Stops pacing; later waits return immediately.
    pub fn stop(&mut self) {
        self.source = None;
    }

    /// Makes the next [`Self::wait`] return at once and re-bases the
    /// deadline to the current tick.
    pub fn skip_next_wait(&mut self) {
        self.skip = true;
    }

    /// Blocks until the next tick.
    pub fn wait(&mut self) {
        let Some(source) = &self.source else {
            return;
        };
        if std::mem::take(&mut self.skip) {
            self.consumed = source.ticks();
            return;
        }
        loop {
            let ticks = source.ticks();
            if ticks > self.consumed {
                self.consumed = ticks;
                return;
            }
            thread::park_timeout(self.period);
        }
    }
}
