//! Sliding-window send throttle.
//!
//! Bounds the number of sends in any trailing 60-second window. Unlike a
//! fixed-bucket scheme, bursts are spread evenly: before each send we check
//! the timestamps of the last N sends and, if N occurred within the window,
//! sleep until the oldest falls outside it. Waits are absorbed here by
//! sleeping -- they are never surfaced to the caller as errors.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Time source, injectable so throttle behavior is testable with
/// simulated time.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock time and real thread sleeps.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Per-client sliding-window rate limiter.
///
/// State is scoped to one instance for one run; a fresh client gets a
/// fresh, empty window.
pub struct RateLimiter {
    /// Maximum sends per window. 0 disables throttling.
    limit: u32,
    /// Timestamps of the most recent sends, oldest first.
    sent: VecDeque<Instant>,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    /// A limiter backed by the system clock.
    pub fn new(limit: u32) -> Self {
        Self::with_clock(limit, Box::new(SystemClock))
    }

    /// A limiter with an injected clock (simulated time in tests).
    pub fn with_clock(limit: u32, clock: Box<dyn Clock>) -> Self {
        Self {
            limit,
            sent: VecDeque::new(),
            clock,
        }
    }

    /// Block until a send slot is available, then claim it.
    ///
    /// Never drops or reorders: callers proceed in order, delayed just
    /// long enough that no more than `limit` sends fall in any trailing
    /// window.
    pub fn acquire(&mut self) {
        if self.limit == 0 {
            return;
        }

        let now = self.clock.now();
        self.evict(now);

        if self.sent.len() >= self.limit as usize {
            if let Some(oldest) = self.sent.front() {
                let elapsed = now.duration_since(*oldest);
                if elapsed < WINDOW {
                    let wait = WINDOW - elapsed;
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, sleeping");
                    self.clock.sleep(wait);
                }
            }
        }

        let stamp = self.clock.now();
        self.evict(stamp);
        self.sent.push_back(stamp);
        while self.sent.len() > self.limit as usize {
            self.sent.pop_front();
        }
    }

    /// Drop timestamps that have aged out of the trailing window.
    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.sent.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }
}
