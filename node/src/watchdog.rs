//! Liveness deadline for the acquisition loop.
//!
//! The deadline is checked from a dedicated OS thread, so it still fires when
//! the loop is stuck inside a blocking call that never yields back to the
//! runtime. Expiry is not recoverable in-process: the default action exits
//! and leaves the restart to the supervisor.

use crate::errors::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::error;

/// Exit status used when the watchdog kills the process.
pub const WATCHDOG_EXIT_CODE: i32 = 75;
/// Exit status for a startup fault that restarting will not fix.
pub const HALT_EXIT_CODE: i32 = 78;

const MIN_CHECK_PERIOD: Duration = Duration::from_millis(10);

pub struct Watchdog {
    armed_at: Instant,
    last_feed_ms: Arc<AtomicU64>,
    disarmed: Arc<AtomicBool>,
    deadline: Duration,
}

impl Watchdog {
    /// Starts the deadline timer. `on_expire` runs on the watchdog thread with
    /// the time since the last feed, at most once.
    pub fn arm<F>(deadline: Duration, on_expire: F) -> Result<Self>
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        let armed_at = Instant::now();
        let last_feed_ms = Arc::new(AtomicU64::new(0));
        let disarmed = Arc::new(AtomicBool::new(false));

        let feeds = Arc::clone(&last_feed_ms);
        let stop = Arc::clone(&disarmed);
        let check_every = (deadline / 10).max(MIN_CHECK_PERIOD);

        thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || loop {
                thread::sleep(check_every);
                if stop.load(Ordering::Acquire) {
                    return;
                }

                let last_feed = Duration::from_millis(feeds.load(Ordering::Acquire));
                let silent = armed_at.elapsed().saturating_sub(last_feed);
                if silent >= deadline {
                    error!(silent = ?silent, deadline = ?deadline, "Watchdog expired, loop is hung");
                    on_expire(silent);
                    return;
                }
            })?;

        Ok(Self {
            armed_at,
            last_feed_ms,
            disarmed,
            deadline,
        })
    }

    /// Arms a watchdog whose expiry terminates the process.
    pub fn arm_restarting(deadline: Duration) -> Result<Self> {
        Self::arm(deadline, |_| std::process::exit(WATCHDOG_EXIT_CODE))
    }

    pub fn feed(&self) {
        let now_ms = self.armed_at.elapsed().as_millis() as u64;
        self.last_feed_ms.store(now_ms, Ordering::Release);
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarmed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_expires_during_blocking_stall() {
        // Scaled down: 200 ms deadline, 500 ms stall.
        let deadline = Duration::from_millis(200);
        let stall = Duration::from_millis(500);
        let (tx, rx) = mpsc::channel();

        let start = Instant::now();
        let watchdog = Watchdog::arm(deadline, move |_| {
            let _ = tx.send(Instant::now());
        })
        .unwrap();
        watchdog.feed();

        thread::sleep(stall);

        let fired_at = rx.try_recv().expect("watchdog did not fire during the stall");
        assert!(fired_at.duration_since(start) >= deadline);
        assert!(fired_at.duration_since(start) < stall);
    }

    #[test]
    fn test_regular_feeding_keeps_it_quiet() {
        let deadline = Duration::from_millis(200);
        let (tx, rx) = mpsc::channel();

        let watchdog = Watchdog::arm(deadline, move |_| {
            let _ = tx.send(());
        })
        .unwrap();

        for _ in 0..10 {
            thread::sleep(Duration::from_millis(50));
            watchdog.feed();
        }

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_watchdog_never_fires() {
        let (tx, rx) = mpsc::channel();
        let watchdog = Watchdog::arm(Duration::from_millis(50), move |_| {
            let _ = tx.send(());
        })
        .unwrap();
        drop(watchdog);

        thread::sleep(Duration::from_millis(200));
        assert!(rx.try_recv().is_err());
    }
}
