//! Periodic tick driver.
//!
//! A [`Timer`] runs a callback repeatedly on a dedicated thread at a fixed
//! cadence. Invocations are serialized by construction (one thread), the
//! interval can be retuned while the timer is live, and teardown is
//! synchronous: [`Timer::kill`] signals the thread and joins it, unless it is
//! called from the timer thread itself, in which case the thread is detached
//! and exits on its own.

use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct TimerControl {
    interval: Duration,
    killed: bool,
}

struct TimerShared {
    control: Mutex<TimerControl>,
    signal: Condvar,
}

impl TimerShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, TimerControl> {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dedicated-thread periodic driver for simulation ticks.
///
/// The callback returns [`ControlFlow`]; `Break` ends the driver loop from
/// inside a tick (used when a time limit stops the simulation, or when a
/// tick fails).
pub struct Timer {
    shared: Arc<TimerShared>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("interval", &self.shared.lock().interval)
            .finish_non_exhaustive()
    }
}

impl Timer {
    /// Spawn the driver thread, invoking `callback` every `interval_secs`
    /// seconds until killed or until the callback breaks.
    ///
    /// The cadence is drift-compensated: each deadline is derived from the
    /// previous one, and a callback that overruns its slot fires the next
    /// tick immediately rather than queueing a burst.
    #[must_use]
    pub fn spawn<F>(interval_secs: f64, mut callback: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            control: Mutex::new(TimerControl {
                interval: Duration::from_secs_f64(interval_secs),
                killed: false,
            }),
            signal: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            let mut next_deadline = Instant::now() + worker.lock().interval;
            loop {
                let mut control = worker.lock();
                loop {
                    if control.killed {
                        return;
                    }
                    let now = Instant::now();
                    if now >= next_deadline {
                        break;
                    }
                    let (guard, _) = worker
                        .signal
                        .wait_timeout(control, next_deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    control = guard;
                }
                let interval = control.interval;
                drop(control);

                if callback().is_break() {
                    return;
                }

                next_deadline += interval;
                let now = Instant::now();
                if next_deadline < now {
                    next_deadline = now;
                }
            }
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Current tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.lock().interval
    }

    /// Retune the tick interval; takes effect from the next cycle.
    pub fn set_interval(&self, interval_secs: f64) {
        self.shared.lock().interval = Duration::from_secs_f64(interval_secs);
        self.shared.signal.notify_all();
    }

    fn signal_kill(&self) {
        self.shared.lock().killed = true;
        self.shared.signal.notify_all();
    }

    /// Signal the driver thread to exit and join it.
    ///
    /// Safe to call from the timer thread itself (from inside a tick): the
    /// join is skipped and the thread winds down on its own.
    pub fn kill(&mut self) {
        self.signal_kill();

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Dropping the handle detaches the (exiting) thread.
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for Timer {
    // Signal without joining: a dropped timer may still be mid-tick, and
    // the tick path itself drops the handle when a time limit stops the
    // simulation. Synchronous teardown goes through `kill`.
    fn drop(&mut self) {
        self.signal_kill();
    }
}
