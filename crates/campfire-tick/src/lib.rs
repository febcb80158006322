//! Fixed-interval tick scheduler for Campfire.
//!
//! Drives the fire-decay countdown of a room session. The scheduler is a
//! plain value owned by the session actor; it never spawns anything.
//!
//! # Integration
//!
//! The scheduler sits inside a session actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         info = scheduler.wait_for_tick() => {
//!             for _ in 0..=info.ticks_skipped {
//!                 fire.tick();
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! While paused, or when the interval is zero, [`TickScheduler::wait_for_tick`]
//! pends forever so the other `select!` branches keep running.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `Duration::ZERO` disables ticking entirely.
    pub interval: Duration,
    /// Upper bound of random delay added to the *first* tick, so sessions
    /// opened at the same instant don't tick in lockstep.
    pub initial_jitter: Duration,
    /// Create the scheduler already paused.
    pub start_paused: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            initial_jitter: Duration::from_millis(2),
            start_paused: false,
        }
    }
}

impl TickConfig {
    /// Config ticking every `interval` with default jitter.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// How late the tick fired relative to its deadline.
    pub late_by: Duration,
    /// Whole intervals that elapsed without a tick because the owner was
    /// busy. Callers that count time in ticks should apply these too.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval tick scheduler. One per session actor.
pub struct TickScheduler {
    interval: Option<Duration>,
    tick_count: u64,
    /// When the next tick should fire.
    next_tick: Option<Instant>,
    paused: bool,
}

impl TickScheduler {
    /// Create a new scheduler from config.
    pub fn new(config: TickConfig) -> Self {
        let interval = (!config.interval.is_zero()).then_some(config.interval);

        let next_tick = interval.map(|d| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max_us = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
            };
            Instant::now() + d + jitter
        });

        match interval {
            Some(d) => debug!(
                interval_ms = d.as_millis() as u64,
                paused = config.start_paused,
                "tick scheduler created"
            ),
            None => debug!("tick scheduler created with zero interval (never ticks)"),
        }

        Self {
            interval,
            tick_count: 0,
            next_tick,
            paused: config.start_paused,
        }
    }

    /// Create a scheduler ticking every `interval` with default settings.
    pub fn every(interval: Duration) -> Self {
        Self::new(TickConfig::every(interval))
    }

    /// Wait until the next tick is due.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// deadline untouched.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, interval) = match (self.next_tick, self.interval) {
            (Some(next), Some(interval)) if !self.paused => (next, interval),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = (late_by.as_nanos() / interval.as_nanos()) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }

        // Always schedule from now, not from the missed deadline.
        self.next_tick = Some(now + interval);

        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
            late_by,
            ticks_skipped,
        }
    }

    /// Stop ticking. `wait_for_tick` pends until [`resume`](Self::resume).
    ///
    /// Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "tick scheduler paused");
        }
    }

    /// Resume ticking after a pause. The next tick is a full interval from
    /// now, never a burst for the time spent paused.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.restart();
            debug!(tick = self.tick_count, "tick scheduler resumed");
        }
    }

    /// Push the next deadline to a full interval from now.
    pub fn restart(&mut self) {
        if let Some(interval) = self.interval {
            self.next_tick = Some(Instant::now() + interval);
        }
    }

    /// Whether the scheduler is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The tick interval, or `None` if ticking is disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}
