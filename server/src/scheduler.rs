//! Fixed-period tick bookkeeping.
//!
//! The scheduler decides what a tick has to do; the coordinator does it.
//! Wall-clock pacing comes from a tokio interval, which follows tokio's
//! clock and can therefore be paused and advanced in tests.

use shared::{DEFAULT_TICK_MS, ECONOMY_TICK_INTERVAL};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub tick: u64,
    pub advance_economy: bool,
}

#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    economy_every: u64,
    tick: u64,
}

impl TickScheduler {
    pub fn new(period: Duration, economy_every: u64) -> Result<Self, ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if economy_every == 0 {
            return Err(ConfigError::ZeroEconomyInterval);
        }
        Ok(Self {
            period,
            economy_every,
            tick: 0,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn economy_every(&self) -> u64 {
        self.economy_every
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Counts one tick and reports whether the economy is due.
    pub fn advance(&mut self) -> TickPlan {
        self.tick += 1;
        TickPlan {
            tick: self.tick,
            advance_economy: self.tick % self.economy_every == 0,
        }
    }

    /// Interval whose first tick fires one period from now. Late ticks are
    /// skipped rather than bunched up.
    pub fn interval(&self) -> Interval {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(DEFAULT_TICK_MS),
            economy_every: ECONOMY_TICK_INTERVAL,
            tick: 0,
        }
    }
}
