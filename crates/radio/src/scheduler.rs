//! Transmit scheduler: one recurring timer per layer

use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::timer::{TimerEventId, TimerService};

/// Cadence of the transmit timer.
pub const TX_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("transmit timer {0} is already armed")]
    AlreadyArmed(TimerEventId),
}

/// Owns the single outstanding transmit timer of a layer.
#[derive(Debug)]
pub struct PeriodicSender {
    period: Duration,
    armed: Option<TimerEventId>,
    stats: SchedulerStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub arms: u64,
    pub cancels: u64,
    pub ticks: u64,
}

impl PeriodicSender {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            armed: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Schedule the first tick one period from now, recurring every period.
    pub fn arm(&mut self, timers: &mut dyn TimerService) -> Result<TimerEventId, SchedulerError> {
        if let Some(id) = self.armed {
            return Err(SchedulerError::AlreadyArmed(id));
        }

        let id = timers.schedule_recurring(self.period, self.period);
        self.armed = Some(id);
        self.stats.arms += 1;
        debug!("armed transmit timer {} every {:?}", id, self.period);
        Ok(id)
    }

    /// Cancel the outstanding timer, if any. Returns whether one was armed.
    pub fn disarm(&mut self, timers: &mut dyn TimerService) -> bool {
        let Some(id) = self.armed.take() else {
            return false;
        };

        if !timers.cancel(id) {
            debug!("transmit timer {} was already gone", id);
        }
        self.stats.cancels += 1;
        true
    }

    /// Accept a tick if it came from the armed timer.
    pub fn on_tick(&mut self, id: TimerEventId) -> bool {
        if self.armed == Some(id) {
            self.stats.ticks += 1;
            true
        } else {
            false
        }
    }

    pub fn handle(&self) -> Option<TimerEventId> {
        self.armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}

impl Default for PeriodicSender {
    fn default() -> Self {
        Self::new(TX_INTERVAL)
    }
}
