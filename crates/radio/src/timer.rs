//! Timer facility a host lends to its layers

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Handle for one scheduled timer. Ticks are delivered back to the layer
/// tagged with the handle that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerEventId(u64);

impl TimerEventId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling capability injected into a layer.
///
/// Implementations must not call back into the layer from inside these
/// methods; ticks arrive later through the host's dispatch loop.
pub trait TimerService: Send {
    /// Fire `initial_delay` from now and every `period` after that.
    fn schedule_recurring(&mut self, initial_delay: Duration, period: Duration) -> TimerEventId;

    /// Returns false if `id` was not outstanding.
    fn cancel(&mut self, id: TimerEventId) -> bool;

    /// Wall-clock time as seen by this facility.
    fn now(&self) -> SystemTime;
}

#[derive(Debug)]
struct Recurring {
    due: Duration,
    period: Duration,
}

#[derive(Debug)]
struct ManualClock {
    epoch: SystemTime,
    elapsed: Duration,
    next_id: u64,
    timers: BTreeMap<TimerEventId, Recurring>,
    cancellations: usize,
}

/// Timer facility driven by hand. Time only moves on [`advance`].
///
/// Clones share one clock, so a test can keep a handle while the layer owns
/// another.
///
/// [`advance`]: ManualTimerService::advance
#[derive(Debug, Clone)]
pub struct ManualTimerService {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualTimerService {
    pub fn new(epoch: SystemTime) -> Self {
        Self {
            clock: Arc::new(Mutex::new(ManualClock {
                epoch,
                elapsed: Duration::ZERO,
                next_id: 1,
                timers: BTreeMap::new(),
                cancellations: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move time forward and return every tick that fell due, oldest first.
    pub fn advance(&self, by: Duration) -> Vec<TimerEventId> {
        let mut clock = self.lock();
        let target = clock.elapsed + by;
        let mut fired = Vec::new();

        loop {
            let next = clock
                .timers
                .iter()
                .filter(|(_, timer)| timer.due <= target)
                .min_by_key(|(id, timer)| (timer.due, **id))
                .map(|(id, _)| *id);

            let Some(id) = next else { break };
            if let Some(timer) = clock.timers.get_mut(&id) {
                timer.due += timer.period;
            }
            fired.push(id);
        }

        clock.elapsed = target;
        fired
    }

    pub fn armed(&self) -> Vec<TimerEventId> {
        self.lock().timers.keys().copied().collect()
    }

    pub fn cancellations(&self) -> usize {
        self.lock().cancellations
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }
}

impl TimerService for ManualTimerService {
    fn schedule_recurring(&mut self, initial_delay: Duration, period: Duration) -> TimerEventId {
        let mut clock = self.lock();
        let id = TimerEventId(clock.next_id);
        clock.next_id += 1;
        let due = clock.elapsed + initial_delay;
        // a zero period would never let advance() terminate
        let period = period.max(Duration::from_nanos(1));
        clock.timers.insert(id, Recurring { due, period });
        id
    }

    fn cancel(&mut self, id: TimerEventId) -> bool {
        let mut clock = self.lock();
        let removed = clock.timers.remove(&id).is_some();
        if removed {
            clock.cancellations += 1;
        }
        removed
    }

    fn now(&self) -> SystemTime {
        let clock = self.lock();
        clock.epoch + clock.elapsed
    }
}
