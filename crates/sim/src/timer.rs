//! Timer facility backed by tokio

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use log::trace;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use embedded_radio_core::NemId;
use embedded_radio_model::{TimerEventId, TimerService};

use crate::nem::NemEvent;

/// Runs each recurring timer as its own task. Ticks are posted to the owning
/// NEM's event queue rather than calling the layer directly, so they are
/// serialized with everything else the layer sees.
pub struct TokioTimerService {
    owner: NemId,
    events: mpsc::UnboundedSender<NemEvent>,
    next_id: u64,
    tasks: HashMap<TimerEventId, JoinHandle<()>>,
}

impl TokioTimerService {
    pub(crate) fn new(owner: NemId, events: mpsc::UnboundedSender<NemEvent>) -> Self {
        Self {
            owner,
            events,
            next_id: 1,
            tasks: HashMap::new(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }
}

impl TimerService for TokioTimerService {
    fn schedule_recurring(&mut self, initial_delay: Duration, period: Duration) -> TimerEventId {
        let id = TimerEventId::new(self.next_id);
        self.next_id += 1;

        let events = self.events.clone();
        let owner = self.owner;
        let period = period.max(Duration::from_millis(1));
        let first = Instant::now() + initial_delay;
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(first, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                trace!("NEM {} timer {} fired", owner, id);
                if events.send(NemEvent::Timer(id)).is_err() {
                    break;
                }
            }
        });

        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerEventId) -> bool {
        match self.tasks.remove(&id) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
