//! Auto-cancel deadline scheduler.
//!
//! Keeps one armed deadline per future group / semi-private class and calls
//! `BookingEngine::auto_cancel_evaluation` when it passes. Three loops drive it:
//!
//! - precise timer: sleeps until the earliest armed deadline;
//! - refresh: rebuilds the armed set from the store every hour;
//! - sweep: every 15 minutes evaluates every class starting soon, in case a
//!   timer was lost.
//!
//! Refresh always rebuilds from scratch, so timers of moved or deleted classes
//! simply disappear.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::error::BookingResult;
use crate::services::booking::{AutoCancelOutcome, BookingEngine};
use crate::services::clock::Clock;
use crate::store::BookingStore;

/// Idle wait of the precise loop when nothing is armed.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Min-heap of `(deadline, schedule_id)`.
#[derive(Debug, Default)]
pub struct DeadlineQueue {
    heap: BinaryHeap<Reverse<(NaiveDateTime, i64)>>,
}

impl DeadlineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retires every armed deadline and arms the given set instead.
    pub fn rebuild(&mut self, deadlines: impl IntoIterator<Item = (NaiveDateTime, i64)>) {
        self.heap = deadlines.into_iter().map(Reverse).collect();
    }

    pub fn arm(&mut self, deadline: NaiveDateTime, schedule_id: i64) {
        self.heap.push(Reverse((deadline, schedule_id)));
    }

    /// Removes and returns every schedule whose deadline is `<= now`, earliest first.
    pub fn pop_due(&mut self, now: NaiveDateTime) -> Vec<i64> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _))) = self.heap.peek() {
            if *deadline > now {
                break;
            }
            if let Some(Reverse((_, id))) = self.heap.pop() {
                due.push(id);
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub armed: usize,
    pub next_deadline: Option<NaiveDateTime>,
    pub last_refresh_at: Option<NaiveDateTime>,
    pub horizon_days: i64,
}

pub struct DeadlineScheduler {
    engine: Arc<BookingEngine>,
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    queue: Mutex<DeadlineQueue>,
    last_refresh_at: Mutex<Option<NaiveDateTime>>,
    wake: Notify,
    config: SchedulerConfig,
}

impl DeadlineScheduler {
    pub fn new(engine: Arc<BookingEngine>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            store: Arc::clone(engine.store()),
            engine,
            clock,
            queue: Mutex::new(DeadlineQueue::new()),
            last_refresh_at: Mutex::new(None),
            wake: Notify::new(),
            config,
        }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, DeadlineQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-derives the armed set from every class inside the horizon.
    /// Returns the number of armed deadlines.
    pub async fn refresh(&self) -> BookingResult<usize> {
        let now = self.clock.now();
        let until = now + ChronoDuration::days(self.config.horizon_days);
        let schedules = self.store.schedules_starting_between(now, until).await?;

        let deadlines: Vec<(NaiveDateTime, i64)> = schedules
            .iter()
            .filter(|s| s.needs_deadline_timer(now))
            .map(|s| (s.cancel_deadline(), s.id))
            .collect();
        let armed = deadlines.len();

        self.queue().rebuild(deadlines);
        *self.last_refresh_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
        self.wake.notify_one();

        info!("⏰ Scheduler refreshed: {} deadline(s) armed within {} day(s)", armed, self.config.horizon_days);
        Ok(armed)
    }

    /// Evaluates every deadline that has passed. Each fires once; a failed
    /// evaluation is left to the sweep.
    pub async fn fire_due(&self) -> Vec<(i64, AutoCancelOutcome)> {
        let due = self.queue().pop_due(self.clock.now());
        let mut outcomes = Vec::with_capacity(due.len());
        for schedule_id in due {
            match self.engine.auto_cancel_evaluation(schedule_id).await {
                Ok(outcome) => {
                    debug!("Deadline of schedule {} fired: {:?}", schedule_id, outcome);
                    outcomes.push((schedule_id, outcome));
                }
                Err(e) => error!("Auto-cancel evaluation of schedule {} failed: {}", schedule_id, e),
            }
        }
        outcomes
    }

    /// Fallback pass over every class starting within the lookahead window.
    pub async fn sweep(&self) -> BookingResult<Vec<(i64, AutoCancelOutcome)>> {
        let now = self.clock.now();
        let until = now + ChronoDuration::hours(self.config.sweep_lookahead_hours);
        let schedules = self.store.schedules_starting_between(now, until).await?;

        let mut outcomes = Vec::new();
        for schedule in schedules.iter().filter(|s| s.session_type.has_minimum_signup()) {
            match self.engine.auto_cancel_evaluation(schedule.id).await {
                Ok(AutoCancelOutcome::NotDue) | Ok(AutoCancelOutcome::AlreadyResolved) => {}
                Ok(outcome) => outcomes.push((schedule.id, outcome)),
                Err(e) => error!("Sweep evaluation of schedule {} failed: {}", schedule.id, e),
            }
        }
        if !outcomes.is_empty() {
            info!("🧹 Sweep resolved {} schedule(s)", outcomes.len());
        }
        Ok(outcomes)
    }

    pub fn status(&self) -> SchedulerStatus {
        let queue = self.queue();
        SchedulerStatus {
            armed: queue.len(),
            next_deadline: queue.next_deadline(),
            last_refresh_at: *self.last_refresh_at.lock().unwrap_or_else(|e| e.into_inner()),
            horizon_days: self.config.horizon_days,
        }
    }

    fn until_next_deadline(&self) -> Duration {
        match self.queue().next_deadline() {
            Some(deadline) => (deadline - self.clock.now()).to_std().unwrap_or(Duration::ZERO),
            None => IDLE_WAIT,
        }
    }

    /// Spawns the timer, refresh and sweep loops. All stop on `shutdown`.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let timer = {
            let scheduler = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let wait = scheduler.until_next_deadline();
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            scheduler.fire_due().await;
                        }
                        // пересчитать время сна после refresh
                        _ = scheduler.wake.notified() => {}
                        _ = shutdown.cancelled() => {
                            info!("Deadline timer stopped");
                            return;
                        }
                    }
                }
            })
        };

        let refresher = {
            let scheduler = Arc::clone(&self);
            let shutdown = shutdown.clone();
            let every = Duration::from_secs(self.config.refresh_interval_seconds);
            tokio::spawn(async move {
                loop {
                    if let Err(e) = scheduler.refresh().await {
                        error!("Scheduler refresh failed: {}", e);
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(every) => {}
                        _ = shutdown.cancelled() => {
                            info!("Scheduler refresh loop stopped");
                            return;
                        }
                    }
                }
            })
        };

        let sweeper = {
            let scheduler = Arc::clone(&self);
            let every = Duration::from_secs(self.config.sweep_interval_seconds);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(every) => {
                            if let Err(e) = scheduler.sweep().await {
                                error!("Scheduler sweep failed: {}", e);
                            }
                        }
                        _ = shutdown.cancelled() => {
                            info!("Scheduler sweep loop stopped");
                            return;
                        }
                    }
                }
            })
        };

        vec![timer, refresher, sweeper]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn pops_only_due_deadlines_in_order() {
        let mut queue = DeadlineQueue::new();
        queue.arm(at(10, 0), 3);
        queue.arm(at(8, 0), 1);
        queue.arm(at(9, 0), 2);

        assert_eq!(queue.pop_due(at(9, 0)), vec![1, 2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(at(10, 0)));
        assert!(queue.pop_due(at(9, 59)).is_empty());
    }

    #[test]
    fn rebuild_retires_previous_deadlines() {
        let mut queue = DeadlineQueue::new();
        queue.arm(at(8, 0), 1);
        queue.arm(at(9, 0), 2);

        queue.rebuild(vec![(at(11, 0), 7)]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_due(at(12, 0)), vec![7]);
        assert!(queue.is_empty());
    }
}
