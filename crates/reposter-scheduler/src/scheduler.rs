//! Slot trigger and polling loop.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{Action, Due, SchedulerError, SlotTable, floor_minute};

/// Minimum sleep duration between polls.
const MIN_SLEEP_SECS: u64 = 1;

/// Default sleep duration between polls.
const DEFAULT_POLL_SECS: u64 = 60;

/// Runs the action bound to a slot.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute `action` for the slot occurrence at `at`.
    async fn handle(&self, action: Action, at: NaiveDateTime) -> Result<(), SchedulerError>;
}

/// Decides which slots are due on each poll.
///
/// Remembers how far the slot table has been covered so a slot fires exactly
/// once even when polls drift across minute boundaries or an action overruns
/// the next slot. Time since the trigger last saw the process alive (a poll or
/// a finished action) longer than `max_gap` is treated as downtime and its
/// slots are skipped.
#[derive(Debug, Clone)]
pub struct Trigger {
    table: SlotTable,
    /// Exclusive lower bound of the next poll window.
    covered_until: Option<NaiveDateTime>,
    last_alive: Option<NaiveDateTime>,
    max_gap: Duration,
}

impl Trigger {
    pub fn new(table: SlotTable, max_gap: Duration) -> Self {
        Self {
            table,
            covered_until: None,
            last_alive: None,
            max_gap,
        }
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Start covering the table from `at`, including `at`'s own minute.
    ///
    /// Slots falling due between `at` and the first poll then fire late
    /// instead of being lost.
    pub fn seed(&mut self, at: NaiveDateTime) {
        self.covered_until = Some(floor_minute(at) - Duration::minutes(1));
        self.last_alive = Some(at);
    }

    /// Record that the process was alive and busy until `at`.
    pub fn record_activity(&mut self, at: NaiveDateTime) {
        self.last_alive = Some(self.last_alive.map_or(at, |alive| alive.max(at)));
    }

    /// Slots due at `now`, in chronological order.
    pub fn poll(&mut self, now: NaiveDateTime) -> Vec<Due> {
        let due = match (self.covered_until, self.last_alive) {
            (Some(covered), Some(alive)) if now < alive => {
                warn!(previous = %alive, now = %now, covered = %covered, "clock moved backwards, skipping poll");
                Vec::new()
            }
            (Some(covered), Some(alive)) if now - alive > self.max_gap => {
                let missed = self.table.due_between(covered, now);
                let current = self.table.due_at(now);
                let skipped = missed.len().saturating_sub(current.len());
                if skipped > 0 {
                    warn!(
                        previous = %alive,
                        now = %now,
                        skipped,
                        "poll gap exceeded, skipping missed slots"
                    );
                }
                current
            }
            (Some(covered), _) => self.table.due_between(covered, now),
            (None, _) => self.table.due_at(now),
        };

        self.covered_until = Some(now);
        self.last_alive = Some(now);
        due
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// The slot scheduler.
pub struct Scheduler {
    trigger: Trigger,
    poll_interval: std::time::Duration,
    clock: Clock,
}

impl Scheduler {
    /// Create a scheduler polling every `poll_interval` against local time.
    ///
    /// Gaps longer than two poll intervals count as downtime.
    pub fn new(table: SlotTable, poll_interval: std::time::Duration) -> Self {
        let poll_interval = poll_interval.max(std::time::Duration::from_secs(MIN_SLEEP_SECS));
        let max_gap = Duration::from_std(poll_interval * 2)
            .unwrap_or_else(|_| Duration::seconds(2 * DEFAULT_POLL_SECS as i64));
        Self {
            trigger: Trigger::new(table, max_gap),
            poll_interval,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Current local time according to the scheduler's clock.
    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Start covering the slot table from the current time.
    ///
    /// Call before startup work so slots that fall due during it still fire
    /// on the first poll.
    pub fn begin(&mut self) -> NaiveDateTime {
        let now = self.now();
        self.trigger.seed(now);
        now
    }

    /// Record that work ran until the current time.
    pub fn mark_active(&mut self) {
        let now = self.now();
        self.trigger.record_activity(now);
    }

    /// Run the polling loop until shutdown is signalled.
    ///
    /// Due actions run one at a time, to completion; shutdown is only checked
    /// between actions.
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>, handler: &dyn ActionHandler) {
        info!(
            slots = self.trigger.table().slots().len(),
            poll_secs = self.poll_interval.as_secs(),
            "scheduler starting"
        );

        loop {
            if *shutdown_rx.borrow() {
                info!("scheduler shutting down");
                break;
            }

            let now = self.now();
            for due in self.trigger.poll(now) {
                if *shutdown_rx.borrow() {
                    info!("shutdown requested, not starting new actions");
                    break;
                }
                self.execute(due, handler).await;
                // Time spent inside an action is not downtime
                self.mark_active();
            }

            let sleep_duration = self.calculate_sleep_duration(self.now());

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                    }
                }
                _ = sleep(sleep_duration) => {}
            }
        }

        info!("scheduler shut down gracefully");
    }

    /// Run a single due action and log the result.
    #[tracing::instrument(skip(self, handler, due), fields(action = %due.action, at = %due.at))]
    async fn execute(&self, due: Due, handler: &dyn ActionHandler) {
        info!("executing action");
        match handler.handle(due.action, due.at).await {
            Ok(()) => debug!("action completed"),
            Err(e) => error!(error = %e, "action failed"),
        }
    }

    /// How long to sleep before the next poll: the poll interval, shortened
    /// so the next slot isn't overshot.
    pub fn calculate_sleep_duration(&self, now: NaiveDateTime) -> std::time::Duration {
        let max = self.poll_interval.as_secs();
        let secs = match self.trigger.table().next_after(now) {
            Some(next) => {
                let diff = (next.at - now).num_seconds();
                (diff.max(MIN_SLEEP_SECS as i64) as u64).min(max)
            }
            None => max,
        };
        std::time::Duration::from_secs(secs)
    }
}
