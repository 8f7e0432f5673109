//! Cron-driven event scheduler.
//!
//! A single task drains a min-heap of timed events every 100 ms. Firing a
//! start event calls into the manager and immediately re-arms the job at its
//! next cron instant, so a periodic job stays scheduled for as long as it
//! exists. Cancellation flips events to `Cancel` in place instead of
//! removing them; they drain on their natural due time.

pub mod event;

use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub use event::{EventKind, SchedulerEvent};

use crate::catalog::Catalog;
use crate::cron::CronSpec;
use crate::error::{KiwibesError, Result};
use crate::manager::Manager;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

pub struct Scheduler {
    catalog: Arc<Catalog>,
    manager: Arc<Manager>,
    events: Arc<Mutex<BinaryHeap<SchedulerEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(catalog: Arc<Catalog>, manager: Arc<Manager>) -> Self {
        Self {
            catalog,
            manager,
            events: Arc::new(Mutex::new(BinaryHeap::new())),
            task: Mutex::new(None),
        }
    }

    /// Launch the scheduler task. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let catalog = self.catalog.clone();
        let manager = self.manager.clone();
        let events = self.events.clone();
        *task = Some(tokio::spawn(async move {
            run_scheduler(catalog, manager, events).await;
        }));
        tracing::info!("scheduler task started");
    }

    /// Post the exit sentinel and join the task. Idempotent.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            self.events.lock().await.push(SchedulerEvent::exit());
            tracing::info!("waiting for the scheduler task to finish");
            let _ = handle.await;
        }
    }

    /// Arm the job at the next instant of its cron schedule.
    pub async fn schedule(&self, name: &str) -> Result<()> {
        let job = self.catalog.get(name).await?;
        let due = next_occurrence(&job.schedule)?;
        tracing::info!(job = %name, due = %due, "scheduled job");
        self.events.lock().await.push(SchedulerEvent::start(due, name));
        Ok(())
    }

    /// Withdraw every queued event of the named job. Idempotent.
    pub async fn unschedule(&self, name: &str) {
        let mut events = self.events.lock().await;
        let rebuilt = std::mem::take(&mut *events)
            .into_iter()
            .map(|mut event| {
                if event.kind == EventKind::Start && event.job == name {
                    event.kind = EventKind::Cancel;
                }
                event
            })
            .collect();
        *events = rebuilt;
    }

    /// Names with at least one live event in the queue.
    pub async fn list_scheduled(&self) -> Vec<String> {
        let events = self.events.lock().await;
        let names: BTreeSet<String> = events
            .iter()
            .filter(|event| event.kind == EventKind::Start)
            .map(|event| event.job.clone())
            .collect();
        names.into_iter().collect()
    }
}

async fn run_scheduler(
    catalog: Arc<Catalog>,
    manager: Arc<Manager>,
    events: Arc<Mutex<BinaryHeap<SchedulerEvent>>>,
) {
    'outer: loop {
        {
            let mut events = events.lock().await;
            let now = Utc::now();

            while events.peek().is_some_and(|event| event.due <= now) {
                let event = events.pop().expect("event queue cannot be empty here");
                match event.kind {
                    EventKind::Start => {
                        if let Err(e) = manager.start(&event.job).await {
                            tracing::warn!(job = %event.job, error = %e, "scheduled start failed");
                        }
                        // Re-arm at the next cron instant; the job may have
                        // been deleted or rescheduled in the meantime.
                        let next = match catalog.get(&event.job).await {
                            Ok(job) => next_occurrence(&job.schedule),
                            Err(e) => Err(e),
                        };
                        match next {
                            Ok(due) => events.push(SchedulerEvent::start(due, event.job)),
                            Err(e) => {
                                tracing::debug!(job = %event.job, error = %e, "not re-arming job")
                            }
                        }
                    }
                    EventKind::Cancel => {}
                    EventKind::Exit => break 'outer,
                }
            }
        }
        tokio::time::sleep(TICK_INTERVAL).await;
    }
    tracing::info!("scheduler task finished");
}

/// Resolve a schedule to its next wall-clock instant.
///
/// A schedule that parses but has no future occurrence is treated as
/// invalid; arming it would fire immediately and forever.
fn next_occurrence(schedule: &str) -> Result<DateTime<Utc>> {
    CronSpec::parse(schedule)?
        .next_from_now()
        .ok_or(KiwibesError::JobScheduleInvalid)
}
