//! Loads the current cycle of an activity and keeps the store in step with
//! the engine.

use std::sync::Arc;

use tokio::time;
use tracing::{debug, info, warn};

use super::driver::{CycleDriver, DriverIntervals};
use super::record::{CycleRecord, CycleStatus};
use super::store::CycleStore;
use crate::clock::Clock;
use crate::error::CycleError;
use crate::events::Event;

/// Result of [`CycleLoader::load`].
#[derive(Debug)]
pub enum LoadOutcome {
    /// The activity has no cycle. Not an error; shown as idle.
    Idle,
    /// A driver seeded from the reconciled record. Running if the record was.
    Ready(CycleDriver),
    /// Every cycle of the record already ran.
    Completed(CycleRecord),
}

/// Notifications produced while a cycle runs.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// An event straight from the engine.
    Engine(Event),
    /// The store accepted a finished phase.
    PhaseRecorded(CycleRecord),
    /// The record was re-fetched after a large gap.
    Resynced(CycleRecord),
    /// The store marked the cycle completed; the driver is torn down.
    CycleFinished {
        activity_id: String,
        cycle_id: String,
    },
}

pub struct CycleLoader {
    store: Arc<dyn CycleStore>,
    clock: Arc<dyn Clock>,
    intervals: DriverIntervals,
}

impl CycleLoader {
    pub fn new(store: Arc<dyn CycleStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            intervals: DriverIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: DriverIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn store(&self) -> &Arc<dyn CycleStore> {
        &self.store
    }

    /// The current record, or `NoActiveCycle`.
    pub async fn require(&self, activity_id: &str) -> Result<CycleRecord, CycleError> {
        self.store
            .get_active(activity_id)
            .await?
            .ok_or_else(|| CycleError::NoActiveCycle {
                activity_id: activity_id.to_string(),
            })
    }

    /// Fetch and reconcile the activity's record and seed a driver from it.
    ///
    /// An `in_progress` record resumes counting from where wall-clock time
    /// says it should be; pending and paused records load with a full phase.
    pub async fn load(&self, activity_id: &str) -> Result<LoadOutcome, CycleError> {
        let record = match self.store.get_active(activity_id).await? {
            Some(record) => record,
            None => {
                debug!(activity_id, "no cycle for activity");
                return Ok(LoadOutcome::Idle);
            }
        };
        if record.is_completed() {
            return Ok(LoadOutcome::Completed(record));
        }

        let driver = CycleDriver::new(
            &record,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.intervals,
        );
        if record.status == CycleStatus::InProgress {
            driver.start().await?;
        }
        info!(
            activity_id,
            cycle_id = %record.id,
            cycle = record.current_cycle_index,
            of = record.target_cycles,
            status = record.status.as_str(),
            "cycle loaded"
        );
        Ok(LoadOutcome::Ready(driver))
    }

    /// React to one engine event. Returns the notification it produced, if any.
    ///
    /// A finished phase is queued on the driver and every queued report is
    /// sent before the record is re-fetched. If the store does not confirm,
    /// the error is returned and the reports stay queued for the next event
    /// (or [`retry`](Self::retry)); the engine is not reseeded meanwhile.
    pub async fn handle_event(
        &self,
        driver: &CycleDriver,
        event: &Event,
    ) -> Result<Option<LoaderEvent>, CycleError> {
        match event {
            Event::PhaseCompleted { report, epoch, .. } => {
                driver.queue_report(*report).await;
                self.settle(driver, *epoch, false).await.map(Some)
            }
            Event::ResyncRequired { skipped_secs, epoch, .. } => {
                debug!(cycle_id = driver.cycle_id(), skipped_secs, "resyncing with store");
                self.settle(driver, *epoch, true).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Send reports still queued after a failure, then re-fetch the record.
    /// With `resync`, the record replaces the countdown even at the engine's
    /// own position.
    pub async fn retry(
        &self,
        driver: &CycleDriver,
        resync: bool,
    ) -> Result<LoaderEvent, CycleError> {
        let epoch = driver.epoch().await;
        self.settle(driver, epoch, resync).await
    }

    /// Forward engine events and persist phase completions until the store
    /// reports the cycle completed.
    ///
    /// Store failures on phase reports do not end the run: the reports stay
    /// queued and are retried every checkpoint interval until confirmed.
    pub async fn run<F>(&self, driver: &CycleDriver, mut notify: F) -> Result<(), CycleError>
    where
        F: FnMut(LoaderEvent),
    {
        let mut events = driver.take_events().ok_or_else(|| {
            CycleError::InvalidTransition(format!(
                "events of cycle {} are already consumed",
                driver.cycle_id()
            ))
        })?;
        let mut resync_owed = false;

        loop {
            let next = if driver.pending_reports().await > 0 {
                match time::timeout(self.intervals.checkpoint, events.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        match self.retry(driver, resync_owed).await {
                            Ok(outcome) => {
                                resync_owed = false;
                                if deliver(outcome, &mut notify) {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(cycle_id = driver.cycle_id(), error = %e, "phase reports still unconfirmed");
                            }
                        }
                        continue;
                    }
                }
            } else {
                events.recv().await
            };
            let Some(event) = next else {
                break;
            };

            let outcome = match self.handle_event(driver, &event).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if driver.pending_reports().await == 0 {
                        return Err(e);
                    }
                    warn!(cycle_id = driver.cycle_id(), error = %e, "store did not confirm phase, will retry");
                    resync_owed |= matches!(event, Event::ResyncRequired { .. });
                    None
                }
            };
            notify(LoaderEvent::Engine(event));
            if let Some(outcome) = outcome {
                if deliver(outcome, &mut notify) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Flush queued reports, then re-fetch and apply the record unless the
    /// cycle is over.
    async fn settle(
        &self,
        driver: &CycleDriver,
        epoch: u64,
        resync: bool,
    ) -> Result<LoaderEvent, CycleError> {
        let recorded = driver.flush_reports().await?;
        if let Some(record) = recorded.as_ref().filter(|r| r.is_completed()) {
            return Ok(self.finish(driver, record).await);
        }
        let fresh = self.require(driver.activity_id()).await?;
        if fresh.is_completed() {
            return Ok(self.finish(driver, &fresh).await);
        }
        self.reseed(driver, epoch, &fresh, resync).await?;
        Ok(if resync {
            LoaderEvent::Resynced(fresh)
        } else {
            LoaderEvent::PhaseRecorded(recorded.unwrap_or(fresh))
        })
    }

    async fn reseed(
        &self,
        driver: &CycleDriver,
        epoch: u64,
        record: &CycleRecord,
        resync: bool,
    ) -> Result<(), CycleError> {
        let applied = if resync {
            driver.resync_if_current(epoch, record).await
        } else {
            driver.reseed_if_current(epoch, record).await
        };
        match applied {
            Ok(_) => Ok(()),
            Err(CycleError::StaleResponse { epoch }) => {
                debug!(cycle_id = driver.cycle_id(), epoch, "dropping stale record");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn finish(&self, driver: &CycleDriver, record: &CycleRecord) -> LoaderEvent {
        driver.teardown().await;
        info!(
            activity_id = %record.activity_id,
            cycle_id = %record.id,
            focus_secs = record.total_focus_seconds,
            break_secs = record.total_break_seconds,
            "cycle completed"
        );
        LoaderEvent::CycleFinished {
            activity_id: record.activity_id.clone(),
            cycle_id: record.id.clone(),
        }
    }
}

/// Pass `outcome` on. Returns whether the cycle finished.
fn deliver<F: FnMut(LoaderEvent)>(outcome: LoaderEvent, notify: &mut F) -> bool {
    let finished = matches!(outcome, LoaderEvent::CycleFinished { .. });
    notify(outcome);
    finished
}
