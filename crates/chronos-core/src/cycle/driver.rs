//! Runs a [`TimerEngine`] against a [`CycleStore`].
//!
//! The driver owns the two periodic handlers of a live cycle: advancement
//! (about once a second) and checkpointing (about every ten seconds). Both are
//! plain tokio tasks over `time::interval` and are aborted whenever the engine
//! stops running. Every event the engine produces is published on an unbounded
//! channel for the loader.
//!
//! Store calls never hold the engine lock. Each call captures the engine epoch
//! first and the response is only applied if the epoch is unchanged.
//!
//! Finished phases are queued as [`PhaseReport`]s and sent oldest first. A
//! report the store did not confirm stays at the head of the queue, so the
//! store never skips a phase.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::engine::{Action, Seed, TimerEngine, TimerState};
use super::record::{Checkpoint, CycleRecord, CycleStatus, PhaseReport};
use super::store::CycleStore;
use crate::clock::Clock;
use crate::error::CycleError;
use crate::events::Event;

/// Periods of the advancement and checkpoint handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverIntervals {
    pub tick: Duration,
    pub checkpoint: Duration,
}

impl Default for DriverIntervals {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            checkpoint: Duration::from_secs(10),
        }
    }
}

struct Shared {
    cycle_id: String,
    activity_id: String,
    store: Arc<dyn CycleStore>,
    clock: Arc<dyn Clock>,
    engine: Mutex<TimerEngine>,
    /// Whether the store already holds a `started_at` for the current phase.
    store_started: AtomicBool,
    /// Finished phases not yet confirmed by the store, oldest first.
    reports: Mutex<VecDeque<PhaseReport>>,
    events: mpsc::UnboundedSender<Event>,
}

impl Shared {
    fn publish(&self, events: &[Event]) {
        for event in events {
            // The receiver may be gone; the engine keeps going regardless.
            let _ = self.events.send(event.clone());
        }
    }

    async fn tick(&self) -> Vec<Event> {
        let now = self.clock.now();
        let events = self.engine.lock().await.apply(Action::Tick, now);
        self.publish(&events);
        events
    }

    async fn checkpoint(&self) -> Option<Checkpoint> {
        let (checkpoint, epoch) = {
            let engine = self.engine.lock().await;
            (engine.checkpoint(self.clock.now())?, engine.epoch())
        };
        match self.store.checkpoint(&self.cycle_id, &checkpoint).await {
            Ok(()) => {
                if !self.engine.lock().await.is_current(epoch) {
                    debug!(cycle_id = %self.cycle_id, epoch, "checkpoint landed after a phase change");
                }
            }
            Err(e) => warn!(cycle_id = %self.cycle_id, error = %e, "checkpoint failed, retrying next interval"),
        }
        Some(checkpoint)
    }

    async fn is_running(&self) -> bool {
        self.engine.lock().await.is_running()
    }
}

/// Drives one cycle record.
pub struct CycleDriver {
    shared: Arc<Shared>,
    intervals: DriverIntervals,
    handlers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl CycleDriver {
    /// Create an idle driver seeded from `record`, reconciled against the clock.
    pub fn new(
        record: &CycleRecord,
        store: Arc<dyn CycleStore>,
        clock: Arc<dyn Clock>,
        intervals: DriverIntervals,
    ) -> Self {
        let seed = Seed::from_record(record, clock.now());
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            cycle_id: record.id.clone(),
            activity_id: record.activity_id.clone(),
            store,
            clock,
            engine: Mutex::new(TimerEngine::new(seed)),
            store_started: AtomicBool::new(is_store_running(record)),
            reports: Mutex::new(VecDeque::new()),
            events: tx,
        };
        Self {
            shared: Arc::new(shared),
            intervals,
            handlers: std::sync::Mutex::new(Vec::new()),
            receiver: std::sync::Mutex::new(Some(rx)),
        }
    }

    pub fn cycle_id(&self) -> &str {
        &self.shared.cycle_id
    }

    pub fn activity_id(&self) -> &str {
        &self.shared.activity_id
    }

    /// Take the engine event stream. Only the first caller gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub async fn state(&self) -> TimerState {
        self.shared.engine.lock().await.state()
    }

    pub async fn epoch(&self) -> u64 {
        self.shared.engine.lock().await.epoch()
    }

    pub async fn snapshot(&self) -> Event {
        let now = self.shared.clock.now();
        self.shared.engine.lock().await.snapshot(now)
    }

    /// Whether the periodic handlers are alive.
    pub fn is_ticking(&self) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|h| !h.is_finished())
    }

    /// Start or resume the countdown.
    ///
    /// When the record has no `started_at`, the store is asked first and the
    /// engine only starts once the store confirmed.
    pub async fn start(&self) -> Result<Vec<Event>, CycleError> {
        let epoch = {
            let engine = self.shared.engine.lock().await;
            if matches!(engine.state(), TimerState::Running | TimerState::Finished) {
                return Ok(Vec::new());
            }
            engine.epoch()
        };

        if !self.shared.store_started.load(Ordering::SeqCst) {
            self.shared.store.start(&self.shared.cycle_id).await?;
            self.shared.store_started.store(true, Ordering::SeqCst);
        }

        let events = {
            let mut engine = self.shared.engine.lock().await;
            if !engine.is_current(epoch) {
                debug!(cycle_id = %self.shared.cycle_id, epoch, "dropping stale start confirmation");
                return Err(CycleError::StaleResponse { epoch });
            }
            engine.apply(Action::Start, self.shared.clock.now())
        };
        self.shared.publish(&events);
        self.spawn_handlers();
        info!(cycle_id = %self.shared.cycle_id, "cycle running");
        Ok(events)
    }

    /// Pause the countdown.
    ///
    /// A no-op unless running. If the store refuses, the engine keeps running
    /// and the error is returned.
    pub async fn pause(&self) -> Result<Vec<Event>, CycleError> {
        let epoch = {
            let engine = self.shared.engine.lock().await;
            if !engine.is_running() {
                return Ok(Vec::new());
            }
            engine.epoch()
        };

        self.shared.store.pause(&self.shared.cycle_id).await?;
        self.shared.store_started.store(false, Ordering::SeqCst);

        let now = self.shared.clock.now();
        let (events, checkpoint) = {
            let mut engine = self.shared.engine.lock().await;
            // The store is already paused, so the engine follows even if a
            // phase ended while the request was in flight.
            if !engine.is_current(epoch) {
                debug!(cycle_id = %self.shared.cycle_id, epoch, "phase changed during pause request");
            }
            let events = engine.apply(Action::Pause, now);
            let checkpoint = Checkpoint {
                remaining_seconds: engine.remaining_secs(),
                is_break: engine.phase_kind().is_break(),
                at: now,
            };
            (events, checkpoint)
        };
        self.abort_handlers();
        self.shared.publish(&events);

        if let Err(e) = self
            .shared
            .store
            .checkpoint(&self.shared.cycle_id, &checkpoint)
            .await
        {
            warn!(cycle_id = %self.shared.cycle_id, error = %e, "checkpoint on pause failed");
        }
        info!(cycle_id = %self.shared.cycle_id, remaining = checkpoint.remaining_seconds, "cycle paused");
        Ok(events)
    }

    /// Run the advancement step once, as the tick handler does.
    pub async fn tick_once(&self) -> Vec<Event> {
        self.shared.tick().await
    }

    /// Write one checkpoint, as the checkpoint handler does. Returns the
    /// payload that was sent, or `None` when not running.
    pub async fn checkpoint_once(&self) -> Option<Checkpoint> {
        self.shared.checkpoint().await
    }

    /// Queue a finished phase for [`flush_reports`](Self::flush_reports).
    pub async fn queue_report(&self, report: PhaseReport) {
        self.shared.reports.lock().await.push_back(report);
    }

    /// Number of finished phases the store has not confirmed yet.
    pub async fn pending_reports(&self) -> usize {
        self.shared.reports.lock().await.len()
    }

    /// Send queued phase reports to the store, oldest first.
    ///
    /// Stops at the first failure and keeps that report and every later one
    /// queued. A report the store refuses as an invalid transition was already
    /// applied by an earlier attempt whose response got lost, so it is dropped.
    /// Returns the record after the last accepted report.
    pub async fn flush_reports(&self) -> Result<Option<CycleRecord>, CycleError> {
        let mut queue = self.shared.reports.lock().await;
        let mut last = None;
        while let Some(report) = queue.front().copied() {
            match self.shared.store.complete(&self.shared.cycle_id, &report).await {
                Ok(record) => {
                    queue.pop_front();
                    let completed = record.is_completed();
                    last = Some(record);
                    if completed {
                        queue.clear();
                        break;
                    }
                }
                Err(CycleError::InvalidTransition(reason)) => {
                    warn!(cycle_id = %self.shared.cycle_id, %reason, "store already past phase report, dropping it");
                    queue.pop_front();
                }
                Err(e) => {
                    warn!(
                        cycle_id = %self.shared.cycle_id,
                        pending = queue.len(),
                        error = %e,
                        "phase report not confirmed, keeping it queued"
                    );
                    return Err(e);
                }
            }
        }
        Ok(last)
    }

    /// Apply a freshly fetched record.
    pub async fn reseed(&self, record: &CycleRecord) -> Vec<Event> {
        self.apply_record(record, false).await
    }

    async fn apply_record(&self, record: &CycleRecord, force: bool) -> Vec<Event> {
        let now = self.shared.clock.now();
        let seed = Seed::from_record(record, now);
        let action = if force {
            Action::Resync(seed)
        } else {
            Action::Reseed(seed)
        };
        let events = self.shared.engine.lock().await.apply(action, now);
        if !events.is_empty() {
            self.shared
                .store_started
                .store(is_store_running(record), Ordering::SeqCst);
        }
        self.shared.publish(&events);
        events
    }

    /// Like [`reseed`](Self::reseed), but only if no transition happened
    /// since `epoch` was observed.
    pub async fn reseed_if_current(
        &self,
        epoch: u64,
        record: &CycleRecord,
    ) -> Result<Vec<Event>, CycleError> {
        if !self.shared.engine.lock().await.is_current(epoch) {
            return Err(CycleError::StaleResponse { epoch });
        }
        Ok(self.reseed(record).await)
    }

    /// Replace the countdown with the store's view of `record` after a large
    /// gap, even at the position the engine already holds. Only if no
    /// transition happened since `epoch` was observed.
    pub async fn resync_if_current(
        &self,
        epoch: u64,
        record: &CycleRecord,
    ) -> Result<Vec<Event>, CycleError> {
        if !self.shared.engine.lock().await.is_current(epoch) {
            return Err(CycleError::StaleResponse { epoch });
        }
        Ok(self.apply_record(record, true).await)
    }

    /// Stop both handlers and invalidate every in-flight response.
    pub async fn teardown(&self) {
        self.abort_handlers();
        let now = self.shared.clock.now();
        let events = self
            .shared
            .engine
            .lock()
            .await
            .apply(Action::Teardown, now);
        self.shared.publish(&events);
        debug!(cycle_id = %self.shared.cycle_id, "driver torn down");
    }

    fn spawn_handlers(&self) {
        self.abort_handlers();

        let shared = Arc::clone(&self.shared);
        let tick_every = self.intervals.tick;
        let ticker = tokio::spawn(async move {
            let mut interval = time::interval(tick_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                shared.tick().await;
                if !shared.is_running().await {
                    break;
                }
            }
        });

        let shared = Arc::clone(&self.shared);
        let checkpoint_every = self.intervals.checkpoint;
        let checkpointer = tokio::spawn(async move {
            let mut interval = time::interval(checkpoint_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing has elapsed yet.
            interval.tick().await;
            loop {
                interval.tick().await;
                if shared.checkpoint().await.is_none() {
                    break;
                }
            }
        });

        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.push(ticker);
        handlers.push(checkpointer);
    }

    fn abort_handlers(&self) {
        for handle in self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            handle.abort();
        }
    }
}

impl Drop for CycleDriver {
    fn drop(&mut self) {
        self.abort_handlers();
    }
}

impl fmt::Debug for CycleDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleDriver")
            .field("cycle_id", &self.shared.cycle_id)
            .field("intervals", &self.intervals)
            .finish_non_exhaustive()
    }
}

fn is_store_running(record: &CycleRecord) -> bool {
    record.status == CycleStatus::InProgress && record.started_at.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::cycle::PhaseKind;
    use crate::planner::SessionPlanner;
    use crate::storage::SqliteCycleStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    fn t0() -> DateTime<Utc> {
        "2026-03-02T09:00:00Z".parse().unwrap()
    }

    async fn setup(focus: u32, rest: u32) -> (CycleDriver, Arc<SqliteCycleStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(SqliteCycleStore::open_memory().unwrap().with_clock(clock.clone()));
        let planner = SessionPlanner::with_sessions(120, &[crate::cycle::SessionDurations::new(focus, rest)]);
        let record = store.create("a1", &planner.plan()).await.unwrap();
        let driver = CycleDriver::new(&record, store.clone(), clock.clone(), DriverIntervals::default());
        (driver, store, clock)
    }

    #[tokio::test]
    async fn start_confirms_with_store_first() {
        let (driver, store, _clock) = setup(25, 5).await;
        let events = driver.start().await.unwrap();
        assert!(matches!(events[0], Event::TimerStarted { remaining_secs: 1500, .. }));
        let record = store.get_active("a1").await.unwrap().unwrap();
        assert_eq!(record.status, CycleStatus::InProgress);
        assert_eq!(record.started_at, Some(t0()));
        assert!(driver.is_ticking());
        driver.teardown().await;
        assert!(!driver.is_ticking());
    }

    #[tokio::test]
    async fn pause_flushes_and_checkpoints() {
        let (driver, store, clock) = setup(25, 5).await;
        driver.start().await.unwrap();
        clock.advance_secs(90);
        driver.pause().await.unwrap();
        assert_eq!(driver.state().await, TimerState::Paused);
        assert!(!driver.is_ticking());

        let record = store.get_active("a1").await.unwrap().unwrap();
        assert_eq!(record.status, CycleStatus::Paused);
        assert_eq!(record.started_at, None);
        assert_eq!(record.last_checkpoint_remaining_seconds, Some(1410));

        // Second pause is a no-op.
        clock.advance_secs(30);
        assert!(driver.pause().await.unwrap().is_empty());
        match driver.snapshot().await {
            Event::StateSnapshot { remaining_secs, .. } => assert_eq!(remaining_secs, 1410),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn checkpoint_once_reports_live_remaining() {
        let (driver, store, clock) = setup(25, 5).await;
        assert!(driver.checkpoint_once().await.is_none());
        driver.start().await.unwrap();
        clock.advance_secs(12);
        let cp = driver.checkpoint_once().await.unwrap();
        assert_eq!(cp.remaining_seconds, 1488);
        let record = store.get_active("a1").await.unwrap().unwrap();
        assert_eq!(record.last_checkpoint_remaining_seconds, Some(1488));
        driver.teardown().await;
    }

    #[tokio::test]
    async fn tick_once_publishes_phase_completion() {
        let (driver, _store, clock) = setup(1, 1).await;
        let mut rx = driver.take_events().unwrap();
        assert!(driver.take_events().is_none());
        driver.start().await.unwrap();
        clock.advance_secs(60);
        driver.tick_once().await;
        driver.teardown().await;

        assert!(matches!(rx.recv().await, Some(Event::TimerStarted { .. })));
        match rx.recv().await {
            Some(Event::PhaseCompleted { report, next_phase, .. }) => {
                assert_eq!(report.focus_seconds, 60);
                assert_eq!(next_phase, PhaseKind::Break);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_handler_advances_on_its_own() {
        let (driver, _store, clock) = setup(1, 1).await;
        let mut rx = driver.take_events().unwrap();
        driver.start().await.unwrap();
        clock.advance_secs(61);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        rx.recv().await.unwrap();
        assert!(matches!(rx.recv().await, Some(Event::PhaseCompleted { .. })));
        match driver.snapshot().await {
            Event::StateSnapshot { phase, remaining_secs, .. } => {
                assert_eq!(phase, PhaseKind::Break);
                assert_eq!(remaining_secs, 59);
            }
            other => panic!("unexpected {other:?}"),
        }
        driver.teardown().await;
    }

    #[tokio::test]
    async fn reseed_after_transition_is_stale() {
        let (driver, store, clock) = setup(1, 1).await;
        driver.start().await.unwrap();
        let epoch = driver.epoch().await;
        clock.advance_secs(60);
        driver.tick_once().await;
        let record = store.get_active("a1").await.unwrap().unwrap();
        assert!(matches!(
            driver.reseed_if_current(epoch, &record).await,
            Err(CycleError::StaleResponse { .. })
        ));
        driver.teardown().await;
    }

    #[tokio::test]
    async fn queued_reports_reach_the_store_in_order() {
        let (driver, store, clock) = setup(1, 1).await;
        driver.start().await.unwrap();
        clock.advance_secs(120);
        driver
            .queue_report(PhaseReport::for_phase(PhaseKind::Focus, 60, t0() + chrono::Duration::seconds(60)))
            .await;
        driver
            .queue_report(PhaseReport::for_phase(PhaseKind::Break, 60, clock.now()))
            .await;
        assert_eq!(driver.pending_reports().await, 2);

        let record = driver.flush_reports().await.unwrap().unwrap();
        assert!(record.is_completed());
        assert_eq!(record.total_focus_seconds, 60);
        assert_eq!(record.total_break_seconds, 60);
        assert_eq!(driver.pending_reports().await, 0);
        assert_eq!(store.get_active("a1").await.unwrap().unwrap().status, CycleStatus::Completed);
        driver.teardown().await;
    }

    #[tokio::test]
    async fn report_the_store_already_applied_is_dropped() {
        let (driver, store, clock) = setup(1, 1).await;
        driver.start().await.unwrap();
        // The record is still in focus, so a break report cannot apply.
        driver
            .queue_report(PhaseReport::for_phase(PhaseKind::Break, 60, clock.now()))
            .await;
        assert!(driver.flush_reports().await.unwrap().is_none());
        assert_eq!(driver.pending_reports().await, 0);
        assert!(!store.get_active("a1").await.unwrap().unwrap().is_break);
        driver.teardown().await;
    }

    #[tokio::test]
    async fn resync_applies_store_view_at_same_position() {
        let (driver, store, clock) = setup(1, 1).await;
        driver.start().await.unwrap();
        let mut record = store.get_active("a1").await.unwrap().unwrap();
        clock.advance_secs(20);
        // Same position as the engine: a reseed is ignored, a resync is not.
        record.started_at = Some(t0() - chrono::Duration::seconds(30));
        assert!(driver.reseed(&record).await.is_empty());
        let epoch = driver.epoch().await;
        let events = driver.resync_if_current(epoch, &record).await.unwrap();
        assert!(matches!(
            events[..],
            [Event::Reseeded { phase: PhaseKind::Focus, cycle_index: 1, remaining_secs: 10, .. }]
        ));
        assert!(matches!(
            driver.resync_if_current(epoch, &record).await,
            Err(CycleError::StaleResponse { .. })
        ));
        driver.teardown().await;
    }

    struct RefusingStore;

    #[async_trait]
    impl CycleStore for RefusingStore {
        async fn create(&self, _: &str, _: &crate::planner::SessionPlan) -> Result<CycleRecord, CycleError> {
            Err(CycleError::network("create", "offline"))
        }
        async fn get_active(&self, _: &str) -> Result<Option<CycleRecord>, CycleError> {
            Err(CycleError::network("get_active", "offline"))
        }
        async fn start(&self, _: &str) -> Result<CycleRecord, CycleError> {
            Err(CycleError::network("start", "offline"))
        }
        async fn pause(&self, _: &str) -> Result<CycleRecord, CycleError> {
            Err(CycleError::network("pause", "offline"))
        }
        async fn complete(&self, _: &str, _: &crate::cycle::PhaseReport) -> Result<CycleRecord, CycleError> {
            Err(CycleError::network("complete", "offline"))
        }
        async fn checkpoint(&self, _: &str, _: &Checkpoint) -> Result<(), CycleError> {
            Err(CycleError::network("checkpoint", "offline"))
        }
        async fn cancel(&self, _: &str) -> Result<(), CycleError> {
            Ok(())
        }
        async fn cleanup(&self) -> Result<u64, CycleError> {
            Ok(0)
        }
    }

    fn running_record() -> CycleRecord {
        let mut record: CycleRecord = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "activityId": "a1",
            "status": "in_progress",
            "isBreak": false,
            "currentCycleIndex": 1,
            "targetCycles": 1,
            "focusDurationMinutes": 25,
            "restDurationMinutes": 5,
            "startedAt": "2026-03-02T09:00:00Z",
            "createdAt": "2026-03-02T09:00:00Z",
            "updatedAt": "2026-03-02T09:00:00Z"
        }))
        .unwrap();
        record.started_at = Some(t0());
        record
    }

    #[tokio::test]
    async fn start_failure_leaves_engine_idle() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut record = running_record();
        record.status = CycleStatus::Pending;
        record.started_at = None;
        let driver = CycleDriver::new(&record, Arc::new(RefusingStore), clock, DriverIntervals::default());
        assert!(driver.start().await.is_err());
        assert_eq!(driver.state().await, TimerState::Idle);
        assert!(!driver.is_ticking());
    }

    #[tokio::test]
    async fn unconfirmed_report_stays_queued() {
        let clock = Arc::new(ManualClock::new(t0()));
        let driver = CycleDriver::new(&running_record(), Arc::new(RefusingStore), clock.clone(), DriverIntervals::default());
        driver
            .queue_report(PhaseReport::for_phase(PhaseKind::Focus, 1500, clock.now()))
            .await;
        assert!(matches!(
            driver.flush_reports().await,
            Err(CycleError::NetworkFailure { .. })
        ));
        assert_eq!(driver.pending_reports().await, 1);
    }

    #[tokio::test]
    async fn pause_failure_keeps_running_and_checkpoint_failure_is_swallowed() {
        let clock = Arc::new(ManualClock::new(t0()));
        let driver = CycleDriver::new(&running_record(), Arc::new(RefusingStore), clock.clone(), DriverIntervals::default());
        // Already started in the store; no start request is sent.
        driver.start().await.unwrap();
        clock.advance_secs(5);
        assert!(driver.pause().await.is_err());
        assert_eq!(driver.state().await, TimerState::Running);
        assert!(driver.checkpoint_once().await.is_some());
        driver.tick_once().await;
        match driver.snapshot().await {
            Event::StateSnapshot { remaining_secs, .. } => assert_eq!(remaining_secs, 1495),
            other => panic!("unexpected {other:?}"),
        }
        driver.teardown().await;
    }
}
