//! Focus/break timer engine.
//!
//! The engine is a wall-clock-based state machine. It does not use
//! internal threads or read the clock itself - the caller passes `now` into
//! every action and is responsible for ticking it periodically.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |
//!            +-- Focus(r) -> Break(r) -> Focus(r) ... -> Finished
//! ```
//!
//! All mutations go through [`TimerEngine::apply`]. Each phase transition,
//! reseed and teardown bumps the `epoch`, which callers use to recognise
//! responses that belong to a superseded phase.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(Seed::from_record(&record, now));
//! engine.apply(Action::Start, now);
//! // Every second:
//! for event in engine.apply(Action::Tick, clock.now()) { ... }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::record::{Checkpoint, CycleRecord, PhaseKind, PhaseReport, SessionDurations};
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    /// Every cycle ran out; no further phase will start.
    Finished,
}

/// The active phase and the seconds left in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "remaining", rename_all = "lowercase")]
pub enum Phase {
    Focus(u32),
    Break(u32),
}

impl Phase {
    pub fn new(kind: PhaseKind, remaining: u32) -> Self {
        match kind {
            PhaseKind::Focus => Phase::Focus(remaining),
            PhaseKind::Break => Phase::Break(remaining),
        }
    }

    pub fn kind(self) -> PhaseKind {
        match self {
            Phase::Focus(_) => PhaseKind::Focus,
            Phase::Break(_) => PhaseKind::Break,
        }
    }

    pub fn remaining(self) -> u32 {
        match self {
            Phase::Focus(r) | Phase::Break(r) => r,
        }
    }

    fn with_remaining(self, remaining: u32) -> Self {
        Phase::new(self.kind(), remaining)
    }
}

/// Externally supplied starting point for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub phase: Phase,
    pub cycle_index: u32,
    pub target_cycles: u32,
    pub schedule: Vec<SessionDurations>,
}

impl Seed {
    /// Seed reconciled against `now`.
    pub fn from_record(record: &CycleRecord, now: DateTime<Utc>) -> Self {
        let target_cycles = record.target_cycles.max(1);
        let schedule = if record.sessions.is_empty() {
            vec![record.durations(); target_cycles as usize]
        } else {
            record.sessions.clone()
        };
        Self {
            phase: Phase::new(record.phase(), record.reconciled_remaining(now)),
            cycle_index: record.current_cycle_index.clamp(1, target_cycles),
            target_cycles,
            schedule,
        }
    }

    /// A fresh seed at the start of cycle 1.
    pub fn fresh(schedule: Vec<SessionDurations>) -> Self {
        let first = schedule
            .first()
            .copied()
            .unwrap_or_else(|| SessionDurations::new(25, 5));
        let target_cycles = schedule.len().max(1) as u32;
        Self {
            phase: Phase::Focus(first.phase_secs(PhaseKind::Focus)),
            cycle_index: 1,
            target_cycles,
            schedule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Tick,
    Reseed(Seed),
    /// Apply a store-reconciled seed even at the position the engine holds.
    Resync(Seed),
    Teardown,
}

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEngine {
    phase: Phase,
    state: TimerState,
    cycle_index: u32,
    target_cycles: u32,
    schedule: Vec<SessionDurations>,
    /// Instant up to which elapsed time has been subtracted.
    last_tick_at: Option<DateTime<Utc>>,
    epoch: u64,
}

impl TimerEngine {
    /// Create an idle engine positioned at `seed`.
    pub fn new(seed: Seed) -> Self {
        let mut engine = Self {
            phase: seed.phase,
            state: TimerState::Idle,
            cycle_index: 1,
            target_cycles: 1,
            schedule: Vec::new(),
            last_tick_at: None,
            epoch: 0,
        };
        engine.load_seed(seed);
        engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn remaining_secs(&self) -> u32 {
        self.phase.remaining()
    }

    pub fn cycle_index(&self) -> u32 {
        self.cycle_index
    }

    pub fn target_cycles(&self) -> u32 {
        self.target_cycles
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Whether a response captured at `epoch` still describes the live phase.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    pub fn durations(&self) -> SessionDurations {
        self.durations_for(self.cycle_index)
    }

    /// Full length of the current phase.
    pub fn total_secs(&self) -> u32 {
        self.durations().phase_secs(self.phase.kind())
    }

    /// Remaining seconds as of `now`, without consuming the pending delta.
    pub fn live_remaining(&self, now: DateTime<Utc>) -> u32 {
        let pending = match (self.state, self.last_tick_at) {
            (TimerState::Running, Some(last)) => (now - last).num_seconds().max(0),
            _ => 0,
        };
        let remaining = i64::from(self.phase.remaining()) - pending;
        remaining.max(0) as u32
    }

    /// Checkpoint payload, only while running.
    pub fn checkpoint(&self, now: DateTime<Utc>) -> Option<Checkpoint> {
        (self.state == TimerState::Running).then(|| Checkpoint {
            remaining_seconds: self.live_remaining(now),
            is_break: self.phase.kind().is_break(),
            at: now,
        })
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        Event::StateSnapshot {
            state: self.state,
            phase: self.phase.kind(),
            cycle_index: self.cycle_index,
            target_cycles: self.target_cycles,
            remaining_secs: self.live_remaining(now),
            total_secs: self.total_secs(),
            epoch: self.epoch,
            at: now,
        }
    }

    // ── Reducer ──────────────────────────────────────────────────────

    /// The single entry point for every state change.
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> Vec<Event> {
        match action {
            Action::Start => self.start(now),
            Action::Pause => self.pause(now),
            Action::Tick => self.advance(now),
            Action::Reseed(seed) => self.reseed(seed, now),
            Action::Resync(seed) => self.resync(seed, now),
            Action::Teardown => {
                self.state = TimerState::Idle;
                self.last_tick_at = None;
                self.epoch += 1;
                Vec::new()
            }
        }
    }

    fn start(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        match self.state {
            TimerState::Idle | TimerState::Paused => {
                self.state = TimerState::Running;
                self.last_tick_at = Some(now);
                vec![Event::TimerStarted {
                    phase: self.phase.kind(),
                    cycle_index: self.cycle_index,
                    remaining_secs: self.phase.remaining(),
                    at: now,
                }]
            }
            TimerState::Running | TimerState::Finished => Vec::new(),
        }
    }

    fn pause(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if self.state != TimerState::Running {
            return Vec::new();
        }
        // Flush elapsed time first; this may itself finish a phase.
        let mut events = self.advance(now);
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
            self.last_tick_at = None;
            events.push(Event::TimerPaused {
                remaining_secs: self.phase.remaining(),
                at: now,
            });
        }
        events
    }

    fn advance(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if self.state != TimerState::Running {
            return Vec::new();
        }
        let Some(last) = self.last_tick_at else {
            self.last_tick_at = Some(now);
            return Vec::new();
        };
        let elapsed = (now - last).num_seconds();
        if elapsed < 1 {
            return Vec::new();
        }
        // Keep the sub-second remainder for the next tick.
        self.last_tick_at = Some(last + Duration::seconds(elapsed));

        let elapsed = elapsed as u64;
        let remaining = u64::from(self.phase.remaining());
        if elapsed < remaining {
            self.phase = self.phase.with_remaining((remaining - elapsed) as u32);
            return Vec::new();
        }
        let overflow = elapsed - remaining;
        let boundary = now - Duration::seconds(overflow as i64);
        self.finish_phase(boundary, overflow, now)
    }

    fn finish_phase(
        &mut self,
        boundary: DateTime<Utc>,
        overflow: u64,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let ended = self.phase.kind();
        let report = PhaseReport::for_phase(ended, self.total_secs(), boundary);
        let next = ended.flipped();

        if ended == PhaseKind::Break && self.cycle_index >= self.target_cycles {
            self.state = TimerState::Finished;
            self.phase = Phase::Break(0);
            self.last_tick_at = None;
            self.epoch += 1;
            return vec![
                Event::PhaseCompleted {
                    report,
                    next_phase: next,
                    cycle_index: self.cycle_index,
                    epoch: self.epoch,
                },
                Event::CycleFinished {
                    cycle_index: self.cycle_index,
                    at: boundary,
                },
            ];
        }

        if ended == PhaseKind::Break {
            self.cycle_index += 1;
        }
        let next_secs = self.durations().phase_secs(next);
        self.epoch += 1;

        let mut events = vec![Event::PhaseCompleted {
            report,
            next_phase: next,
            cycle_index: self.cycle_index,
            epoch: self.epoch,
        }];

        // At most one transition per tick; a gap that would also swallow the
        // next phase starts it full and asks for a resync instead.
        if overflow < u64::from(next_secs) {
            self.phase = Phase::new(next, next_secs - overflow as u32);
        } else {
            self.phase = Phase::new(next, next_secs);
            self.last_tick_at = Some(now);
            events.push(Event::ResyncRequired {
                skipped_secs: overflow,
                epoch: self.epoch,
                at: now,
            });
        }
        events
    }

    fn reseed(&mut self, seed: Seed, now: DateTime<Utc>) -> Vec<Event> {
        if self.state == TimerState::Finished {
            return Vec::new();
        }
        // A running engine that already reached this position on its own is
        // authoritative for the countdown.
        if self.state == TimerState::Running
            && seed.cycle_index == self.cycle_index
            && seed.phase.kind() == self.phase.kind()
        {
            return Vec::new();
        }
        self.resync(seed, now)
    }

    fn resync(&mut self, seed: Seed, now: DateTime<Utc>) -> Vec<Event> {
        if self.state == TimerState::Finished {
            return Vec::new();
        }
        self.load_seed(seed);
        self.epoch += 1;
        if self.state == TimerState::Running {
            self.last_tick_at = Some(now);
        }
        vec![Event::Reseeded {
            phase: self.phase.kind(),
            cycle_index: self.cycle_index,
            remaining_secs: self.phase.remaining(),
            epoch: self.epoch,
        }]
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn load_seed(&mut self, seed: Seed) {
        self.target_cycles = seed.target_cycles.max(1);
        self.cycle_index = seed.cycle_index.clamp(1, self.target_cycles);
        self.schedule = seed.schedule;
        let full = self.durations().phase_secs(seed.phase.kind());
        self.phase = seed.phase.with_remaining(seed.phase.remaining().min(full));
    }

    fn durations_for(&self, cycle_index: u32) -> SessionDurations {
        cycle_index
            .checked_sub(1)
            .and_then(|i| self.schedule.get(i as usize))
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or_else(|| SessionDurations::new(25, 5))
    }
}
