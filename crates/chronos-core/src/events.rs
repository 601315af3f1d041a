use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::{PhaseKind, PhaseReport, TimerState};

/// Every state change of a running cycle produces an Event.
/// The loader consumes them; the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: PhaseKind,
        cycle_index: u32,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    /// A phase ran out. The engine has already moved into the next phase
    /// (or finished) when this is observed.
    PhaseCompleted {
        report: PhaseReport,
        next_phase: PhaseKind,
        cycle_index: u32,
        epoch: u64,
    },
    /// The last break of the last cycle ended.
    CycleFinished {
        cycle_index: u32,
        at: DateTime<Utc>,
    },
    /// An advancement gap swallowed the whole next phase; the engine capped
    /// at one transition and the caller should re-fetch the record.
    ResyncRequired {
        skipped_secs: u64,
        epoch: u64,
        at: DateTime<Utc>,
    },
    /// External initial values were applied.
    Reseeded {
        phase: PhaseKind,
        cycle_index: u32,
        remaining_secs: u32,
        epoch: u64,
    },
    StateSnapshot {
        state: TimerState,
        phase: PhaseKind,
        cycle_index: u32,
        target_cycles: u32,
        remaining_secs: u32,
        total_secs: u32,
        epoch: u64,
        at: DateTime<Utc>,
    },
}
