//! Persisted cycle record and the payloads exchanged with the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Focus,
    Break,
}

impl PhaseKind {
    pub fn from_is_break(is_break: bool) -> Self {
        if is_break {
            PhaseKind::Break
        } else {
            PhaseKind::Focus
        }
    }

    pub fn is_break(self) -> bool {
        self == PhaseKind::Break
    }

    pub fn flipped(self) -> Self {
        match self {
            PhaseKind::Focus => PhaseKind::Break,
            PhaseKind::Break => PhaseKind::Focus,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Focus => "focus",
            PhaseKind::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStatus::Pending => "pending",
            CycleStatus::InProgress => "in_progress",
            CycleStatus::Paused => "paused",
            CycleStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CycleStatus::Pending),
            "in_progress" => Some(CycleStatus::InProgress),
            "paused" => Some(CycleStatus::Paused),
            "completed" => Some(CycleStatus::Completed),
            _ => None,
        }
    }
}

/// Focus and rest minutes for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDurations {
    pub focus_duration_minutes: u32,
    pub rest_duration_minutes: u32,
}

impl SessionDurations {
    pub fn new(focus_duration_minutes: u32, rest_duration_minutes: u32) -> Self {
        Self {
            focus_duration_minutes,
            rest_duration_minutes,
        }
    }

    /// Phase length in seconds.
    pub fn phase_secs(&self, phase: PhaseKind) -> u32 {
        let minutes = match phase {
            PhaseKind::Focus => self.focus_duration_minutes,
            PhaseKind::Break => self.rest_duration_minutes,
        };
        minutes.saturating_mul(60)
    }
}

/// One cycle run attached to one scheduled activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub id: String,
    pub activity_id: String,
    pub status: CycleStatus,
    pub is_break: bool,
    pub current_cycle_index: u32,
    pub target_cycles: u32,
    /// Durations of the current cycle.
    pub focus_duration_minutes: u32,
    pub rest_duration_minutes: u32,
    /// Per-cycle durations; entry `i` drives cycle `i + 1`.
    #[serde(default)]
    pub sessions: Vec<SessionDurations>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_checkpoint_remaining_seconds: Option<u32>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_focus_seconds: u64,
    #[serde(default)]
    pub total_break_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CycleRecord {
    pub fn phase(&self) -> PhaseKind {
        PhaseKind::from_is_break(self.is_break)
    }

    pub fn durations(&self) -> SessionDurations {
        SessionDurations::new(self.focus_duration_minutes, self.rest_duration_minutes)
    }

    /// Durations for a 1-based cycle index, falling back to the current ones
    /// when the record carries no per-cycle schedule.
    pub fn durations_for(&self, cycle_index: u32) -> SessionDurations {
        cycle_index
            .checked_sub(1)
            .and_then(|i| self.sessions.get(i as usize))
            .copied()
            .unwrap_or_else(|| self.durations())
    }

    pub fn current_phase_secs(&self) -> u32 {
        self.durations().phase_secs(self.phase())
    }

    pub fn is_completed(&self) -> bool {
        self.status == CycleStatus::Completed
    }

    /// Remaining seconds of the current phase as seen at `now`.
    ///
    /// Elapsed time only accrues while the record is `in_progress`; a pending
    /// or paused phase is always reported full.
    pub fn reconciled_remaining(&self, now: DateTime<Utc>) -> u32 {
        let phase_secs = self.current_phase_secs();
        match (self.status, self.started_at) {
            (CycleStatus::InProgress, Some(started_at)) => {
                let elapsed = (now - started_at).num_seconds().max(0);
                let remaining = i64::from(phase_secs) - elapsed;
                remaining.clamp(0, i64::from(phase_secs)) as u32
            }
            (CycleStatus::Completed, _) => 0,
            _ => phase_secs,
        }
    }
}

/// Metrics accrued by a phase that just ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub focus_seconds: u32,
    pub break_seconds: u32,
    pub was_break: bool,
    pub completed_at: DateTime<Utc>,
}

impl PhaseReport {
    pub fn for_phase(phase: PhaseKind, seconds: u32, completed_at: DateTime<Utc>) -> Self {
        let (focus_seconds, break_seconds) = match phase {
            PhaseKind::Focus => (seconds, 0),
            PhaseKind::Break => (0, seconds),
        };
        Self {
            focus_seconds,
            break_seconds,
            was_break: phase.is_break(),
            completed_at,
        }
    }
}

/// Best-effort durability write of the live countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub remaining_seconds: u32,
    pub is_break: bool,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: CycleStatus, started_at: Option<DateTime<Utc>>) -> CycleRecord {
        let now = Utc::now();
        CycleRecord {
            id: "c1".into(),
            activity_id: "a1".into(),
            status,
            is_break: false,
            current_cycle_index: 1,
            target_cycles: 2,
            focus_duration_minutes: 25,
            rest_duration_minutes: 5,
            sessions: vec![SessionDurations::new(25, 5), SessionDurations::new(50, 10)],
            started_at,
            last_checkpoint_remaining_seconds: None,
            last_checkpoint_at: None,
            total_focus_seconds: 0,
            total_break_seconds: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn in_progress_subtracts_time_since_start() {
        let now = Utc::now();
        let rec = record(CycleStatus::InProgress, Some(now - Duration::seconds(90)));
        assert_eq!(rec.reconciled_remaining(now), 1410);
    }

    #[test]
    fn in_progress_never_goes_negative() {
        let now = Utc::now();
        let rec = record(CycleStatus::InProgress, Some(now - Duration::hours(3)));
        assert_eq!(rec.reconciled_remaining(now), 0);
    }

    #[test]
    fn paused_and_pending_show_full_phase() {
        let now = Utc::now();
        assert_eq!(record(CycleStatus::Paused, None).reconciled_remaining(now), 1500);
        assert_eq!(record(CycleStatus::Pending, None).reconciled_remaining(now), 1500);
    }

    #[test]
    fn durations_for_uses_schedule() {
        let rec = record(CycleStatus::Pending, None);
        assert_eq!(rec.durations_for(2), SessionDurations::new(50, 10));
        assert_eq!(rec.durations_for(9), SessionDurations::new(25, 5));
    }

    #[test]
    fn record_serializes_camel_case() {
        let rec = record(CycleStatus::InProgress, None);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["currentCycleIndex"], 1);
        assert_eq!(json["focusDurationMinutes"], 25);
    }
}
