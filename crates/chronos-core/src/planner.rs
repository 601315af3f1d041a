//! Pre-run session planner.
//!
//! Lets a user lay out one or more (focus, rest) pairs for an activity before
//! its cycle record is created. Every mutation re-derives the aggregate
//! durations and the strategic reserve, i.e. the slack between the planned
//! sessions and the activity's time window.

use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cycle::SessionDurations;
use crate::error::CycleError;

pub const FOCUS_MINUTES: RangeInclusive<u32> = 1..=60;
pub const REST_MINUTES: RangeInclusive<u32> = 1..=30;

/// Which half of a session an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionField {
    Focus,
    Rest,
}

impl SessionField {
    pub fn range(self) -> RangeInclusive<u32> {
        match self {
            SessionField::Focus => FOCUS_MINUTES,
            SessionField::Rest => REST_MINUTES,
        }
    }

    pub fn clamp(self, minutes: u32) -> u32 {
        let range = self.range();
        minutes.clamp(*range.start(), *range.end())
    }
}

impl FromStr for SessionField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "focus" => Ok(SessionField::Focus),
            "rest" | "break" => Ok(SessionField::Rest),
            other => Err(format!("unknown session field: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSession {
    pub id: String,
    pub focus_duration_minutes: u32,
    pub rest_duration_minutes: u32,
}

impl PlannedSession {
    fn new(durations: SessionDurations) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            focus_duration_minutes: SessionField::Focus.clamp(durations.focus_duration_minutes),
            rest_duration_minutes: SessionField::Rest.clamp(durations.rest_duration_minutes),
        }
    }

    pub fn durations(&self) -> SessionDurations {
        SessionDurations::new(self.focus_duration_minutes, self.rest_duration_minutes)
    }
}

/// The full planner output used to seed a cycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub sessions: Vec<PlannedSession>,
    pub aggregate_focus_minutes: u32,
    pub aggregate_rest_minutes: u32,
    pub enabled: bool,
    /// Window minus planned time. Negative when the plan overruns the window.
    pub strategic_reserve_minutes: i64,
}

impl SessionPlan {
    pub fn durations(&self) -> Vec<SessionDurations> {
        self.sessions.iter().map(PlannedSession::durations).collect()
    }

    pub fn target_cycles(&self) -> u32 {
        self.sessions.len() as u32
    }

    pub fn is_over_window(&self) -> bool {
        self.strategic_reserve_minutes < 0
    }

    /// Reject empty plans and out-of-range durations before they reach a store.
    pub fn validate(&self) -> Result<(), CycleError> {
        if self.sessions.is_empty() {
            return Err(CycleError::InvalidSessionConfig {
                field: "sessions".into(),
                minutes: 0,
                min: 1,
                max: u32::MAX,
            });
        }
        for session in &self.sessions {
            check(SessionField::Focus, session.focus_duration_minutes)?;
            check(SessionField::Rest, session.rest_duration_minutes)?;
        }
        Ok(())
    }

    /// Whether a store may seed a cycle record for `activity_id` from this plan.
    pub fn seedable(&self, activity_id: &str) -> Result<(), CycleError> {
        self.validate()?;
        if !self.enabled {
            return Err(CycleError::InvalidTransition(format!(
                "cycles are disabled for activity {activity_id}"
            )));
        }
        Ok(())
    }
}

fn check(field: SessionField, minutes: u32) -> Result<(), CycleError> {
    let range = field.range();
    if range.contains(&minutes) {
        return Ok(());
    }
    Err(CycleError::InvalidSessionConfig {
        field: match field {
            SessionField::Focus => "focus".into(),
            SessionField::Rest => "rest".into(),
        },
        minutes,
        min: *range.start(),
        max: *range.end(),
    })
}

/// What the planner emits after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanPayload {
    Enabled(SessionPlan),
    Disabled { enabled: bool },
}

impl PlanPayload {
    pub fn plan(&self) -> Option<&SessionPlan> {
        match self {
            PlanPayload::Enabled(plan) => Some(plan),
            PlanPayload::Disabled { .. } => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, PlanPayload::Enabled(_))
    }
}

/// Editable list of (focus, rest) pairs for one activity.
#[derive(Debug, Clone)]
pub struct SessionPlanner {
    sessions: Vec<PlannedSession>,
    defaults: SessionDurations,
    window_minutes: u32,
    enabled: bool,
}

impl SessionPlanner {
    /// One default 25/5 session, enabled.
    pub fn new(window_minutes: u32) -> Self {
        Self::with_defaults(window_minutes, SessionDurations::new(25, 5))
    }

    pub fn with_defaults(window_minutes: u32, defaults: SessionDurations) -> Self {
        Self {
            sessions: vec![PlannedSession::new(defaults)],
            defaults,
            window_minutes,
            enabled: true,
        }
    }

    /// Planner pre-filled with `pairs`; values are clamped like any update.
    pub fn with_sessions(window_minutes: u32, pairs: &[SessionDurations]) -> Self {
        let mut planner = Self::new(window_minutes);
        if !pairs.is_empty() {
            planner.sessions = pairs.iter().copied().map(PlannedSession::new).collect();
        }
        planner
    }

    pub fn sessions(&self) -> &[PlannedSession] {
        &self.sessions
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn add_session(&mut self) -> PlanPayload {
        self.sessions.push(PlannedSession::new(self.defaults));
        self.payload()
    }

    /// Remove by id. The last remaining session cannot be removed.
    pub fn remove_session(&mut self, id: &str) -> PlanPayload {
        if self.sessions.len() > 1 {
            self.sessions.retain(|s| s.id != id);
        }
        self.payload()
    }

    pub fn update_session(&mut self, id: &str, field: SessionField, minutes: u32) -> PlanPayload {
        let minutes = field.clamp(minutes);
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            match field {
                SessionField::Focus => session.focus_duration_minutes = minutes,
                SessionField::Rest => session.rest_duration_minutes = minutes,
            }
        }
        self.payload()
    }

    pub fn set_enabled(&mut self, enabled: bool) -> PlanPayload {
        self.enabled = enabled;
        self.payload()
    }

    pub fn set_window_minutes(&mut self, window_minutes: u32) -> PlanPayload {
        self.window_minutes = window_minutes;
        self.payload()
    }

    /// The full plan regardless of the enable toggle.
    pub fn plan(&self) -> SessionPlan {
        let aggregate_focus_minutes = self.sessions.iter().map(|s| s.focus_duration_minutes).sum();
        let aggregate_rest_minutes = self.sessions.iter().map(|s| s.rest_duration_minutes).sum();
        let planned = i64::from(aggregate_focus_minutes) + i64::from(aggregate_rest_minutes);
        SessionPlan {
            sessions: self.sessions.clone(),
            aggregate_focus_minutes,
            aggregate_rest_minutes,
            enabled: self.enabled,
            strategic_reserve_minutes: i64::from(self.window_minutes) - planned,
        }
    }

    pub fn payload(&self) -> PlanPayload {
        if self.enabled {
            PlanPayload::Enabled(self.plan())
        } else {
            PlanPayload::Disabled { enabled: false }
        }
    }
}
