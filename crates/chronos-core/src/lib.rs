//! # Chronos Core Library
//!
//! Focus/break cycle timing for scheduled activities. The same library backs
//! the `chronos` CLI and any other front end.
//!
//! ## Architecture
//!
//! - **Session Planner**: splits an activity window into focus/rest pairs and
//!   reports the strategic reserve left over
//! - **Timer Engine**: a wall-clock-based state machine; every change goes
//!   through one reducer and the caller supplies `now`
//! - **Cycle Driver / Loader**: run the engine on tokio intervals and keep the
//!   cycle store in step (reconciliation, checkpoints, phase completions)
//! - **Storage**: SQLite or HTTP cycle stores and TOML-based configuration
//! - **Progress Classifier**: where an activity stands relative to now
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`CycleLoader`]: Loads, reconciles and drives a cycle record
//! - [`CycleStore`]: Persistence contract, see [`SqliteCycleStore`] and [`HttpCycleStore`]
//! - [`SessionPlanner`]: Focus/rest plan editing
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod cycle;
pub mod error;
pub mod events;
pub mod planner;
pub mod progress;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cycle::{
    Checkpoint, CycleDriver, CycleLoader, CycleRecord, CycleStatus, CycleStore, LoadOutcome,
    LoaderEvent, Phase, PhaseKind, PhaseReport, SessionDurations, TimerEngine, TimerState,
};
pub use error::{ConfigError, CoreError, CycleError, ValidationError};
pub use events::Event;
pub use planner::{PlanPayload, PlannedSession, SessionField, SessionPlan, SessionPlanner};
pub use progress::{classify, classify_with_grace, ActivityStatus, ActivityWindow};
pub use storage::{Config, HttpCycleStore, SqliteCycleStore, StoreBackend};
