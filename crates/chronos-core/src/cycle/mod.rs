mod driver;
mod engine;
mod loader;
mod record;
mod store;

pub use driver::{CycleDriver, DriverIntervals};
pub use engine::{Action, Phase, Seed, TimerEngine, TimerState};
pub use loader::{CycleLoader, LoadOutcome, LoaderEvent};
pub use record::{
    Checkpoint, CycleRecord, CycleStatus, PhaseKind, PhaseReport, SessionDurations,
};
pub use store::CycleStore;
