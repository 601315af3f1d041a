use async_trait::async_trait;

use super::record::{Checkpoint, CycleRecord, PhaseReport};
use crate::error::CycleError;
use crate::planner::SessionPlan;

/// Persistence contract for cycle records.
///
/// The store is the durability authority. The live countdown is owned by the
/// engine; every call here is a request whose response may arrive after the
/// engine has already moved on.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Seed a record for `activity_id` from a plan, replacing any existing one.
    async fn create(&self, activity_id: &str, plan: &SessionPlan) -> Result<CycleRecord, CycleError>;

    /// The single current record for the activity, if any.
    async fn get_active(&self, activity_id: &str) -> Result<Option<CycleRecord>, CycleError>;

    /// Set `started_at` to now and move to `in_progress`.
    async fn start(&self, cycle_id: &str) -> Result<CycleRecord, CycleError>;

    /// Move to `paused` and clear `started_at`.
    async fn pause(&self, cycle_id: &str) -> Result<CycleRecord, CycleError>;

    /// Record a finished phase and advance the cycle (or complete it).
    async fn complete(&self, cycle_id: &str, report: &PhaseReport) -> Result<CycleRecord, CycleError>;

    /// Best-effort write of the live countdown.
    async fn checkpoint(&self, cycle_id: &str, checkpoint: &Checkpoint) -> Result<(), CycleError>;

    /// Drop the record of a deleted or cancelled activity.
    async fn cancel(&self, activity_id: &str) -> Result<(), CycleError>;

    /// Sweep finished records. Returns how many were removed.
    async fn cleanup(&self) -> Result<u64, CycleError>;
}
