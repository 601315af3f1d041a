//! SQLite-backed cycle store.
//!
//! The local record of truth for cycle runs. Implements the store side of the
//! contract: `start` stamps `started_at`, `complete` flips the phase and
//! advances the cycle index, `cleanup` sweeps old completed runs.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::clock::{Clock, SystemClock};
use crate::cycle::{
    Checkpoint, CycleRecord, CycleStatus, CycleStore, PhaseReport, SessionDurations,
};
use crate::error::CycleError;
use crate::planner::SessionPlan;

const COLUMNS: &str = "id, activity_id, status, is_break, current_cycle_index, target_cycles,
     focus_duration_minutes, rest_duration_minutes, sessions, started_at,
     last_checkpoint_remaining_seconds, last_checkpoint_at, total_focus_seconds,
     total_break_seconds, created_at, updated_at, completed_at";

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CycleRecord> {
    let status: String = row.get(2)?;
    let status = CycleStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown cycle status '{status}'").into(),
        )
    })?;
    let sessions: String = row.get(8)?;
    let sessions: Vec<SessionDurations> = serde_json::from_str(&sessions).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CycleRecord {
        id: row.get(0)?,
        activity_id: row.get(1)?,
        status,
        is_break: row.get(3)?,
        current_cycle_index: row.get(4)?,
        target_cycles: row.get(5)?,
        focus_duration_minutes: row.get(6)?,
        rest_duration_minutes: row.get(7)?,
        sessions,
        started_at: parse_opt_ts(9, row.get(9)?)?,
        last_checkpoint_remaining_seconds: row.get(10)?,
        last_checkpoint_at: parse_opt_ts(11, row.get(11)?)?,
        total_focus_seconds: row.get(12)?,
        total_break_seconds: row.get(13)?,
        created_at: parse_ts(14, &row.get::<_, String>(14)?)?,
        updated_at: parse_ts(15, &row.get::<_, String>(15)?)?,
        completed_at: parse_opt_ts(16, row.get(16)?)?,
    })
}

/// SQLite database holding one current cycle record per activity.
pub struct SqliteCycleStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    retention_days: u32,
}

impl SqliteCycleStore {
    /// Open the database at `~/.config/chronos/chronos.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, CycleError> {
        let path = data_dir()
            .map_err(|e| CycleError::network("open", e))?
            .join("chronos.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self, CycleError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, CycleError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CycleError> {
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            retention_days: 30,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn find(conn: &Connection, cycle_id: &str) -> Result<CycleRecord, CycleError> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM cycles WHERE id = ?1"),
            params![cycle_id],
            row_to_record,
        )
        .optional()?
        .ok_or_else(|| CycleError::CycleNotFound(cycle_id.to_string()))
    }

    fn write(conn: &Connection, record: &CycleRecord) -> Result<(), CycleError> {
        let sessions = serde_json::to_string(&record.sessions)?;
        conn.execute(
            "UPDATE cycles SET
                status = ?2, is_break = ?3, current_cycle_index = ?4,
                focus_duration_minutes = ?5, rest_duration_minutes = ?6, sessions = ?7,
                started_at = ?8, last_checkpoint_remaining_seconds = ?9, last_checkpoint_at = ?10,
                total_focus_seconds = ?11, total_break_seconds = ?12, updated_at = ?13,
                completed_at = ?14
             WHERE id = ?1",
            params![
                record.id,
                record.status.as_str(),
                record.is_break,
                record.current_cycle_index,
                record.focus_duration_minutes,
                record.rest_duration_minutes,
                sessions,
                record.started_at.map(fmt_ts),
                record.last_checkpoint_remaining_seconds,
                record.last_checkpoint_at.map(fmt_ts),
                record.total_focus_seconds,
                record.total_break_seconds,
                fmt_ts(record.updated_at),
                record.completed_at.map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    fn require_open(record: &CycleRecord, operation: &str) -> Result<(), CycleError> {
        if record.is_completed() {
            return Err(CycleError::InvalidTransition(format!(
                "cannot {operation} completed cycle {}",
                record.id
            )));
        }
        Ok(())
    }

    /// Advance `record` past the phase described by `report`.
    fn apply_completion(record: &mut CycleRecord, report: &PhaseReport, now: DateTime<Utc>) {
        record.total_focus_seconds += u64::from(report.focus_seconds);
        record.total_break_seconds += u64::from(report.break_seconds);
        record.last_checkpoint_remaining_seconds = None;
        record.last_checkpoint_at = None;
        record.updated_at = now;

        if report.was_break && record.current_cycle_index >= record.target_cycles {
            record.status = CycleStatus::Completed;
            record.started_at = None;
            record.completed_at = Some(report.completed_at);
            return;
        }

        if report.was_break {
            record.current_cycle_index += 1;
            let next = record.durations_for(record.current_cycle_index);
            record.focus_duration_minutes = next.focus_duration_minutes;
            record.rest_duration_minutes = next.rest_duration_minutes;
        }
        record.is_break = !report.was_break;

        // A phase flushed out by a pause stays paused; otherwise the next
        // phase started at the boundary.
        if record.status == CycleStatus::Paused {
            record.started_at = None;
        } else {
            record.status = CycleStatus::InProgress;
            record.started_at = Some(report.completed_at);
        }
    }
}

#[async_trait]
impl CycleStore for SqliteCycleStore {
    async fn create(&self, activity_id: &str, plan: &SessionPlan) -> Result<CycleRecord, CycleError> {
        plan.seedable(activity_id)?;
        let now = self.clock.now();
        let sessions = plan.durations();
        let first = sessions[0];
        let record = CycleRecord {
            id: Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            status: CycleStatus::Pending,
            is_break: false,
            current_cycle_index: 1,
            target_cycles: plan.target_cycles(),
            focus_duration_minutes: first.focus_duration_minutes,
            rest_duration_minutes: first.rest_duration_minutes,
            sessions,
            started_at: None,
            last_checkpoint_remaining_seconds: None,
            last_checkpoint_at: None,
            total_focus_seconds: 0,
            total_break_seconds: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cycles WHERE activity_id = ?1", params![activity_id])?;
        tx.execute(
            "INSERT INTO cycles (id, activity_id, status, target_cycles, focus_duration_minutes,
                rest_duration_minutes, sessions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.activity_id,
                record.status.as_str(),
                record.target_cycles,
                record.focus_duration_minutes,
                record.rest_duration_minutes,
                serde_json::to_string(&record.sessions)?,
                fmt_ts(now),
                fmt_ts(now),
            ],
        )?;
        tx.commit()?;
        debug!(activity_id, cycle_id = %record.id, "created cycle record");
        Ok(record)
    }

    async fn get_active(&self, activity_id: &str) -> Result<Option<CycleRecord>, CycleError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM cycles WHERE activity_id = ?1"),
                params![activity_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn start(&self, cycle_id: &str) -> Result<CycleRecord, CycleError> {
        let conn = self.conn();
        let mut record = Self::find(&conn, cycle_id)?;
        Self::require_open(&record, "start")?;
        if record.status == CycleStatus::InProgress && record.started_at.is_some() {
            return Ok(record);
        }
        let now = self.clock.now();
        record.status = CycleStatus::InProgress;
        record.started_at = Some(now);
        record.updated_at = now;
        Self::write(&conn, &record)?;
        Ok(record)
    }

    async fn pause(&self, cycle_id: &str) -> Result<CycleRecord, CycleError> {
        let conn = self.conn();
        let mut record = Self::find(&conn, cycle_id)?;
        Self::require_open(&record, "pause")?;
        record.status = CycleStatus::Paused;
        record.started_at = None;
        record.updated_at = self.clock.now();
        Self::write(&conn, &record)?;
        Ok(record)
    }

    async fn complete(&self, cycle_id: &str, report: &PhaseReport) -> Result<CycleRecord, CycleError> {
        let conn = self.conn();
        let mut record = Self::find(&conn, cycle_id)?;
        Self::require_open(&record, "complete")?;
        if record.is_break != report.was_break {
            return Err(CycleError::InvalidTransition(format!(
                "cycle {cycle_id} is not in the {} phase",
                if report.was_break { "break" } else { "focus" }
            )));
        }
        Self::apply_completion(&mut record, report, self.clock.now());
        Self::write(&conn, &record)?;
        Ok(record)
    }

    async fn checkpoint(&self, cycle_id: &str, checkpoint: &Checkpoint) -> Result<(), CycleError> {
        let conn = self.conn();
        let record = Self::find(&conn, cycle_id)?;
        if record.is_completed() || record.is_break != checkpoint.is_break {
            debug!(cycle_id, "ignoring checkpoint for a phase the record has left");
            return Ok(());
        }
        conn.execute(
            "UPDATE cycles SET last_checkpoint_remaining_seconds = ?2, last_checkpoint_at = ?3,
                updated_at = ?4
             WHERE id = ?1",
            params![
                cycle_id,
                checkpoint.remaining_seconds,
                fmt_ts(checkpoint.at),
                fmt_ts(self.clock.now()),
            ],
        )?;
        Ok(())
    }

    async fn cancel(&self, activity_id: &str) -> Result<(), CycleError> {
        self.conn()
            .execute("DELETE FROM cycles WHERE activity_id = ?1", params![activity_id])?;
        Ok(())
    }

    async fn cleanup(&self) -> Result<u64, CycleError> {
        let cutoff = self.clock.now() - Duration::days(i64::from(self.retention_days));
        let removed = self.conn().execute(
            "DELETE FROM cycles WHERE status = 'completed' AND completed_at < ?1",
            params![fmt_ts(cutoff)],
        )?;
        Ok(removed as u64)
    }
}
