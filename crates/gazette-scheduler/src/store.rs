//! SQLite-backed durable store — the trigger queue, the per-step
//! idempotence ledger, and cancellation tokens in one file.
//!
//! Triggers are rows; "Idle" is the absence of a pending/running row for
//! a user. At most one live (pending or running) row exists per user,
//! which is what serializes same-user cycles.

use chrono::{DateTime, Utc};
use gazette_core::error::{GazetteError, Result};
use gazette_core::types::{CycleTrigger, Frequency};
use std::path::Path;

/// Lifecycle state of one stored cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Pending => "pending",
            CycleStatus::Running => "running",
            CycleStatus::Completed => "completed",
            CycleStatus::Skipped => "skipped",
            CycleStatus::Failed => "failed",
            CycleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => CycleStatus::Running,
            "completed" => CycleStatus::Completed,
            "skipped" => CycleStatus::Skipped,
            "failed" => CycleStatus::Failed,
            "cancelled" => CycleStatus::Cancelled,
            _ => CycleStatus::Pending,
        }
    }
}

/// One stored cycle: a trigger plus its execution bookkeeping.
#[derive(Debug, Clone)]
pub struct CycleJob {
    pub run_id: String,
    pub trigger: CycleTrigger,
    pub status: CycleStatus,
    /// Failed attempts so far (0 on first execution).
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The durable store.
pub struct JobStore {
    conn: rusqlite::Connection,
}

impl JobStore {
    /// Open or create the store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| GazetteError::Database(format!("DB open: {e}")))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            -- One row per cycle execution. 'Idle' = no live row for a user.
            CREATE TABLE IF NOT EXISTS cycles (
                run_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                email TEXT NOT NULL,
                categories TEXT NOT NULL,        -- JSON array
                frequency TEXT NOT NULL,
                scheduled_for TEXT,              -- RFC 3339; NULL = run now
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cycles_user ON cycles(user_id, status);

            -- Per-step idempotence ledger, keyed by runId + step.
            CREATE TABLE IF NOT EXISTS step_ledger (
                run_id TEXT NOT NULL,
                step TEXT NOT NULL,
                output TEXT NOT NULL,            -- JSON
                completed_at TEXT NOT NULL,
                PRIMARY KEY (run_id, step)
            );

            -- Cancellation tokens, one per user, consumed on observation.
            CREATE TABLE IF NOT EXISTS cancellations (
                user_id TEXT PRIMARY KEY,
                requested_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| GazetteError::Database(format!("Migration: {e}")))?;
        Ok(())
    }

    // ─── Trigger queue ──────────────────────────────────────

    /// Queue a trigger as a pending cycle. Returns the assigned runId,
    /// or None when the user already has a live cycle (the engine never
    /// double-schedules).
    pub fn enqueue(&self, trigger: &CycleTrigger) -> Result<Option<String>> {
        if let Some(live) = self.live_job(&trigger.user_id)? {
            tracing::warn!(
                "Not queuing cycle for {}: {} already {}",
                trigger.user_id,
                live.run_id,
                live.status.as_str()
            );
            return Ok(None);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO cycles
                 (run_id, user_id, email, categories, frequency, scheduled_for,
                  status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?7)",
                rusqlite::params![
                    run_id,
                    trigger.user_id,
                    trigger.email,
                    serde_json::to_string(&trigger.categories).unwrap_or_else(|_| "[]".into()),
                    trigger.frequency.as_str(),
                    trigger.scheduled_for.map(|t| t.to_rfc3339()),
                    now,
                ],
            )
            .map_err(|e| GazetteError::Database(format!("Enqueue: {e}")))?;
        Ok(Some(run_id))
    }

    /// The user's pending or running cycle, if any.
    pub fn live_job(&self, user_id: &str) -> Result<Option<CycleJob>> {
        self.query_jobs(
            "SELECT * FROM cycles
             WHERE user_id = ?1 AND status IN ('pending', 'running')
             LIMIT 1",
            rusqlite::params![user_id],
        )
        .map(|mut jobs| jobs.pop())
    }

    /// Fetch one cycle by runId.
    pub fn get(&self, run_id: &str) -> Result<Option<CycleJob>> {
        self.query_jobs(
            "SELECT * FROM cycles WHERE run_id = ?1",
            rusqlite::params![run_id],
        )
        .map(|mut jobs| jobs.pop())
    }

    /// Atomically move due pending cycles to running and return them.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<CycleJob>> {
        let due = self.query_jobs(
            "SELECT * FROM cycles
             WHERE status = 'pending'
               AND (scheduled_for IS NULL OR scheduled_for <= ?1)
             ORDER BY created_at",
            rusqlite::params![now.to_rfc3339()],
        )?;

        let mut claimed = Vec::with_capacity(due.len());
        for mut job in due {
            self.conn
                .execute(
                    "UPDATE cycles SET status = 'running', updated_at = ?1 WHERE run_id = ?2",
                    rusqlite::params![Utc::now().to_rfc3339(), job.run_id],
                )
                .map_err(|e| GazetteError::Database(format!("Claim: {e}")))?;
            job.status = CycleStatus::Running;
            claimed.push(job);
        }
        Ok(claimed)
    }

    /// Record a terminal state.
    pub fn mark(&self, run_id: &str, status: CycleStatus, error: Option<&str>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cycles SET status = ?1, last_error = ?2, updated_at = ?3
                 WHERE run_id = ?4",
                rusqlite::params![status.as_str(), error, Utc::now().to_rfc3339(), run_id],
            )
            .map_err(|e| GazetteError::Database(format!("Mark {}: {e}", status.as_str())))?;
        Ok(())
    }

    /// Re-queue a running cycle after a retryable failure: same runId,
    /// attempts incremented, due again at `at`.
    pub fn requeue(&self, run_id: &str, at: DateTime<Utc>, error: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cycles
                 SET status = 'pending', attempts = attempts + 1,
                     scheduled_for = ?1, last_error = ?2, updated_at = ?3
                 WHERE run_id = ?4",
                rusqlite::params![at.to_rfc3339(), error, Utc::now().to_rfc3339(), run_id],
            )
            .map_err(|e| GazetteError::Database(format!("Requeue: {e}")))?;
        Ok(())
    }

    /// Cancel the user's pending cycle in place. Returns whether one
    /// existed — a cancelled pending cycle never executes.
    pub fn cancel_pending(&self, user_id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "UPDATE cycles SET status = 'cancelled', updated_at = ?1
                 WHERE user_id = ?2 AND status = 'pending'",
                rusqlite::params![Utc::now().to_rfc3339(), user_id],
            )
            .map_err(|e| GazetteError::Database(format!("Cancel pending: {e}")))?;
        Ok(n > 0)
    }

    /// Put orphaned running cycles (e.g. after a crash) back in the
    /// queue. The step ledger makes re-execution safe.
    pub fn recover_running(&self) -> Result<usize> {
        let n = self
            .conn
            .execute(
                "UPDATE cycles SET status = 'pending', updated_at = ?1
                 WHERE status = 'running'",
                rusqlite::params![Utc::now().to_rfc3339()],
            )
            .map_err(|e| GazetteError::Database(format!("Recover: {e}")))?;
        Ok(n)
    }

    /// Most recent cycles, newest first (operator status view).
    pub fn recent(&self, limit: usize) -> Result<Vec<CycleJob>> {
        self.query_jobs(
            "SELECT * FROM cycles ORDER BY updated_at DESC LIMIT ?1",
            rusqlite::params![limit as i64],
        )
    }

    fn query_jobs(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<CycleJob>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| GazetteError::Database(format!("Prepare: {e}")))?;

        let rows = stmt
            .query_map(params, |row| {
                let run_id: String = row.get("run_id")?;
                let user_id: String = row.get("user_id")?;
                let email: String = row.get("email")?;
                let categories_str: String = row.get("categories")?;
                let frequency_str: String = row.get("frequency")?;
                let scheduled_for_str: Option<String> = row.get("scheduled_for")?;
                let status_str: String = row.get("status")?;
                let attempts: u32 = row.get("attempts")?;
                let last_error: Option<String> = row.get("last_error")?;
                let created_at_str: String = row.get("created_at")?;
                let updated_at_str: String = row.get("updated_at")?;

                Ok(CycleJob {
                    run_id,
                    trigger: CycleTrigger {
                        user_id,
                        email,
                        categories: serde_json::from_str(&categories_str).unwrap_or_default(),
                        frequency: Frequency::parse(&frequency_str),
                        scheduled_for: scheduled_for_str
                            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                            .map(|d| d.with_timezone(&Utc)),
                    },
                    status: CycleStatus::parse(&status_str),
                    attempts,
                    last_error,
                    created_at: parse_utc(&created_at_str),
                    updated_at: parse_utc(&updated_at_str),
                })
            })
            .map_err(|e| GazetteError::Database(format!("Query: {e}")))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ─── Step ledger ──────────────────────────────────────

    /// Output of a completed step, if it already ran for this runId.
    pub fn step_output(&self, run_id: &str, step: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT output FROM step_ledger WHERE run_id = ?1 AND step = ?2",
                rusqlite::params![run_id, step],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(GazetteError::Database(format!("Ledger read: {other}"))),
            })
    }

    /// Mark a step complete. Only called after the step succeeded.
    pub fn record_step(&self, run_id: &str, step: &str, output: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO step_ledger (run_id, step, output, completed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![run_id, step, output, Utc::now().to_rfc3339()],
            )
            .map_err(|e| GazetteError::Database(format!("Ledger write: {e}")))?;
        Ok(())
    }

    /// Drop a cycle's ledger entries once it reaches a terminal state.
    pub fn clear_steps(&self, run_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM step_ledger WHERE run_id = ?1",
                rusqlite::params![run_id],
            )
            .map_err(|e| GazetteError::Database(format!("Ledger clear: {e}")))?;
        Ok(())
    }

    // ─── Cancellation tokens ──────────────────────────────────────

    /// Flag the user's in-flight cycle for cancellation.
    pub fn request_cancel(&self, user_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO cancellations (user_id, requested_at) VALUES (?1, ?2)",
                rusqlite::params![user_id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| GazetteError::Database(format!("Cancel request: {e}")))?;
        Ok(())
    }

    /// Consume the user's token. Returns whether one was present.
    pub fn consume_cancel(&self, user_id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM cancellations WHERE user_id = ?1",
                rusqlite::params![user_id],
            )
            .map_err(|e| GazetteError::Database(format!("Cancel consume: {e}")))?;
        Ok(n > 0)
    }

    /// Drop any stale token once the cycle it targeted is over.
    pub fn clear_cancel(&self, user_id: &str) -> Result<()> {
        self.consume_cancel(user_id).map(|_| ())
    }
}

fn parse_utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
