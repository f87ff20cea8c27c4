//! SQLite-backed store.
//!
//! State transitions are single-row compare-and-updates against the one
//! legal predecessor state, which is what makes worker claims atomic across
//! processes sharing the database file.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tokio_rusqlite::Connection;
use tracing::debug;

use formpilot_core_types::{
    ActionKind, Interaction, Job, JobId, JobMetrics, JobSpec, JobState, StrategyKind,
};

use crate::api::{JobStore, RecoveryOutcome, StateUpdate};
use crate::errors::StoreError;

pub struct SqliteJobStore {
    conn: Connection,
}

enum TransitionRaw {
    Updated(Job),
    Conflict(Option<String>),
}

enum RecoverRaw {
    Missing,
    WrongState(String),
    Requeued(u32),
    Abandoned,
}

impl SqliteJobStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref().to_path_buf())
            .await
            .map_err(StoreError::persistence)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(StoreError::persistence)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS jobs (
                        id TEXT PRIMARY KEY,
                        state TEXT NOT NULL,
                        url TEXT NOT NULL,
                        fields TEXT NOT NULL,
                        files TEXT NOT NULL,
                        config TEXT NOT NULL,
                        result TEXT,
                        error_message TEXT,
                        requeue_count INTEGER NOT NULL DEFAULT 0,
                        created_at TEXT NOT NULL,
                        started_at TEXT,
                        completed_at TEXT
                    );
                    CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
                    CREATE TABLE IF NOT EXISTS interactions (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        job_id TEXT NOT NULL REFERENCES jobs(id),
                        action TEXT NOT NULL,
                        selector TEXT NOT NULL,
                        element_type TEXT NOT NULL,
                        success INTEGER NOT NULL,
                        error_message TEXT,
                        strategy TEXT,
                        elapsed_ms INTEGER NOT NULL,
                        created_at TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_interactions_job
                        ON interactions(job_id);
                    CREATE INDEX IF NOT EXISTS idx_interactions_created
                        ON interactions(created_at);",
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::persistence)?;
        debug!("job store schema ready");
        Ok(())
    }
}

fn ts(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_enum<T>(idx: usize, raw: &str, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown value: {raw}").into(),
        )
    })
}

const JOB_COLUMNS: &str = "id, state, url, fields, files, config, result, error_message, \
                           requeue_count, created_at, started_at, completed_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let state_raw: String = row.get(1)?;
    let fields_raw: String = row.get(3)?;
    let files_raw: String = row.get(4)?;
    let config_raw: String = row.get(5)?;
    let result_raw: Option<String> = row.get(6)?;
    let created_raw: String = row.get(9)?;
    let started_raw: Option<String> = row.get(10)?;
    let completed_raw: Option<String> = row.get(11)?;

    Ok(Job {
        id: JobId(row.get(0)?),
        state: parse_enum(1, &state_raw, JobState::parse)?,
        url: row.get(2)?,
        fields: parse_json(3, &fields_raw)?,
        files: parse_json(4, &files_raw)?,
        config: parse_json(5, &config_raw)?,
        result: result_raw.as_deref().map(|r| parse_json(6, r)).transpose()?,
        error_message: row.get(7)?,
        requeue_count: row.get(8)?,
        created_at: parse_ts(9, created_raw)?,
        started_at: started_raw.map(|t| parse_ts(10, t)).transpose()?,
        completed_at: completed_raw.map(|t| parse_ts(11, t)).transpose()?,
    })
}

fn interaction_from_row(row: &Row<'_>) -> rusqlite::Result<Interaction> {
    let action_raw: String = row.get(1)?;
    let strategy_raw: Option<String> = row.get(6)?;
    let created_raw: String = row.get(8)?;

    Ok(Interaction {
        job_id: JobId(row.get(0)?),
        action: parse_enum(1, &action_raw, ActionKind::parse)?,
        selector: row.get(2)?,
        element_type: row.get(3)?,
        success: row.get(4)?,
        error: row.get(5)?,
        strategy: strategy_raw
            .as_deref()
            .map(|s| parse_enum(6, s, StrategyKind::parse))
            .transpose()?,
        elapsed_ms: row.get::<_, i64>(7)? as u64,
        created_at: parse_ts(8, created_raw)?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, spec: JobSpec) -> Result<JobId, StoreError> {
        let job = Job::from_spec(spec);
        let id = job.id.clone();
        let fields = serde_json::to_string(&job.fields).map_err(StoreError::persistence)?;
        let files = serde_json::to_string(&job.files).map_err(StoreError::persistence)?;
        let config = serde_json::to_string(&job.config).map_err(StoreError::persistence)?;
        let id_raw = job.id.0.clone();
        let url = job.url.clone();
        let created = ts(job.created_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (id, state, url, fields, files, config, requeue_count, created_at)
                     VALUES (?1, 'pending', ?2, ?3, ?4, ?5, 0, ?6)",
                    params![id_raw, url, fields, files, config, created],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::persistence)?;
        Ok(id)
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        let id_raw = id.0.clone();
        let job = self
            .conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                        [&id_raw],
                        job_from_row,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
            .map_err(StoreError::persistence)?;
        job.ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn transition(
        &self,
        id: &JobId,
        to: JobState,
        update: StateUpdate,
    ) -> Result<Job, StoreError> {
        let Some(from) = JobState::required_predecessor(to) else {
            let job = self.get(id).await?;
            return Err(StoreError::InvalidTransition {
                job: id.clone(),
                from: job.state,
                to,
            });
        };

        let result_json = update
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::persistence)?;
        let error_message = update.error_message;
        let now = ts(Utc::now());
        let (started_at, completed_at) = match to {
            JobState::Running => (Some(now.clone()), None),
            JobState::Completed | JobState::Failed => (None, Some(now.clone())),
            JobState::Pending => (None, None),
        };
        let id_raw = id.0.clone();

        let raw = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE jobs SET state = ?1,
                            error_message = COALESCE(?2, error_message),
                            result = COALESCE(?3, result),
                            started_at = COALESCE(?4, started_at),
                            completed_at = COALESCE(?5, completed_at)
                     WHERE id = ?6 AND state = ?7",
                    params![
                        to.as_str(),
                        error_message,
                        result_json,
                        started_at,
                        completed_at,
                        id_raw,
                        from.as_str()
                    ],
                )?;
                if changed == 0 {
                    let current: Option<String> = conn
                        .query_row("SELECT state FROM jobs WHERE id = ?1", [&id_raw], |row| {
                            row.get(0)
                        })
                        .optional()?;
                    return Ok(TransitionRaw::Conflict(current));
                }
                let job = conn.query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                    [&id_raw],
                    job_from_row,
                )?;
                Ok(TransitionRaw::Updated(job))
            })
            .await
            .map_err(StoreError::persistence)?;

        match raw {
            TransitionRaw::Updated(job) => Ok(job),
            TransitionRaw::Conflict(None) => Err(StoreError::NotFound(id.clone())),
            TransitionRaw::Conflict(Some(state)) => Err(StoreError::InvalidTransition {
                job: id.clone(),
                from: JobState::parse(&state).unwrap_or(JobState::Failed),
                to,
            }),
        }
    }

    async fn recover(&self, id: &JobId, max_requeues: u32) -> Result<RecoveryOutcome, StoreError> {
        let id_raw = id.0.clone();
        let now = ts(Utc::now());

        let raw = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let row: Option<(String, u32)> = tx
                    .query_row(
                        "SELECT state, requeue_count FROM jobs WHERE id = ?1",
                        [&id_raw],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let outcome = match row {
                    None => RecoverRaw::Missing,
                    Some((state, _)) if state != "running" => RecoverRaw::WrongState(state),
                    Some((_, count)) if count >= max_requeues => {
                        tx.execute(
                            "UPDATE jobs SET state = 'failed', completed_at = ?1,
                                    error_message = ?2
                             WHERE id = ?3",
                            params![
                                now,
                                format!("abandoned after {count} crash-recovery requeues"),
                                id_raw
                            ],
                        )?;
                        RecoverRaw::Abandoned
                    }
                    Some((_, count)) => {
                        tx.execute(
                            "UPDATE jobs SET state = 'pending', started_at = NULL,
                                    requeue_count = ?1
                             WHERE id = ?2",
                            params![count + 1, id_raw],
                        )?;
                        RecoverRaw::Requeued(count + 1)
                    }
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await
            .map_err(StoreError::persistence)?;

        match raw {
            RecoverRaw::Missing => Err(StoreError::NotFound(id.clone())),
            RecoverRaw::WrongState(state) => Err(StoreError::InvalidTransition {
                job: id.clone(),
                from: JobState::parse(&state).unwrap_or(JobState::Failed),
                to: JobState::Pending,
            }),
            RecoverRaw::Requeued(count) => Ok(RecoveryOutcome::Requeued(count)),
            RecoverRaw::Abandoned => Ok(RecoveryOutcome::Abandoned),
        }
    }

    async fn append_interaction(&self, interaction: Interaction) -> Result<(), StoreError> {
        let job_id = interaction.job_id.clone();
        let job_raw = interaction.job_id.0.clone();
        let created = ts(interaction.created_at);

        let exists = self
            .conn
            .call(move |conn| {
                let exists: Option<i64> = conn
                    .query_row("SELECT 1 FROM jobs WHERE id = ?1", [&job_raw], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if exists.is_none() {
                    return Ok(false);
                }
                conn.execute(
                    "INSERT INTO interactions
                        (job_id, action, selector, element_type, success,
                         error_message, strategy, elapsed_ms, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        job_raw,
                        interaction.action.as_str(),
                        interaction.selector,
                        interaction.element_type,
                        interaction.success,
                        interaction.error,
                        interaction.strategy.map(|s| s.name()),
                        interaction.elapsed_ms as i64,
                        created
                    ],
                )?;
                Ok(true)
            })
            .await
            .map_err(StoreError::persistence)?;

        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound(job_id))
        }
    }

    async fn interactions_for(&self, id: &JobId) -> Result<Vec<Interaction>, StoreError> {
        let id_raw = id.0.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT job_id, action, selector, element_type, success,
                            error_message, strategy, elapsed_ms, created_at
                     FROM interactions WHERE job_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([&id_raw], interaction_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(StoreError::persistence)
    }

    async fn recent_interactions(&self, window: Duration) -> Result<Vec<Interaction>, StoreError> {
        let cutoff = ts(crate::memory::window_cutoff(window));
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT job_id, action, selector, element_type, success,
                            error_message, strategy, elapsed_ms, created_at
                     FROM interactions WHERE created_at > ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([&cutoff], interaction_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(StoreError::persistence)
    }

    async fn jobs_in_state(&self, state: JobState) -> Result<Vec<JobId>, StoreError> {
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id FROM jobs WHERE state = ?1 ORDER BY created_at")?;
                let rows = stmt
                    .query_map([state.as_str()], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows.into_iter().map(JobId).collect())
            })
            .await
            .map_err(StoreError::persistence)
    }

    async fn aggregate_metrics(&self, window: Duration) -> Result<JobMetrics, StoreError> {
        let cutoff = ts(crate::memory::window_cutoff(window));
        self.conn
            .call(move |conn| {
                let metrics = conn.query_row(
                    "SELECT COUNT(*),
                            SUM(CASE WHEN state = 'completed' THEN 1 ELSE 0 END),
                            SUM(CASE WHEN state = 'failed' THEN 1 ELSE 0 END),
                            AVG(CASE WHEN started_at IS NOT NULL AND completed_at IS NOT NULL
                                THEN (julianday(completed_at) - julianday(started_at)) * 86400000.0
                                END)
                     FROM jobs WHERE created_at > ?1",
                    [&cutoff],
                    |row| {
                        Ok(JobMetrics {
                            total: row.get::<_, i64>(0)? as u64,
                            succeeded: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64,
                            failed: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                            avg_duration_ms: row.get(3)?,
                        })
                    },
                )?;
                Ok(metrics)
            })
            .await
            .map_err(StoreError::persistence)
    }
}
