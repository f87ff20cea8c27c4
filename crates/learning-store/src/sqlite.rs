//! SQLite-backed pattern store so rankings survive restarts and can be
//! shared across worker processes.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use formpilot_core_types::ActionKind;

use crate::api::{LearningError, LearningStore};
use crate::model::{RankedSelector, StrategyPattern};

pub struct SqliteLearningStore {
    conn: Connection,
}

impl SqliteLearningStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LearningError> {
        let conn = Connection::open(path.as_ref().to_path_buf())
            .await
            .map_err(LearningError::persistence)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, LearningError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(LearningError::persistence)?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), LearningError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS strategy_patterns (
                        element_type TEXT NOT NULL,
                        action TEXT NOT NULL,
                        selectors TEXT NOT NULL,
                        updated_at TEXT NOT NULL,
                        PRIMARY KEY (element_type, action)
                    );",
                )?;
                Ok(())
            })
            .await
            .map_err(LearningError::persistence)
    }
}

fn row_to_pattern(
    element_type: String,
    action_raw: String,
    selectors_raw: String,
    updated_raw: String,
) -> Result<StrategyPattern, LearningError> {
    let action = ActionKind::parse(&action_raw)
        .ok_or_else(|| LearningError::Persistence(format!("unknown action: {action_raw}")))?;
    let selectors: Vec<RankedSelector> =
        serde_json::from_str(&selectors_raw).map_err(LearningError::persistence)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(LearningError::persistence)?;
    Ok(StrategyPattern {
        element_type,
        action,
        selectors,
        updated_at,
    })
}

#[async_trait]
impl LearningStore for SqliteLearningStore {
    async fn patterns_for(
        &self,
        element_type: &str,
        action: ActionKind,
    ) -> Result<Option<StrategyPattern>, LearningError> {
        let element_type = element_type.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT element_type, action, selectors, updated_at
                         FROM strategy_patterns WHERE element_type = ?1 AND action = ?2",
                        params![element_type, action.as_str()],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(LearningError::persistence)?;

        row.map(|(etype, action, selectors, updated)| {
            row_to_pattern(etype, action, selectors, updated)
        })
        .transpose()
    }

    async fn replace(&self, pattern: StrategyPattern) -> Result<(), LearningError> {
        let selectors =
            serde_json::to_string(&pattern.selectors).map_err(LearningError::persistence)?;
        let updated = pattern
            .updated_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO strategy_patterns
                        (element_type, action, selectors, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        pattern.element_type,
                        pattern.action.as_str(),
                        selectors,
                        updated
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(LearningError::persistence)
    }

    async fn all_patterns(&self) -> Result<Vec<StrategyPattern>, LearningError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT element_type, action, selectors, updated_at FROM strategy_patterns",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(LearningError::persistence)?;

        rows.into_iter()
            .map(|(etype, action, selectors, updated)| {
                row_to_pattern(etype, action, selectors, updated)
            })
            .collect()
    }
}
