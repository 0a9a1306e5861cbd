use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use super::{
    date_to_sql, decode_err, parse_date_column, parse_timestamp_column, PromptRepository,
    RepositoryError,
};
use crate::DbPool;

/// The morning message for a day; its ts is the thread parent for confirmations and the summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailyPrompt {
    pub date: NaiveDate,
    pub channel_id: String,
    pub message_ts: String,
    pub posted_at: DateTime<Utc>,
}

pub struct SqlPromptRepository {
    pool: DbPool,
}

impl SqlPromptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PromptRepository for SqlPromptRepository {
    async fn find(&self, date: NaiveDate) -> Result<Option<DailyPrompt>, RepositoryError> {
        let row = sqlx::query(
            "SELECT date, channel_id, message_ts, posted_at FROM daily_prompt WHERE date = ?",
        )
        .bind(date_to_sql(date))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let date: String = row.try_get("date").map_err(decode_err)?;
        let posted_at: String = row.try_get("posted_at").map_err(decode_err)?;
        Ok(Some(DailyPrompt {
            date: parse_date_column(&date)?,
            channel_id: row.try_get("channel_id").map_err(decode_err)?,
            message_ts: row.try_get("message_ts").map_err(decode_err)?,
            posted_at: parse_timestamp_column(&posted_at),
        }))
    }

    async fn save(&self, prompt: &DailyPrompt) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO daily_prompt (date, channel_id, message_ts, posted_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(date) DO UPDATE SET
                 channel_id = excluded.channel_id,
                 message_ts = excluded.message_ts,
                 posted_at = excluded.posted_at",
        )
        .bind(date_to_sql(prompt.date))
        .bind(&prompt.channel_id)
        .bind(&prompt.message_ts)
        .bind(prompt.posted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
