use chrono::{NaiveDate, Utc};

use muster_core::domain::user::UserId;

use super::{date_to_sql, ReminderLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlReminderLogRepository {
    pool: DbPool,
}

impl SqlReminderLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReminderLogRepository for SqlReminderLogRepository {
    async fn reminded_users(&self, date: NaiveDate) -> Result<Vec<UserId>, RepositoryError> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT user_id FROM reminder_log WHERE date = ? ORDER BY user_id")
                .bind(date_to_sql(date))
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(UserId).collect())
    }

    async fn record(&self, user_id: &UserId, date: NaiveDate) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO reminder_log (user_id, date, sent_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, date) DO NOTHING",
        )
        .bind(&user_id.0)
        .bind(date_to_sql(date))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
