use chrono::NaiveDate;
use sqlx::Row;

use muster_core::domain::leave::Leave;
use muster_core::domain::user::UserId;

use super::{
    date_to_sql, decode_err, parse_date_column, parse_timestamp_column, LeaveRepository,
    RepositoryError,
};
use crate::DbPool;

const LEAVE_COLUMNS: &str = "id, user_id, start_date, end_date, note, created_at";

pub struct SqlLeaveRepository {
    pool: DbPool,
}

impl SqlLeaveRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_leave(row: &sqlx::sqlite::SqliteRow) -> Result<Leave, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_err)?;
    let user_id: String = row.try_get("user_id").map_err(decode_err)?;
    let start_date: String = row.try_get("start_date").map_err(decode_err)?;
    let end_date: String = row.try_get("end_date").map_err(decode_err)?;
    let note: Option<String> = row.try_get("note").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Leave {
        id: Some(id),
        user_id: UserId(user_id),
        start_date: parse_date_column(&start_date)?,
        end_date: parse_date_column(&end_date)?,
        note,
        created_at: parse_timestamp_column(&created_at),
    })
}

#[async_trait::async_trait]
impl LeaveRepository for SqlLeaveRepository {
    async fn insert(&self, leave: Leave) -> Result<Leave, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO leave_entries (user_id, start_date, end_date, note, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&leave.user_id.0)
        .bind(date_to_sql(leave.start_date))
        .bind(date_to_sql(leave.end_date))
        .bind(&leave.note)
        .bind(leave.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Leave { id: Some(result.last_insert_rowid()), ..leave })
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Leave>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_entries WHERE user_id = ? ORDER BY start_date ASC"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_leave).collect()
    }

    async fn list_covering(&self, date: NaiveDate) -> Result<Vec<Leave>, RepositoryError> {
        let day = date_to_sql(date);
        let rows = sqlx::query(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_entries
             WHERE start_date <= ? AND end_date >= ?
             ORDER BY user_id ASC, start_date ASC"
        ))
        .bind(&day)
        .bind(&day)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_leave).collect()
    }

    async fn list_overlapping(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<Leave>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_entries
             WHERE start_date <= ? AND end_date >= ?
             ORDER BY start_date ASC, user_id ASC"
        ))
        .bind(date_to_sql(last))
        .bind(date_to_sql(first))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_leave).collect()
    }
}
