use chrono::NaiveDate;
use sqlx::Row;

use muster_core::domain::check_in::{CheckIn, CheckInStatus};
use muster_core::domain::user::UserId;

use super::{
    date_to_sql, decode_err, parse_date_column, parse_timestamp_column, CheckInRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlCheckInRepository {
    pool: DbPool,
}

impl SqlCheckInRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_check_in(row: &sqlx::sqlite::SqliteRow) -> Result<CheckIn, RepositoryError> {
    let user_id: String = row.try_get("user_id").map_err(decode_err)?;
    let date: String = row.try_get("date").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let detail: Option<String> = row.try_get("detail").map_err(decode_err)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(decode_err)?;

    let status = status
        .parse::<CheckInStatus>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CheckIn {
        user_id: UserId(user_id),
        date: parse_date_column(&date)?,
        status,
        detail,
        recorded_at: parse_timestamp_column(&recorded_at),
    })
}

#[async_trait::async_trait]
impl CheckInRepository for SqlCheckInRepository {
    async fn upsert(&self, check_in: &CheckIn) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO check_ins (user_id, date, status, detail, recorded_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id, date) DO UPDATE SET
                 status = excluded.status,
                 detail = excluded.detail,
                 recorded_at = excluded.recorded_at",
        )
        .bind(&check_in.user_id.0)
        .bind(date_to_sql(check_in.date))
        .bind(check_in.status.as_str())
        .bind(&check_in.detail)
        .bind(check_in.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> Result<Option<CheckIn>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, date, status, detail, recorded_at
             FROM check_ins WHERE user_id = ? AND date = ?",
        )
        .bind(&user_id.0)
        .bind(date_to_sql(date))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_check_in).transpose()
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<CheckIn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, date, status, detail, recorded_at
             FROM check_ins WHERE date = ?
             ORDER BY recorded_at ASC, user_id ASC",
        )
        .bind(date_to_sql(date))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_check_in).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use muster_core::domain::check_in::{CheckIn, CheckInStatus};
    use muster_core::domain::user::{User, UserId};

    use super::SqlCheckInRepository;
    use crate::repositories::test_support::pool;
    use crate::repositories::{CheckInRepository, SqlUserRepository, UserRepository};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 2).expect("valid date")
    }

    #[tokio::test]
    async fn resubmission_overwrites_previous_status() {
        let pool = pool().await;
        let users = SqlUserRepository::new(pool.clone());
        let repo = SqlCheckInRepository::new(pool);
        let id = UserId::new("U1");
        users.upsert(&User::new(id.clone(), "one")).await.expect("user");

        repo.upsert(&CheckIn::new(id.clone(), day(), CheckInStatus::Normal, None))
            .await
            .expect("first");
        repo.upsert(&CheckIn::new(
            id.clone(),
            day(),
            CheckInStatus::Late,
            Some("dentist 9am".to_string()),
        ))
        .await
        .expect("second");

        let rows = repo.list_for_date(day()).await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, CheckInStatus::Late);
        assert_eq!(rows[0].detail.as_deref(), Some("dentist 9am"));
    }

    #[tokio::test]
    async fn find_is_scoped_to_date() {
        let pool = pool().await;
        let users = SqlUserRepository::new(pool.clone());
        let repo = SqlCheckInRepository::new(pool);
        let id = UserId::new("U2");
        users.upsert(&User::new(id.clone(), "two")).await.expect("user");

        repo.upsert(&CheckIn::new(id.clone(), day(), CheckInStatus::WorkingFromHome, None))
            .await
            .expect("save");

        let next = day().succ_opt().expect("next day");
        assert!(repo.find(&id, day()).await.expect("find").is_some());
        assert!(repo.find(&id, next).await.expect("find").is_none());
    }
}
