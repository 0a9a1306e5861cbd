use chrono::NaiveDate;
use sqlx::Row;

use muster_core::domain::holiday::Holiday;

use super::{date_to_sql, decode_err, parse_date_column, HolidayRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHolidayRepository {
    pool: DbPool,
}

impl SqlHolidayRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_holiday(row: &sqlx::sqlite::SqliteRow) -> Result<Holiday, RepositoryError> {
    let date: String = row.try_get("date").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    Ok(Holiday { date: parse_date_column(&date)?, description })
}

#[async_trait::async_trait]
impl HolidayRepository for SqlHolidayRepository {
    async fn upsert(&self, holiday: &Holiday) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO holidays (date, description) VALUES (?, ?)
             ON CONFLICT(date) DO UPDATE SET description = excluded.description",
        )
        .bind(date_to_sql(holiday.date))
        .bind(&holiday.description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, date: NaiveDate) -> Result<Option<Holiday>, RepositoryError> {
        let row = sqlx::query("SELECT date, description FROM holidays WHERE date = ?")
            .bind(date_to_sql(date))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_holiday).transpose()
    }

    async fn list_between(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<Holiday>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT date, description FROM holidays WHERE date >= ? AND date <= ? ORDER BY date ASC",
        )
        .bind(date_to_sql(first))
        .bind(date_to_sql(last))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_holiday).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use muster_core::domain::holiday::Holiday;

    use super::SqlHolidayRepository;
    use crate::repositories::test_support::pool;
    use crate::repositories::HolidayRepository;

    #[tokio::test]
    async fn re_adding_a_date_replaces_description() {
        let repo = SqlHolidayRepository::new(pool().await);
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).expect("date");

        repo.upsert(&Holiday::new(date, "Independence Day").expect("valid")).await.expect("add");
        repo.upsert(&Holiday::new(date, "Fourth of July").expect("valid")).await.expect("replace");

        let stored = repo.find(date).await.expect("find").expect("exists");
        assert_eq!(stored.description, "Fourth of July");

        let first = NaiveDate::from_ymd_opt(2024, 7, 1).expect("date");
        let last = NaiveDate::from_ymd_opt(2024, 7, 31).expect("date");
        assert_eq!(repo.list_between(first, last).await.expect("month").len(), 1);
    }
}
