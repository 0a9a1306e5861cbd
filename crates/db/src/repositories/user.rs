use sqlx::Row;

use muster_core::domain::user::{User, UserId};

use super::{decode_err, parse_timestamp_column, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let display_name: String = row.try_get("display_name").map_err(decode_err)?;
    let is_admin: i64 = row.try_get("is_admin").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(User {
        id: UserId(id),
        display_name,
        is_admin: is_admin != 0,
        created_at: parse_timestamp_column(&created_at),
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, is_admin, created_at FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn upsert(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, is_admin, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = CASE
                     WHEN excluded.display_name <> '' THEN excluded.display_name
                     ELSE users.display_name
                 END",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(i64::from(user.is_admin))
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, display_name, is_admin, created_at FROM users ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn set_admin(&self, id: &UserId, is_admin: bool) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, is_admin, created_at)
             VALUES (?, '', ?, ?)
             ON CONFLICT(id) DO UPDATE SET is_admin = excluded.is_admin",
        )
        .bind(&id.0)
        .bind(i64::from(is_admin))
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_admin(&self, id: &UserId) -> Result<bool, RepositoryError> {
        let flag: Option<i64> = sqlx::query_scalar("SELECT is_admin FROM users WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(flag.unwrap_or(0) != 0)
    }
}
