use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use muster_core::domain::check_in::CheckIn;
use muster_core::domain::holiday::Holiday;
use muster_core::domain::leave::Leave;
use muster_core::domain::user::{User, UserId};

pub mod check_in;
pub mod holiday;
pub mod leave;
pub mod prompt;
pub mod reminder_log;
pub mod settings;
pub mod user;

pub use check_in::SqlCheckInRepository;
pub use holiday::SqlHolidayRepository;
pub use leave::SqlLeaveRepository;
pub use prompt::{DailyPrompt, SqlPromptRepository};
pub use reminder_log::SqlReminderLogRepository;
pub use settings::SqlSettingsRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// Inserts or refreshes the display name. Never touches the admin flag.
    async fn upsert(&self, user: &User) -> Result<(), RepositoryError>;
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
    async fn set_admin(&self, id: &UserId, is_admin: bool) -> Result<(), RepositoryError>;
    async fn is_admin(&self, id: &UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CheckInRepository: Send + Sync {
    /// Last write wins for a (user, date) pair.
    async fn upsert(&self, check_in: &CheckIn) -> Result<(), RepositoryError>;
    async fn find(&self, user_id: &UserId, date: NaiveDate)
        -> Result<Option<CheckIn>, RepositoryError>;
    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<CheckIn>, RepositoryError>;
}

#[async_trait]
pub trait LeaveRepository: Send + Sync {
    async fn insert(&self, leave: Leave) -> Result<Leave, RepositoryError>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Leave>, RepositoryError>;
    async fn list_covering(&self, date: NaiveDate) -> Result<Vec<Leave>, RepositoryError>;
    async fn list_overlapping(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<Leave>, RepositoryError>;
}

#[async_trait]
pub trait HolidayRepository: Send + Sync {
    async fn upsert(&self, holiday: &Holiday) -> Result<(), RepositoryError>;
    async fn find(&self, date: NaiveDate) -> Result<Option<Holiday>, RepositoryError>;
    async fn list_between(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<Holiday>, RepositoryError>;
}

#[async_trait]
pub trait PromptRepository: Send + Sync {
    async fn find(&self, date: NaiveDate) -> Result<Option<DailyPrompt>, RepositoryError>;
    async fn save(&self, prompt: &DailyPrompt) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ReminderLogRepository: Send + Sync {
    async fn reminded_users(&self, date: NaiveDate) -> Result<Vec<UserId>, RepositoryError>;
    /// Returns `false` when the user already had a reminder logged for the date.
    async fn record(&self, user_id: &UserId, date: NaiveDate) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    /// Writes only the keys that are not stored yet.
    async fn seed(&self, defaults: &[(&str, &str)]) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<(String, String)>, RepositoryError>;
}

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date_column(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("invalid date `{value}`: {e}")))
}

pub(crate) fn parse_timestamp_column(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
