use std::sync::Arc;

use muster_core::ApplicationError;
use muster_db::repositories::{
    CheckInRepository, HolidayRepository, LeaveRepository, PromptRepository,
    ReminderLogRepository, RepositoryError, SettingsRepository, SqlCheckInRepository,
    SqlHolidayRepository, SqlLeaveRepository, SqlPromptRepository, SqlReminderLogRepository,
    SqlSettingsRepository, SqlUserRepository, UserRepository,
};
use muster_db::DbPool;
use muster_slack::api::ApiError;

/// Every repository the server touches, sharing one pool.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub check_ins: Arc<dyn CheckInRepository>,
    pub leave: Arc<dyn LeaveRepository>,
    pub holidays: Arc<dyn HolidayRepository>,
    pub prompts: Arc<dyn PromptRepository>,
    pub reminders: Arc<dyn ReminderLogRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Stores {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            check_ins: Arc::new(SqlCheckInRepository::new(pool.clone())),
            leave: Arc::new(SqlLeaveRepository::new(pool.clone())),
            holidays: Arc::new(SqlHolidayRepository::new(pool.clone())),
            prompts: Arc::new(SqlPromptRepository::new(pool.clone())),
            reminders: Arc::new(SqlReminderLogRepository::new(pool.clone())),
            settings: Arc::new(SqlSettingsRepository::new(pool)),
        }
    }
}

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

pub(crate) fn delivery(error: ApiError) -> ApplicationError {
    ApplicationError::Delivery(error.to_string())
}
