use chrono::NaiveDate;
use muster_core::calendar::month_bounds;
use muster_core::{ApplicationError, DomainError, Holiday, Leave, User, UserId};
use tracing::info;

use crate::stores::{persistence, Stores};

/// Company holidays and per-user leave: the dates reminders stay quiet on.
pub struct Registry {
    stores: Stores,
}

impl Registry {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Re-adding a date replaces its description.
    pub async fn add_holiday(
        &self,
        actor: &UserId,
        date: NaiveDate,
        description: &str,
    ) -> Result<Holiday, ApplicationError> {
        if !self.stores.users.is_admin(actor).await.map_err(persistence)? {
            return Err(DomainError::Authorization {
                user_id: actor.0.clone(),
                command: "/holiday".to_owned(),
            }
            .into());
        }

        let holiday = Holiday::new(date, description)?;
        self.stores.holidays.upsert(&holiday).await.map_err(persistence)?;
        info!(
            event_name = "registry.holiday.added",
            user_id = %actor,
            date = %date,
            "holiday registered"
        );
        Ok(holiday)
    }

    pub async fn add_leave(
        &self,
        user_id: &UserId,
        start: NaiveDate,
        end: NaiveDate,
        note: Option<String>,
    ) -> Result<Leave, ApplicationError> {
        let leave = Leave::new(user_id.clone(), start, end, note)?;
        self.stores.users.upsert(&User::new(user_id.clone(), "")).await.map_err(persistence)?;
        let leave = self.stores.leave.insert(leave).await.map_err(persistence)?;
        info!(
            event_name = "registry.leave.added",
            user_id = %user_id,
            start_date = %start,
            end_date = %end,
            "leave registered"
        );
        Ok(leave)
    }

    pub async fn leave_for_user(&self, user_id: &UserId) -> Result<Vec<Leave>, ApplicationError> {
        self.stores.leave.list_for_user(user_id).await.map_err(persistence)
    }

    pub async fn holidays_in_month(
        &self,
        month: NaiveDate,
    ) -> Result<Vec<Holiday>, ApplicationError> {
        let (first, last) = month_bounds(month);
        self.stores.holidays.list_between(first, last).await.map_err(persistence)
    }

    pub async fn leave_in_month(&self, month: NaiveDate) -> Result<Vec<Leave>, ApplicationError> {
        let (first, last) = month_bounds(month);
        self.stores.leave.list_overlapping(first, last).await.map_err(persistence)
    }
}
