//! Slack-facing operations: slash commands, button clicks and modal submissions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use muster_core::calendar::{format_time_of_day, month_bounds, parse_date};
use muster_core::{ApplicationError, CheckInStatus, DomainError, ScheduleTimes, SettingKey, UserId};
use muster_slack::api::SlackApi;
use muster_slack::blocks::{self, MessageTemplate};
use muster_slack::commands::{CommandEnvelope, MusterCommandService, TimeOffRequest};
use muster_slack::events::{
    BlockActionEvent, BlockActionService, EventContext, ViewSubmissionEvent,
    ViewSubmissionService,
};
use tracing::{info, warn};

use crate::registry::Registry;
use crate::scheduler::load_schedule;
use crate::stores::{delivery, persistence, Stores};
use crate::workflow::{CheckInWorkflow, PostOutcome};

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Clone)]
pub struct MusterServices {
    api: Arc<dyn SlackApi>,
    stores: Stores,
    workflow: Arc<CheckInWorkflow>,
    registry: Arc<Registry>,
    defaults: ScheduleTimes,
    today: fn() -> NaiveDate,
}

impl MusterServices {
    pub fn new(
        api: Arc<dyn SlackApi>,
        stores: Stores,
        workflow: Arc<CheckInWorkflow>,
        registry: Arc<Registry>,
        defaults: ScheduleTimes,
    ) -> Self {
        Self { api, stores, workflow, registry, defaults, today: local_today }
    }

    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn today(&self) -> NaiveDate {
        (self.today)()
    }

    async fn record_leave(
        &self,
        user_id: &UserId,
        start: NaiveDate,
        end: NaiveDate,
        note: Option<String>,
    ) -> Result<MessageTemplate, ApplicationError> {
        let leave = self.registry.add_leave(user_id, start, end, note).await?;
        Ok(blocks::confirmation_message(&format!(
            "Got it! Your leave from {} to {} has been recorded.",
            leave.start_date, leave.end_date
        )))
    }
}

fn forced_reply(text: &str, outcome: &PostOutcome) -> MessageTemplate {
    match outcome {
        PostOutcome::Posted { .. } => blocks::confirmation_message(text),
        PostOutcome::AlreadyPosted { .. } | PostOutcome::Skipped(_) => {
            blocks::confirmation_message(&format!("{text} (nothing new to post)"))
        }
    }
}

#[async_trait]
impl MusterCommandService for MusterServices {
    async fn is_admin(&self, user_id: &UserId) -> Result<bool, ApplicationError> {
        self.stores.users.is_admin(user_id).await.map_err(persistence)
    }

    async fn time_off(
        &self,
        request: TimeOffRequest,
        envelope: &CommandEnvelope,
    ) -> Result<Option<MessageTemplate>, ApplicationError> {
        match request {
            TimeOffRequest::OpenForm => {
                self.api
                    .open_view(&envelope.trigger_id, &blocks::leave_modal(self.today()))
                    .await
                    .map_err(delivery)?;
                Ok(None)
            }
            TimeOffRequest::Direct { start, end, note } => {
                self.record_leave(&envelope.user_id, start, end, note).await.map(Some)
            }
        }
    }

    async fn calendar(
        &self,
        month: Option<NaiveDate>,
        _envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let (first, _) = month_bounds(month.unwrap_or_else(|| self.today()));
        let holidays = self.registry.holidays_in_month(first).await?;
        let leave = self.registry.leave_in_month(first).await?;
        Ok(blocks::calendar_message(first, &holidays, &leave))
    }

    async fn status(
        &self,
        user_id: Option<UserId>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let target = user_id.unwrap_or_else(|| envelope.user_id.clone());
        let today = self.today();
        let check_in = self.stores.check_ins.find(&target, today).await.map_err(persistence)?;
        if check_in.is_none() {
            let leave = self.registry.leave_for_user(&target).await?;
            if let Some(entry) = leave.iter().find(|entry| entry.covers(today)) {
                return Ok(blocks::confirmation_message(&format!(
                    "{} is on leave until {}.",
                    target.mention(),
                    entry.end_date
                )));
            }
        }
        Ok(blocks::status_message(&target, today, check_in.as_ref()))
    }

    async fn add_holiday(
        &self,
        date: NaiveDate,
        description: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let holiday = self.registry.add_holiday(&envelope.user_id, date, &description).await?;
        Ok(blocks::confirmation_message(&format!(
            ":tada: Holiday '{}' on {} has been added.",
            holiday.description, holiday.date
        )))
    }

    async fn post_check_in(
        &self,
        _envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let outcome = self.workflow.post_daily_check_in(self.today(), true).await?;
        Ok(forced_reply("Forcing the daily check-in post now...", &outcome))
    }

    async fn post_reminders(
        &self,
        _envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let report = self.workflow.send_reminders(self.today(), true).await?;
        Ok(blocks::confirmation_message(&format!(
            "Forcing reminders now... sent {}, failed {}, skipped {}.",
            report.sent, report.failed, report.skipped
        )))
    }

    async fn post_summary(
        &self,
        _envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let outcome = self.workflow.post_summary(self.today(), true).await?;
        Ok(forced_reply("Forcing the daily summary post now...", &outcome))
    }

    async fn add_admin(
        &self,
        user_id: UserId,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        self.stores.users.set_admin(&user_id, true).await.map_err(persistence)?;
        info!(
            event_name = "admin.granted",
            user_id = %user_id,
            granted_by = %envelope.user_id,
            "admin flag granted"
        );
        Ok(blocks::confirmation_message(&format!("{} is now an admin.", user_id.mention())))
    }

    async fn edit_status(
        &self,
        user_id: UserId,
        status: CheckInStatus,
        detail: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        let check_in =
            self.workflow.record_response(&user_id, self.today(), status, detail).await?;
        info!(
            event_name = "admin.status_edited",
            user_id = %user_id,
            edited_by = %envelope.user_id,
            status = status.as_str(),
            "check-in edited by admin"
        );
        Ok(blocks::confirmation_message(&format!("Updated: {}", check_in.summary_line())))
    }

    async fn configure(
        &self,
        key: Option<SettingKey>,
        value: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError> {
        match (key, value) {
            (Some(key), Some(value)) => {
                let current = load_schedule(self.stores.settings.as_ref(), &self.defaults).await?;
                let updated = current.with(key, &value)?;
                let stored = format_time_of_day(updated.get(key));
                self.stores.settings.set(key.as_str(), &stored).await.map_err(persistence)?;
                info!(
                    event_name = "admin.setting_changed",
                    user_id = %envelope.user_id,
                    key = key.as_str(),
                    value = %stored,
                    "schedule setting updated"
                );
                Ok(blocks::confirmation_message(&format!(
                    "`{}` set to {stored}. It applies from the next scheduler cycle.",
                    key.as_str()
                )))
            }
            (Some(key), None) => {
                let current = load_schedule(self.stores.settings.as_ref(), &self.defaults).await?;
                Ok(blocks::settings_message(&[(
                    key.as_str().to_owned(),
                    format_time_of_day(current.get(key)),
                )]))
            }
            (None, _) => {
                let current = load_schedule(self.stores.settings.as_ref(), &self.defaults).await?;
                let settings = SettingKey::ALL
                    .into_iter()
                    .map(|key| (key.as_str().to_owned(), format_time_of_day(current.get(key))))
                    .collect::<Vec<_>>();
                Ok(blocks::settings_message(&settings))
            }
        }
    }
}

#[async_trait]
impl BlockActionService for MusterServices {
    async fn handle_block_action(
        &self,
        event: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, ApplicationError> {
        let Some(user_id) = event.user_id.as_deref() else {
            warn!(correlation_id = %ctx.correlation_id, "block action without user; dropped");
            return Ok(None);
        };
        let Some(status) = blocks::status_from_action_id(&event.action_id) else {
            warn!(
                correlation_id = %ctx.correlation_id,
                action_id = %event.action_id,
                "unknown block action; dropped"
            );
            return Ok(None);
        };
        let today = self.today();

        if status.requires_detail() {
            let Some(trigger_id) = event.trigger_id.as_deref() else {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    action_id = %event.action_id,
                    "detail status clicked without trigger id; dropped"
                );
                return Ok(None);
            };
            self.api
                .open_view(trigger_id, &blocks::detail_modal(status, today))
                .await
                .map_err(delivery)?;
            return Ok(None);
        }

        self.workflow.record_response(&UserId::new(user_id), today, status, None).await?;
        Ok(None)
    }
}

#[async_trait]
impl ViewSubmissionService for MusterServices {
    async fn handle_view_submission(
        &self,
        event: &ViewSubmissionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, ApplicationError> {
        let Some(user_id) = event.user_id.as_deref().map(UserId::new) else {
            warn!(correlation_id = %ctx.correlation_id, "view submission without user; dropped");
            return Ok(None);
        };

        if event.callback_id == blocks::LEAVE_MODAL_CALLBACK_ID {
            let (Some(start), Some(end)) = (
                event.value(blocks::LEAVE_START_ACTION_ID),
                event.value(blocks::LEAVE_END_ACTION_ID),
            ) else {
                return Err(DomainError::Validation(
                    "Please pick both a start and an end date.".to_owned(),
                )
                .into());
            };
            let note = event.value(blocks::LEAVE_NOTE_ACTION_ID).map(str::to_owned);
            let reply = self.record_leave(&user_id, parse_date(start)?, parse_date(end)?, note).await?;
            return Ok(Some(reply));
        }

        let Some(status) = blocks::status_from_modal_callback_id(&event.callback_id) else {
            warn!(
                correlation_id = %ctx.correlation_id,
                callback_id = %event.callback_id,
                "unknown modal submission; dropped"
            );
            return Ok(None);
        };
        let Some(detail) = event.value(blocks::CHECK_IN_DETAIL_ACTION_ID) else {
            warn!(
                correlation_id = %ctx.correlation_id,
                user_id = %user_id,
                status = status.as_str(),
                "check-in modal submitted without detail; dropped"
            );
            return Ok(None);
        };
        let date = match event.private_metadata.as_deref().map(parse_date) {
            Some(Ok(date)) => date,
            _ => self.today(),
        };

        self.workflow.record_response(&user_id, date, status, Some(detail.to_owned())).await?;
        Ok(None)
    }
}
