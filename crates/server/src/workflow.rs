//! The daily check-in cycle: morning prompt, responses, reminders, summary.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use muster_core::calendar::is_weekend;
use muster_core::{
    reminder_decision, ApplicationError, CheckIn, CheckInStatus, DayEvent, DayState, Leave,
    ReminderDecision, SkipReason, User, UserId,
};
use muster_db::repositories::DailyPrompt;
use muster_slack::api::{PostMessage, SlackApi};
use muster_slack::blocks;
use tracing::{debug, error, info, warn};

use crate::stores::{delivery, persistence, Stores};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    Posted { ts: String },
    AlreadyPosted { ts: String },
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct CheckInWorkflow {
    api: Arc<dyn SlackApi>,
    stores: Stores,
    channel_id: String,
    reporting_user_id: Option<String>,
}

impl CheckInWorkflow {
    pub fn new(
        api: Arc<dyn SlackApi>,
        stores: Stores,
        channel_id: impl Into<String>,
        reporting_user_id: Option<String>,
    ) -> Self {
        Self { api, stores, channel_id: channel_id.into(), reporting_user_id }
    }

    /// Posts the status buttons to the channel, at most once per day unless forced.
    pub async fn post_daily_check_in(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<PostOutcome, ApplicationError> {
        if !force {
            if let Some(reason) = self.off_day(date).await? {
                info!(
                    event_name = "workflow.check_in.skipped",
                    date = %date,
                    reason = reason.as_str(),
                    "not posting check-in prompt"
                );
                return Ok(PostOutcome::Skipped(reason));
            }
            if let Some(prompt) = self.stores.prompts.find(date).await.map_err(persistence)? {
                info!(
                    event_name = "workflow.check_in.already_posted",
                    date = %date,
                    message_ts = %prompt.message_ts,
                    "check-in prompt already posted today"
                );
                return Ok(PostOutcome::AlreadyPosted { ts: prompt.message_ts });
            }
        }

        let ts = self
            .api
            .post_message(PostMessage::new(&self.channel_id, blocks::daily_prompt_message(date)))
            .await
            .map_err(delivery)?;
        self.stores
            .prompts
            .save(&DailyPrompt {
                date,
                channel_id: self.channel_id.clone(),
                message_ts: ts.clone(),
                posted_at: Utc::now(),
            })
            .await
            .map_err(persistence)?;

        info!(
            event_name = "workflow.check_in.posted",
            date = %date,
            forced = force,
            message_ts = %ts,
            "check-in prompt posted"
        );
        Ok(PostOutcome::Posted { ts })
    }

    /// Stores a user's status for the day and confirms it in the prompt thread.
    ///
    /// A re-submission overwrites the earlier status. The stored check-in stands
    /// even when the confirmation cannot be delivered.
    pub async fn record_response(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        status: CheckInStatus,
        detail: Option<String>,
    ) -> Result<CheckIn, ApplicationError> {
        self.stores.users.upsert(&User::new(user_id.clone(), "")).await.map_err(persistence)?;

        let previous = self.stores.check_ins.find(user_id, date).await.map_err(persistence)?;
        let reminded = self
            .stores
            .reminders
            .reminded_users(date)
            .await
            .map_err(persistence)?
            .contains(user_id);
        let prior = DayState::from_records(previous.is_some(), reminded);
        prior.apply(DayEvent::ResponseRecorded)?;

        let check_in = CheckIn::new(user_id.clone(), date, status, detail);
        self.stores.check_ins.upsert(&check_in).await.map_err(persistence)?;
        info!(
            event_name = "workflow.check_in.recorded",
            user_id = %user_id,
            date = %date,
            status = status.as_str(),
            prior_state = ?prior,
            resubmitted = previous.is_some(),
            "check-in recorded"
        );

        let prompt = self.stores.prompts.find(date).await.map_err(persistence)?;
        let (channel, thread_ts) = match prompt {
            Some(prompt) => (prompt.channel_id, Some(prompt.message_ts)),
            None => (self.channel_id.clone(), None),
        };
        let confirmation =
            PostMessage::new(channel, blocks::check_in_confirmation_message(&check_in))
                .in_thread(thread_ts);
        if let Err(error) = self.api.post_message(confirmation).await {
            warn!(
                event_name = "workflow.check_in.confirmation_failed",
                user_id = %user_id,
                date = %date,
                error = %error,
                "check-in stored but confirmation was not delivered"
            );
        }

        Ok(check_in)
    }

    /// Posts the day's summary under the prompt and copies it to the reporting user.
    pub async fn post_summary(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<PostOutcome, ApplicationError> {
        if !force {
            if let Some(reason) = self.off_day(date).await? {
                info!(
                    event_name = "workflow.summary.skipped",
                    date = %date,
                    reason = reason.as_str(),
                    "not posting summary"
                );
                return Ok(PostOutcome::Skipped(reason));
            }
        }

        let check_ins = self.stores.check_ins.list_for_date(date).await.map_err(persistence)?;
        let message = blocks::summary_message(date, &check_ins);
        let prompt = self.stores.prompts.find(date).await.map_err(persistence)?;
        let (channel, thread_ts) = match prompt {
            Some(prompt) => (prompt.channel_id, Some(prompt.message_ts)),
            None => (self.channel_id.clone(), None),
        };

        let ts = self
            .api
            .post_message(PostMessage::new(channel, message.clone()).in_thread(thread_ts))
            .await
            .map_err(delivery)?;
        info!(
            event_name = "workflow.summary.posted",
            date = %date,
            responses = check_ins.len(),
            "daily summary posted"
        );

        if let Some(reporting_user_id) = &self.reporting_user_id {
            if let Err(error) =
                self.api.post_message(PostMessage::new(reporting_user_id, message)).await
            {
                warn!(
                    event_name = "workflow.summary.report_failed",
                    user_id = %reporting_user_id,
                    date = %date,
                    error = %error,
                    "summary copy to reporting user failed"
                );
            }
        }

        Ok(PostOutcome::Posted { ts })
    }

    /// DMs everyone who still owes a check-in for `date`.
    ///
    /// `force` lifts the weekend/holiday gate only. Leave, existing check-ins and
    /// earlier reminders still exclude a user. One failed DM does not stop the rest.
    pub async fn send_reminders(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<ReminderReport, ApplicationError> {
        if !force {
            if let Some(reason) = self.off_day(date).await? {
                let known = self.stores.users.list_all().await.map_err(persistence)?;
                info!(
                    event_name = "workflow.reminders.skipped",
                    date = %date,
                    reason = reason.as_str(),
                    "no reminders on an off day"
                );
                return Ok(ReminderReport { skipped: known.len(), ..ReminderReport::default() });
            }
        }

        self.sync_roster().await?;

        let users = self.stores.users.list_all().await.map_err(persistence)?;
        let checked_in: HashSet<UserId> = self
            .stores
            .check_ins
            .list_for_date(date)
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|check_in| check_in.user_id)
            .collect();
        let reminded: HashSet<UserId> = self
            .stores
            .reminders
            .reminded_users(date)
            .await
            .map_err(persistence)?
            .into_iter()
            .collect();
        let leave = self.stores.leave.list_covering(date).await.map_err(persistence)?;
        let holiday = self.stores.holidays.find(date).await.map_err(persistence)?;

        let mut report = ReminderReport::default();
        for user in users {
            let user_leave: Vec<Leave> =
                leave.iter().filter(|entry| entry.user_id == user.id).cloned().collect();
            let state = DayState::from_records(
                checked_in.contains(&user.id),
                reminded.contains(&user.id),
            );

            match reminder_decision(date, holiday.as_ref(), &user_leave, state, force) {
                ReminderDecision::Skip(reason) => {
                    debug!(user_id = %user.id, date = %date, reason = reason.as_str(), "no reminder");
                    report.skipped += 1;
                }
                ReminderDecision::Send => {
                    let reminded_state = state.apply(DayEvent::ReminderSent)?;
                    let dm = PostMessage::new(user.id.0.clone(), blocks::reminder_message());
                    match self.api.post_message(dm).await {
                        Ok(_) => {
                            debug!(
                                user_id = %user.id,
                                date = %date,
                                state = ?reminded_state,
                                "reminder sent"
                            );
                            self.stores
                                .reminders
                                .record(&user.id, date)
                                .await
                                .map_err(persistence)?;
                            report.sent += 1;
                        }
                        Err(error) => {
                            warn!(
                                event_name = "workflow.reminders.delivery_failed",
                                user_id = %user.id,
                                date = %date,
                                error = %error,
                                "reminder not delivered"
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        info!(
            event_name = "workflow.reminders.completed",
            date = %date,
            forced = force,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "reminder pass finished"
        );
        Ok(report)
    }

    /// Adds the channel's human members to the user table. When Slack cannot
    /// list the channel the pass carries on with the users already known.
    async fn sync_roster(&self) -> Result<(), ApplicationError> {
        let members = match self.api.channel_members(&self.channel_id).await {
            Ok(members) => members,
            Err(error) => {
                warn!(
                    event_name = "workflow.roster.unavailable",
                    channel_id = %self.channel_id,
                    error = %error,
                    "channel roster unavailable; using known users"
                );
                return Ok(());
            }
        };

        for member in members {
            let info = match self.api.user_info(&member).await {
                Ok(info) => info,
                Err(error) => {
                    warn!(user_id = %member, error = %error, "skipping member without profile");
                    continue;
                }
            };
            if info.is_bot || info.deleted {
                continue;
            }
            self.stores
                .users
                .upsert(&User::new(UserId::new(info.id), info.display_name))
                .await
                .map_err(persistence)?;
        }
        Ok(())
    }

    async fn off_day(&self, date: NaiveDate) -> Result<Option<SkipReason>, ApplicationError> {
        if is_weekend(date) {
            return Ok(Some(SkipReason::Weekend));
        }
        let holiday = self.stores.holidays.find(date).await.map_err(|error| {
            error!(date = %date, error = %error, "holiday lookup failed");
            persistence(error)
        })?;
        Ok(holiday.map(|_| SkipReason::Holiday))
    }
}
