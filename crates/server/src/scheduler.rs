//! Weekday job loop for the prompt, reminder and summary passes.
//!
//! Times are read from `bot_setting` on every cycle so `/config` changes apply
//! without a restart. Jobs whose time passed before startup are not run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use muster_core::calendar::{next_weekday_run, parse_time_of_day};
use muster_core::{ApplicationError, ScheduleTimes, SettingKey};
use muster_db::repositories::SettingsRepository;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::stores::persistence;
use crate::workflow::CheckInWorkflow;

/// Upper bound on one sleep so edited times are noticed promptly.
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduledJob {
    PostCheckIn,
    SendReminders,
    PostSummary,
}

impl ScheduledJob {
    pub const ALL: [Self; 3] = [Self::PostCheckIn, Self::SendReminders, Self::PostSummary];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PostCheckIn => "post_checkin",
            Self::SendReminders => "send_reminders",
            Self::PostSummary => "post_summary",
        }
    }

    fn setting(&self) -> SettingKey {
        match self {
            Self::PostCheckIn => SettingKey::CheckinTime,
            Self::SendReminders => SettingKey::ReminderTime,
            Self::PostSummary => SettingKey::SummaryTime,
        }
    }
}

/// Jobs with a weekday run in `(cursor, now]`, in schedule order.
pub fn due_jobs(
    times: &ScheduleTimes,
    cursor: NaiveDateTime,
    now: NaiveDateTime,
) -> Vec<ScheduledJob> {
    ScheduledJob::ALL
        .into_iter()
        .filter(|job| next_weekday_run(times.get(job.setting()), cursor) <= now)
        .collect()
}

pub fn next_wake(times: &ScheduleTimes, now: NaiveDateTime) -> NaiveDateTime {
    ScheduledJob::ALL
        .into_iter()
        .map(|job| next_weekday_run(times.get(job.setting()), now))
        .min()
        .unwrap_or(now)
}

/// Stored schedule times; keys that are missing fall back to `defaults`.
pub async fn load_schedule(
    settings: &dyn SettingsRepository,
    defaults: &ScheduleTimes,
) -> Result<ScheduleTimes, ApplicationError> {
    let mut resolved = [defaults.checkin, defaults.reminder, defaults.summary];
    for (slot, key) in resolved.iter_mut().zip(SettingKey::ALL) {
        if let Some(raw) = settings.get(key.as_str()).await.map_err(persistence)? {
            *slot = parse_time_of_day(&raw)?;
        }
    }
    let [checkin, reminder, summary] = resolved;
    Ok(ScheduleTimes::new(checkin, reminder, summary)?)
}

pub struct Scheduler {
    workflow: Arc<CheckInWorkflow>,
    settings: Arc<dyn SettingsRepository>,
    defaults: ScheduleTimes,
}

impl Scheduler {
    pub fn new(
        workflow: Arc<CheckInWorkflow>,
        settings: Arc<dyn SettingsRepository>,
        defaults: ScheduleTimes,
    ) -> Self {
        Self { workflow, settings, defaults }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut cursor = Local::now().naive_local();
        info!(
            event_name = "system.scheduler.start",
            correlation_id = "scheduler",
            "scheduler started"
        );

        loop {
            let times = self.current_times().await;
            let now = Local::now().naive_local();

            for job in due_jobs(&times, cursor, now) {
                self.run_job(job, now).await;
            }
            cursor = now;

            let wake = next_wake(&times, now);
            let sleep = (wake - now).to_std().unwrap_or(Duration::ZERO).min(MAX_SLEEP);
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(
                            event_name = "system.scheduler.stop",
                            correlation_id = "scheduler",
                            "scheduler shutting down"
                        );
                        break;
                    }
                }
            }
        }
    }

    async fn current_times(&self) -> ScheduleTimes {
        match load_schedule(self.settings.as_ref(), &self.defaults).await {
            Ok(times) => times,
            Err(error) => {
                warn!(
                    correlation_id = "scheduler",
                    error = %error,
                    "stored schedule unreadable; using configured defaults"
                );
                self.defaults
            }
        }
    }

    async fn run_job(&self, job: ScheduledJob, now: NaiveDateTime) {
        let date = now.date();
        info!(
            event_name = "system.scheduler.job_started",
            correlation_id = job.name(),
            date = %date,
            "running scheduled job"
        );

        let result = match job {
            ScheduledJob::PostCheckIn => {
                self.workflow.post_daily_check_in(date, false).await.map(|_| ())
            }
            ScheduledJob::SendReminders => {
                self.workflow.send_reminders(date, false).await.map(|_| ())
            }
            ScheduledJob::PostSummary => self.workflow.post_summary(date, false).await.map(|_| ()),
        };

        if let Err(error) = result {
            error!(
                event_name = "system.scheduler.job_failed",
                correlation_id = job.name(),
                date = %date,
                error = %error,
                "scheduled job failed"
            );
        }
    }
}
