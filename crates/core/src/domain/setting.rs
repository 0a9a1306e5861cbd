use std::str::FromStr;

use chrono::NaiveTime;

use crate::calendar::parse_time_of_day;
use crate::errors::DomainError;

/// Keys stored in `bot_setting` and editable through `/config`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    CheckinTime,
    ReminderTime,
    SummaryTime,
}

impl SettingKey {
    pub const ALL: [SettingKey; 3] =
        [SettingKey::CheckinTime, SettingKey::ReminderTime, SettingKey::SummaryTime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckinTime => "checkin_time",
            Self::ReminderTime => "reminder_time",
            Self::SummaryTime => "summary_time",
        }
    }
}

impl FromStr for SettingKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|key| key.as_str() == normalized).ok_or_else(|| {
            DomainError::Validation(format!(
                "unknown setting `{}`; expected one of checkin_time, reminder_time, summary_time",
                value.trim()
            ))
        })
    }
}

/// The three weekday job times, resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleTimes {
    pub checkin: NaiveTime,
    pub reminder: NaiveTime,
    pub summary: NaiveTime,
}

impl ScheduleTimes {
    pub fn new(
        checkin: NaiveTime,
        reminder: NaiveTime,
        summary: NaiveTime,
    ) -> Result<Self, DomainError> {
        if !(checkin < reminder && reminder < summary) {
            return Err(DomainError::Validation(
                "schedule times must satisfy checkin_time < reminder_time < summary_time"
                    .to_owned(),
            ));
        }
        Ok(Self { checkin, reminder, summary })
    }

    pub fn get(&self, key: SettingKey) -> NaiveTime {
        match key {
            SettingKey::CheckinTime => self.checkin,
            SettingKey::ReminderTime => self.reminder,
            SettingKey::SummaryTime => self.summary,
        }
    }

    /// Returns a copy with one time replaced, re-checking the ordering.
    pub fn with(&self, key: SettingKey, raw: &str) -> Result<Self, DomainError> {
        let time = parse_time_of_day(raw)?;
        let mut next = *self;
        match key {
            SettingKey::CheckinTime => next.checkin = time,
            SettingKey::ReminderTime => next.reminder = time,
            SettingKey::SummaryTime => next.summary = time,
        }
        Self::new(next.checkin, next.reminder, next.summary)
    }
}
