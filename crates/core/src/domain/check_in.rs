use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Normal,
    #[serde(rename = "wfh")]
    WorkingFromHome,
    Late,
    Appointment,
    OutSick,
    Liberty,
    Other,
}

impl CheckInStatus {
    pub const ALL: [CheckInStatus; 7] = [
        CheckInStatus::Normal,
        CheckInStatus::Late,
        CheckInStatus::WorkingFromHome,
        CheckInStatus::Appointment,
        CheckInStatus::OutSick,
        CheckInStatus::Liberty,
        CheckInStatus::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::WorkingFromHome => "wfh",
            Self::Late => "late",
            Self::Appointment => "appointment",
            Self::OutSick => "out_sick",
            Self::Liberty => "liberty",
            Self::Other => "other",
        }
    }

    /// Short label used in summaries and confirmations.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::WorkingFromHome => "WFH",
            Self::Late => "Late",
            Self::Appointment => "Appointment",
            Self::OutSick => "Out Sick",
            Self::Liberty => "Liberty",
            Self::Other => "Other",
        }
    }

    pub fn button_text(&self) -> &'static str {
        match self {
            Self::Normal => "In at Normal Time",
            Self::WorkingFromHome => "Working from Home",
            Self::Late => "In Late",
            Self::Appointment => "Appointment",
            Self::OutSick => "Out Sick",
            Self::Liberty => "Liberty",
            Self::Other => "Other...",
        }
    }

    /// Statuses that collect free-text detail through a modal before recording.
    pub fn requires_detail(&self) -> bool {
        matches!(self, Self::Late | Self::Appointment | Self::Other)
    }
}

impl std::fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckInStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "normal" | "in" | "in_normal" => Ok(Self::Normal),
            "wfh" | "working_from_home" | "home" | "remote" => Ok(Self::WorkingFromHome),
            "late" | "in_late" => Ok(Self::Late),
            "appointment" | "appt" => Ok(Self::Appointment),
            "out_sick" | "sick" => Ok(Self::OutSick),
            "liberty" => Ok(Self::Liberty),
            "other" => Ok(Self::Other),
            other => Err(DomainError::Validation(format!(
                "unknown status `{other}` (expected normal|wfh|late|appointment|out_sick|liberty|other)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub status: CheckInStatus,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl CheckIn {
    pub fn new(
        user_id: UserId,
        date: NaiveDate,
        status: CheckInStatus,
        detail: Option<String>,
    ) -> Self {
        let detail = detail.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());
        Self { user_id, date, status, detail, recorded_at: Utc::now() }
    }

    /// One summary row: the mention, the bold status label, then any detail.
    pub fn summary_line(&self) -> String {
        match &self.detail {
            Some(detail) => {
                format!("{}: *{}* — {detail}", self.user_id.mention(), self.status.label())
            }
            None => format!("{}: *{}*", self.user_id.mention(), self.status.label()),
        }
    }
}

/// Per-(user, day) reminder state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayState {
    NoResponse,
    Reminded,
    Responded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayEvent {
    ReminderSent,
    ResponseRecorded,
}

impl DayState {
    pub fn from_records(checked_in: bool, reminded: bool) -> Self {
        match (checked_in, reminded) {
            (true, _) => Self::Responded,
            (false, true) => Self::Reminded,
            (false, false) => Self::NoResponse,
        }
    }

    pub fn can_apply(&self, event: DayEvent) -> bool {
        matches!(
            (self, event),
            (Self::NoResponse, DayEvent::ReminderSent)
                | (Self::NoResponse, DayEvent::ResponseRecorded)
                | (Self::Reminded, DayEvent::ResponseRecorded)
                | (Self::Responded, DayEvent::ResponseRecorded)
        )
    }

    pub fn apply(self, event: DayEvent) -> Result<Self, DomainError> {
        if !self.can_apply(event) {
            return Err(DomainError::InvalidDayTransition { from: self, event });
        }

        Ok(match event {
            DayEvent::ReminderSent => Self::Reminded,
            DayEvent::ResponseRecorded => Self::Responded,
        })
    }
}
