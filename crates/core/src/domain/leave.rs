use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

/// A per-user exclusion range. Both ends are inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Leave {
    pub fn new(
        user_id: UserId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        note: Option<String>,
    ) -> Result<Self, DomainError> {
        if end_date < start_date {
            return Err(DomainError::Validation(format!(
                "leave end date {end_date} is before start date {start_date}"
            )));
        }

        Ok(Self {
            id: None,
            user_id,
            start_date,
            end_date,
            note: note.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty()),
            created_at: Utc::now(),
        })
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::Leave;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).expect("valid date")
    }

    #[test]
    fn rejects_inverted_range() {
        let result = Leave::new(UserId::new("U1"), day(10), day(9), None);
        assert!(matches!(result, Err(DomainError::Validation(ref message)) if message.contains("before")));
    }

    #[test]
    fn covers_is_inclusive_on_both_ends() {
        let leave = Leave::new(UserId::new("U1"), day(8), day(12), Some("beach".into())).expect("leave");
        assert!(!leave.covers(day(7)));
        assert!(leave.covers(day(8)));
        assert!(leave.covers(day(12)));
        assert!(!leave.covers(day(13)));
    }

    #[test]
    fn single_day_leave_is_valid() {
        let leave = Leave::new(UserId::new("U1"), day(5), day(5), Some("  ".into())).expect("leave");
        assert!(leave.covers(day(5)));
        assert_eq!(leave.note, None);
    }
}
