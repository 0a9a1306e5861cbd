use chrono::NaiveDate;

use crate::calendar::is_weekend;
use crate::domain::check_in::{DayEvent, DayState};
use crate::domain::holiday::Holiday;
use crate::domain::leave::Leave;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Weekend,
    Holiday,
    OnLeave,
    CheckedIn,
    AlreadyReminded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekend => "weekend",
            Self::Holiday => "holiday",
            Self::OnLeave => "on_leave",
            Self::CheckedIn => "checked_in",
            Self::AlreadyReminded => "already_reminded",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderDecision {
    Send,
    Skip(SkipReason),
}

/// Decides whether one user gets a reminder for `date`.
///
/// `ignore_off_day` lifts only the weekend/holiday gate (admin-forced passes);
/// leave, existing check-ins and earlier reminders always exclude.
pub fn reminder_decision(
    date: NaiveDate,
    holiday: Option<&Holiday>,
    leave: &[Leave],
    state: DayState,
    ignore_off_day: bool,
) -> ReminderDecision {
    if !ignore_off_day {
        if is_weekend(date) {
            return ReminderDecision::Skip(SkipReason::Weekend);
        }
        if holiday.is_some_and(|holiday| holiday.date == date) {
            return ReminderDecision::Skip(SkipReason::Holiday);
        }
    }

    if leave.iter().any(|entry| entry.covers(date)) {
        return ReminderDecision::Skip(SkipReason::OnLeave);
    }

    if state.can_apply(DayEvent::ReminderSent) {
        return ReminderDecision::Send;
    }
    match state {
        DayState::Responded => ReminderDecision::Skip(SkipReason::CheckedIn),
        _ => ReminderDecision::Skip(SkipReason::AlreadyReminded),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{reminder_decision, ReminderDecision, SkipReason};
    use crate::domain::check_in::DayState;
    use crate::domain::holiday::Holiday;
    use crate::domain::leave::Leave;
    use crate::domain::user::UserId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn weekday_without_exclusions_sends() {
        let wednesday = date(2024, 7, 3);
        assert_eq!(
            reminder_decision(wednesday, None, &[], DayState::NoResponse, false),
            ReminderDecision::Send
        );
    }

    #[test]
    fn weekend_and_holiday_skip_everyone() {
        let saturday = date(2024, 7, 6);
        assert_eq!(
            reminder_decision(saturday, None, &[], DayState::NoResponse, false),
            ReminderDecision::Skip(SkipReason::Weekend)
        );

        let independence_day = Holiday::new(date(2024, 7, 4), "Independence Day").expect("holiday");
        assert_eq!(
            reminder_decision(
                independence_day.date,
                Some(&independence_day),
                &[],
                DayState::NoResponse,
                false
            ),
            ReminderDecision::Skip(SkipReason::Holiday)
        );
    }

    #[test]
    fn leave_excludes_regardless_of_check_in_state_and_force() {
        let wednesday = date(2024, 7, 3);
        let leave = Leave::new(UserId::new("U1"), date(2024, 7, 1), date(2024, 7, 5), None)
            .expect("leave");

        for state in [DayState::NoResponse, DayState::Reminded, DayState::Responded] {
            for forced in [false, true] {
                assert_eq!(
                    reminder_decision(wednesday, None, std::slice::from_ref(&leave), state, forced),
                    ReminderDecision::Skip(SkipReason::OnLeave)
                );
            }
        }
    }

    #[test]
    fn forced_pass_ignores_weekend_but_not_prior_reminder() {
        let sunday = date(2024, 7, 7);
        assert_eq!(
            reminder_decision(sunday, None, &[], DayState::NoResponse, true),
            ReminderDecision::Send
        );
        assert_eq!(
            reminder_decision(sunday, None, &[], DayState::Reminded, true),
            ReminderDecision::Skip(SkipReason::AlreadyReminded)
        );
        assert_eq!(
            reminder_decision(sunday, None, &[], DayState::Responded, true),
            ReminderDecision::Skip(SkipReason::CheckedIn)
        );
    }
}
