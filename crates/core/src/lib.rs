//! Domain model, calendar rules and configuration for the muster bot.
//!
//! Nothing in this crate talks to Slack or SQLite; the `db`, `slack` and `server`
//! crates build on these types.

pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;

pub use domain::check_in::{CheckIn, CheckInStatus, DayEvent, DayState};
pub use domain::holiday::Holiday;
pub use domain::leave::Leave;
pub use domain::reminder::{reminder_decision, ReminderDecision, SkipReason};
pub use domain::setting::{ScheduleTimes, SettingKey};
pub use domain::user::{User, UserId};
pub use errors::{ApplicationError, DomainError};
