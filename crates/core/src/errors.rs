use thiserror::Error;

use crate::domain::check_in::{DayEvent, DayState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("user {user_id} is not authorized to run `{command}`")]
    Authorization { user_id: String, command: String },
    #[error("invalid check-in transition from {from:?} on {event:?}")]
    InvalidDayTransition { from: DayState, event: DayEvent },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("delivery failure: {0}")]
    Delivery(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Domain(DomainError::Validation(_)) | Self::Domain(DomainError::Authorization { .. })
        )
    }

    /// Text shown privately to the user whose action failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::Domain(DomainError::Validation(message)) => message.clone(),
            Self::Domain(DomainError::Authorization { .. }) => {
                "Sorry, only admins can use this command.".to_owned()
            }
            Self::Domain(DomainError::InvalidDayTransition { .. }) => {
                "That check-in action is not available right now.".to_owned()
            }
            Self::Persistence(_) => {
                "The check-in store is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::Delivery(_) => "Slack did not accept the message. Please retry shortly.".to_owned(),
            Self::Configuration(_) => "The bot is misconfigured; ask an admin to check it.".to_owned(),
        }
    }
}
