use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub description: String,
}

impl Holiday {
    pub fn new(date: NaiveDate, description: impl Into<String>) -> Result<Self, DomainError> {
        let description = description.into().trim().to_owned();
        if description.is_empty() {
            return Err(DomainError::Validation("holiday description must not be empty".into()));
        }

        Ok(Self { date, description })
    }
}
