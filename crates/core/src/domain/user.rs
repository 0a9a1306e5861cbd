use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Slack mention markup, e.g. `<@U123>`.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }

    /// Accepts a raw id (`U123`) or Slack's escaped mention forms (`<@U123>`, `<@U123|alice>`).
    pub fn parse_mention(token: &str) -> Option<Self> {
        let trimmed = token.trim();
        let inner = trimmed
            .strip_prefix("<@")
            .and_then(|rest| rest.strip_suffix('>'))
            .map(|rest| rest.split('|').next().unwrap_or(rest))
            .unwrap_or(trimmed);

        let valid = inner.len() > 1
            && (inner.starts_with('U') || inner.starts_with('W'))
            && inner.chars().all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit());
        valid.then(|| Self(inner.to_owned()))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self { id, display_name: display_name.into(), is_admin: false, created_at: Utc::now() }
    }
}
