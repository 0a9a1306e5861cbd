use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use muster_core::calendar::{parse_date, parse_month};
use muster_core::domain::check_in::CheckInStatus;
use muster_core::domain::setting::SettingKey;
use muster_core::domain::user::UserId;
use muster_core::errors::{ApplicationError, DomainError};

use crate::blocks::{self, MessageTemplate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
}

/// Who invoked a command and where; handed to every service call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: String,
    pub channel_id: String,
    pub user_id: UserId,
    pub trigger_id: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeOffRequest {
    OpenForm,
    Direct { start: NaiveDate, end: NaiveDate, note: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MusterCommand {
    Help,
    TimeOff(TimeOffRequest),
    Calendar { month: Option<NaiveDate> },
    Status { user_id: Option<UserId> },
    AddHoliday { date: NaiveDate, description: String },
    PostCheckIn,
    PostReminders,
    PostSummary,
    AddAdmin { user_id: UserId },
    EditStatus { user_id: UserId, status: CheckInStatus, detail: Option<String> },
    Config { key: Option<SettingKey>, value: Option<String> },
}

impl MusterCommand {
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::AddHoliday { .. }
                | Self::PostCheckIn
                | Self::PostReminders
                | Self::PostSummary
                | Self::AddAdmin { .. }
                | Self::EditStatus { .. }
                | Self::Config { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "/help",
            Self::TimeOff(_) => "/timeoff",
            Self::Calendar { .. } => "/calendar",
            Self::Status { .. } => "/status",
            Self::AddHoliday { .. } => "/holiday",
            Self::PostCheckIn => "/post_checkin",
            Self::PostReminders => "/post_reminders",
            Self::PostSummary => "/post_summary",
            Self::AddAdmin { .. } => "/add_admin",
            Self::EditStatus { .. } => "/edit_status",
            Self::Config { .. } => "/config",
        }
    }
}

pub fn usage(command: &str) -> Option<&'static str> {
    let usage = match command {
        "/help" => "/help",
        "/timeoff" => "/timeoff [YYYY-MM-DD YYYY-MM-DD note]",
        "/calendar" => "/calendar [YYYY-MM]",
        "/status" => "/status [@user]",
        "/holiday" => "/holiday YYYY-MM-DD description",
        "/post_checkin" => "/post_checkin",
        "/post_reminders" => "/post_reminders",
        "/post_summary" => "/post_summary",
        "/add_admin" => "/add_admin @user",
        "/edit_status" => "/edit_status @user status [detail]",
        "/config" => "/config [key] [HH:MM]",
        _ => return None,
    };
    Some(usage)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("{message}")]
    Invalid { command: String, message: String },
}

impl CommandParseError {
    fn invalid(command: &str, message: impl Into<String>) -> Self {
        Self::Invalid { command: command.to_owned(), message: message.into() }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(#[from] ApplicationError),
}

pub fn parse_command(command: &str, text: &str) -> Result<MusterCommand, CommandParseError> {
    let command = command.trim().to_ascii_lowercase();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let rest_after = |n: usize| -> Option<String> {
        let rest = tokens.iter().skip(n).copied().collect::<Vec<_>>().join(" ");
        (!rest.is_empty()).then_some(rest)
    };
    let date_arg = |token: &str| {
        parse_date(token).map_err(|error| CommandParseError::invalid(&command, error.to_string()))
    };
    let mention_arg = |token: Option<&&str>| {
        token.and_then(|token| UserId::parse_mention(token)).ok_or_else(|| {
            CommandParseError::invalid(&command, "Please mention a user, e.g. `@alice`.")
        })
    };

    let parsed = match command.as_str() {
        "/help" => MusterCommand::Help,
        "/timeoff" => match tokens.as_slice() {
            [] => MusterCommand::TimeOff(TimeOffRequest::OpenForm),
            [_] => {
                return Err(CommandParseError::invalid(
                    &command,
                    "Please give both a start and an end date.",
                ))
            }
            [start, end, ..] => MusterCommand::TimeOff(TimeOffRequest::Direct {
                start: date_arg(start)?,
                end: date_arg(end)?,
                note: rest_after(2),
            }),
        },
        "/calendar" => match tokens.first() {
            None => MusterCommand::Calendar { month: None },
            Some(token) => {
                let (first, _) = parse_month(token)
                    .map_err(|error| CommandParseError::invalid(&command, error.to_string()))?;
                MusterCommand::Calendar { month: Some(first) }
            }
        },
        "/status" => match tokens.first() {
            None => MusterCommand::Status { user_id: None },
            token => MusterCommand::Status { user_id: Some(mention_arg(token)?) },
        },
        "/holiday" => {
            let Some(token) = tokens.first() else {
                return Err(CommandParseError::invalid(&command, "Please give a date."));
            };
            let date = date_arg(token)?;
            let Some(description) = rest_after(1) else {
                return Err(CommandParseError::invalid(
                    &command,
                    "Please add a description for the holiday.",
                ));
            };
            MusterCommand::AddHoliday { date, description }
        }
        "/post_checkin" => MusterCommand::PostCheckIn,
        "/post_reminders" => MusterCommand::PostReminders,
        "/post_summary" => MusterCommand::PostSummary,
        "/add_admin" => MusterCommand::AddAdmin { user_id: mention_arg(tokens.first())? },
        "/edit_status" => {
            let user_id = mention_arg(tokens.first())?;
            let Some(raw_status) = tokens.get(1) else {
                return Err(CommandParseError::invalid(&command, "Please give a status."));
            };
            let status = raw_status
                .parse::<CheckInStatus>()
                .map_err(|error| CommandParseError::invalid(&command, error.to_string()))?;
            MusterCommand::EditStatus { user_id, status, detail: rest_after(2) }
        }
        "/config" => {
            let key = tokens
                .first()
                .map(|token| token.parse::<SettingKey>())
                .transpose()
                .map_err(|error| CommandParseError::invalid(&command, error.to_string()))?;
            MusterCommand::Config { key, value: tokens.get(1).map(|value| (*value).to_owned()) }
        }
        _ => return Err(CommandParseError::UnsupportedCommand(command.clone())),
    };

    Ok(parsed)
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: MusterCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Parses, authorizes and dispatches a slash command.
    ///
    /// Admin-only commands are checked here and nowhere else on the command path.
    /// Validation and authorization failures come back as private rejection
    /// messages; only infrastructure failures surface as errors.
    pub async fn route(
        &self,
        payload: SlashCommandPayload,
    ) -> Result<Option<MessageTemplate>, CommandRouteError> {
        let command = match parse_command(&payload.command, &payload.text) {
            Ok(command) => command,
            Err(CommandParseError::Invalid { command, message }) => {
                info!(
                    event_name = "command.rejected.invalid",
                    correlation_id = %payload.request_id,
                    user_id = %payload.user_id,
                    command = %command,
                    "slash command arguments rejected"
                );
                return Ok(Some(blocks::rejection_message(&message, usage(&command))));
            }
            Err(CommandParseError::UnsupportedCommand(command)) => {
                return Ok(Some(blocks::rejection_message(
                    &format!("Unsupported command `{command}`. Try `/help`."),
                    None,
                )));
            }
        };

        let envelope = CommandEnvelope {
            command: command.name().to_owned(),
            channel_id: payload.channel_id,
            user_id: UserId::new(payload.user_id),
            trigger_id: payload.trigger_id,
            request_id: payload.request_id,
        };

        if command.requires_admin() && !self.service.is_admin(&envelope.user_id).await? {
            info!(
                event_name = "command.rejected.not_admin",
                correlation_id = %envelope.request_id,
                user_id = %envelope.user_id,
                command = command.name(),
                "admin command denied"
            );
            let denied = ApplicationError::from(DomainError::Authorization {
                user_id: envelope.user_id.0.clone(),
                command: command.name().to_owned(),
            });
            return Ok(Some(blocks::rejection_message(&denied.user_message(), None)));
        }

        let result = match command {
            MusterCommand::Help => {
                let is_admin = self.service.is_admin(&envelope.user_id).await?;
                Ok(Some(blocks::help_message(is_admin)))
            }
            MusterCommand::TimeOff(request) => self.service.time_off(request, &envelope).await,
            MusterCommand::Calendar { month } => {
                self.service.calendar(month, &envelope).await.map(Some)
            }
            MusterCommand::Status { user_id } => {
                self.service.status(user_id, &envelope).await.map(Some)
            }
            MusterCommand::AddHoliday { date, description } => {
                self.service.add_holiday(date, description, &envelope).await.map(Some)
            }
            MusterCommand::PostCheckIn => self.service.post_check_in(&envelope).await.map(Some),
            MusterCommand::PostReminders => self.service.post_reminders(&envelope).await.map(Some),
            MusterCommand::PostSummary => self.service.post_summary(&envelope).await.map(Some),
            MusterCommand::AddAdmin { user_id } => {
                self.service.add_admin(user_id, &envelope).await.map(Some)
            }
            MusterCommand::EditStatus { user_id, status, detail } => {
                self.service.edit_status(user_id, status, detail, &envelope).await.map(Some)
            }
            MusterCommand::Config { key, value } => {
                self.service.configure(key, value, &envelope).await.map(Some)
            }
        };

        match result {
            Ok(message) => Ok(message),
            Err(error) if error.is_user_error() => {
                info!(
                    event_name = "command.rejected.validation",
                    correlation_id = %envelope.request_id,
                    user_id = %envelope.user_id,
                    command = %envelope.command,
                    error = %error,
                    "slash command rejected"
                );
                Ok(Some(blocks::rejection_message(&error.user_message(), usage(&envelope.command))))
            }
            Err(error) => Err(CommandRouteError::Service(error)),
        }
    }
}

#[async_trait]
pub trait MusterCommandService: Send + Sync {
    async fn is_admin(&self, user_id: &UserId) -> Result<bool, ApplicationError>;

    /// `None` when the reply is a modal rather than a message.
    async fn time_off(
        &self,
        request: TimeOffRequest,
        envelope: &CommandEnvelope,
    ) -> Result<Option<MessageTemplate>, ApplicationError>;

    async fn calendar(
        &self,
        month: Option<NaiveDate>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn status(
        &self,
        user_id: Option<UserId>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn add_holiday(
        &self,
        date: NaiveDate,
        description: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn post_check_in(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn post_reminders(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn post_summary(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn add_admin(
        &self,
        user_id: UserId,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn edit_status(
        &self,
        user_id: UserId,
        status: CheckInStatus,
        detail: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;

    async fn configure(
        &self,
        key: Option<SettingKey>,
        value: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ApplicationError>;
}
