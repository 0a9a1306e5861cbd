use chrono::NaiveDate;
use serde::Serialize;

use muster_core::domain::check_in::{CheckIn, CheckInStatus};
use muster_core::domain::holiday::Holiday;
use muster_core::domain::leave::Leave;
use muster_core::domain::user::UserId;

pub const CHECK_IN_DETAIL_BLOCK_ID: &str = "checkin.detail.block.v1";
pub const CHECK_IN_DETAIL_ACTION_ID: &str = "checkin.detail.input.v1";
pub const LEAVE_MODAL_CALLBACK_ID: &str = "leave.modal.v1";
pub const LEAVE_START_ACTION_ID: &str = "leave.start_date.v1";
pub const LEAVE_END_ACTION_ID: &str = "leave.end_date.v1";
pub const LEAVE_NOTE_ACTION_ID: &str = "leave.note.v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Form elements that can sit inside an `input` block of a modal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    PlainTextInput {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
    },
    Datepicker {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_date: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        block_id: String,
        text: TextObject,
    },
    Actions {
        block_id: String,
        elements: Vec<ButtonElement>,
    },
    Context {
        block_id: String,
        elements: Vec<TextObject>,
    },
    Input {
        block_id: String,
        label: TextObject,
        element: InputElement,
        optional: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// A `views.open` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "modal")]
pub struct ModalView {
    pub callback_id: String,
    pub title: TextObject,
    pub submit: TextObject,
    pub close: TextObject,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_metadata: Option<String>,
}

impl ModalView {
    pub fn new(callback_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            title: TextObject::plain(title),
            submit: TextObject::plain("Submit"),
            close: TextObject::plain("Cancel"),
            blocks: Vec::new(),
            private_metadata: None,
        }
    }

    pub fn input(
        mut self,
        block_id: impl Into<String>,
        label: impl Into<String>,
        element: InputElement,
        optional: bool,
    ) -> Self {
        self.blocks.push(Block::Input {
            block_id: block_id.into(),
            label: TextObject::plain(label),
            element,
            optional,
        });
        self
    }

    pub fn private_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.private_metadata = Some(metadata.into());
        self
    }
}

pub fn check_in_action_id(status: CheckInStatus) -> String {
    format!("checkin.{}.v1", status.as_str())
}

pub fn status_from_action_id(action_id: &str) -> Option<CheckInStatus> {
    let status = action_id.strip_prefix("checkin.")?.strip_suffix(".v1")?;
    CheckInStatus::ALL.into_iter().find(|candidate| candidate.as_str() == status)
}

pub fn check_in_modal_callback_id(status: CheckInStatus) -> String {
    format!("checkin.modal.{}.v1", status.as_str())
}

pub fn status_from_modal_callback_id(callback_id: &str) -> Option<CheckInStatus> {
    let status = callback_id.strip_prefix("checkin.modal.")?.strip_suffix(".v1")?;
    CheckInStatus::ALL
        .into_iter()
        .find(|candidate| candidate.as_str() == status && candidate.requires_detail())
}

pub fn daily_prompt_message(date: NaiveDate) -> MessageTemplate {
    MessageBuilder::new("Good morning team! Please check in for the day.")
        .section("checkin.prompt.header.v1", |section| {
            section.mrkdwn("*Good morning! :sunrise: Please check in for today.*");
        })
        .actions("checkin.prompt.actions.v1", |actions| {
            for status in CheckInStatus::ALL {
                let mut button = ButtonElement::new(check_in_action_id(status), status.button_text())
                    .value(status.as_str());
                match status {
                    CheckInStatus::Normal => button = button.style(ButtonStyle::Primary),
                    CheckInStatus::OutSick => button = button.style(ButtonStyle::Danger),
                    _ => {}
                }
                actions.button(button);
            }
        })
        .context("checkin.prompt.context.v1", |context| {
            context.plain(format!("Check-in for {}", date.format("%A, %B %-d, %Y")));
        })
        .build()
}

/// Posted into the prompt thread after every recorded response.
pub fn check_in_confirmation_message(check_in: &CheckIn) -> MessageTemplate {
    let text = match &check_in.detail {
        Some(detail) => format!(
            "{} has checked in: *{}* ({detail})",
            check_in.user_id.mention(),
            check_in.status.label()
        ),
        None => {
            format!("{} has checked in: *{}*", check_in.user_id.mention(), check_in.status.label())
        }
    };

    MessageBuilder::new(text.clone())
        .section("checkin.confirmation.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn summary_message(date: NaiveDate, check_ins: &[CheckIn]) -> MessageTemplate {
    let heading = format!("*Daily Status Summary for {}*", date.format("%Y-%m-%d"));
    let body = if check_ins.is_empty() {
        "No one has checked in yet.".to_owned()
    } else {
        check_ins
            .iter()
            .map(|check_in| format!("• {}", check_in.summary_line()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    MessageBuilder::new(format!("Daily status summary for {}", date.format("%Y-%m-%d")))
        .section("checkin.summary.body.v1", |section| {
            section.mrkdwn(format!("{heading}\n\n{body}"));
        })
        .context("checkin.summary.context.v1", |context| {
            context.plain(format!("{} response(s)", check_ins.len()));
        })
        .build()
}

pub fn reminder_message() -> MessageTemplate {
    MessageBuilder::new("Just a friendly reminder to please check in for today! ☀️")
        .section("checkin.reminder.v1", |section| {
            section.mrkdwn(
                "Just a friendly reminder to please check in for today! ☀️\nUse the buttons on this morning's post in the team channel.",
            );
        })
        .build()
}

pub fn detail_modal(status: CheckInStatus, date: NaiveDate) -> ModalView {
    let (title, label, placeholder) = match status {
        CheckInStatus::Late => ("In Late", "What time do you expect to be in?", "e.g., 10:30 AM"),
        CheckInStatus::Appointment => {
            ("Appointment", "What are the details of the appointment?", "e.g., Dentist at 2 PM")
        }
        _ => (
            "Other Status",
            "Please provide your status for the day.",
            "e.g., Working from the airport",
        ),
    };

    ModalView::new(check_in_modal_callback_id(status), title)
        .input(
            CHECK_IN_DETAIL_BLOCK_ID,
            label,
            InputElement::PlainTextInput {
                action_id: CHECK_IN_DETAIL_ACTION_ID.to_owned(),
                placeholder: Some(TextObject::plain(placeholder)),
            },
            false,
        )
        .private_metadata(date.format("%Y-%m-%d").to_string())
}

pub fn leave_modal(today: NaiveDate) -> ModalView {
    let initial = today.format("%Y-%m-%d").to_string();
    ModalView::new(LEAVE_MODAL_CALLBACK_ID, "Register Leave/PTO")
        .input(
            "leave.start.block.v1",
            "Start Date",
            InputElement::Datepicker {
                action_id: LEAVE_START_ACTION_ID.to_owned(),
                initial_date: Some(initial.clone()),
            },
            false,
        )
        .input(
            "leave.end.block.v1",
            "End Date",
            InputElement::Datepicker {
                action_id: LEAVE_END_ACTION_ID.to_owned(),
                initial_date: Some(initial),
            },
            false,
        )
        .input(
            "leave.note.block.v1",
            "Note",
            InputElement::PlainTextInput {
                action_id: LEAVE_NOTE_ACTION_ID.to_owned(),
                placeholder: Some(TextObject::plain("e.g., Family vacation")),
            },
            true,
        )
}

pub fn help_message(is_admin: bool) -> MessageTemplate {
    let mut text = String::from(
        "*Muster Bot Commands*\n\
         `/timeoff [START END note]` - Register your upcoming leave or PTO.\n\
         `/calendar [YYYY-MM]` - Holidays and team leave for the month.\n\
         `/status [@user]` - Today's check-in for you or a team member.\n\
         `/help` - Shows this message.",
    );
    if is_admin {
        text.push_str(
            "\n\n*Admin Commands*\n\
             `/holiday YYYY-MM-DD description` - Add a company holiday.\n\
             `/post_checkin` - Post today's check-in prompt now.\n\
             `/post_reminders` - Send today's reminders now.\n\
             `/post_summary` - Post today's summary now.\n\
             `/add_admin @user` - Grant a user admin permissions for this bot.\n\
             `/edit_status @user status [detail]` - Manually set a user's status for today.\n\
             `/config [key] [value]` - View or set the schedule times.",
        );
    }

    MessageBuilder::new("Muster bot command help")
        .section("muster.help.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn calendar_message(
    month_first: NaiveDate,
    holidays: &[Holiday],
    leave: &[Leave],
) -> MessageTemplate {
    let month_label = month_first.format("%B %Y").to_string();
    let holiday_lines = if holidays.is_empty() {
        "_No holidays._".to_owned()
    } else {
        holidays
            .iter()
            .map(|holiday| format!("• {} - {}", holiday.date.format("%a %b %-d"), holiday.description))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let leave_lines = if leave.is_empty() {
        "_No leave registered._".to_owned()
    } else {
        leave
            .iter()
            .map(|entry| {
                let range = if entry.start_date == entry.end_date {
                    entry.start_date.format("%b %-d").to_string()
                } else {
                    format!(
                        "{} to {}",
                        entry.start_date.format("%b %-d"),
                        entry.end_date.format("%b %-d")
                    )
                };
                match &entry.note {
                    Some(note) => format!("• {}: {range} ({note})", entry.user_id.mention()),
                    None => format!("• {}: {range}", entry.user_id.mention()),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    MessageBuilder::new(format!("Calendar for {month_label}"))
        .section("muster.calendar.holidays.v1", |section| {
            section.mrkdwn(format!(":calendar: *{month_label}*\n\n*Holidays*\n{holiday_lines}"));
        })
        .section("muster.calendar.leave.v1", |section| {
            section.mrkdwn(format!("*Leave*\n{leave_lines}"));
        })
        .build()
}

pub fn status_message(
    user_id: &UserId,
    date: NaiveDate,
    check_in: Option<&CheckIn>,
) -> MessageTemplate {
    let text = match check_in {
        Some(check_in) => check_in.summary_line(),
        None => format!("{} has not checked in yet.", user_id.mention()),
    };

    MessageBuilder::new(text.clone())
        .section("muster.status.v1", |section| {
            section.mrkdwn(text);
        })
        .context("muster.status.context.v1", |context| {
            context.plain(format!("Status for {}", date.format("%Y-%m-%d")));
        })
        .build()
}

pub fn settings_message(settings: &[(String, String)]) -> MessageTemplate {
    let lines = if settings.is_empty() {
        "_No settings stored._".to_owned()
    } else {
        settings.iter().map(|(key, value)| format!("• `{key}` = `{value}`")).collect::<Vec<_>>().join("\n")
    };

    MessageBuilder::new("Muster bot configuration")
        .section("muster.config.v1", |section| {
            section.mrkdwn(format!("*Configuration*\n{lines}"));
        })
        .build()
}

pub fn confirmation_message(text: &str) -> MessageTemplate {
    MessageBuilder::new(text.to_owned())
        .section("muster.confirmation.v1", |section| {
            section.mrkdwn(text.to_owned());
        })
        .build()
}

/// Private reply for validation and authorization failures.
pub fn rejection_message(summary: &str, usage: Option<&str>) -> MessageTemplate {
    let builder = MessageBuilder::new(summary.to_owned()).section("muster.rejection.v1", |section| {
        section.mrkdwn(format!(":warning: {summary}"));
    });

    match usage {
        Some(usage) => builder
            .context("muster.rejection.usage.v1", |context| {
                context.mrkdwn(format!("Usage: `{usage}`"));
            })
            .build(),
        None => builder.build(),
    }
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("muster.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("muster.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}
