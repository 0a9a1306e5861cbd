use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use muster_core::errors::ApplicationError;

use crate::{
    blocks::{self, MessageTemplate},
    commands::{CommandRouteError, CommandRouter, MusterCommandService, SlashCommandPayload},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    BlockAction(BlockActionEvent),
    ViewSubmission(ViewSubmissionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(payload.user_id.as_str()),
            Self::BlockAction(event) => event.user_id.as_deref(),
            Self::ViewSubmission(event) => event.user_id.as_deref(),
            Self::Unsupported { .. } => None,
        }
    }

    /// Where a private reply to this event should go.
    pub fn reply_target(&self) -> Option<ReplyTarget> {
        let user_id = self.user_id()?.to_owned();
        let channel_id = match self {
            Self::SlashCommand(payload) => Some(payload.channel_id.clone()),
            Self::BlockAction(event) => event.channel_id.clone(),
            Self::ViewSubmission(_) | Self::Unsupported { .. } => None,
        };
        Some(ReplyTarget { channel_id, user_id })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    BlockAction,
    ViewSubmission,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTarget {
    pub channel_id: Option<String>,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: Option<String>,
    pub message_ts: Option<String>,
    pub user_id: Option<String>,
    pub action_id: String,
    pub value: Option<String>,
    pub trigger_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub user_id: Option<String>,
    pub callback_id: String,
    pub private_metadata: Option<String>,
    /// Submitted input values keyed by element `action_id`.
    pub values: BTreeMap<String, String>,
}

impl ViewSubmissionEvent {
    pub fn value(&self, action_id: &str) -> Option<&str> {
        self.values.get(action_id).map(String::as_str).filter(|value| !value.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct RawSlashCommand {
    command: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    channel_id: String,
    user_id: String,
    #[serde(default)]
    trigger_id: String,
}

#[derive(Deserialize)]
struct RawIdRef {
    id: String,
}

#[derive(Deserialize)]
struct RawMessageRef {
    ts: String,
}

#[derive(Deserialize)]
struct RawAction {
    action_id: String,
    value: Option<String>,
}

#[derive(Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    kind: String,
    user: Option<RawIdRef>,
    channel: Option<RawIdRef>,
    message: Option<RawMessageRef>,
    trigger_id: Option<String>,
    #[serde(default)]
    actions: Vec<RawAction>,
    view: Option<RawView>,
}

#[derive(Deserialize)]
struct RawView {
    callback_id: String,
    private_metadata: Option<String>,
    #[serde(default)]
    state: RawViewState,
}

#[derive(Default, Deserialize)]
struct RawViewState {
    #[serde(default)]
    values: HashMap<String, HashMap<String, RawInputValue>>,
}

#[derive(Deserialize)]
struct RawInputValue {
    value: Option<String>,
    selected_date: Option<String>,
}

/// Parses one Socket Mode frame. Frames without an `envelope_id` (`hello`,
/// `disconnect`) are not envelopes and yield `None`.
pub fn parse_envelope(frame: &Value) -> Option<SlackEnvelope> {
    let raw = RawEnvelope::deserialize(frame).ok()?;
    let envelope_id = raw.envelope_id?;

    let event = match raw.kind.as_str() {
        "slash_commands" => parse_slash_command(&envelope_id, raw.payload),
        "interactive" => parse_interaction(raw.payload),
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Some(SlackEnvelope { envelope_id, event })
}

fn parse_slash_command(envelope_id: &str, payload: Value) -> SlackEvent {
    match RawSlashCommand::deserialize(payload) {
        Ok(raw) => SlackEvent::SlashCommand(SlashCommandPayload {
            command: raw.command,
            text: raw.text,
            channel_id: raw.channel_id,
            user_id: raw.user_id,
            trigger_id: raw.trigger_id,
            request_id: envelope_id.to_owned(),
        }),
        Err(_) => SlackEvent::Unsupported { event_type: "slash_commands.malformed".to_owned() },
    }
}

fn parse_interaction(payload: Value) -> SlackEvent {
    let Ok(raw) = RawInteraction::deserialize(payload) else {
        return SlackEvent::Unsupported { event_type: "interactive.malformed".to_owned() };
    };
    let user_id = raw.user.map(|user| user.id);

    match raw.kind.as_str() {
        "block_actions" => {
            let Some(action) = raw.actions.into_iter().next() else {
                return SlackEvent::Unsupported { event_type: "block_actions.empty".to_owned() };
            };
            SlackEvent::BlockAction(BlockActionEvent {
                channel_id: raw.channel.map(|channel| channel.id),
                message_ts: raw.message.map(|message| message.ts),
                user_id,
                action_id: action.action_id,
                value: action.value,
                trigger_id: raw.trigger_id,
            })
        }
        "view_submission" => {
            let Some(view) = raw.view else {
                return SlackEvent::Unsupported { event_type: "view_submission.empty".to_owned() };
            };
            let values = view
                .state
                .values
                .into_values()
                .flat_map(|inputs| inputs.into_iter())
                .filter_map(|(action_id, input)| {
                    input.value.or(input.selected_date).map(|value| (action_id, value))
                })
                .collect();
            SlackEvent::ViewSubmission(ViewSubmissionEvent {
                user_id,
                callback_id: view.callback_id,
                private_metadata: view.private_metadata.filter(|metadata| !metadata.is_empty()),
                values,
            })
        }
        other => SlackEvent::Unsupported { event_type: format!("interactive.{other}") },
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("event service failed: {0}")]
    Service(#[from] ApplicationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Turns a failed operation into the private reply the user sees.
///
/// Validation and authorization problems are expected and logged at info;
/// anything else is logged at error with the correlation id.
fn failure_reply(error: &ApplicationError, ctx: &EventContext) -> HandlerResult {
    if error.is_user_error() {
        info!(
            event_name = "ingress.slack.rejected",
            correlation_id = %ctx.correlation_id,
            error = %error,
            "event rejected"
        );
        return HandlerResult::Responded(blocks::rejection_message(&error.user_message(), None));
    }

    error!(
        event_name = "ingress.slack.failed",
        correlation_id = %ctx.correlation_id,
        error = %error,
        "event handling failed"
    );
    HandlerResult::Responded(blocks::error_message(&error.user_message(), &ctx.correlation_id))
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: MusterCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: MusterCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match self.router.route(payload.clone()).await {
            Ok(Some(message)) => Ok(HandlerResult::Responded(message)),
            Ok(None) => Ok(HandlerResult::Processed),
            Err(CommandRouteError::Service(error)) => Ok(failure_reply(&error, ctx)),
        }
    }
}

#[async_trait]
pub trait BlockActionService: Send + Sync {
    async fn handle_block_action(
        &self,
        event: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, ApplicationError>;
}

pub struct BlockActionHandler<S> {
    service: S,
}

impl<S> BlockActionHandler<S>
where
    S: BlockActionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: BlockActionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(match self.service.handle_block_action(event, ctx).await {
            Ok(Some(message)) => HandlerResult::Responded(message),
            Ok(None) => HandlerResult::Processed,
            Err(error) => failure_reply(&error, ctx),
        })
    }
}

#[async_trait]
pub trait ViewSubmissionService: Send + Sync {
    async fn handle_view_submission(
        &self,
        event: &ViewSubmissionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, ApplicationError>;
}

pub struct ViewSubmissionHandler<S> {
    service: S,
}

impl<S> ViewSubmissionHandler<S>
where
    S: ViewSubmissionService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ViewSubmissionHandler<S>
where
    S: ViewSubmissionService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(match self.service.handle_view_submission(event, ctx).await {
            Ok(Some(message)) => HandlerResult::Responded(message),
            Ok(None) => HandlerResult::Processed,
            Err(error) => failure_reply(&error, ctx),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use muster_core::errors::{ApplicationError, DomainError};

    use super::{
        parse_envelope, BlockActionEvent, BlockActionHandler, BlockActionService, EventContext,
        EventDispatcher, HandlerResult, ReplyTarget, SlackEnvelope, SlackEvent,
        SlashCommandHandler,
    };
    use crate::blocks::MessageTemplate;
    use crate::commands::tests::{payload, RecordingCommandService};

    struct FailingActions(ApplicationError);

    #[async_trait]
    impl BlockActionService for FailingActions {
        async fn handle_block_action(
            &self,
            _event: &BlockActionEvent,
            _ctx: &EventContext,
        ) -> Result<Option<MessageTemplate>, ApplicationError> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn parses_slash_command_envelope() {
        let frame = json!({
            "envelope_id": "env-1",
            "type": "slash_commands",
            "payload": {
                "command": "/holiday",
                "text": "2024-07-04 Independence Day",
                "channel_id": "C1",
                "user_id": "U1",
                "trigger_id": "t-1"
            }
        });

        let envelope = parse_envelope(&frame).expect("envelope");
        let SlackEvent::SlashCommand(command) = envelope.event else {
            panic!("expected slash command");
        };
        assert_eq!(command.command, "/holiday");
        assert_eq!(command.request_id, "env-1");
    }

    #[test]
    fn parses_block_action_and_reply_target() {
        let frame = json!({
            "envelope_id": "env-2",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "user": { "id": "U2" },
                "channel": { "id": "C9" },
                "message": { "ts": "1719900000.000100" },
                "trigger_id": "t-2",
                "actions": [{ "action_id": "checkin.late.v1", "value": "late" }]
            }
        });

        let envelope = parse_envelope(&frame).expect("envelope");
        assert_eq!(
            envelope.event.reply_target(),
            Some(ReplyTarget { channel_id: Some("C9".to_owned()), user_id: "U2".to_owned() })
        );
        let SlackEvent::BlockAction(action) = envelope.event else {
            panic!("expected block action");
        };
        assert_eq!(action.action_id, "checkin.late.v1");
        assert_eq!(action.message_ts.as_deref(), Some("1719900000.000100"));
    }

    #[test]
    fn parses_view_submission_values_by_action_id() {
        let frame = json!({
            "envelope_id": "env-3",
            "type": "interactive",
            "payload": {
                "type": "view_submission",
                "user": { "id": "U3" },
                "view": {
                    "callback_id": "leave.modal.v1",
                    "private_metadata": "",
                    "state": { "values": {
                        "leave.start.block.v1": { "leave.start_date.v1": { "type": "datepicker", "selected_date": "2024-07-08" } },
                        "leave.end.block.v1": { "leave.end_date.v1": { "type": "datepicker", "selected_date": "2024-07-12" } },
                        "leave.note.block.v1": { "leave.note.v1": { "type": "plain_text_input", "value": null } }
                    } }
                }
            }
        });

        let envelope = parse_envelope(&frame).expect("envelope");
        let SlackEvent::ViewSubmission(view) = envelope.event else {
            panic!("expected view submission");
        };
        assert_eq!(view.value("leave.start_date.v1"), Some("2024-07-08"));
        assert_eq!(view.value("leave.end_date.v1"), Some("2024-07-12"));
        assert_eq!(view.value("leave.note.v1"), None);
        assert_eq!(view.private_metadata, None);
    }

    #[test]
    fn control_frames_are_not_envelopes() {
        assert!(parse_envelope(&json!({ "type": "hello", "num_connections": 1 })).is_none());
        assert!(parse_envelope(&json!({ "type": "disconnect", "reason": "refresh_requested" }))
            .is_none());
    }

    #[test]
    fn unknown_envelope_types_are_unsupported() {
        let envelope =
            parse_envelope(&json!({ "envelope_id": "env-4", "type": "events_api", "payload": {} }))
                .expect("envelope");
        assert_eq!(envelope.event, SlackEvent::Unsupported { event_type: "events_api".to_owned() });
    }

    #[tokio::test]
    async fn dispatcher_routes_slash_commands() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SlashCommandHandler::new(RecordingCommandService::default()));
        let envelope = SlackEnvelope {
            envelope_id: "env-5".to_owned(),
            event: SlackEvent::SlashCommand(payload("/help", "", "U1")),
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert!(matches!(result, HandlerResult::Responded(_)));
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let envelope = SlackEnvelope {
            envelope_id: "env-6".to_owned(),
            event: SlackEvent::Unsupported { event_type: "events_api".to_owned() },
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[tokio::test]
    async fn failed_actions_still_reply_privately() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(BlockActionHandler::new(FailingActions(
            ApplicationError::Domain(DomainError::Validation("details are required".to_owned())),
        )));
        let envelope = SlackEnvelope {
            envelope_id: "env-7".to_owned(),
            event: SlackEvent::BlockAction(BlockActionEvent {
                channel_id: Some("C1".to_owned()),
                message_ts: None,
                user_id: Some("U1".to_owned()),
                action_id: "checkin.normal.v1".to_owned(),
                value: None,
                trigger_id: None,
            }),
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        let HandlerResult::Responded(message) = result else {
            panic!("expected a private reply");
        };
        assert!(message.fallback_text.contains("details are required"));
    }
}
