use std::sync::atomic::{AtomicBool, Ordering};
use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, SlackApi};
use crate::blocks::MessageTemplate;
use crate::events::{EventContext, EventDispatcher, HandlerResult, ReplyTarget, SlackEnvelope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Slack closes healthy sockets periodically; reconnect instead of returning.
    pub reconnect_on_close: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000, reconnect_on_close: true }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the server closed the connection.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Delivers a handler's reply to the user who triggered the event.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, target: &ReplyTarget, message: &MessageTemplate)
        -> Result<(), ApiError>;
}

/// Replies with `chat.postEphemeral`; events without a channel use the fallback channel.
pub struct EphemeralResponder {
    api: Arc<dyn SlackApi>,
    fallback_channel: String,
}

impl EphemeralResponder {
    pub fn new(api: Arc<dyn SlackApi>, fallback_channel: impl Into<String>) -> Self {
        Self { api, fallback_channel: fallback_channel.into() }
    }
}

#[async_trait]
impl Responder for EphemeralResponder {
    async fn respond(
        &self,
        target: &ReplyTarget,
        message: &MessageTemplate,
    ) -> Result<(), ApiError> {
        let channel = target.channel_id.as_deref().unwrap_or(&self.fallback_channel);
        self.api.post_ephemeral(channel, &target.user_id, message).await
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
    responder: Arc<dyn Responder>,
    reconnect_policy: ReconnectPolicy,
    connected: Arc<AtomicBool>,
}

enum PumpOutcome {
    Closed,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        responder: Arc<dyn Responder>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            dispatcher: Arc::new(dispatcher),
            responder,
            reconnect_policy,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a socket is open and being read.
    pub fn connection_status(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Runs until the socket closes with reconnects disabled, or until
    /// `max_retries` consecutive attempts fail. The retry count starts over
    /// after every successful connect.
    pub async fn start(&self) -> Result<()> {
        let mut in_flight = JoinSet::new();
        let result = self.run_connections(&mut in_flight).await;
        while in_flight.join_next().await.is_some() {}
        result
    }

    async fn run_connections(&self, in_flight: &mut JoinSet<()>) -> Result<()> {
        let mut attempt = 0;
        loop {
            let outcome = match self.transport.connect().await {
                Ok(()) => {
                    attempt = 0;
                    self.connected.store(true, Ordering::Release);
                    info!(
                        event_name = "ingress.slack.connected",
                        correlation_id = "socket",
                        "socket mode transport connected"
                    );
                    let outcome = self.pump(in_flight).await;
                    self.connected.store(false, Ordering::Release);
                    outcome
                }
                Err(error) => Err(error),
            };

            match outcome {
                Ok(PumpOutcome::Closed) => {
                    if !self.reconnect_policy.reconnect_on_close {
                        return Ok(());
                    }
                    info!(
                        event_name = "ingress.slack.reconnecting",
                        correlation_id = "socket",
                        "socket mode connection closed; reconnecting"
                    );
                    let delay = self.reconnect_policy.backoff(0);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        return Err(anyhow!(
                            "socket mode gave up after {} consecutive failures: {transport_error}",
                            attempt + 1
                        ));
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Reads envelopes, acknowledging each one before its handler runs on its own task.
    async fn pump(&self, in_flight: &mut JoinSet<()>) -> Result<PumpOutcome, TransportError> {
        loop {
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(correlation_id = "socket", "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(PumpOutcome::Closed);
            };
            let user_id = envelope.event.user_id().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id = %user_id,
                "received slack envelope"
            );

            // Slack retries anything not acknowledged within three seconds.
            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    user_id = %user_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    user_id = %user_id,
                    "acknowledged slack envelope"
                );
            }

            in_flight.spawn(handle_envelope(
                self.dispatcher.clone(),
                self.responder.clone(),
                envelope,
                user_id,
            ));
        }
    }
}

async fn handle_envelope(
    dispatcher: Arc<EventDispatcher>,
    responder: Arc<dyn Responder>,
    envelope: SlackEnvelope,
    user_id: String,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(message)) => {
            deliver_reply(responder.as_ref(), &envelope, &message, &context).await;
        }
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
        Err(error) => {
            warn!(
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                user_id = %user_id,
                error = %error,
                "event dispatch failed"
            );
        }
    }
}

async fn deliver_reply(
    responder: &dyn Responder,
    envelope: &SlackEnvelope,
    message: &MessageTemplate,
    context: &EventContext,
) {
    let Some(target) = envelope.event.reply_target() else {
        debug!(
            correlation_id = %context.correlation_id,
            "handler reply has no target user; dropping"
        );
        return;
    };

    if let Err(error) = responder.respond(&target, message).await {
        error!(
            event_name = "egress.slack.reply_failed",
            correlation_id = %context.correlation_id,
            user_id = %target.user_id,
            error = %error,
            "failed to deliver private reply"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use muster_core::errors::ApplicationError;
    use tokio::sync::Mutex;

    use super::{ReconnectPolicy, Responder, SocketModeRunner, SocketTransport, TransportError};
    use crate::api::ApiError;
    use crate::blocks::MessageTemplate;
    use crate::commands::tests::{payload, RecordingCommandService};
    use crate::events::{
        BlockActionEvent, BlockActionHandler, BlockActionService, EventContext, EventDispatcher,
        ReplyTarget, SlackEnvelope, SlackEvent, SlashCommandHandler,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            journal: Arc<Mutex<Vec<String>>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
                journal,
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            self.journal.lock().await.push(format!("ack:{envelope_id}"));
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct RecordingResponder {
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn respond(
            &self,
            target: &ReplyTarget,
            _message: &MessageTemplate,
        ) -> Result<(), ApiError> {
            self.journal.lock().await.push(format!("reply:{}", target.user_id));
            Ok(())
        }
    }

    /// Finishes the first click only once the envelope behind it has been acknowledged.
    struct WaitsForNextAck {
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BlockActionService for WaitsForNextAck {
        async fn handle_block_action(
            &self,
            _event: &BlockActionEvent,
            ctx: &EventContext,
        ) -> Result<Option<MessageTemplate>, ApplicationError> {
            if ctx.correlation_id == "env-1" {
                let waited = tokio::time::timeout(Duration::from_secs(1), async {
                    while !self.journal.lock().await.iter().any(|entry| entry == "ack:env-2") {
                        tokio::task::yield_now().await;
                    }
                })
                .await;
                self.journal.lock().await.push(format!("handled:env-1:{}", waited.is_ok()));
            }
            Ok(None)
        }
    }

    fn click(id: &str) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::BlockAction(BlockActionEvent {
                channel_id: Some("C1".to_owned()),
                message_ts: None,
                user_id: Some("U1".to_owned()),
                action_id: "checkin.normal.v1".to_owned(),
                value: None,
                trigger_id: None,
            }),
        }))
    }

    fn envelope(id: &str) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(Some(SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }))
    }

    fn reset() -> Result<Option<SlackEnvelope>, TransportError> {
        Err(TransportError::Receive("connection reset".to_owned()))
    }

    fn policy(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0, reconnect_on_close: false }
    }

    fn runner(
        transport: Arc<ScriptedTransport>,
        dispatcher: EventDispatcher,
        journal: Arc<Mutex<Vec<String>>>,
        retries: u32,
    ) -> SocketModeRunner {
        SocketModeRunner::new(
            transport,
            dispatcher,
            Arc::new(RecordingResponder { journal }),
            policy(retries),
        )
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
            journal.clone(),
        ));

        runner(transport.clone(), EventDispatcher::default(), journal, 2)
            .start()
            .await
            .expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported_to_the_caller() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            journal.clone(),
        ));

        let runner = runner(transport.clone(), EventDispatcher::default(), journal, 2);
        let result = runner.start().await;

        assert!(result.is_err(), "giving up must not look like a clean stop");
        assert_eq!(transport.connect_attempts().await, 3);
        assert!(!runner.connection_status().load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn successful_connect_resets_the_retry_budget() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                envelope("env-1"),
                reset(),
                envelope("env-2"),
                reset(),
                envelope("env-3"),
                reset(),
                envelope("env-late"),
                Ok(None),
            ],
            journal.clone(),
        ));

        runner(transport.clone(), EventDispatcher::default(), journal, 2)
            .start()
            .await
            .expect("separate drops should not exhaust retries");

        assert_eq!(transport.connect_attempts().await, 4);
        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2", "env-3", "env-late"]);
    }

    #[tokio::test]
    async fn acknowledges_before_replying_privately() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-help".to_owned(),
                    event: SlackEvent::SlashCommand(payload("/help", "", "U42")),
                })),
                Ok(None),
            ],
            journal.clone(),
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SlashCommandHandler::new(RecordingCommandService::default()));

        runner(transport, dispatcher, journal.clone(), 0).start().await.expect("runner");

        assert_eq!(*journal.lock().await, vec!["ack:env-help", "reply:U42"]);
    }

    #[tokio::test]
    async fn slow_handler_does_not_delay_the_next_ack() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![click("env-1"), click("env-2"), Ok(None)],
            journal.clone(),
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(BlockActionHandler::new(WaitsForNextAck { journal: journal.clone() }));

        runner(transport, dispatcher, journal.clone(), 0).start().await.expect("runner");

        assert!(journal.lock().await.contains(&"handled:env-1:true".to_owned()));
    }
}
