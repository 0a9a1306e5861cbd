use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::blocks::{MessageTemplate, ModalView};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("slack request `{method}` failed: {message}")]
    Http { method: String, message: String },
    #[error("slack method `{method}` returned error `{error}`")]
    Slack { method: String, error: String },
    #[error("could not decode `{method}` response: {message}")]
    Decode { method: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostMessage {
    pub channel: String,
    pub message: MessageTemplate,
    pub thread_ts: Option<String>,
}

impl PostMessage {
    pub fn new(channel: impl Into<String>, message: MessageTemplate) -> Self {
        Self { channel: channel.into(), message, thread_ts: None }
    }

    pub fn in_thread(mut self, thread_ts: Option<String>) -> Self {
        self.thread_ts = thread_ts;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackUserInfo {
    pub id: String,
    pub display_name: String,
    pub is_bot: bool,
    pub deleted: bool,
}

/// The Slack Web API calls the bot makes.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Returns the `ts` of the posted message. A user id as `channel` sends a DM.
    async fn post_message(&self, request: PostMessage) -> Result<String, ApiError>;
    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), ApiError>;
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), ApiError>;
    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, ApiError>;
    async fn user_info(&self, user_id: &str) -> Result<SlackUserInfo, ApiError>;
    /// `apps.connections.open`: a fresh Socket Mode WebSocket URL.
    async fn open_socket_url(&self) -> Result<String, ApiError>;
}

pub struct WebApiClient {
    client: Client,
    base_url: String,
    bot_token: SecretString,
    app_token: SecretString,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: Map<String, Value>,
}

#[derive(Deserialize)]
struct MembersPage {
    #[serde(default)]
    members: Vec<String>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct UserInfoBody {
    user: RawUser,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: RawProfile,
}

#[derive(Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    real_name: String,
}

enum Token {
    Bot,
    App,
}

/// Slack only takes JSON bodies on write methods; the rest want form encoding.
fn accepts_json(method: &str) -> bool {
    matches!(method, "chat.postMessage" | "chat.postEphemeral" | "views.open")
}

impl WebApiClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        app_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| ApiError::Http {
            method: "client.build".to_owned(),
            message: error.to_string(),
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            bot_token,
            app_token,
        })
    }

    async fn call(&self, method: &str, token: Token, payload: Value) -> Result<Value, ApiError> {
        let token = match token {
            Token::Bot => self.bot_token.expose_secret(),
            Token::App => self.app_token.expose_secret(),
        };
        let url = format!("{}/{method}", self.base_url);

        let request = self.client.post(&url).bearer_auth(token);
        let request =
            if accepts_json(method) { request.json(&payload) } else { request.form(&payload) };
        let response = request
            .send()
            .await
            .map_err(|error| ApiError::Http { method: method.to_owned(), message: error.to_string() })?;

        if !response.status().is_success() {
            return Err(ApiError::Http {
                method: method.to_owned(),
                message: format!("status {}", response.status()),
            });
        }

        let envelope: ApiEnvelope = response.json().await.map_err(|error| ApiError::Decode {
            method: method.to_owned(),
            message: error.to_string(),
        })?;

        if !envelope.ok {
            return Err(ApiError::Slack {
                method: method.to_owned(),
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }

        debug!(event_name = "egress.slack.api_call", method, "slack api call succeeded");
        Ok(Value::Object(envelope.body))
    }

    fn decode<T: for<'de> Deserialize<'de>>(method: &str, body: Value) -> Result<T, ApiError> {
        serde_json::from_value(body)
            .map_err(|error| ApiError::Decode { method: method.to_owned(), message: error.to_string() })
    }
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn post_message(&self, request: PostMessage) -> Result<String, ApiError> {
        let mut payload = json!({
            "channel": request.channel,
            "text": request.message.fallback_text,
            "blocks": request.message.blocks,
        });
        if let Some(thread_ts) = request.thread_ts {
            payload["thread_ts"] = Value::String(thread_ts);
        }

        let body = self.call("chat.postMessage", Token::Bot, payload).await?;
        body.get("ts").and_then(Value::as_str).map(str::to_owned).ok_or_else(|| ApiError::Decode {
            method: "chat.postMessage".to_owned(),
            message: "response has no `ts`".to_owned(),
        })
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), ApiError> {
        let payload = json!({
            "channel": channel,
            "user": user_id,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        self.call("chat.postEphemeral", Token::Bot, payload).await.map(|_| ())
    }

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), ApiError> {
        let payload = json!({ "trigger_id": trigger_id, "view": view });
        self.call("views.open", Token::Bot, payload).await.map(|_| ())
    }

    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, ApiError> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({ "channel": channel, "limit": 200 });
            if let Some(cursor) = &cursor {
                payload["cursor"] = Value::String(cursor.clone());
            }

            let body = self.call("conversations.members", Token::Bot, payload).await?;
            let page: MembersPage = Self::decode("conversations.members", body)?;
            members.extend(page.members);

            cursor = page
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|next| !next.is_empty());
            if cursor.is_none() {
                return Ok(members);
            }
        }
    }

    async fn user_info(&self, user_id: &str) -> Result<SlackUserInfo, ApiError> {
        let body = self.call("users.info", Token::Bot, json!({ "user": user_id })).await?;
        let UserInfoBody { user } = Self::decode("users.info", body)?;

        let display_name = [user.profile.display_name, user.profile.real_name, user.name]
            .into_iter()
            .find(|name| !name.trim().is_empty())
            .unwrap_or_default();

        Ok(SlackUserInfo { id: user.id, display_name, is_bot: user.is_bot, deleted: user.deleted })
    }

    async fn open_socket_url(&self) -> Result<String, ApiError> {
        let body = self.call("apps.connections.open", Token::App, json!({})).await?;
        body.get("url").and_then(Value::as_str).map(str::to_owned).ok_or_else(|| ApiError::Decode {
            method: "apps.connections.open".to_owned(),
            message: "response has no `url`".to_owned(),
        })
    }
}
