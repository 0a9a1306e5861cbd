use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use muster_db::{connect_with_settings, migrations, DbPool};
use muster_slack::api::{ApiError, PostMessage, SlackApi, SlackUserInfo};
use muster_slack::blocks::{MessageTemplate, ModalView};

use crate::stores::Stores;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub async fn pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

pub async fn stores() -> Stores {
    Stores::sqlite(pool().await)
}

/// In-memory Slack: records every call, hands out increasing message ts values
/// and fails deliveries to the channels listed in `failing`.
#[derive(Default)]
pub struct RecordingSlackApi {
    pub members: Vec<String>,
    pub bots: HashSet<String>,
    pub names: HashMap<String, String>,
    pub failing: HashSet<String>,
    pub roster_unavailable: bool,
    posts: Mutex<Vec<PostMessage>>,
    views: Mutex<Vec<(String, ModalView)>>,
    next_ts: AtomicU64,
}

impl RecordingSlackApi {
    pub fn with_members(members: &[&str]) -> Self {
        Self { members: members.iter().map(|id| (*id).to_owned()).collect(), ..Self::default() }
    }

    pub fn failing_for(mut self, channel: &str) -> Self {
        self.failing.insert(channel.to_owned());
        self
    }

    pub fn without_roster(mut self) -> Self {
        self.roster_unavailable = true;
        self
    }

    pub fn posts(&self) -> Vec<PostMessage> {
        self.posts.lock().expect("posts lock").clone()
    }

    pub fn posts_to(&self, channel: &str) -> Vec<PostMessage> {
        self.posts().into_iter().filter(|post| post.channel == channel).collect()
    }

    pub fn views(&self) -> Vec<(String, ModalView)> {
        self.views.lock().expect("views lock").clone()
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn post_message(&self, request: PostMessage) -> Result<String, ApiError> {
        if self.failing.contains(&request.channel) {
            return Err(ApiError::Slack {
                method: "chat.postMessage".to_owned(),
                error: "channel_not_found".to_owned(),
            });
        }
        let ts = self.next_ts.fetch_add(1, Ordering::SeqCst) + 1;
        self.posts.lock().expect("posts lock").push(request);
        Ok(format!("1720000000.{ts:06}"))
    }

    async fn post_ephemeral(
        &self,
        _channel: &str,
        _user_id: &str,
        _message: &MessageTemplate,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), ApiError> {
        self.views.lock().expect("views lock").push((trigger_id.to_owned(), view.clone()));
        Ok(())
    }

    async fn channel_members(&self, _channel: &str) -> Result<Vec<String>, ApiError> {
        if self.roster_unavailable {
            return Err(ApiError::Http {
                method: "conversations.members".to_owned(),
                message: "connection reset".to_owned(),
            });
        }
        Ok(self.members.clone())
    }

    async fn user_info(&self, user_id: &str) -> Result<SlackUserInfo, ApiError> {
        Ok(SlackUserInfo {
            id: user_id.to_owned(),
            display_name: self.names.get(user_id).cloned().unwrap_or_else(|| user_id.to_lowercase()),
            is_bot: self.bots.contains(user_id),
            deleted: false,
        })
    }

    async fn open_socket_url(&self) -> Result<String, ApiError> {
        Ok("wss://example.invalid/link".to_owned())
    }
}

pub fn api(members: &[&str]) -> Arc<RecordingSlackApi> {
    Arc::new(RecordingSlackApi::with_members(members))
}
