use std::sync::Arc;
use std::time::Duration;

use muster_core::calendar::format_time_of_day;
use muster_core::config::{AppConfig, ConfigError, LoadOptions};
use muster_core::{ScheduleTimes, SettingKey, UserId};
use muster_db::repositories::RepositoryError;
use muster_db::{connect_with_settings, migrations, DbPool};
use muster_slack::api::{ApiError, SlackApi, WebApiClient};
use muster_slack::events::{
    BlockActionHandler, EventDispatcher, SlashCommandHandler, ViewSubmissionHandler,
};
use muster_slack::socket::{EphemeralResponder, ReconnectPolicy, SocketModeRunner};
use muster_slack::transport::WebSocketTransport;
use thiserror::Error;
use tracing::info;

use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::services::MusterServices;
use crate::stores::Stores;
use crate::workflow::CheckInWorkflow;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub scheduler: Scheduler,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("seeding initial settings failed: {0}")]
    Seed(#[source] RepositoryError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] ApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let defaults = ScheduleTimes::new(
        config.schedule.checkin()?,
        config.schedule.reminder()?,
        config.schedule.summary()?,
    )
    .map_err(|error| ConfigError::Validation(error.to_string()))?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let stores = Stores::sqlite(db_pool.clone());
    seed(&stores, &config, &defaults).await.map_err(BootstrapError::Seed)?;

    let api: Arc<dyn SlackApi> = Arc::new(
        WebApiClient::new(
            config.slack.api_base_url.clone(),
            config.slack.bot_token.clone(),
            config.slack.app_token.clone(),
            Duration::from_secs(config.slack.request_timeout_secs),
        )
        .map_err(BootstrapError::SlackClient)?,
    );

    let workflow = Arc::new(CheckInWorkflow::new(
        api.clone(),
        stores.clone(),
        config.slack.channel_id.clone(),
        config.slack.reporting_user_id.clone(),
    ));
    let registry = Arc::new(Registry::new(stores.clone()));
    let services =
        MusterServices::new(api.clone(), stores.clone(), workflow.clone(), registry, defaults);

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(services.clone()));
    dispatcher.register(BlockActionHandler::new(services.clone()));
    dispatcher.register(ViewSubmissionHandler::new(services));

    let slack_runner = SocketModeRunner::new(
        Arc::new(WebSocketTransport::new(api.clone())),
        dispatcher,
        Arc::new(EphemeralResponder::new(api, config.slack.channel_id.clone())),
        ReconnectPolicy::default(),
    );
    let scheduler = Scheduler::new(workflow, stores.settings.clone(), defaults);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        channel_id = %config.slack.channel_id,
        "application wired"
    );
    Ok(Application { config, db_pool, scheduler, slack_runner })
}

/// First-run rows: schedule times from config and the reporting user as admin.
/// Stored values win over config on later starts.
async fn seed(
    stores: &Stores,
    config: &AppConfig,
    defaults: &ScheduleTimes,
) -> Result<(), RepositoryError> {
    let values: Vec<(&str, String)> = SettingKey::ALL
        .into_iter()
        .map(|key| (key.as_str(), format_time_of_day(defaults.get(key))))
        .collect();
    let pairs: Vec<(&str, &str)> =
        values.iter().map(|(key, value)| (*key, value.as_str())).collect();
    stores.settings.seed(&pairs).await?;

    if let Some(reporting_user_id) = &config.slack.reporting_user_id {
        stores.users.set_admin(&UserId::new(reporting_user_id.clone()), true).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use muster_core::config::{ConfigOverrides, LoadOptions};
    use muster_core::UserId;
    use muster_db::repositories::{
        SettingsRepository, SqlSettingsRepository, SqlUserRepository, UserRepository,
    };
    use tempfile::TempDir;

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                slack_app_token: Some("invalid-token".to_string()),
                slack_bot_token: Some("xoxb-valid".to_string()),
                slack_channel_id: Some("C-MUSTER".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_creates_database_and_seeds_first_run_rows() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("muster.db");

        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!("sqlite://{}", path.display())),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                slack_channel_id: Some("C-MUSTER".to_string()),
                slack_reporting_user_id: Some("U0BOSS".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        assert!(path.exists(), "database file should be created on first run");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('users', 'check_ins', 'leave_entries', 'holidays')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        let settings =
            SqlSettingsRepository::new(app.db_pool.clone()).list().await.expect("settings");
        assert!(settings.contains(&("reminder_time".to_string(), "10:00".to_string())));
        let users = SqlUserRepository::new(app.db_pool.clone());
        assert!(users.is_admin(&UserId::new("U0BOSS")).await.expect("admin flag"));

        app.db_pool.close().await;
    }
}
