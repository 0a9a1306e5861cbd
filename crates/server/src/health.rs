use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use muster_db::repositories::{SettingsRepository, SqlSettingsRepository};
use muster_db::DbPool;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    socket_connected: Arc<AtomicBool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub socket: HealthCheck,
    /// Stored job times; empty when the database is unreachable.
    pub schedule: Vec<(String, String)>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, socket_connected: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { db_pool, socket_connected })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    socket_connected: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool, socket_connected)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let socket = socket_check(&state.socket_connected);
    let database_ready = database.status == "ready";
    let ready = database_ready && socket.status == "ready";
    let schedule = if database_ready { stored_schedule(&state.db_pool).await } else { Vec::new() };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        socket,
        schedule,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn socket_check(connected: &AtomicBool) -> HealthCheck {
    if connected.load(Ordering::Acquire) {
        HealthCheck { status: "ready", detail: "socket mode connected".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "socket mode not connected".to_string() }
    }
}

async fn stored_schedule(pool: &DbPool) -> Vec<(String, String)> {
    match SqlSettingsRepository::new(pool.clone()).list().await {
        Ok(schedule) => schedule,
        Err(error) => {
            warn!(
                event_name = "system.health.schedule_unreadable",
                correlation_id = "health",
                error = %error,
                "could not read stored schedule"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use muster_db::repositories::SettingsRepository;

    use crate::health::{health, HealthState};
    use crate::stores::Stores;
    use crate::test_support::pool;

    fn state(db_pool: muster_db::DbPool, connected: bool) -> State<HealthState> {
        State(HealthState { db_pool, socket_connected: Arc::new(AtomicBool::new(connected)) })
    }

    #[tokio::test]
    async fn health_reports_ready_with_stored_schedule() {
        let pool = pool().await;
        let stores = Stores::sqlite(pool.clone());
        stores.settings.set("checkin_time", "08:15").await.expect("store");

        let (status, Json(payload)) = health(state(pool.clone(), true)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.socket.status, "ready");
        assert_eq!(payload.schedule, vec![("checkin_time".to_string(), "08:15".to_string())]);

        pool.close().await;
    }

    #[tokio::test]
    async fn health_is_degraded_while_socket_is_down() {
        let pool = pool().await;

        let (status, Json(payload)) = health(state(pool.clone(), false)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.socket.status, "degraded");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(payload)) = health(state(pool, true)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert!(payload.schedule.is_empty());
    }
}
