use crate::api::responses::{
    HealthErrorCode, HealthErrorResponse, HealthStatus, HealthSuccessResponse,
    SnapshotErrorCode, SnapshotErrorResponse, SnapshotSuccessResponse, StatsSuccessResponse,
};
use crate::engine::Engine;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// A snapshot older than this many tick intervals reports degraded health.
const STALE_TICKS: i64 = 3;

pub enum SnapshotResponse {
    Success(SnapshotSuccessResponse),
    Error {
        status: StatusCode,
        body: SnapshotErrorResponse,
    },
}

impl IntoResponse for SnapshotResponse {
    fn into_response(self) -> Response {
        match self {
            SnapshotResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            SnapshotResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_snapshot(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    build_snapshot_response(&engine)
}

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    build_health_response(&engine, OffsetDateTime::now_utc())
}

pub async fn get_stats(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    build_stats_response(&engine, OffsetDateTime::now_utc())
}

fn build_snapshot_response(engine: &Engine) -> SnapshotResponse {
    let Some(snapshot) = engine.latest() else {
        return no_data_response(OffsetDateTime::now_utc());
    };

    match format_timestamp(snapshot.generated_at) {
        Ok(formatted) => {
            SnapshotResponse::Success(SnapshotSuccessResponse::from_snapshot(&snapshot, formatted))
        }
        Err(_) => snapshot_internal_error("timestamp formatting failure"),
    }
}

fn no_data_response(now: OffsetDateTime) -> SnapshotResponse {
    match format_timestamp(now) {
        Ok(formatted) => SnapshotResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: SnapshotErrorResponse {
                error_code: SnapshotErrorCode::NoData,
                error_message: "No snapshot published yet".to_string(),
                timestamp: formatted,
            },
        },
        Err(_) => snapshot_internal_error("timestamp formatting failure"),
    }
}

fn snapshot_internal_error(message: &str) -> SnapshotResponse {
    error!(message = message, "Internal error while handling /api/snapshot");
    SnapshotResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: SnapshotErrorResponse {
            error_code: SnapshotErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}

fn build_health_response(engine: &Engine, now: OffsetDateTime) -> HealthResponse {
    let status = derive_health_status(engine, now);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return health_internal_error("timestamp formatting failure");
        }
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse { status, timestamp },
    }
}

fn derive_health_status(engine: &Engine, now: OffsetDateTime) -> HealthStatus {
    let Some(snapshot) = engine.latest() else {
        return HealthStatus::Ko;
    };

    let stale_after = engine.settings().tick_interval.as_secs() as i64 * STALE_TICKS;
    if (now - snapshot.generated_at).whole_seconds() > stale_after {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

fn health_internal_error(message: &str) -> HealthResponse {
    error!(message = message, "Internal error while handling /api/health");
    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}

fn build_stats_response(engine: &Engine, now: OffsetDateTime) -> Response {
    let timestamp = format_timestamp(now).unwrap_or_else(|_| fallback_timestamp());
    let body = StatsSuccessResponse {
        counters: engine.counters().totals(),
        tracked_windows: engine.tracked_keys(),
        timestamp,
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    timestamp.format(&Rfc3339)
}

fn fallback_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
