//! # API Handlers
//!
//! Axum handlers for querying, pushing and describing telemetry.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vg_core::{fields, AlertRecord, EntityKind, FieldDescriptor, LogRecord};

use crate::error::{ApiError, QueryError};
use crate::query::{Page, QueryParams};
use crate::{ingest, simulate, AppState};

// =============================================================================
// Query
// =============================================================================

pub async fn query_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Page<AlertRecord>>, QueryError> {
    let req = params.into_request(state.engine.settings())?;
    let page = state.engine.query(&*state.alerts, &req, Utc::now()).await?;
    Ok(Json(page))
}

pub async fn query_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Page<LogRecord>>, QueryError> {
    let req = params.into_request(state.engine.settings())?;
    let page = state.engine.query(&*state.logs, &req, Utc::now()).await?;
    Ok(Json(page))
}

// =============================================================================
// Ingestion
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PushResult {
    pub ok: bool,
    pub inserted: usize,
}

pub async fn push_alerts(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<PushResult>, ApiError> {
    let alerts = ingest::alerts_from_body(body, Utc::now())?;
    let mut inserted = 0;
    for alert in alerts {
        state.alerts.append(alert).await?;
        inserted += 1;
    }
    tracing::info!(inserted, "alerts pushed");
    Ok(Json(PushResult { ok: true, inserted }))
}

pub async fn push_logs(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<PushResult>, ApiError> {
    let logs = ingest::logs_from_body(body)?;
    let mut inserted = 0;
    for log in logs {
        state.logs.append(log).await?;
        inserted += 1;
    }
    tracing::info!(inserted, "logs pushed");
    Ok(Json(PushResult { ok: true, inserted }))
}

// =============================================================================
// Field Registry
// =============================================================================

#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub entity: EntityKind,
    pub fields: &'static [FieldDescriptor],
    pub example: &'static str,
}

pub async fn list_fields(Path(entity): Path<String>) -> Result<Json<FieldsResponse>, ApiError> {
    let entity: EntityKind = entity.parse().map_err(ApiError::NotFound)?;
    let example = match entity {
        EntityKind::Alert => "priority<3 action=block msg contains exploit",
        EntityKind::Log => "proto=udp service=dns dst.port=53",
    };
    Ok(Json(FieldsResponse {
        entity,
        fields: fields::fields(entity),
        example,
    }))
}

// =============================================================================
// Status & Simulation
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub alerts_stored: usize,
    pub logs_stored: usize,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<SystemStatus>, ApiError> {
    let alerts_stored = state.engine.count(&*state.alerts).await?;
    let logs_stored = state.engine.count(&*state.logs).await?;
    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        alerts_stored,
        logs_stored,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateParams {
    pub entity: Option<EntityKind>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SimulateResult {
    pub entity: EntityKind,
    pub created: usize,
}

pub async fn simulate(
    State(state): State<Arc<AppState>>,
    Json(params): Json<SimulateParams>,
) -> Result<Json<SimulateResult>, ApiError> {
    let entity = params.entity.unwrap_or(EntityKind::Alert);
    let count = params.count.unwrap_or(100).min(10_000);

    // ThreadRng is not Send; build the batch before the first await.
    let now = Utc::now();
    let created = match entity {
        EntityKind::Alert => {
            let batch: Vec<AlertRecord> = {
                let mut rng = rand::thread_rng();
                (0..count).map(|_| simulate::random_alert(&mut rng, now)).collect()
            };
            for alert in batch {
                state.alerts.append(alert).await?;
            }
            count
        }
        EntityKind::Log => {
            let batch: Vec<LogRecord> = {
                let mut rng = rand::thread_rng();
                (0..count).map(|_| simulate::random_log(&mut rng, now)).collect()
            };
            for log in batch {
                state.logs.append(log).await?;
            }
            count
        }
    };

    tracing::info!(%entity, created, "simulated records appended");
    Ok(Json(SimulateResult { entity, created }))
}
