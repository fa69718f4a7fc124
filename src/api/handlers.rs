use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::alerts::{AlertEngine, EngineError, EngineStats};
use crate::clock::Clock;
use crate::data::{Sample, Value};
use crate::storage::{CachedIntegrationStore, IntegrationCacheStats};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub clock: Arc<dyn Clock>,
    pub integrations: Arc<CachedIntegrationStore>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Evaluate
// ============================================================================

#[derive(Deserialize)]
pub struct SampleRequest {
    /// Unix millis; defaults to the server clock
    pub timestamp: Option<i64>,
    pub value: serde_json::Value,
    /// Hold the response until every delivery has finished
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize)]
pub struct AlertResult {
    pub alert_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize, Default)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Serialize)]
pub struct EvaluateResponse {
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<&'static str>,
    pub alerts: Vec<AlertResult>,
    pub fired: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliveries: Option<DeliverySummary>,
}

pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
    Json(request): Json<SampleRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    if dataset_id.trim().is_empty() {
        return Err(ApiError::BadRequest("dataset id is empty".to_string()));
    }

    let timestamp = request
        .timestamp
        .unwrap_or_else(|| state.clock.now_millis());
    let sample = Sample::new(timestamp, Value::from_json(&request.value));

    let report = state.engine.evaluate(&dataset_id, sample).await?;

    let alerts: Vec<AlertResult> = report
        .outcomes
        .iter()
        .map(|o| AlertResult {
            alert_id: o.alert_id.clone(),
            status: o.status.as_str(),
            detail: o.status.detail(),
        })
        .collect();
    let skipped = report.skipped.map(|r| r.as_str());
    let fired = report.dispatches.len();

    let deliveries = if request.wait {
        let mut summary = DeliverySummary::default();
        for dispatch in report.wait_for_deliveries().await {
            summary.delivered += dispatch.delivered();
            summary.failed += dispatch.failed();
            summary.skipped += dispatch.skipped();
        }
        Some(summary)
    } else {
        None
    };

    Ok(Json(EvaluateResponse {
        dataset_id,
        skipped,
        alerts,
        fired,
        deliveries,
    }))
}

// ============================================================================
// Windows
// ============================================================================

#[derive(Serialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<String>,
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<DatasetsResponse> {
    let mut datasets = state.engine.windows().datasets();
    datasets.sort();
    Json(DatasetsResponse { datasets })
}

#[derive(Serialize)]
pub struct WindowResponse {
    pub dataset_id: String,
    pub samples: Vec<Sample>,
}

pub async fn dataset_window(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<WindowResponse>, ApiError> {
    let window = state.engine.windows().window(&dataset_id);
    if window.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No samples for dataset {}",
            dataset_id
        )));
    }

    Ok(Json(WindowResponse {
        dataset_id,
        samples: window.to_vec(),
    }))
}

pub async fn drop_window(
    State(state): State<Arc<AppState>>,
    Path(dataset_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.engine.windows().remove(&dataset_id) {
        return Err(ApiError::NotFound(format!(
            "No samples for dataset {}",
            dataset_id
        )));
    }

    Ok(Json(serde_json::json!({ "dropped": dataset_id })))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub engine: EngineStats,
    pub integration_cache: IntegrationCacheStats,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        engine: state.engine.stats(),
        integration_cache: state.integrations.stats(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
