use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{JobId, JobState};
use super::orchestrator::{JobOrchestrator, JobQueryError, OrchestratorError};
use crate::error::AppError;
use crate::matching::{EmergencyDescriptor, EmergencyValidationError, GeoPoint};

/// Location used when an intake request carries none.
pub const DEFAULT_EMERGENCY_LOCATION: GeoPoint = GeoPoint::new(44.42, 26.10);
pub const DEFAULT_SEVERITY: u8 = 7;

/// Emergency intake payload as sent by dispatch clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    #[serde(default)]
    pub emergency_id: Option<String>,
    pub emergency_type: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub patient_data: Option<Value>,
}

impl EmergencyRequest {
    /// Applies intake defaults and validates the result.
    ///
    /// Severity falls back to `patientData.severity`, then to [`DEFAULT_SEVERITY`].
    pub fn into_descriptor(self) -> Result<EmergencyDescriptor, EmergencyValidationError> {
        let severity = self
            .severity
            .or_else(|| {
                self.patient_data
                    .as_ref()
                    .and_then(|patient| patient.get("severity"))
                    .and_then(Value::as_u64)
                    .and_then(|severity| u8::try_from(severity).ok())
            })
            .unwrap_or(DEFAULT_SEVERITY);

        EmergencyDescriptor::new(
            self.emergency_id,
            self.location.unwrap_or(DEFAULT_EMERGENCY_LOCATION),
            severity,
            self.emergency_type,
            self.patient_data,
        )
    }
}

/// HTTP endpoints for starting matching jobs and reading their progress.
pub fn job_router(orchestrator: Arc<JobOrchestrator>) -> Router {
    Router::new()
        .route("/api/v1/emergencies", post(start_handler))
        .route(
            "/api/v1/jobs/:job_id",
            get(status_handler).delete(cancel_handler),
        )
        .route("/api/v1/jobs/:job_id/result", get(result_handler))
        .route("/job/:job_id", get(legacy_job_handler))
        .with_state(orchestrator)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub(crate) async fn start_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Json(request): Json<EmergencyRequest>,
) -> Response {
    let emergency = match request.into_descriptor() {
        Ok(emergency) => emergency,
        Err(error) => return AppError::from(error).into_response(),
    };
    let emergency_id = emergency.emergency_id().to_string();

    match orchestrator.start_job(emergency).await {
        Ok(job_id) => {
            let state = orchestrator
                .job_status(&job_id)
                .map(|view| view.state)
                .unwrap_or(JobState::Submitted);
            let payload = json!({
                "job_id": job_id,
                "emergency_id": emergency_id,
                "state": state,
                "backend": orchestrator.backend(),
            });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Err(OrchestratorError::Submission { job_id, source }) => {
            let payload = json!({
                "error": source.to_string(),
                "job_id": job_id,
                "emergency_id": emergency_id,
            });
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
        Err(OrchestratorError::Registry(error)) => AppError::from(error).into_response(),
    }
}

pub(crate) async fn status_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Response {
    match orchestrator.job_status(&JobId(job_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => query_error_response(error),
    }
}

pub(crate) async fn result_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Response {
    match orchestrator.job_result(&JobId(job_id)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => query_error_response(error),
    }
}

fn query_error_response(error: JobQueryError) -> Response {
    let message = error.to_string();
    match error {
        JobQueryError::NotFound(_) => error_response(StatusCode::NOT_FOUND, message),
        JobQueryError::NotReady { id, state } => {
            let payload = json!({ "error": message, "job_id": id, "state": state });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        JobQueryError::JobFailed { id, state, detail } => {
            let status = match state {
                JobState::TimedOut => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            let payload = json!({
                "error": message,
                "job_id": id,
                "state": state,
                "detail": detail,
            });
            (status, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn cancel_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Response {
    let id = JobId(job_id);
    let Some(job) = orchestrator.job(&id) else {
        return query_error_response(JobQueryError::NotFound(id));
    };

    let cancelled = orchestrator.cancel(&id);
    let payload = json!({
        "job_id": id,
        "cancelled": cancelled,
        "state": job.state(),
    });
    (StatusCode::OK, Json(payload)).into_response()
}

/// Progress view consumed by the mobile dispatch client.
pub(crate) async fn legacy_job_handler(
    State(orchestrator): State<Arc<JobOrchestrator>>,
    Path(job_id): Path<String>,
) -> Response {
    let id = JobId(job_id);
    let Some(job) = orchestrator.job(&id) else {
        return query_error_response(JobQueryError::NotFound(id));
    };

    let progress = if job.state().is_terminal() { 100 } else { 50 };
    let outcome = job.outcome();
    let payload = json!({
        "job_id": job.id(),
        "emergency_id": job.emergency().emergency_id(),
        "status": job.state(),
        "progress": progress,
        "matched_hospital_id": outcome.and_then(|o| o.best_hospital_id.clone()),
        "match_score": outcome.map(|o| o.best_score),
        "best_match": outcome.and_then(|o| o.best()),
        "error": job.error().map(ToString::to_string),
    });
    (StatusCode::OK, Json(payload)).into_response()
}
