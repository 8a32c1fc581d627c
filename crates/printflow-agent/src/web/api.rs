// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Axum routes and handlers.
//
// Submission is synchronous only up to queue admission: a 202 means the job
// is recorded and queued, not printed.  Delivery outcomes surface through
// `GET /jobs/{id}` and the ERP status reporter.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::Notify;
use tracing::debug;

use printflow_core::error::AgentError;
use printflow_core::types::{JobFormat, JobId, JobOrigin, PrinterCapabilities};
use printflow_spool::normalize::{Normalizer, Submission};
use printflow_spool::registry::PrinterRegistry;
use printflow_spool::service::SpoolService;
use printflow_spool::store::JobStore;

use crate::web::models::{
    ErrorBody, PrinterView, RawPrintRequest, StatusResponse, SubmitRequest, SubmitResponse,
};

pub struct AppStateInner {
    pub registry: Arc<PrinterRegistry>,
    pub store: Arc<JobStore>,
    pub spool: SpoolService,
    pub normalizer: Normalizer,
    /// Nudges the discovery task into an immediate availability sweep.
    pub refresh: Arc<Notify>,
}

pub type AppState = Arc<AppStateInner>;

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/printers", get(list_printers))
        .route("/print", post(submit_print))
        .route("/print_raw", post(print_raw))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .with_state(state)
}

/// The ERP's connection probe.  Also kicks discovery so the printer list in
/// the answer is at most one sweep stale.
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    state.refresh.notify_one();
    Json(StatusResponse {
        active: true,
        version: env!("CARGO_PKG_VERSION"),
        printers: state.registry.names(),
    })
}

async fn list_printers(State(state): State<AppState>) -> Json<Vec<PrinterView>> {
    let printers = state
        .registry
        .list()
        .into_iter()
        .map(|entry| {
            let queue_depth = state.spool.queue_depth(&entry.name);
            PrinterView { entry, queue_depth }
        })
        .collect();
    Json(printers)
}

/// General submission route.
async fn submit_print(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let format = JobFormat::from_str(&req.format)
        .map_err(|_| error_response(&AgentError::UnsupportedFormat(req.format.clone())))?;
    let payload = decode_payload(&req.payload).map_err(|e| error_response(&e))?;
    accept(&state, req.printer, format, payload, req.copies, req.origin)
}

/// Legacy POS route: field names and the `raw_type` vocabulary match the POS
/// frontend's raw-printing client.
async fn print_raw(
    State(state): State<AppState>,
    Json(req): Json<RawPrintRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let format = match req.raw_type.as_str() {
        // A rendered ticket image gets the paper cut appended.
        "image" => JobFormat::GraphicCut,
        "text" => JobFormat::Raw,
        other => {
            return Err(error_response(&AgentError::UnsupportedFormat(
                other.to_string(),
            )))
        }
    };
    let payload = decode_payload(&req.raw_data).map_err(|e| error_response(&e))?;
    let origin = JobOrigin {
        terminal: req.pos_config_id,
        ..JobOrigin::default()
    };
    accept(&state, req.printer_name, format, payload, req.copies, origin)
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let jobs = state
        .store
        .recent(50)
        .map_err(|e| error_response(&e))?;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = uuid::Uuid::parse_str(&id)
        .map(JobId)
        .map_err(|_| error_response(&AgentError::InvalidSubmission("malformed job id".into())))?;
    match state.store.get(job_id).map_err(|e| error_response(&e))? {
        Some(record) => Ok(Json(serde_json::json!(record))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "job_not_found",
                detail: format!("no job {job_id}"),
            }),
        )),
    }
}

/// Shared tail of both submission routes: resolve, capability-check,
/// normalize, spool.
fn accept(
    state: &AppState,
    printer: String,
    format: JobFormat,
    payload: Vec<u8>,
    copies: u32,
    origin: JobOrigin,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let entry = state
        .registry
        .resolve(&printer)
        .map_err(|e| error_response(&e))?;
    if !supports(&entry.capabilities, format) {
        return Err(error_response(&AgentError::UnsupportedFormat(format!(
            "printer {} does not accept {}",
            entry.name,
            format.as_str()
        ))));
    }

    let job = state
        .normalizer
        .normalize(Submission {
            printer,
            format,
            payload,
            copies,
            origin,
        })
        .map_err(|e| error_response(&e))?;

    let job_id = state.spool.submit(job).map_err(|e| error_response(&e))?;
    debug!(job_id = %job_id, "submission accepted");
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// Decode a base64 payload, tolerating a browser `data:` URL prefix.
fn decode_payload(raw: &str) -> Result<Vec<u8>, AgentError> {
    let encoded = match raw.find(";base64,") {
        Some(idx) if raw.starts_with("data:") => &raw[idx + ";base64,".len()..],
        _ => raw,
    };
    BASE64
        .decode(encoded.trim())
        .map_err(|e| AgentError::InvalidSubmission(format!("payload is not valid base64: {e}")))
}

fn supports(caps: &PrinterCapabilities, format: JobFormat) -> bool {
    match format {
        JobFormat::Graphic | JobFormat::GraphicCut => caps.graphic,
        JobFormat::Raw => caps.raw,
        JobFormat::Zpl => caps.zpl,
        JobFormat::Pdf => caps.pdf,
    }
}

/// Map an agent error onto its HTTP shape.
fn error_response(err: &AgentError) -> ApiError {
    let (status, code) = match err {
        AgentError::PrinterNotFound(_) => (StatusCode::NOT_FOUND, "printer_not_found"),
        AgentError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "unsupported_format"),
        AgentError::InvalidSubmission(_) => (StatusCode::BAD_REQUEST, "invalid_submission"),
        AgentError::PayloadTooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
        }
        AgentError::QueueFull { .. } => (StatusCode::TOO_MANY_REQUESTS, "queue_full"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(ErrorBody {
            error: code,
            detail: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_base64() {
        assert_eq!(decode_payload("aGVsbG8=").expect("decode"), b"hello");
    }

    #[test]
    fn decode_strips_data_url_prefix() {
        let raw = "data:image/png;base64,aGVsbG8=";
        assert_eq!(decode_payload(raw).expect("decode"), b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_payload("not base64!!!"),
            Err(AgentError::InvalidSubmission(_))
        ));
    }

    #[test]
    fn capability_gating_per_format() {
        let caps = PrinterCapabilities {
            raw: true,
            graphic: false,
            zpl: true,
            pdf: false,
        };
        assert!(supports(&caps, JobFormat::Raw));
        assert!(supports(&caps, JobFormat::Zpl));
        assert!(!supports(&caps, JobFormat::Graphic));
        assert!(!supports(&caps, JobFormat::GraphicCut));
        assert!(!supports(&caps, JobFormat::Pdf));
    }

    #[test]
    fn error_codes_map_to_status() {
        let (status, body) = error_response(&AgentError::PrinterNotFound("X".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "printer_not_found");

        let (status, _) = error_response(&AgentError::QueueFull {
            printer: "X".into(),
            capacity: 1,
        });
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = error_response(&AgentError::PayloadTooLarge { size: 2, limit: 1 });
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, body) = error_response(&AgentError::Transport("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "internal");
    }
}
