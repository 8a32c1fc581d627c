// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Integration tests for the HTTP front door, driven through the router with
// tower's `oneshot` — no sockets involved.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http_body_util::BodyExt; // for .collect().await
use serde_json::json;
use tokio::sync::{mpsc, Notify};
use tower::util::ServiceExt; // for `oneshot`

use printflow_agent::web::api::{router, AppState, AppStateInner};
use printflow_core::config::{LimitsConfig, PrinterSeed};
use printflow_core::types::{JobStatus, PrintJob, PrinterCapabilities, PrinterEntry, PrinterTransport};
use printflow_spool::{Courier, Normalizer, PrinterRegistry, SpoolService, StatusReport, SystemCourier};
use printflow_spool::store::JobStore;

fn test_state(limits: LimitsConfig, spool_dir: &std::path::Path) -> AppState {
    test_state_with(
        limits,
        Arc::new(SystemCourier::new(spool_dir.to_path_buf())),
    )
}

fn test_state_with(limits: LimitsConfig, courier: Arc<dyn Courier>) -> AppState {
    let seeds = vec![
        PrinterSeed {
            name: "PdfOut".into(),
            transport: PrinterTransport::VirtualPdf,
            capabilities: PrinterCapabilities {
                raw: true,
                graphic: true,
                zpl: false,
                pdf: true,
            },
        },
        PrinterSeed {
            name: "Labels".into(),
            transport: PrinterTransport::Usb {
                device: "/dev/usb/lp0".into(),
            },
            capabilities: PrinterCapabilities {
                raw: false,
                graphic: false,
                zpl: true,
                pdf: false,
            },
        },
    ];
    let registry = Arc::new(PrinterRegistry::with_seeds(&seeds));
    registry.mark_online("PdfOut");
    registry.mark_online("Labels");

    let store = Arc::new(JobStore::open_in_memory().expect("store"));
    // Reports go nowhere in these tests; the dispatcher ignores send errors.
    let (report_tx, _report_rx) = mpsc::unbounded_channel::<StatusReport>();
    let spool = SpoolService::start(
        Arc::clone(&registry),
        Arc::clone(&store),
        courier,
        report_tx,
        &limits,
        Duration::from_secs(60),
    );

    Arc::new(AppStateInner {
        registry,
        store,
        spool,
        normalizer: Normalizer::new(limits.max_payload_bytes),
        refresh: Arc::new(Notify::new()),
    })
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn wait_terminal(state: &AppState, job_id: uuid::Uuid) -> JobStatus {
    let id = printflow_core::types::JobId(job_id);
    for _ in 0..200 {
        if let Some(record) = state.store.get(id).expect("get") {
            if record.status.is_terminal() {
                return record.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job never reached a terminal state");
}

#[tokio::test]
async fn status_probe_reports_printers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["active"], json!(true));
    let printers: Vec<&str> = body["printers"]
        .as_array()
        .expect("printers")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(printers, vec!["Labels", "PdfOut"]);
}

#[tokio::test]
async fn submitted_pdf_is_delivered_and_spooled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(Arc::clone(&state));

    let payload = BASE64.encode(b"%PDF-1.7 ticket");
    let response = app
        .oneshot(post_json(
            "/print",
            json!({ "printer": "PdfOut", "format": "pdf", "payload": payload }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = json_body(response).await;
    let job_id: uuid::Uuid = serde_json::from_value(body["job_id"].clone()).expect("job id");

    assert_eq!(wait_terminal(&state, job_id).await, JobStatus::Delivered);
    let spooled = std::fs::read(dir.path().join(format!("{job_id}.pdf"))).expect("spool file");
    assert_eq!(spooled, b"%PDF-1.7 ticket");
}

#[tokio::test]
async fn job_is_queryable_after_submission() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(Arc::clone(&state));

    let payload = BASE64.encode(b"\x1b@hello");
    let response = app
        .clone()
        .oneshot(post_json(
            "/print",
            json!({ "printer": "PdfOut", "format": "raw", "payload": payload }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    let job_id: uuid::Uuid = serde_json::from_value(body["job_id"].clone()).expect("job id");
    wait_terminal(&state, job_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/jobs/{job_id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["printer"], json!("PdfOut"));
    assert_eq!(body["status"], json!("delivered"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/jobs")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["jobs"].as_array().expect("jobs").len(), 1);
}

#[tokio::test]
async fn print_raw_accepts_the_pos_shape() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(Arc::clone(&state));

    let response = app
        .oneshot(post_json(
            "/print_raw",
            json!({
                "printer_name": "PdfOut",
                "raw_type": "text",
                "raw_data": BASE64.encode(b"\x1b@order"),
                "pos_config_id": "7"
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = json_body(response).await;
    let job_id: uuid::Uuid = serde_json::from_value(body["job_id"].clone()).expect("job id");
    wait_terminal(&state, job_id).await;
    let record = state
        .store
        .get(printflow_core::types::JobId(job_id))
        .expect("get")
        .expect("found");
    assert_eq!(record.origin.terminal.as_deref(), Some("7"));
}

#[tokio::test]
async fn unknown_printer_is_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(state);

    let response = app
        .oneshot(post_json(
            "/print",
            json!({ "printer": "Ghost", "format": "raw", "payload": BASE64.encode(b"x") }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("printer_not_found"));
}

#[tokio::test]
async fn unknown_format_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(state);

    let response = app
        .oneshot(post_json(
            "/print",
            json!({ "printer": "PdfOut", "format": "docx", "payload": BASE64.encode(b"x") }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("unsupported_format"));
}

#[tokio::test]
async fn format_outside_printer_capabilities_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(state);

    // Labels is zpl-only; raw is refused.
    let response = app
        .oneshot(post_json(
            "/print",
            json!({ "printer": "Labels", "format": "raw", "payload": BASE64.encode(b"x") }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("unsupported_format"));
}

#[tokio::test]
async fn undecodable_payload_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(state);

    let response = app
        .oneshot(post_json(
            "/print",
            json!({ "printer": "PdfOut", "format": "raw", "payload": "!!! not base64 !!!" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("invalid_submission"));
}

#[tokio::test]
async fn oversize_payload_is_413() {
    let dir = tempfile::tempdir().expect("tempdir");
    let limits = LimitsConfig {
        max_payload_bytes: 16,
        ..LimitsConfig::default()
    };
    let state = test_state(limits, dir.path());
    let app = router(state);

    let response = app
        .oneshot(post_json(
            "/print",
            json!({
                "printer": "PdfOut",
                "format": "raw",
                "payload": BASE64.encode(vec![0u8; 64])
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("payload_too_large"));
}

/// Courier that never completes, pinning one job in flight so the bounded
/// queue behind it can fill up.
struct StuckCourier;

#[async_trait::async_trait]
impl Courier for StuckCourier {
    async fn send(
        &self,
        _entry: &PrinterEntry,
        _job: &PrintJob,
    ) -> printflow_core::error::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[tokio::test]
async fn full_queue_is_429() {
    let limits = LimitsConfig {
        queue_capacity: 1,
        ..LimitsConfig::default()
    };
    let state = test_state_with(limits, Arc::new(StuckCourier));
    let app = router(state);

    // One job may go in flight immediately; keep submitting until the
    // bounded queue behind it rejects.
    let mut rejected = None;
    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/print",
                json!({ "printer": "PdfOut", "format": "raw", "payload": BASE64.encode(b"x") }),
            ))
            .await
            .expect("response");
        if response.status() != StatusCode::ACCEPTED {
            rejected = Some(response);
            break;
        }
        tokio::task::yield_now().await;
    }

    let response = rejected.expect("a submission was rejected");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert_eq!(body["error"], json!("queue_full"));
}

#[tokio::test]
async fn unknown_job_id_is_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(LimitsConfig::default(), dir.path());
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/jobs/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
