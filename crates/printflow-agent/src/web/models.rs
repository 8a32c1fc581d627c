// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Wire models for the HTTP API.

use serde::{Deserialize, Serialize};

use printflow_core::types::{JobId, JobOrigin, PrinterEntry};

/// Body of `POST /print`, the general submission route.
///
/// `payload` is base64; a `data:...;base64,` prefix from a browser canvas
/// export is tolerated and stripped.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub printer: String,
    pub format: String,
    pub payload: String,
    #[serde(default = "default_copies")]
    pub copies: u32,
    #[serde(default)]
    pub origin: JobOrigin,
}

fn default_copies() -> u32 {
    1
}

/// Body of `POST /print_raw`, the route the POS frontend talks to.
///
/// Field names match the POS client: `raw_type` is `image` (rendered ticket,
/// cut after printing) or `text` (ESC/POS passthrough).
#[derive(Debug, Deserialize)]
pub struct RawPrintRequest {
    pub printer_name: String,
    pub raw_type: String,
    pub raw_data: String,
    #[serde(default = "default_copies")]
    pub copies: u32,
    #[serde(default)]
    pub pos_config_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Answer to `GET /status` — the ERP's connection probe.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: bool,
    pub version: &'static str,
    pub printers: Vec<String>,
}

/// One printer in the `GET /printers` listing.
#[derive(Debug, Serialize)]
pub struct PrinterView {
    #[serde(flatten)]
    pub entry: PrinterEntry,
    pub queue_depth: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}
