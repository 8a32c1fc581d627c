// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Terminal-status reporting back to the ERP.
//
// Reports ride an unbounded channel so the dispatch workers never block on
// the ERP being slow or unreachable.  Reporting is best effort: one retry,
// then the report is logged locally and dropped.  A failed report never
// changes a job's outcome.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use printflow_core::error::{AgentError, Result};
use printflow_core::types::{JobStatus, PrintJob};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on one complete POST/response exchange.  An ERP that accepts
/// the connection and then goes silent must not park the reporter loop.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

/// One job outcome destined for the ERP's print-history log.
///
/// Field names match the ERP logging route's JSON-RPC parameters.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub printer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    pub format: String,
    /// `queued`, `delivered`, or `error` in the ERP's vocabulary.
    pub status: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_config_id: Option<String>,
}

impl StatusReport {
    pub fn for_job(job: &PrintJob, status: JobStatus, error: Option<&str>) -> Self {
        // Cancelled is folded into the ERP's error bucket.
        let status = match status {
            JobStatus::Delivered => "delivered",
            JobStatus::Queued | JobStatus::InFlight => "queued",
            JobStatus::Error | JobStatus::Cancelled => "error",
        };
        Self {
            printer: job.target_printer.clone(),
            document_model: job.origin.document_model.clone(),
            document_name: job.origin.document_name.clone(),
            format: job.format.as_str().to_string(),
            status: status.to_string(),
            size: job.payload.len(),
            error: error.map(str::to_string),
            pos_config_id: job.origin.terminal.clone(),
        }
    }
}

/// Sending side handed to the dispatcher.
pub type ReporterHandle = mpsc::UnboundedSender<StatusReport>;

/// Drains status reports and relays them to the configured ERP endpoint.
pub struct Reporter {
    endpoint: Option<Endpoint>,
    rx: mpsc::UnboundedReceiver<StatusReport>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
    path: String,
}

impl Reporter {
    /// Build a reporter for the given logging URL, if any.
    ///
    /// Only plain `http` is supported; the agent and ERP are expected to
    /// share a trusted LAN segment.
    pub fn new(log_url: Option<&str>) -> Result<(Self, ReporterHandle)> {
        let endpoint = match log_url {
            Some(raw) => Some(parse_endpoint(raw)?),
            None => None,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((Self { endpoint, rx }, tx))
    }

    /// Drain the report channel until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(report) = self.rx.recv().await {
            match &self.endpoint {
                None => {
                    info!(
                        printer = %report.printer,
                        status = %report.status,
                        size = report.size,
                        "job outcome (no ERP log endpoint configured)"
                    );
                }
                Some(endpoint) => {
                    // One retry, then log and move on.  The ERP can always
                    // reconcile from the /jobs endpoints.
                    let mut result = relay(endpoint, &report).await;
                    if result.is_err() {
                        result = relay(endpoint, &report).await;
                    }
                    if let Err(e) = result {
                        warn!(
                            printer = %report.printer,
                            status = %report.status,
                            error = %e,
                            "dropping status report after retry"
                        );
                    }
                }
            }
        }
        debug!("status reporter drained and stopped");
    }
}

fn parse_endpoint(raw: &str) -> Result<Endpoint> {
    let url = Url::parse(raw).map_err(|e| AgentError::Config(format!("log_url: {e}")))?;
    if url.scheme() != "http" {
        return Err(AgentError::Config(format!(
            "log_url: unsupported scheme '{}' (only http)",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| AgentError::Config("log_url: missing host".into()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    Ok(Endpoint {
        host,
        port,
        path: url.path().to_string(),
    })
}

/// POST one report as a JSON-RPC call, the envelope the ERP's web routes
/// expect.  Hand-framed HTTP/1.1: a single short-lived connection per report
/// keeps the agent free of an HTTP client stack it needs for nothing else.
async fn relay(endpoint: &Endpoint, report: &StatusReport) -> Result<()> {
    relay_with_timeout(endpoint, report, EXCHANGE_TIMEOUT).await
}

/// The whole exchange runs under one deadline, so a peer that accepts the
/// connection but never answers (or never closes) cannot stall the reporter.
async fn relay_with_timeout(
    endpoint: &Endpoint,
    report: &StatusReport,
    deadline: Duration,
) -> Result<()> {
    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    tokio::time::timeout(deadline, exchange(endpoint, &addr, report))
        .await
        .map_err(|_| AgentError::Reporting(format!("exchange with {addr}: timed out")))?
}

async fn exchange(endpoint: &Endpoint, addr: &str, report: &StatusReport) -> Result<()> {
    let body = serde_json::to_string(&json!({
        "jsonrpc": "2.0",
        "method": "call",
        "params": report,
    }))?;
    let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| AgentError::Reporting(format!("connect {addr}: timed out")))?
        .map_err(|e| AgentError::Reporting(format!("connect {addr}: {e}")))?;

    let request = format!(
        "POST {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        endpoint.path,
        endpoint.host,
        body.len(),
        body
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| AgentError::Reporting(format!("send to {addr}: {e}")))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .map_err(|e| AgentError::Reporting(format!("read from {addr}: {e}")))?;

    let status_line = response
        .split(|&b| b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .unwrap_or_default();
    if !is_success(&status_line) {
        return Err(AgentError::Reporting(format!(
            "ERP log endpoint answered: {}",
            status_line.trim()
        )));
    }

    debug!(printer = %report.printer, status = %report.status, "status report relayed");
    Ok(())
}

fn is_success(status_line: &str) -> bool {
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code))
}
