// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Unified error types for the PrintFlow agent.

use thiserror::Error;

/// Top-level error type for all agent operations.
///
/// Synchronous errors (`InvalidSubmission`, `UnsupportedFormat`,
/// `PayloadTooLarge`, `PrinterNotFound`, `QueueFull`) surface immediately to
/// the HTTP caller.  Asynchronous errors (`PrinterOffline`, `DeliveryFailed`)
/// surface only through the status reporter and the job status query.
#[derive(Debug, Error)]
pub enum AgentError {
    // -- Intake / validation --
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("queue full for printer {printer} (capacity {capacity})")]
    QueueFull { printer: String, capacity: usize },

    // -- Delivery --
    #[error("printer offline: {0}")]
    PrinterOffline(String),

    #[error("transport timed out after {0} seconds")]
    TransportTimeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("delivery failed after {attempts} attempt(s): {last}")]
    DeliveryFailed { attempts: u32, last: String },

    // -- Collaborators --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    #[error("status reporting failed: {0}")]
    Reporting(String),

    // -- Storage / config --
    #[error("job store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AgentError>;
