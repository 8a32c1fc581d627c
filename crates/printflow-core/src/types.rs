// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Core domain types for the PrintFlow agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job, assigned at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target output format of a submitted job.
///
/// Mirrors the ERP's ticket format selection (`graphic`, `graphic_cut`,
/// `raw`) plus `pdf` for backend reports and `zpl` for label printers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFormat {
    /// Pre-rendered ticket image, sent as-is.
    Graphic,
    /// Pre-rendered image followed by an ESC/POS paper-cut directive.
    GraphicCut,
    /// Raw command-stream bytes (ESC/POS), passed through untouched.
    Raw,
    /// PDF document for a PDF-capable spooler path.
    Pdf,
    /// Zebra label markup (textual).
    Zpl,
}

impl JobFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graphic => "graphic",
            Self::GraphicCut => "graphic_cut",
            Self::Raw => "raw",
            Self::Pdf => "pdf",
            Self::Zpl => "zpl",
        }
    }
}

impl std::str::FromStr for JobFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graphic" => Ok(Self::Graphic),
            "graphic_cut" => Ok(Self::GraphicCut),
            "raw" => Ok(Self::Raw),
            "pdf" => Ok(Self::Pdf),
            "zpl" => Ok(Self::Zpl),
            _ => Err(()),
        }
    }
}

/// Lifecycle states of a print job.  Transitions are forward-only:
/// `queued → in_flight → delivered | error | cancelled`, with the one
/// shortcut `queued → error` when the target printer is offline at dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InFlight,
    Delivered,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Delivered => "delivered",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Error | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Queued => matches!(
                next,
                Self::InFlight | Self::Delivered | Self::Error | Self::Cancelled
            ),
            Self::InFlight => matches!(next, Self::Delivered | Self::Error | Self::Cancelled),
            // Terminal states accept nothing.
            Self::Delivered | Self::Error | Self::Cancelled => false,
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_flight" => Ok(Self::InFlight),
            "delivered" => Ok(Self::Delivered),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// Opaque submission context, carried through for audit logging only.
/// The dispatcher never interprets these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOrigin {
    /// POS terminal reference (the ERP's `pos_config_id`).
    #[serde(default)]
    pub terminal: Option<String>,
    #[serde(default)]
    pub document_model: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
}

/// A unit of print work.  The payload is immutable once accepted, and the
/// job belongs to exactly one printer queue for its entire life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub target_printer: String,
    pub format: JobFormat,
    pub payload: Vec<u8>,
    pub copies: u32,
    pub origin: JobOrigin,
    pub status: JobStatus,
    /// Count of transport delivery attempts so far.
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PrintJob {
    pub fn new(
        target_printer: String,
        format: JobFormat,
        payload: Vec<u8>,
        copies: u32,
        origin: JobOrigin,
    ) -> Self {
        Self {
            id: JobId::new(),
            target_printer,
            format,
            payload,
            copies,
            origin,
            status: JobStatus::Queued,
            attempts: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// How the agent reaches a printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrinterTransport {
    /// Raw TCP socket (JetDirect-style, typically port 9100).
    Network { host: String, port: u16 },
    /// USB printer exposed as a device node (e.g. `/dev/usb/lp0`).
    Usb { device: String },
    /// Bluetooth printer bound to an RFCOMM device node.
    Bluetooth { device: String },
    /// Virtual PDF printer — jobs land as files in the spool directory.
    VirtualPdf,
}

/// What a printer can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterCapabilities {
    /// Accepts raw ESC/POS command streams.
    #[serde(default = "default_true")]
    pub raw: bool,
    /// Accepts rasterised images (graphic / graphic_cut).
    #[serde(default = "default_true")]
    pub graphic: bool,
    /// Accepts ZPL passthrough.
    #[serde(default)]
    pub zpl: bool,
    /// Accepts PDF documents directly.
    #[serde(default)]
    pub pdf: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PrinterCapabilities {
    fn default() -> Self {
        Self {
            raw: true,
            graphic: true,
            zpl: false,
            pdf: false,
        }
    }
}

/// Live reachability of a printer as last observed by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Online,
    Offline,
    Unknown,
}

/// Registry record for a reachable (or once-reachable) printer.
///
/// Entries are created or refreshed by discovery and are never deleted while
/// jobs may still reference them — disappearance only marks them offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterEntry {
    pub name: String,
    pub transport: PrinterTransport,
    pub capabilities: PrinterCapabilities,
    pub availability: Availability,
    pub last_seen: DateTime<Utc>,
}

impl PrinterEntry {
    pub fn new(name: String, transport: PrinterTransport, capabilities: PrinterCapabilities) -> Self {
        Self {
            name,
            transport,
            capabilities,
            availability: Availability::Unknown,
            last_seen: Utc::now(),
        }
    }
}
