// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Delivery transports.
//
// The `Courier` trait is the seam between dispatch logic and the actual
// device I/O, so retry and ordering behaviour can be tested without sockets.
// `SystemCourier` is the real thing: raw TCP for network printers (JetDirect
// port 9100 style — open a socket, dump bytes, no negotiation), direct writes
// to USB/Bluetooth device nodes, and spool files for the virtual PDF printer.
//
// Every attempt sends the full wire payload from the start.  Partial-write
// resume is deliberately not offered: a command stream appended mid-way
// through a receipt is worse than a reprinted receipt.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use printflow_core::error::{AgentError, Result};
use printflow_core::types::{JobFormat, PrintJob, PrinterEntry, PrinterTransport};

/// Performs one delivery of a job to a printer.
///
/// Implementations must be idempotent per call in the restart-from-scratch
/// sense: a failed call leaves nothing the next call depends on.
#[async_trait]
pub trait Courier: Send + Sync {
    async fn send(&self, entry: &PrinterEntry, job: &PrintJob) -> Result<()>;
}

/// The production courier, routing by the printer's transport.
pub struct SystemCourier {
    spool_dir: PathBuf,
}

impl SystemCourier {
    pub fn new(spool_dir: PathBuf) -> Self {
        Self { spool_dir }
    }

    /// Build the byte stream that actually goes to the device: the payload
    /// repeated once per copy.  Stream transports have no copies knob, so
    /// copies are expressed by concatenation.
    fn wire_payload(job: &PrintJob) -> Vec<u8> {
        if job.copies <= 1 {
            return job.payload.clone();
        }
        let mut wire = Vec::with_capacity(job.payload.len() * job.copies as usize);
        for _ in 0..job.copies {
            wire.extend_from_slice(&job.payload);
        }
        wire
    }

    fn spool_extension(format: JobFormat) -> &'static str {
        match format {
            JobFormat::Pdf => "pdf",
            JobFormat::Zpl => "zpl",
            JobFormat::Raw | JobFormat::Graphic | JobFormat::GraphicCut => "bin",
        }
    }
}

#[async_trait]
impl Courier for SystemCourier {
    async fn send(&self, entry: &PrinterEntry, job: &PrintJob) -> Result<()> {
        match &entry.transport {
            PrinterTransport::Network { host, port } => {
                send_tcp(host, *port, &Self::wire_payload(job)).await
            }
            PrinterTransport::Usb { device } | PrinterTransport::Bluetooth { device } => {
                send_device(device, &Self::wire_payload(job)).await
            }
            PrinterTransport::VirtualPdf => {
                // One spool file per job regardless of copies.
                let filename = format!("{}.{}", job.id, Self::spool_extension(job.format));
                let path = self.spool_dir.join(filename);
                tokio::fs::create_dir_all(&self.spool_dir).await?;
                tokio::fs::write(&path, &job.payload).await?;
                info!(job_id = %job.id, path = %path.display(), "job spooled to file");
                Ok(())
            }
        }
    }
}

/// Send bytes to a raw TCP printer.  The printer must natively understand
/// the stream; there is no protocol negotiation and no feedback channel.
async fn send_tcp(host: &str, port: u16, bytes: &[u8]) -> Result<()> {
    let addr = format!("{host}:{port}");
    debug!(addr = %addr, total = bytes.len(), "connecting via raw TCP");

    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| AgentError::Transport(format!("connect {addr}: {e}")))?;

    stream
        .write_all(bytes)
        .await
        .map_err(|e| AgentError::Transport(format!("send to {addr}: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| AgentError::Transport(format!("flush to {addr}: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| AgentError::Transport(format!("shutdown to {addr}: {e}")))?;

    info!(addr = %addr, total = bytes.len(), "raw TCP job sent");
    Ok(())
}

/// Write bytes to a local printer device node.
async fn send_device(device: &str, bytes: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(device)
        .await
        .map_err(|e| AgentError::Transport(format!("open {device}: {e}")))?;

    file.write_all(bytes)
        .await
        .map_err(|e| AgentError::Transport(format!("write {device}: {e}")))?;
    file.flush()
        .await
        .map_err(|e| AgentError::Transport(format!("flush {device}: {e}")))?;

    info!(device, total = bytes.len(), "device node job sent");
    Ok(())
}
