// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Per-printer bounded FIFO queues.
//
// One queue per printer, created lazily on first enqueue.  Push happens under
// the manager lock with a non-blocking try_send, so a jammed printer can
// never stall the HTTP front door: a full queue fails fast with QueueFull.
// Pop is the exclusive right of the single worker owning the queue's
// receiver, which also gives the at-most-one-in-flight guarantee per printer.
// Queues for different printers are fully independent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use printflow_core::error::{AgentError, Result};
use printflow_core::types::PrintJob;

struct QueueSlot {
    tx: mpsc::Sender<PrintJob>,
    depth: Arc<AtomicUsize>,
}

/// The consuming end of one printer's queue, owned by its dispatch worker.
pub struct QueueReceiver {
    pub printer: String,
    rx: mpsc::Receiver<PrintJob>,
    depth: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Wait for the next job on this printer's queue.
    ///
    /// Returns `None` once the queue has been removed and drained.
    pub async fn recv(&mut self) -> Option<PrintJob> {
        let job = self.rx.recv().await;
        if job.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        job
    }
}

/// Owner of all per-printer queues.
pub struct QueueManager {
    capacity: usize,
    queues: Mutex<HashMap<String, QueueSlot>>,
    /// New queue receivers are handed to the spool supervisor, which spawns
    /// a dispatch worker for each.
    registrations: mpsc::UnboundedSender<QueueReceiver>,
}

impl QueueManager {
    /// Create a manager with the given per-queue capacity.
    ///
    /// The returned receiver yields one [`QueueReceiver`] per lazily created
    /// printer queue; the caller must spawn a worker for each.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<QueueReceiver>) {
        let (registrations, registration_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                capacity,
                queues: Mutex::new(HashMap::new()),
                registrations,
            }),
            registration_rx,
        )
    }

    /// Append a job to its printer's queue, creating the queue on first use.
    ///
    /// Fails fast with `QueueFull` once the bounded capacity is reached —
    /// the submitter is never blocked on printer availability.
    pub fn enqueue(&self, job: PrintJob) -> Result<()> {
        let mut queues = self.queues.lock().expect("queue map lock poisoned");

        let slot = queues.entry(job.target_printer.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            let depth = Arc::new(AtomicUsize::new(0));
            debug!(printer = %job.target_printer, "printer queue created");
            // Ignore a closed registration channel: it only means the spool
            // supervisor is gone, which ends the process anyway.
            let _ = self.registrations.send(QueueReceiver {
                printer: job.target_printer.clone(),
                rx,
                depth: Arc::clone(&depth),
            });
            QueueSlot { tx, depth }
        });

        match slot.tx.try_send(job) {
            Ok(()) => {
                slot.depth.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => Err(AgentError::QueueFull {
                printer: job.target_printer,
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(job)) => {
                // The worker side is gone without a teardown; drop the stale
                // slot so the next enqueue recreates the queue.
                queues.remove(&job.target_printer);
                Err(AgentError::QueueFull {
                    printer: job.target_printer,
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Number of jobs currently queued (not in flight) for a printer.
    pub fn depth(&self, printer: &str) -> usize {
        self.queues
            .lock()
            .expect("queue map lock poisoned")
            .get(printer)
            .map(|slot| slot.depth.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Tear down a printer's queue if it is drained.
    ///
    /// Called by an idle worker once its printer has been offline past the
    /// grace period.  Runs under the same lock as `enqueue`, so a removal
    /// can never race with a push: after removal, the next enqueue simply
    /// creates a fresh queue and worker.
    pub fn remove_if_empty(&self, printer: &str) -> bool {
        let mut queues = self.queues.lock().expect("queue map lock poisoned");
        if let Some(slot) = queues.get(printer) {
            if slot.depth.load(Ordering::SeqCst) == 0 {
                queues.remove(printer);
                debug!(printer, "printer queue removed");
                return true;
            }
        }
        false
    }
}
