// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The spool service: glue between intake, queues, and dispatch workers.
//
// `SpoolService::start` wires the queue manager to a dispatcher and runs the
// supervisor task that spawns one worker per lazily created printer queue.
// `submit` is the single entry point for accepted jobs: record first, then
// enqueue, and back the record out if the queue rejects the job so a
// QueueFull submission leaves no trace.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use printflow_core::config::LimitsConfig;
use printflow_core::error::Result;
use printflow_core::types::{JobId, PrintJob};

use crate::courier::Courier;
use crate::dispatch::{DeliveryPolicy, Dispatcher};
use crate::queue::QueueManager;
use crate::registry::PrinterRegistry;
use crate::report::ReporterHandle;
use crate::store::JobStore;

pub struct SpoolService {
    queues: Arc<QueueManager>,
    store: Arc<JobStore>,
}

impl SpoolService {
    /// Wire up queues and dispatch and start the worker supervisor.
    pub fn start(
        registry: Arc<PrinterRegistry>,
        store: Arc<JobStore>,
        courier: Arc<dyn Courier>,
        reporter: ReporterHandle,
        limits: &LimitsConfig,
        idle_grace: Duration,
    ) -> Self {
        let (queues, mut registrations) = QueueManager::new(limits.queue_capacity);
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::clone(&store),
            courier,
            reporter,
            DeliveryPolicy::from_limits(limits),
            Arc::clone(&queues),
            idle_grace,
        ));

        tokio::spawn(async move {
            while let Some(queue) = registrations.recv().await {
                debug!(printer = %queue.printer, "spawning dispatch worker");
                tokio::spawn(Arc::clone(&dispatcher).run_printer(queue));
            }
            info!("spool supervisor stopped");
        });

        Self { queues, store }
    }

    /// Accept a normalized job: persist its record, then queue it.
    ///
    /// On QueueFull the record is deleted again so the caller's rejection is
    /// the only trace of the job.
    pub fn submit(&self, job: PrintJob) -> Result<JobId> {
        let id = job.id;
        self.store.insert(&job)?;
        if let Err(e) = self.queues.enqueue(job) {
            self.store.delete(id)?;
            return Err(e);
        }
        debug!(job_id = %id, "job accepted into spool");
        Ok(id)
    }

    /// Jobs currently waiting (not in flight) for a printer.
    pub fn queue_depth(&self, printer: &str) -> usize {
        self.queues.depth(printer)
    }
}
