// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Dispatch workers: one per printer queue.
//
// Each worker owns its queue receiver exclusively, so a printer sees at most
// one job in flight at a time and jobs leave in arrival order.  Delivery
// failures are retried with backoff up to the attempt budget; a job bound
// for an offline printer fails immediately without consuming any attempts.
// Workers for different printers are fully independent tasks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use printflow_core::config::LimitsConfig;
use printflow_core::error::{AgentError, Result};
use printflow_core::types::{Availability, JobStatus, PrintJob};

use crate::courier::Courier;
use crate::queue::{QueueManager, QueueReceiver};
use crate::registry::PrinterRegistry;
use crate::report::{ReporterHandle, StatusReport};
use crate::retry::RetryPolicy;
use crate::store::JobStore;

/// Attempt budget and pacing for deliveries.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    /// Hard timeout on a single courier call.
    pub attempt_timeout: Duration,
    pub backoff: RetryPolicy,
}

impl DeliveryPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_attempts: limits.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(limits.delivery_timeout_secs),
            backoff: RetryPolicy::new(
                Duration::from_millis(limits.retry_base_ms),
                Duration::from_millis(limits.retry_max_ms),
            ),
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

/// Shared state behind every per-printer worker.
pub struct Dispatcher {
    registry: Arc<PrinterRegistry>,
    store: Arc<JobStore>,
    courier: Arc<dyn Courier>,
    reporter: ReporterHandle,
    policy: DeliveryPolicy,
    queues: Arc<QueueManager>,
    /// How long an idle worker waits before tearing down the queue of a
    /// printer that is no longer online.
    idle_grace: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<PrinterRegistry>,
        store: Arc<JobStore>,
        courier: Arc<dyn Courier>,
        reporter: ReporterHandle,
        policy: DeliveryPolicy,
        queues: Arc<QueueManager>,
        idle_grace: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            courier,
            reporter,
            policy,
            queues,
            idle_grace,
        }
    }

    /// Worker loop for one printer.  Runs until the queue is removed or the
    /// printer has been idle and not-online past the grace period.
    pub async fn run_printer(self: Arc<Self>, mut queue: QueueReceiver) {
        let printer = queue.printer.clone();
        debug!(printer = %printer, "dispatch worker started");

        loop {
            match tokio::time::timeout(self.idle_grace, queue.recv()).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => break,
                Err(_elapsed) => {
                    // Tear down only when the printer is gone or confirmed
                    // offline and nothing is queued.  Online printers keep
                    // their worker, and so does Unknown (seeded but not yet
                    // probed by discovery).
                    let gone = matches!(
                        self.registry.availability(&printer),
                        None | Some(Availability::Offline)
                    );
                    if gone && self.queues.remove_if_empty(&printer) {
                        break;
                    }
                }
            }
        }
        debug!(printer = %printer, "dispatch worker stopped");
    }

    /// Drive one job to a terminal state and report the outcome.
    async fn process(&self, mut job: PrintJob) {
        let outcome = self.deliver(&mut job).await;

        let (status, error) = match outcome {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    printer = %job.target_printer,
                    attempts = job.attempts,
                    "job delivered"
                );
                (JobStatus::Delivered, None)
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    printer = %job.target_printer,
                    attempts = job.attempts,
                    error = %e,
                    "job failed"
                );
                (JobStatus::Error, Some(e.to_string()))
            }
        };

        if let Err(e) = self
            .store
            .transition(job.id, status, job.attempts, error.as_deref())
        {
            warn!(job_id = %job.id, error = %e, "failed to record job outcome");
        }

        // Fire and forget; the reporter handles its own retries.
        let _ = self
            .reporter
            .send(StatusReport::for_job(&job, status, error.as_deref()));
    }

    /// Attempt delivery within the policy's budget, mutating the job's
    /// attempt count as it goes.
    async fn deliver(&self, job: &mut PrintJob) -> Result<()> {
        let entry = self.registry.resolve(&job.target_printer)?;

        // An offline printer fails the job outright, before any attempt is
        // spent; a resubmit after the printer returns is cheaper than
        // printing a stale receipt minutes later.
        if entry.availability == Availability::Offline {
            return Err(AgentError::PrinterOffline(job.target_printer.clone()));
        }

        if let Err(e) = self
            .store
            .transition(job.id, JobStatus::InFlight, job.attempts, None)
        {
            warn!(job_id = %job.id, error = %e, "failed to mark job in flight");
        }

        let mut last_error = String::new();
        while job.attempts < self.policy.max_attempts {
            job.attempts += 1;
            let attempt = job.attempts;

            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.courier.send(&entry, job),
            )
            .await
            {
                Ok(result) => result,
                Err(_elapsed) => Err(AgentError::TransportTimeout(
                    self.policy.attempt_timeout.as_secs(),
                )),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        job_id = %job.id,
                        printer = %job.target_printer,
                        attempt,
                        error = %e,
                        "delivery attempt failed"
                    );
                    last_error = e.to_string();
                    if job.attempts < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff.delay(attempt)).await;
                    }
                }
            }
        }

        Err(AgentError::DeliveryFailed {
            attempts: job.attempts,
            last: last_error,
        })
    }
}
