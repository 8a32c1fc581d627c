// SPDX-License-Identifier: PMPL-1.0-or-later
//
// PrintFlow Spool — the agent's job intake, queuing, and dispatch engine.
// Bridges between the core domain types in `printflow-core` and the actual
// device transports, and relays terminal outcomes back to the ERP.

pub mod courier;
pub mod discovery;
pub mod dispatch;
pub mod normalize;
pub mod queue;
pub mod registry;
pub mod report;
pub mod retry;
pub mod service;
pub mod store;

pub use courier::{Courier, SystemCourier};
pub use discovery::{DiscoveryTask, MdnsBrowser};
pub use dispatch::{DeliveryPolicy, Dispatcher};
pub use normalize::{Normalizer, Submission};
pub use queue::QueueManager;
pub use registry::PrinterRegistry;
pub use report::{Reporter, ReporterHandle, StatusReport};
pub use service::SpoolService;
pub use store::{JobRecord, JobStore};
