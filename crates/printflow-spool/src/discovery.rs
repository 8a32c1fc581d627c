// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Printer discovery and availability probing.
//
// Two independent sources feed the registry.  `DiscoveryTask` periodically
// probes every known printer over its own transport (TCP connect for network
// printers, device-node presence for USB/Bluetooth) and flips availability
// accordingly.  `MdnsBrowser` additionally watches the LAN for raw-socket
// printers announcing `_pdl-datastream._tcp` and feeds new names into the
// registry, marking vanished ones offline.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use printflow_core::error::{AgentError, Result};
use printflow_core::types::{PrinterCapabilities, PrinterEntry, PrinterTransport};

use crate::registry::PrinterRegistry;

/// mDNS service type announced by raw-socket (JetDirect) printers.
const PDL_SERVICE: &str = "_pdl-datastream._tcp.local.";

/// Timeout for one TCP availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Periodic availability prober.
pub struct DiscoveryTask {
    registry: Arc<PrinterRegistry>,
    interval: Duration,
    /// Pinged by the HTTP layer to force an immediate sweep.
    refresh: Arc<Notify>,
}

impl DiscoveryTask {
    pub fn new(registry: Arc<PrinterRegistry>, interval: Duration, refresh: Arc<Notify>) -> Self {
        Self {
            registry,
            interval,
            refresh,
        }
    }

    /// Probe forever, on the configured interval or on demand.
    pub async fn run(self) {
        loop {
            self.sweep().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.refresh.notified() => {
                    debug!("availability sweep requested");
                }
            }
        }
    }

    /// Probe every registered printer once.
    pub async fn sweep(&self) {
        for entry in self.registry.list() {
            let reachable = probe(&entry.transport).await;
            if reachable {
                self.registry.mark_online(&entry.name);
            } else {
                self.registry.mark_offline(&entry.name);
            }
        }
    }
}

/// Check whether a printer's transport endpoint currently answers.
async fn probe(transport: &PrinterTransport) -> bool {
    match transport {
        PrinterTransport::Network { host, port } => {
            let addr = format!("{host}:{port}");
            matches!(
                tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await,
                Ok(Ok(_))
            )
        }
        PrinterTransport::Usb { device } | PrinterTransport::Bluetooth { device } => {
            tokio::fs::metadata(device).await.is_ok()
        }
        // The spool directory is created on demand.
        PrinterTransport::VirtualPdf => true,
    }
}

/// Continuous mDNS browser for raw network printers.
///
/// Browsing runs on `mdns-sd`'s own daemon thread; a listener thread drains
/// the event channel and applies registry updates.  Dropping the browser
/// stops the daemon.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

impl MdnsBrowser {
    /// Start browsing and feed results into the registry.
    pub fn start(registry: Arc<PrinterRegistry>) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| AgentError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
        let receiver = daemon
            .browse(PDL_SERVICE)
            .map_err(|e| AgentError::Discovery(format!("browse {PDL_SERVICE}: {e}")))?;

        std::thread::Builder::new()
            .name("mdns-pdl".into())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        ServiceEvent::SearchStarted(stype) => {
                            debug!(service_type = %stype, "mDNS search started");
                        }
                        ServiceEvent::ServiceFound(stype, fullname) => {
                            debug!(service_type = %stype, name = %fullname, "service found");
                        }
                        ServiceEvent::ServiceResolved(info) => {
                            match service_info_to_entry(&info) {
                                Ok(entry) => {
                                    info!(printer = %entry.name, "mDNS printer resolved");
                                    registry.upsert_discovered(entry);
                                }
                                Err(e) => {
                                    warn!(
                                        fullname = %info.get_fullname(),
                                        error = %e,
                                        "unusable mDNS printer announcement"
                                    );
                                }
                            }
                        }
                        ServiceEvent::ServiceRemoved(_stype, fullname) => {
                            let name = instance_name(&fullname);
                            info!(printer = %name, "mDNS printer removed");
                            registry.mark_offline(&name);
                        }
                        ServiceEvent::SearchStopped(stype) => {
                            debug!(service_type = %stype, "mDNS search stopped");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| AgentError::Discovery(format!("mDNS listener thread: {e}")))?;

        info!("mDNS printer discovery started");
        Ok(Self { daemon })
    }

    pub fn shutdown(self) -> Result<()> {
        let _status_rx = self
            .daemon
            .shutdown()
            .map_err(|e| AgentError::Discovery(format!("daemon shutdown: {e}")))?;
        info!("mDNS daemon shut down");
        Ok(())
    }
}

/// Convert a resolved PDL announcement into a registry entry.
fn service_info_to_entry(info: &ServiceInfo) -> Result<PrinterEntry> {
    let name = instance_name(info.get_fullname());

    // Prefer IPv4 for wider printer compatibility.
    let ip: IpAddr = info
        .get_addresses()
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| info.get_addresses().iter().next())
        .copied()
        .ok_or_else(|| AgentError::Discovery(format!("no address for service {name}")))?;

    Ok(PrinterEntry::new(
        name,
        PrinterTransport::Network {
            host: ip.to_string(),
            port: info.get_port(),
        },
        PrinterCapabilities::default(),
    ))
}

/// Human-facing instance name: the fullname minus the service-type suffix.
fn instance_name(fullname: &str) -> String {
    fullname
        .strip_suffix(&format!(".{PDL_SERVICE}"))
        .or_else(|| fullname.strip_suffix(PDL_SERVICE))
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}
