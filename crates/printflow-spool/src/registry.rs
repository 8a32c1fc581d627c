// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Process-wide printer registry.
//
// Read by every dispatch worker and the HTTP front door; written only by the
// discovery task and explicit mark_online/mark_offline calls, so access goes
// through a reader-writer lock with brief exclusive writes.  Entries are
// never removed while jobs may reference them — a vanished printer is only
// marked offline.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, info, warn};

use printflow_core::config::PrinterSeed;
use printflow_core::error::{AgentError, Result};
use printflow_core::types::{Availability, PrinterEntry};

pub struct PrinterRegistry {
    printers: RwLock<HashMap<String, PrinterEntry>>,
}

impl Default for PrinterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrinterRegistry {
    pub fn new() -> Self {
        Self {
            printers: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry from statically configured printers.
    pub fn with_seeds(seeds: &[PrinterSeed]) -> Self {
        let registry = Self::new();
        {
            let mut printers = registry.printers.write().expect("printer map lock poisoned");
            for seed in seeds {
                printers.insert(
                    seed.name.clone(),
                    PrinterEntry::new(seed.name.clone(), seed.transport.clone(), seed.capabilities),
                );
            }
        }
        info!(count = seeds.len(), "printer registry seeded from config");
        registry
    }

    /// Snapshot of all known printers, sorted by name for stable output.
    pub fn list(&self) -> Vec<PrinterEntry> {
        let mut entries: Vec<PrinterEntry> = self
            .printers
            .read()
            .expect("printer map lock poisoned")
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Names of all known printers, sorted.
    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|e| e.name).collect()
    }

    /// Look up a printer by its logical name.
    pub fn resolve(&self, name: &str) -> Result<PrinterEntry> {
        self.printers
            .read()
            .expect("printer map lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::PrinterNotFound(name.to_string()))
    }

    pub fn availability(&self, name: &str) -> Option<Availability> {
        self.printers
            .read()
            .expect("printer map lock poisoned")
            .get(name)
            .map(|e| e.availability)
    }

    pub fn mark_online(&self, name: &str) {
        let mut printers = self.printers.write().expect("printer map lock poisoned");
        if let Some(entry) = printers.get_mut(name) {
            if entry.availability != Availability::Online {
                info!(printer = name, "printer online");
            }
            entry.availability = Availability::Online;
            entry.last_seen = Utc::now();
        }
    }

    pub fn mark_offline(&self, name: &str) {
        let mut printers = self.printers.write().expect("printer map lock poisoned");
        if let Some(entry) = printers.get_mut(name) {
            if entry.availability == Availability::Online {
                warn!(printer = name, "printer offline");
            }
            entry.availability = Availability::Offline;
        }
    }

    /// Merge a printer found by discovery.
    ///
    /// A new name is inserted as-is; an existing entry only has its liveness
    /// refreshed so configured transports and capabilities are not clobbered
    /// by whatever mDNS happened to advertise.
    pub fn upsert_discovered(&self, entry: PrinterEntry) {
        let mut printers = self.printers.write().expect("printer map lock poisoned");
        match printers.get_mut(&entry.name) {
            Some(existing) => {
                existing.availability = Availability::Online;
                existing.last_seen = Utc::now();
            }
            None => {
                debug!(printer = %entry.name, "new printer discovered");
                printers.insert(entry.name.clone(), entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printflow_core::types::{PrinterCapabilities, PrinterTransport};

    fn seed(name: &str) -> PrinterSeed {
        PrinterSeed {
            name: name.into(),
            transport: PrinterTransport::Network {
                host: "10.0.0.1".into(),
                port: 9100,
            },
            capabilities: PrinterCapabilities::default(),
        }
    }

    #[test]
    fn resolve_unknown_printer_fails() {
        let registry = PrinterRegistry::new();
        let err = registry.resolve("Ghost").unwrap_err();
        assert!(matches!(err, AgentError::PrinterNotFound(_)));
    }

    #[test]
    fn seeded_printers_resolve_with_unknown_availability() {
        let registry = PrinterRegistry::with_seeds(&[seed("Kitchen1")]);
        let entry = registry.resolve("Kitchen1").expect("seeded");
        assert_eq!(entry.availability, Availability::Unknown);
    }

    #[test]
    fn mark_offline_then_online() {
        let registry = PrinterRegistry::with_seeds(&[seed("Kitchen1")]);
        registry.mark_offline("Kitchen1");
        assert_eq!(
            registry.availability("Kitchen1"),
            Some(Availability::Offline)
        );
        registry.mark_online("Kitchen1");
        assert_eq!(registry.availability("Kitchen1"), Some(Availability::Online));
    }

    #[test]
    fn upsert_refreshes_but_keeps_configured_transport() {
        let registry = PrinterRegistry::with_seeds(&[seed("Kitchen1")]);
        registry.mark_offline("Kitchen1");

        let discovered = PrinterEntry::new(
            "Kitchen1".into(),
            PrinterTransport::Network {
                host: "192.168.9.9".into(),
                port: 9100,
            },
            PrinterCapabilities::default(),
        );
        registry.upsert_discovered(discovered);

        let entry = registry.resolve("Kitchen1").expect("present");
        assert_eq!(entry.availability, Availability::Online);
        assert_eq!(
            entry.transport,
            PrinterTransport::Network {
                host: "10.0.0.1".into(),
                port: 9100
            }
        );
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = PrinterRegistry::with_seeds(&[seed("Zebra"), seed("Bar"), seed("Kitchen1")]);
        let names = registry.names();
        assert_eq!(names, vec!["Bar", "Kitchen1", "Zebra"]);
    }
}
