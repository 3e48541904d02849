//! Ingestion, dump and force-add boundaries
//!
//! Transport-independent entry points used by the daemon's HTTP layer.
//! Nothing here waits on reconciliation: a report is acknowledged as soon
//! as it is in the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::coordinator::CycleStatus;
use crate::report::{AddressFamily, AddressReport, normalize_host};
use crate::store::RecordStore;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Acknowledgement returned to reporting hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Rejected(String),
}

impl Ack {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Rejected(reason) => f.write_str(reason),
        }
    }
}

/// One host as exposed by the dump boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpEntry {
    pub hostname: String,
    pub version: Option<String>,
    pub remote_addr: String,
    pub ether: Vec<String>,
    pub inet: Vec<String>,
    pub inet6: Vec<String>,
    /// Receive time, `YYYY-MM-DD HH:MM:SS` UTC
    pub datetime: String,
    /// Receive time as a unix timestamp
    pub t: i64,
    pub changed: bool,
    pub unpaired: bool,
    pub forced: bool,
}

/// Reconciliation health as exposed to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub hosts: usize,
    pub changed: Vec<String>,
    pub unpaired: Vec<String>,
    pub forced: Vec<String>,
    pub last_cycle: Option<CycleStatus>,
}

/// Entry point for reports, operator actions and dumps
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: RecordStore,
}

impl Ingestor {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Accept an address report.
    ///
    /// A report without addresses is still accepted; hosts use it as a
    /// liveness signal. Pairs with an unknown family or an empty value are
    /// dropped. Only a missing host is rejected.
    pub async fn report_addresses<I, F, V>(
        &self,
        host: Option<&str>,
        version: Option<&str>,
        source_address: &str,
        addresses: I,
    ) -> Ack
    where
        I: IntoIterator<Item = (F, V)>,
        F: AsRef<str>,
        V: AsRef<str>,
    {
        let host = match host.map(normalize_host) {
            Some(host) if !host.is_empty() => host,
            _ => {
                debug!("Rejecting report from {} without host", source_address);
                return Ack::Rejected("no host specified".to_string());
            }
        };

        let mut report = AddressReport::new(&host, source_address);
        if let Some(version) = version.map(str::trim).filter(|v| !v.is_empty()) {
            report = report.with_version(version);
        }

        for (family, value) in addresses {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match family.as_ref().parse::<AddressFamily>() {
                Ok(family) => report = report.with_address(family, value),
                Err(e) => warn!("{}: dropping address {}: {}", host, value, e),
            }
        }

        if self.store.submit(report).await {
            info!("{} reported new addresses from {}", host, source_address);
        } else {
            debug!("{} reported unchanged addresses", host);
        }
        Ack::Ok
    }

    /// Approve `host` for insertion without a placeholder line
    pub async fn force_add(&self, host: &str) -> Ack {
        let host = normalize_host(host);
        if host.is_empty() {
            return Ack::Rejected("no host specified".to_string());
        }

        info!("Forced addition of {}", host);
        self.store.force_add(&host).await;
        Ack::Ok
    }

    /// All stored reports with their bookkeeping membership, sorted by host
    pub async fn dump(&self) -> Vec<DumpEntry> {
        self.store
            .entries()
            .await
            .into_iter()
            .map(|entry| {
                let report = entry.report;
                let of = |family| {
                    report
                        .addresses_of(family)
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                };
                DumpEntry {
                    ether: of(AddressFamily::Ether),
                    inet: of(AddressFamily::Inet),
                    inet6: of(AddressFamily::Inet6),
                    datetime: report.received_at.format(DATETIME_FORMAT).to_string(),
                    t: report.received_at.timestamp(),
                    hostname: report.host,
                    version: report.version,
                    remote_addr: report.source_address,
                    changed: entry.changed,
                    unpaired: entry.unpaired,
                    forced: entry.forced,
                }
            })
            .collect()
    }

    /// Set memberships and the outcome of the last cycle
    pub async fn status(&self) -> StatusView {
        let snapshot = self.store.snapshot().await;
        StatusView {
            hosts: snapshot.reports.len(),
            changed: snapshot.changed.into_iter().collect(),
            unpaired: snapshot.unpaired.into_iter().collect(),
            forced: snapshot.forced.into_iter().collect(),
            last_cycle: self.store.last_cycle().await,
        }
    }
}
