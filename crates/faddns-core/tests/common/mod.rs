//! Test doubles and common utilities for contract tests
//!
//! Provides a zone tooling double that records calls instead of running
//! BIND, plus a temporary zone directory fixture.

use chrono::{DateTime, TimeZone, Utc};
use faddns_core::error::{Error, Result};
use faddns_core::{
    AddressFamily, AddressReport, CycleEvent, CycleStage, FaddnsConfig, ToolOutput, ZoneTools,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Zone file with the serial inline and two placeholder lines
pub const ZONE: &str = "$TTL 1D
@\tIN\tSOA\tns1.example.com. hostmaster.example.com. (
\t\t42\t; serial
\t\t1H\t; refresh
\t\t15M\t; retry
\t\t1W\t; expire
\t\t1D )\t; minimum
\tIN\tNS\tns1.example.com.
ns1\tIN\tA\t192.0.2.1
alpha\t10M\tA\t0.0.0.0 ; @faddns
beta\t10M\tA\t203.0.113.20 ; @faddns 2024-01-01 00:00:00
";

/// Fixed receive time used by [`report`]
pub fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap()
}

/// A report for `host` with the given IPv4 addresses, received at [`received_at`]
pub fn report(host: &str, inet: &[&str]) -> AddressReport {
    inet.iter()
        .fold(AddressReport::new(host, "198.51.100.7"), |r, addr| {
            r.with_address(AddressFamily::Inet, *addr)
        })
        .received_at(received_at())
}

/// Record line the patcher generates for `host` at [`received_at`]
pub fn a_line(host: &str, addr: &str) -> String {
    format!("{}\t10M\tA\t{} ; @faddns 2024-05-17 08:30:00\n", host, addr)
}

/// Temporary directory holding a zone file
pub struct ZoneFixture {
    pub dir: tempfile::TempDir,
    pub zone_file: PathBuf,
}

impl ZoneFixture {
    pub fn new(contents: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let zone_file = dir.path().join("db.example.com");
        std::fs::write(&zone_file, contents).unwrap();
        Self { dir, zone_file }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn read(&self) -> String {
        std::fs::read_to_string(&self.zone_file).unwrap()
    }

    pub fn write(&self, contents: &str) {
        std::fs::write(&self.zone_file, contents).unwrap();
    }

    /// Config for this zone with rate limiting disabled
    pub fn config(&self) -> FaddnsConfig {
        let mut config = FaddnsConfig::new("example.com", &self.zone_file);
        config.reconcile.check_interval_secs = 1;
        config.reconcile.min_update_interval_secs = 0;
        config.tools.timeout_secs = 1;
        config
    }
}

/// How a [`MockZoneTools`] call should behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
    /// Succeed after the given delay
    Slow(Duration),
}

/// A ZoneTools double that records calls
#[derive(Clone)]
pub struct MockZoneTools {
    calls: Arc<Mutex<Vec<String>>>,
    call_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    behaviors: Arc<Mutex<Vec<(CycleStage, Behavior)>>>,
}

impl MockZoneTools {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            behaviors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make calls belonging to `stage` behave as `behavior`
    pub fn set(&self, stage: CycleStage, behavior: Behavior) {
        let mut behaviors = self.behaviors.lock().unwrap();
        behaviors.retain(|(s, _)| *s != stage);
        behaviors.push((stage, behavior));
    }

    /// Calls so far, as `operation:zone` or `operation:zone:file name`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of tool calls that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior(&self, stage: CycleStage) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, b)| *b)
            .unwrap_or(Behavior::Succeed)
    }

    async fn invoke(
        &self,
        stage: CycleStage,
        operation: &str,
        call: String,
    ) -> Result<ToolOutput> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let result = match self.behavior(stage) {
            Behavior::Succeed => Ok(ToolOutput::new(operation, "OK")),
            Behavior::Fail if stage == CycleStage::Validating => {
                Err(Error::validation("dns_master_load: syntax error"))
            }
            Behavior::Fail => Err(Error::tool(operation, "exit status: 1")),
            Behavior::Hang => std::future::pending::<Result<ToolOutput>>().await,
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ToolOutput::new(operation, "OK"))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl ZoneTools for MockZoneTools {
    async fn validate_zone(&self, zone: &str, path: &Path) -> Result<ToolOutput> {
        self.invoke(
            CycleStage::Validating,
            "validate",
            format!("validate:{}:{}", zone, file_name(path)),
        )
        .await
    }

    async fn sign_zone(&self, zone: &str, path: &Path) -> Result<ToolOutput> {
        self.invoke(
            CycleStage::Signing,
            "sign",
            format!("sign:{}:{}", zone, file_name(path)),
        )
        .await
    }

    async fn reload_zone(&self, zone: &str) -> Result<ToolOutput> {
        self.invoke(CycleStage::Reloading, "reload", format!("reload:{}", zone))
            .await
    }

    fn tools_name(&self) -> &'static str {
        "mock"
    }
}

/// Drain all events currently queued on `rx`
pub fn drain_events(rx: &mut mpsc::Receiver<CycleEvent>) -> Vec<CycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
