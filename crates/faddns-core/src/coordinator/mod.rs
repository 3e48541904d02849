//! Reconciliation cycle coordinator
//!
//! The coordinator wakes up on a fixed tick, decides whether the zone needs
//! rewriting and, if so, drives one cycle through the external tooling.
//!
//! ## State Machine
//!
//! ```text
//!            tick
//!  ┌──────┐ ─────▶ ┌──────────┐ ── nothing to do ──▶ Skipped
//!  │ Idle │        │ Deciding │
//!  └──────┘ ◀──┐   └──────────┘
//!              │         │
//!              │         ▼
//!              │   ┌──────────┐   serial in    ┌────────────┐
//!              │   │ Patching │ ─ zone file ─▶ │ Validating │
//!              │   └──────────┘                └────────────┘
//!              │         │                           │
//!              │         ▼                           ▼
//!              │   ┌────────────┐   ┌─────────┐   ┌───────────┐
//!              └── │ Committing │ ▶ │ Signing │ ▶ │ Reloading │ ──▶ Idle
//!                  └────────────┘   └─────────┘   └───────────┘
//! ```
//!
//! Any stage from `Patching` on may exit to `Failed`. A failed cycle
//! leaves the change set untouched so the next tick retries it.
//!
//! ## Single Flight
//!
//! Cycles run inside the coordinator task; ticks that fire while a cycle
//! is running are skipped rather than queued. [`ReconcileCoordinator::run_cycle`]
//! additionally holds an async mutex so direct callers cannot overlap
//! with the timer loop.
//!
//! ## Limitations
//!
//! Once the zone file has been committed it is not rolled back if the
//! serial bump, signing or reload fails afterwards. The cycle is reported
//! as failed and the pending hosts are retried on the next tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

use crate::config::{FaddnsConfig, ReconcileConfig, ZoneConfig};
use crate::error::{Error, Result};
use crate::store::{RecordStore, Snapshot};
use crate::traits::{ToolOutput, ZoneTools};
use crate::zone::{self, PatchOutcome, ZonePatcher};

/// Stages of a reconciliation cycle that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    Patching,
    Validating,
    Committing,
    Signing,
    Reloading,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patching => "patching",
            Self::Validating => "validating",
            Self::Committing => "committing",
            Self::Signing => "signing",
            Self::Reloading => "reloading",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a tick did not start a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No host has pending changes
    NoChanges,
    /// Every pending host is known to have no placeholder and none is forced
    OnlyUnpaired,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChanges => f.write_str("no changes"),
            Self::OnlyUnpaired => f.write_str("only unpaired hosts pending"),
        }
    }
}

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// A cycle started for this many changed hosts
    Started { changed: usize },

    /// A tick found nothing to do
    Skipped { reason: SkipReason },

    /// The running cycle moved to a new stage
    StageEntered { stage: CycleStage },

    /// The cycle finished
    Succeeded {
        written: Vec<String>,
        unpaired: Vec<String>,
    },

    /// The cycle aborted
    Failed { stage: CycleStage, error: String },

    /// The coordinator loop stopped
    Stopped { reason: String },
}

/// Result of one [`ReconcileCoordinator::run_cycle`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Succeeded {
        written: BTreeSet<String>,
        unpaired: BTreeSet<String>,
    },
    Failed {
        stage: CycleStage,
        error: String,
    },
}

/// Outcome of the last attempted cycle, kept for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleResult {
    Ok,
    Failed,
}

/// Summary of the last attempted cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStatus {
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleResult,
    /// Failing stage, for failed cycles
    pub stage: Option<CycleStage>,
    /// Error message, for failed cycles
    pub message: Option<String>,
    pub written: Vec<String>,
    pub unpaired: Vec<String>,
}

#[derive(Debug)]
struct StageError {
    stage: CycleStage,
    error: Error,
}

trait AtStage<T> {
    fn at(self, stage: CycleStage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: CycleStage) -> std::result::Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

#[derive(Debug, Default)]
struct CycleState {
    last_started: Option<Instant>,
    /// Zone file mtime seen at the end of the last successful cycle
    zone_modified: Option<SystemTime>,
}

/// Reconciliation cycle coordinator
///
/// Owns the zone and serial files: nothing else in the process writes them.
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileCoordinator::new()`]
/// 2. Start with [`ReconcileCoordinator::run()`]
/// 3. The loop runs until a shutdown signal is received
pub struct ReconcileCoordinator {
    store: RecordStore,
    tools: Box<dyn ZoneTools>,
    patcher: ZonePatcher,
    zone: ZoneConfig,
    reconcile: ReconcileConfig,
    tool_timeout: Duration,

    /// Held for the whole cycle
    state: Mutex<CycleState>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<CycleEvent>,
}

impl ReconcileCoordinator {
    /// Create a new coordinator
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver) where event_receiver yields
    /// cycle events
    pub fn new(
        store: RecordStore,
        tools: Box<dyn ZoneTools>,
        config: FaddnsConfig,
    ) -> Result<(Self, mpsc::Receiver<CycleEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.reconcile.event_channel_capacity);

        let coordinator = Self {
            store,
            tools,
            patcher: ZonePatcher::new(config.reconcile.record_ttl.clone()),
            tool_timeout: Duration::from_secs(config.tools.timeout_secs),
            zone: config.zone,
            reconcile: config.reconcile,
            state: Mutex::new(CycleState::default()),
            event_tx: tx,
        };

        Ok((coordinator, rx))
    }

    /// The record store this coordinator reconciles
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Run the timer loop until SIGINT
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the timer loop until `shutdown_rx` fires (or, when `None`, until
    /// SIGINT). A cycle in flight is always finished before stopping.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.reconcile.check_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        info!(
            "Reconciling zone {} every {}s (at most every {}s)",
            self.zone.name, self.reconcile.check_interval_secs, self.reconcile.min_update_interval_secs
        );

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    self.on_tick().await;
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(CycleEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        // Abandon a work file left behind by an interrupted cycle
        zone::discard(&self.zone.work_path()).await?;
        info!("Coordinator stopped");

        Ok(())
    }

    async fn on_tick(&self) {
        let min_interval = Duration::from_secs(self.reconcile.min_update_interval_secs);
        let last_started = self.state.lock().await.last_started;
        if let Some(last) = last_started
            && last.elapsed() < min_interval
        {
            debug!(
                "Last cycle started {}s ago, waiting for the {}s update interval",
                last.elapsed().as_secs(),
                min_interval.as_secs()
            );
            return;
        }

        // Outcome is already logged and recorded in the store
        let _ = self.run_cycle().await;
    }

    /// Run exactly one reconciliation cycle.
    ///
    /// Failures never escape as errors: they are logged, recorded in the
    /// store and returned as [`CycleOutcome::Failed`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut state = self.state.lock().await;
        let snapshot = self.store.snapshot().await;

        if let Some(reason) = self.skip_reason(&snapshot, &state).await {
            debug!("Skipping cycle: {}", reason);
            self.emit_event(CycleEvent::Skipped { reason });
            return CycleOutcome::Skipped(reason);
        }

        state.last_started = Some(Instant::now());
        info!("Reconciling {} changed host(s)", snapshot.changed.len());
        self.emit_event(CycleEvent::Started {
            changed: snapshot.changed.len(),
        });

        match self.execute(&snapshot).await {
            Ok(outcome) => {
                state.zone_modified = self.zone_modified().await;
                self.finish(&snapshot, outcome).await
            }
            Err(StageError { stage, error }) => {
                if let Err(e) = zone::discard(&self.zone.work_path()).await {
                    warn!("Failed to remove work file: {}", e);
                }
                error!("Reconciliation failed while {}: {}", stage, error);

                self.store
                    .record_cycle(CycleStatus {
                        finished_at: Utc::now(),
                        outcome: CycleResult::Failed,
                        stage: Some(stage),
                        message: Some(error.to_string()),
                        written: Vec::new(),
                        unpaired: snapshot.unpaired.iter().cloned().collect(),
                    })
                    .await;
                self.emit_event(CycleEvent::Failed {
                    stage,
                    error: error.to_string(),
                });

                CycleOutcome::Failed {
                    stage,
                    error: error.to_string(),
                }
            }
        }
    }

    async fn skip_reason(&self, snapshot: &Snapshot, state: &CycleState) -> Option<SkipReason> {
        if snapshot.changed.is_empty() {
            return Some(SkipReason::NoChanges);
        }

        let forced_pending = snapshot.changed.intersection(&snapshot.forced).next().is_some();
        if snapshot.changed == snapshot.unpaired && !forced_pending {
            // An edited zone file may now hold placeholders for them
            let modified = self.zone_modified().await;
            if state.zone_modified.is_some() && modified == state.zone_modified {
                return Some(SkipReason::OnlyUnpaired);
            }
        }

        None
    }

    async fn execute(&self, snapshot: &Snapshot) -> std::result::Result<PatchOutcome, StageError> {
        let work = self.zone.work_path();

        self.enter(CycleStage::Patching);
        let outcome = self
            .patcher
            .patch(
                &self.zone.zone_file,
                &work,
                &snapshot.reports,
                &snapshot.changed,
                &snapshot.forced,
            )
            .await
            .at(CycleStage::Patching)?;

        if outcome.written.is_empty() {
            info!("No records written, leaving the live zone untouched");
            zone::discard(&work).await.at(CycleStage::Patching)?;
            return Ok(outcome);
        }

        // A separate serial file is validated by whoever maintains it
        if self.zone.serial_in_zone_file() {
            self.enter(CycleStage::Validating);
            self.call_tool(CycleStage::Validating, self.tools.validate_zone(&self.zone.name, &work))
                .await?;
        }

        self.enter(CycleStage::Committing);
        zone::commit(&work, &self.zone.zone_file)
            .await
            .at(CycleStage::Committing)?;

        let serial_file = self.zone.serial_path();
        let bumped = zone::bump_serial(serial_file, &work)
            .await
            .at(CycleStage::Committing)?;
        if !bumped {
            return Err(StageError {
                stage: CycleStage::Committing,
                error: Error::data_format(format!("no serial found in {}", serial_file.display())),
            });
        }
        zone::commit(&work, serial_file)
            .await
            .at(CycleStage::Committing)?;

        if self.reconcile.sign_enabled {
            self.enter(CycleStage::Signing);
            self.call_tool(CycleStage::Signing, self.tools.sign_zone(&self.zone.name, serial_file))
                .await?;
        } else {
            debug!("Signing disabled");
        }

        if self.reconcile.reload_enabled {
            self.enter(CycleStage::Reloading);
            self.call_tool(CycleStage::Reloading, self.tools.reload_zone(&self.zone.name))
                .await?;
        } else {
            debug!("Reload disabled");
        }

        Ok(outcome)
    }

    async fn finish(&self, snapshot: &Snapshot, outcome: PatchOutcome) -> CycleOutcome {
        let result = self
            .store
            .complete_cycle(snapshot, &outcome.written, &outcome.unpaired)
            .await;

        for host in &result.superseded {
            debug!("{} changed during the cycle, keeping it pending", host);
        }

        for host in &snapshot.changed {
            if !outcome.written.contains(host) && !outcome.unpaired.contains(host) {
                warn!("{} was not processed", host);
            }
        }

        if !outcome.unpaired.is_empty() {
            warn!(
                "No placeholder for: {} (add one to the zone or force-add)",
                outcome.unpaired.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        let written: Vec<String> = outcome.written.iter().cloned().collect();
        let unpaired: Vec<String> = outcome.unpaired.iter().cloned().collect();
        info!(
            "Reconciliation finished: {} written, {} unpaired",
            written.len(),
            unpaired.len()
        );

        self.store
            .record_cycle(CycleStatus {
                finished_at: Utc::now(),
                outcome: CycleResult::Ok,
                stage: None,
                message: None,
                written: written.clone(),
                unpaired: unpaired.clone(),
            })
            .await;
        self.emit_event(CycleEvent::Succeeded { written, unpaired });

        CycleOutcome::Succeeded {
            written: outcome.written,
            unpaired: outcome.unpaired,
        }
    }

    /// Await one tool invocation, bounded by the configured timeout
    async fn call_tool<F>(&self, stage: CycleStage, call: F) -> std::result::Result<(), StageError>
    where
        F: Future<Output = Result<ToolOutput>>,
    {
        match tokio::time::timeout(self.tool_timeout, call).await {
            Ok(Ok(output)) => {
                debug!("{}: {}", output.tool, output.output.trim());
                Ok(())
            }
            Ok(Err(error)) => Err(StageError { stage, error }),
            Err(_) => Err(StageError {
                stage,
                error: Error::timeout(
                    format!("{} ({})", self.tools.tools_name(), stage),
                    self.tool_timeout.as_secs(),
                ),
            }),
        }
    }

    async fn zone_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.zone.zone_file)
            .await
            .and_then(|meta| meta.modified())
            .ok()
    }

    fn enter(&self, stage: CycleStage) {
        debug!("Entering {}", stage);
        self.emit_event(CycleEvent::StageEntered { stage });
    }

    /// Emit a cycle event
    fn emit_event(&self, event: CycleEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
