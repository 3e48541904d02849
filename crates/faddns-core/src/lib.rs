// # faddns-core
//
// Core library of the faddns zone updater.
//
// Hosts report their addresses; faddns rewrites the matching placeholder
// lines of a BIND zone file, bumps the serial, and has the zone signed and
// reloaded.
//
// ## Architecture Overview
//
// - **RecordStore**: latest report per host plus the changed, unpaired and
//   forced bookkeeping sets, behind one lock
// - **Ingestor**: transport-independent report, dump and force-add entry points
// - **ZonePatcher**: rewrites `@faddns` placeholder lines from a store snapshot
// - **Serial incrementer**: bumps the SOA serial of the committed zone
// - **ReconcileCoordinator**: timer-driven, single-flight reconciliation cycle
// - **ZoneTools**: trait for the external validate/sign/reload tooling
//
// ## Design Principles
//
// 1. **Copy, then rename**: live zone and serial files are never edited in place
// 2. **Pending until published**: a host stays changed until a cycle
//    completes with its records written
// 3. **Library-First**: the daemon is a thin shell around this crate

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ingest;
pub mod report;
pub mod store;
pub mod traits;
pub mod zone;

// Re-export core types for convenience
pub use config::{FaddnsConfig, ReconcileConfig, ToolsConfig, ZoneConfig};
pub use coordinator::{
    CycleEvent, CycleOutcome, CycleResult, CycleStage, CycleStatus, ReconcileCoordinator,
    SkipReason,
};
pub use error::{Error, Result};
pub use ingest::{Ack, DumpEntry, Ingestor, StatusView};
pub use report::{Address, AddressFamily, AddressReport};
pub use store::{RecordStore, Snapshot};
pub use traits::{ToolOutput, ZoneTools};
pub use zone::{PatchOutcome, ZonePatcher, bump_serial};
