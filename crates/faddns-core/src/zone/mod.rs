//! Zone file manipulation
//!
//! Everything here works on copies: the live zone and serial files are
//! only ever replaced through [`commit`], which renames a fully written
//! work file over the live path.
//!
//! ## Layout
//!
//! - [`records`]: turning an [`AddressReport`](crate::AddressReport) into
//!   record lines
//! - [`patcher`]: rewriting sentinel-tagged placeholder lines
//! - [`serial`]: bumping the SOA serial

pub mod patcher;
pub mod records;
pub mod serial;

use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

pub use patcher::{PatchOutcome, ZonePatcher};
pub use records::{is_publishable, record_lines};
pub use serial::{bump_serial, bump_serial_bytes, bump_serial_text};

/// In-line comment marker identifying lines managed by faddns
pub const SENTINEL: &str = "@faddns";

/// Smallest file size accepted by [`commit`]
pub const MIN_COMMIT_BYTES: u64 = 10;

/// Atomically replace `live` with `work`.
///
/// Refuses to commit a file smaller than [`MIN_COMMIT_BYTES`]; a truncated
/// patch result must never reach the nameserver.
pub async fn commit(work: &Path, live: &Path) -> Result<()> {
    let size = tokio::fs::metadata(work).await?.len();
    if size < MIN_COMMIT_BYTES {
        return Err(Error::data_format(format!(
            "refusing to commit {} ({} bytes)",
            work.display(),
            size
        )));
    }

    tokio::fs::rename(work, live).await?;
    debug!("Committed {} -> {}", work.display(), live.display());
    Ok(())
}

/// Remove a leftover work file, ignoring a missing one
pub async fn discard(work: &Path) -> Result<()> {
    match tokio::fs::remove_file(work).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
