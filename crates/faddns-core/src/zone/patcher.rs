//! Zone Patcher
//!
//! Rewrites the sentinel-tagged placeholder lines of changed hosts with
//! freshly generated record lines. Every other line, including the
//! placeholders of unchanged hosts, passes through byte for byte. Zone
//! files are handled as bytes: a comment in a legacy encoding must not
//! stop the zone from being patched.
//!
//! The scan and the bookkeeping are two separate passes: the scan only
//! collects written hosts, and the remaining unpaired hosts are computed
//! afterwards as `changed - written`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

use super::SENTINEL;
use super::records::record_lines;
use crate::error::Result;
use crate::report::{AddressReport, normalize_host};

/// Result of patching one zone file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Hosts whose record lines were written
    pub written: BTreeSet<String>,
    /// Changed hosts that were not written
    pub unpaired: BTreeSet<String>,
    /// Forced hosts appended at the end of the file
    pub appended: Vec<String>,
}

enum LineKind {
    Plain,
    Malformed,
    Placeholder(String),
}

fn classify(line: &str) -> LineKind {
    if !line.contains(SENTINEL) {
        return LineKind::Plain;
    }

    let data = line.split(';').next().unwrap_or_default();
    let mut fields = data.split_whitespace();
    match (fields.next(), fields.count()) {
        (Some(host), rest) if rest >= 3 => LineKind::Placeholder(normalize_host(host)),
        _ => LineKind::Malformed,
    }
}

/// Rewrites placeholder lines in a zone file
#[derive(Debug, Clone)]
pub struct ZonePatcher {
    ttl: String,
}

impl ZonePatcher {
    /// Create a patcher writing records with the given TTL token
    pub fn new(ttl: impl Into<String>) -> Self {
        Self { ttl: ttl.into() }
    }

    /// Patch `zone_in` into `output`.
    ///
    /// `zone_in` is copied to `output` first so that permissions carry
    /// over, then `output` is rewritten with the patched content. The
    /// input file is never modified.
    pub async fn patch(
        &self,
        zone_in: &Path,
        output: &Path,
        reports: &BTreeMap<String, AddressReport>,
        changed: &BTreeSet<String>,
        forced: &BTreeSet<String>,
    ) -> Result<PatchOutcome> {
        tokio::fs::copy(zone_in, output).await?;
        let content = tokio::fs::read(output).await?;

        let (patched, outcome) = self.patch_bytes(&content, reports, changed, forced);
        tokio::fs::write(output, patched).await?;

        info!(
            "Patched {} into {}: {} written, {} unpaired",
            zone_in.display(),
            output.display(),
            outcome.written.len(),
            outcome.unpaired.len()
        );
        Ok(outcome)
    }

    /// Patch zone file content held in memory
    pub fn patch_text(
        &self,
        text: &str,
        reports: &BTreeMap<String, AddressReport>,
        changed: &BTreeSet<String>,
        forced: &BTreeSet<String>,
    ) -> (String, PatchOutcome) {
        let (out, outcome) = self.patch_bytes(text.as_bytes(), reports, changed, forced);
        (String::from_utf8_lossy(&out).into_owned(), outcome)
    }

    /// Patch raw zone file content.
    ///
    /// Only sentinel lines are interpreted; all other bytes are copied
    /// through whatever their encoding.
    pub fn patch_bytes(
        &self,
        content: &[u8],
        reports: &BTreeMap<String, AddressReport>,
        changed: &BTreeSet<String>,
        forced: &BTreeSet<String>,
    ) -> (Vec<u8>, PatchOutcome) {
        let mut out = Vec::with_capacity(content.len());
        let mut matched = BTreeSet::new();
        let mut outcome = PatchOutcome::default();

        for (index, line) in content.split_inclusive(|b| *b == b'\n').enumerate() {
            let text = String::from_utf8_lossy(line);
            let host = match classify(&text) {
                LineKind::Plain => {
                    out.extend_from_slice(line);
                    continue;
                }
                LineKind::Malformed => {
                    warn!(
                        "Line {}: {} line is not a record, leaving it alone: {}",
                        index + 1,
                        SENTINEL,
                        text.trim_end()
                    );
                    out.extend_from_slice(line);
                    continue;
                }
                LineKind::Placeholder(host) => host,
            };

            if outcome.written.contains(&host) {
                debug!("Line {}: dropping duplicate placeholder for {}", index + 1, host);
                continue;
            }

            if !changed.contains(&host) {
                out.extend_from_slice(line);
                continue;
            }

            matched.insert(host.clone());
            let lines = self.lines_for(&host, reports);
            if lines.is_empty() {
                debug!("{}: nothing publishable, keeping placeholder", host);
                out.extend_from_slice(line);
                continue;
            }

            push_lines(&mut out, &lines);
            debug!("{}: wrote {} record line(s)", host, lines.len());
            outcome.written.insert(host);
        }

        for host in changed.intersection(forced) {
            if matched.contains(host) {
                continue;
            }

            let lines = self.lines_for(host, reports);
            if lines.is_empty() {
                debug!("{}: forced but nothing publishable", host);
                continue;
            }

            if out.last().is_some_and(|b| *b != b'\n') {
                out.push(b'\n');
            }
            push_lines(&mut out, &lines);
            info!("{}: appended {} forced record line(s)", host, lines.len());
            outcome.written.insert(host.clone());
            outcome.appended.push(host.clone());
        }

        outcome.unpaired = changed.difference(&outcome.written).cloned().collect();
        (out, outcome)
    }

    fn lines_for(&self, host: &str, reports: &BTreeMap<String, AddressReport>) -> Vec<String> {
        match reports.get(host) {
            Some(report) => record_lines(report, &self.ttl),
            None => {
                warn!("{}: marked changed but no report stored", host);
                Vec::new()
            }
        }
    }
}

fn push_lines(out: &mut Vec<u8>, lines: &[String]) {
    for record in lines {
        out.extend_from_slice(record.as_bytes());
        out.push(b'\n');
    }
}
