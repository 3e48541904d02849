// # Zone Tools Trait
//
// Defines the interface to the external tooling that validates, signs and
// reloads a zone after it has been patched.
//
// ## Implementations
//
// - BIND (`named-checkzone`, `dnssec-signzone`, `rndc`): `faddns-bind` crate
//
// ## Usage
//
// ```rust,ignore
// use faddns_core::ZoneTools;
//
// #[tokio::main]
// async fn main() -> faddns_core::Result<()> {
//     let tools = /* ZoneTools implementation */;
//
//     tools.validate_zone("example.com", "/etc/bind/db.example.com".as_ref()).await?;
//     tools.reload_zone("example.com").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::path::Path;

/// Captured result of a successful tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Tool name, for logging
    pub tool: String,
    /// Combined stdout/stderr of the tool
    pub output: String,
}

impl ToolOutput {
    pub fn new(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            output: output.into(),
        }
    }
}

/// Trait for the external zone tooling
///
/// Each method is one opaque external invocation. The coordinator only
/// observes success or failure and logs the captured output; it owns
/// ordering, timeouts and retry-on-next-tick.
///
/// # Errors
///
/// - [`validate_zone`](Self::validate_zone) reports a rejected zone as
///   [`Error::Validation`](crate::Error::Validation)
/// - any tool that cannot be started or exits non-zero reports
///   [`Error::Tool`](crate::Error::Tool)
///
/// # Forbidden
///
/// Implementations must not edit the zone or serial files themselves and
/// must not retry.
#[async_trait]
pub trait ZoneTools: Send + Sync {
    /// Check the syntax of the zone file at `path`
    async fn validate_zone(&self, zone: &str, path: &Path) -> crate::Result<ToolOutput>;

    /// Sign the zone whose serial file is at `path`
    async fn sign_zone(&self, zone: &str, path: &Path) -> crate::Result<ToolOutput>;

    /// Ask the nameserver to reload the zone
    async fn reload_zone(&self, zone: &str) -> crate::Result<ToolOutput>;

    /// Name of the tool family (for logging)
    fn tools_name(&self) -> &'static str;
}
