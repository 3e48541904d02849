//! Configuration types for the reconciliation engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main faddns configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaddnsConfig {
    /// Zone and file locations
    pub zone: ZoneConfig,

    /// Reconciliation cycle settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl FaddnsConfig {
    /// Create a configuration for the given zone with default settings
    pub fn new(zone_name: impl Into<String>, zone_file: impl Into<PathBuf>) -> Self {
        Self {
            zone: ZoneConfig::new(zone_name, zone_file),
            reconcile: ReconcileConfig::default(),
            tools: ToolsConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.zone.validate()?;
        self.reconcile.validate()?;
        self.tools.validate()?;
        Ok(())
    }
}

/// Zone identity and file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone origin (e.g., "example.com")
    pub name: String,

    /// Zone file holding the `@faddns` placeholder lines
    pub zone_file: PathBuf,

    /// File holding the SOA serial; same as `zone_file` when unset
    #[serde(default)]
    pub serial_file: Option<PathBuf>,

    /// Scratch path for patched output; `<zone_file>.faddns-tmp` when unset
    #[serde(default)]
    pub work_file: Option<PathBuf>,
}

impl ZoneConfig {
    /// Create a zone configuration with the serial in the zone file itself
    pub fn new(name: impl Into<String>, zone_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            zone_file: zone_file.into(),
            serial_file: None,
            work_file: None,
        }
    }

    /// Set a separate serial file
    pub fn with_serial_file(mut self, serial_file: impl Into<PathBuf>) -> Self {
        self.serial_file = Some(serial_file.into());
        self
    }

    /// Set the scratch path for patched output
    pub fn with_work_file(mut self, work_file: impl Into<PathBuf>) -> Self {
        self.work_file = Some(work_file.into());
        self
    }

    /// The file holding the serial number
    pub fn serial_path(&self) -> &Path {
        self.serial_file.as_deref().unwrap_or(self.zone_file.as_path())
    }

    /// The scratch file patched output is written to before commit.
    ///
    /// Defaults to a sibling of the zone file so that committing is a
    /// same-filesystem rename.
    pub fn work_path(&self) -> PathBuf {
        match &self.work_file {
            Some(path) => path.clone(),
            None => {
                let mut name = self
                    .zone_file
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_default();
                name.push(".faddns-tmp");
                self.zone_file.with_file_name(name)
            }
        }
    }

    /// Whether zone records and serial live in the same file
    pub fn serial_in_zone_file(&self) -> bool {
        self.serial_path() == self.zone_file.as_path()
    }

    /// Validate the zone configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::config("Zone name cannot be empty"));
        }
        if self.zone_file.as_os_str().is_empty() {
            return Err(crate::Error::config("Zone file path cannot be empty"));
        }
        let work = self.work_path();
        if work == self.zone_file || work == self.serial_path() {
            return Err(crate::Error::config(
                "Work file must differ from the zone and serial files",
            ));
        }
        Ok(())
    }
}

/// Reconciliation cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// How often the coordinator wakes up to decide whether a cycle is needed
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Minimum spacing between two started cycles
    ///
    /// Bursts of reports arriving inside this window are batched into a
    /// single zone update.
    #[serde(default = "default_min_update_interval_secs")]
    pub min_update_interval_secs: u64,

    /// TTL token written into generated record lines
    #[serde(default = "default_record_ttl")]
    pub record_ttl: String,

    /// Whether to reload the nameserver after signing
    #[serde(default = "default_enabled")]
    pub reload_enabled: bool,

    /// Whether to sign the zone after the serial bump
    #[serde(default = "default_enabled")]
    pub sign_enabled: bool,

    /// Capacity of the cycle event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ReconcileConfig {
    /// Validate the reconciliation settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval_secs == 0 {
            return Err(crate::Error::config("Check interval must be > 0"));
        }
        if self.record_ttl.trim().is_empty()
            || self.record_ttl.chars().any(char::is_whitespace)
        {
            return Err(crate::Error::config(
                "Record TTL must be a single non-empty token",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            min_update_interval_secs: default_min_update_interval_secs(),
            record_ttl: default_record_ttl(),
            reload_enabled: true,
            sign_enabled: true,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// External BIND tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Zone syntax checker
    #[serde(default = "default_checkzone_command")]
    pub checkzone_command: String,

    /// DNSSEC signer
    #[serde(default = "default_signzone_command")]
    pub signzone_command: String,

    /// Nameserver control utility
    #[serde(default = "default_rndc_command")]
    pub rndc_command: String,

    /// Upper bound for any single tool invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ToolsConfig {
    /// Validate the tool settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        for (what, cmd) in [
            ("checkzone", &self.checkzone_command),
            ("signzone", &self.signzone_command),
            ("rndc", &self.rndc_command),
        ] {
            if cmd.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "{} command cannot be empty",
                    what
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Tool timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            checkzone_command: default_checkzone_command(),
            signzone_command: default_signzone_command(),
            rndc_command: default_rndc_command(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_check_interval_secs() -> u64 {
    5
}

fn default_min_update_interval_secs() -> u64 {
    30
}

fn default_record_ttl() -> String {
    "10M".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_checkzone_command() -> String {
    "named-checkzone".to_string()
}

fn default_signzone_command() -> String {
    "dnssec-signzone".to_string()
}

fn default_rndc_command() -> String {
    "rndc".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_defaults_to_zone_file() {
        let zone = ZoneConfig::new("example.com", "/etc/bind/db.example.com");
        assert_eq!(zone.serial_path(), Path::new("/etc/bind/db.example.com"));
        assert!(zone.serial_in_zone_file());

        let zone = zone.with_serial_file("/etc/bind/db.example.com.serial");
        assert!(!zone.serial_in_zone_file());
    }

    #[test]
    fn test_work_path_is_sibling() {
        let zone = ZoneConfig::new("example.com", "/etc/bind/db.example.com");
        assert_eq!(
            zone.work_path(),
            PathBuf::from("/etc/bind/db.example.com.faddns-tmp")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = FaddnsConfig::new("example.com", "/tmp/db.example.com");
        assert!(config.validate().is_ok());

        config.reconcile.record_ttl = "10 M".to_string();
        assert!(config.validate().is_err());

        let mut config = FaddnsConfig::new("", "/tmp/db.example.com");
        assert!(config.validate().is_err());
        config.zone.name = "example.com".to_string();
        config.zone.work_file = Some(PathBuf::from("/tmp/db.example.com"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"zone": {"name": "example.com", "zone_file": "/tmp/zone"}}"#;
        let config: FaddnsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.reconcile.check_interval_secs, 5);
        assert_eq!(config.reconcile.record_ttl, "10M");
        assert!(config.reconcile.reload_enabled);
        assert_eq!(config.tools.rndc_command, "rndc");
    }
}
