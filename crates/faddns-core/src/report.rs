//! Address reports submitted by hosts
//!
//! An [`AddressReport`] is the latest self-reported state of one host. It is
//! replaced wholesale on every accepted report, never merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Address family of a reported address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Hardware (MAC) address, informational only
    Ether,
    /// IPv4 address, published as an A record
    Inet,
    /// IPv6 address, published as an AAAA record
    Inet6,
}

impl AddressFamily {
    /// All families, in the order records are generated and dumped
    pub const ALL: [AddressFamily; 3] = [Self::Ether, Self::Inet, Self::Inet6];

    /// Wire name of the family
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ether => "ether",
            Self::Inet => "inet",
            Self::Inet6 => "inet6",
        }
    }

    /// DNS record type published for this family, if any
    pub fn record_type(&self) -> Option<&'static str> {
        match self {
            Self::Ether => None,
            Self::Inet => Some("A"),
            Self::Inet6 => Some("AAAA"),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressFamily {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ether" => Ok(Self::Ether),
            "inet" => Ok(Self::Inet),
            "inet6" => Ok(Self::Inet6),
            other => Err(crate::Error::data_format(format!(
                "unsupported address family '{}'",
                other
            ))),
        }
    }
}

/// One reported `(family, value)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub family: AddressFamily,
    pub value: String,
}

impl Address {
    pub fn new(family: AddressFamily, value: impl Into<String>) -> Self {
        Self {
            family,
            value: value.into(),
        }
    }
}

/// The latest self-reported state of one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressReport {
    /// Host identifier, lower-cased
    pub host: String,
    /// Client software version (informational)
    pub version: Option<String>,
    /// When the report was received
    pub received_at: DateTime<Utc>,
    /// Peer address observed by the transport
    pub source_address: String,
    /// Reported addresses, in report order
    pub addresses: Vec<Address>,
}

impl AddressReport {
    /// Create an empty report for `host` received now
    pub fn new(host: &str, source_address: impl Into<String>) -> Self {
        Self {
            host: normalize_host(host),
            version: None,
            received_at: Utc::now(),
            source_address: source_address.into(),
            addresses: Vec::new(),
        }
    }

    /// Set the client version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Append one address
    pub fn with_address(mut self, family: AddressFamily, value: impl Into<String>) -> Self {
        self.addresses.push(Address::new(family, value));
        self
    }

    /// Override the receive timestamp
    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Addresses of one family, in report order
    pub fn addresses_of(&self, family: AddressFamily) -> impl Iterator<Item = &str> {
        self.addresses
            .iter()
            .filter(move |a| a.family == family)
            .map(|a| a.value.as_str())
    }

    /// Compare reported content, ignoring the receive timestamp, the order
    /// addresses were listed in and repeated addresses.
    pub fn same_content(&self, other: &AddressReport) -> bool {
        self.host == other.host
            && self.version == other.version
            && self.source_address == other.source_address
            && self.addresses.iter().collect::<BTreeSet<_>>()
                == other.addresses.iter().collect::<BTreeSet<_>>()
    }
}

/// Canonical form of a host identifier
pub fn normalize_host(host: &str) -> String {
    host.trim().to_lowercase()
}
