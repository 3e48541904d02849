//! Record line generation

use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, warn};

use super::SENTINEL;
use crate::report::{AddressFamily, AddressReport};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Whether `addr` may appear in the public zone.
///
/// Loopback, unspecified, multicast, private and link-local ranges of
/// either family are never published. IPv4-mapped IPv6 addresses are
/// judged by their IPv4 part.
pub fn is_publishable(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_unspecified()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_private()
                || v4.is_link_local())
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_publishable(&IpAddr::V4(v4));
            }
            let head = v6.segments()[0];
            let link_local = head & 0xffc0 == 0xfe80;
            let site_local = head & 0xffc0 == 0xfec0;
            let unique_local = head & 0xfe00 == 0xfc00;
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || link_local
                || site_local
                || unique_local)
        }
    }
}

/// Generate the zone lines publishing `report`, without line terminators.
///
/// A lines come first, then AAAA lines, each in report order with
/// duplicates collapsed. Addresses that do not parse, do not match their
/// family or are not publishable are skipped.
pub fn record_lines(report: &AddressReport, ttl: &str) -> Vec<String> {
    let ttl = ttl.to_uppercase();
    let timestamp = report.received_at.format(TIMESTAMP_FORMAT).to_string();
    let mut lines = Vec::new();

    for family in [AddressFamily::Inet, AddressFamily::Inet6] {
        let Some(record_type) = family.record_type() else {
            continue;
        };
        let mut seen = HashSet::new();

        for value in report.addresses_of(family) {
            let addr: IpAddr = match value.trim().parse() {
                Ok(addr) => addr,
                Err(_) => {
                    warn!("{}: ignoring unparsable {} address '{}'", report.host, family, value);
                    continue;
                }
            };

            let family_matches = matches!(
                (family, addr),
                (AddressFamily::Inet, IpAddr::V4(_)) | (AddressFamily::Inet6, IpAddr::V6(_))
            );
            if !family_matches {
                warn!("{}: {} is not an {} address", report.host, addr, family);
                continue;
            }

            if !is_publishable(&addr) {
                debug!("{}: not publishing {}", report.host, addr);
                continue;
            }

            if seen.insert(addr) {
                lines.push(format!(
                    "{}\t{}\t{}\t{} ; {} {}",
                    report.host.to_lowercase(),
                    ttl,
                    record_type,
                    addr,
                    SENTINEL,
                    timestamp
                ));
            }
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_publishable_ranges() {
        for addr in ["203.0.113.5", "8.8.8.8", "2001:db8::5", "2a00:1450::1"] {
            assert!(is_publishable(&addr.parse().unwrap()), "{}", addr);
        }
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.10",
            "169.254.3.4",
            "224.0.0.1",
            "0.0.0.0",
            "::1",
            "::",
            "fe80::1",
            "fd00::1",
            "fec0::1",
            "ff02::1",
            "::ffff:192.168.1.1",
        ] {
            assert!(!is_publishable(&addr.parse().unwrap()), "{}", addr);
        }
    }

    #[test]
    fn test_record_lines_order_and_filtering() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        let report = AddressReport::new("Alpha", "198.51.100.7")
            .with_address(AddressFamily::Ether, "00:11:22:33:44:55")
            .with_address(AddressFamily::Inet6, "2001:DB8::5")
            .with_address(AddressFamily::Inet, "192.168.0.5")
            .with_address(AddressFamily::Inet, "203.0.113.5")
            .with_address(AddressFamily::Inet, "203.0.113.5")
            .with_address(AddressFamily::Inet, "not-an-ip")
            .with_address(AddressFamily::Inet, "2001:db8::6")
            .received_at(at);

        let lines = record_lines(&report, "10m");
        assert_eq!(
            lines,
            vec![
                "alpha\t10M\tA\t203.0.113.5 ; @faddns 2024-05-17 08:30:00".to_string(),
                "alpha\t10M\tAAAA\t2001:db8::5 ; @faddns 2024-05-17 08:30:00".to_string(),
            ]
        );
    }
}
