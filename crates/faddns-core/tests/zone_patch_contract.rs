//! Contract Test: Zone Patching
//!
//! Constraints verified:
//! - Patching an already reconciled zone is byte-identical
//! - Placeholders of unchanged hosts are never touched
//! - Private, loopback and link-local addresses are never published
//! - A changed host with no publishable address keeps its placeholder
//! - Hosts without a placeholder end up unpaired unless forced
//! - The input zone file is never modified

mod common;

use common::*;
use faddns_core::{AddressFamily, AddressReport, RecordStore, ZonePatcher};
use std::collections::BTreeSet;

#[tokio::test]
async fn round_trip_replaces_placeholder() {
    let fixture = ZoneFixture::new(ZONE);
    let store = RecordStore::new();
    store.submit(report("alpha", &["203.0.113.5"])).await;

    let snapshot = store.snapshot().await;
    let output = fixture.path("out");
    let outcome = ZonePatcher::new("10M")
        .patch(
            &fixture.zone_file,
            &output,
            &snapshot.reports,
            &snapshot.changed,
            &snapshot.forced,
        )
        .await
        .unwrap();

    let patched = std::fs::read_to_string(&output).unwrap();
    let alpha_lines: Vec<&str> = patched
        .lines()
        .filter(|line| line.starts_with("alpha"))
        .collect();
    assert_eq!(
        alpha_lines,
        vec!["alpha\t10M\tA\t203.0.113.5 ; @faddns 2024-05-17 08:30:00"]
    );
    assert_eq!(
        patched,
        ZONE.replace("alpha\t10M\tA\t0.0.0.0 ; @faddns\n", &a_line("alpha", "203.0.113.5"))
    );
    assert!(outcome.written.contains("alpha"));
    assert!(!outcome.unpaired.contains("alpha"));

    // Source untouched
    assert_eq!(fixture.read(), ZONE);
}

#[tokio::test]
async fn patching_reconciled_zone_is_idempotent() {
    let fixture = ZoneFixture::new(ZONE);
    let store = RecordStore::new();
    store
        .submit(report("alpha", &["203.0.113.5", "203.0.113.6"]))
        .await;
    let snapshot = store.snapshot().await;
    let patcher = ZonePatcher::new("10M");

    let first = fixture.path("first");
    patcher
        .patch(
            &fixture.zone_file,
            &first,
            &snapshot.reports,
            &snapshot.changed,
            &snapshot.forced,
        )
        .await
        .unwrap();

    // Run twice more against the reconciled output with the same snapshot
    let second = fixture.path("second");
    let third = fixture.path("third");
    for (input, output) in [(&first, &second), (&second, &third)] {
        patcher
            .patch(
                input,
                output,
                &snapshot.reports,
                &snapshot.changed,
                &snapshot.forced,
            )
            .await
            .unwrap();
    }

    let second = std::fs::read(&second).unwrap();
    let third = std::fs::read(&third).unwrap();
    assert_eq!(second, third);
    assert_eq!(second, std::fs::read(&first).unwrap());
}

#[tokio::test]
async fn unchanged_hosts_are_untouched() {
    let store = RecordStore::new();
    store.submit(report("alpha", &["203.0.113.5"])).await;
    store.submit(report("beta", &["203.0.113.99"])).await;
    store.mark_reconciled("beta").await;

    let snapshot = store.snapshot().await;
    let (patched, outcome) = ZonePatcher::new("10M").patch_text(
        ZONE,
        &snapshot.reports,
        &snapshot.changed,
        &snapshot.forced,
    );

    assert!(patched.contains("beta\t10M\tA\t203.0.113.20 ; @faddns 2024-01-01 00:00:00\n"));
    assert!(!patched.contains("203.0.113.99"));
    assert!(!outcome.written.contains("beta"));
}

#[tokio::test]
async fn unpublishable_addresses_are_never_emitted() {
    let store = RecordStore::new();
    let private = [
        (AddressFamily::Inet, "10.0.0.5"),
        (AddressFamily::Inet, "192.168.1.5"),
        (AddressFamily::Inet, "172.20.0.1"),
        (AddressFamily::Inet, "127.0.0.1"),
        (AddressFamily::Inet, "169.254.10.1"),
        (AddressFamily::Inet6, "::1"),
        (AddressFamily::Inet6, "fe80::1234"),
        (AddressFamily::Inet6, "fd12:3456::1"),
    ];
    let report = private
        .iter()
        .fold(AddressReport::new("alpha", "198.51.100.7"), |r, (family, addr)| {
            r.with_address(*family, *addr)
        })
        .with_address(AddressFamily::Inet6, "2001:db8::42")
        .received_at(received_at());
    store.submit(report).await;

    let snapshot = store.snapshot().await;
    let (patched, outcome) = ZonePatcher::new("10M").patch_text(
        ZONE,
        &snapshot.reports,
        &snapshot.changed,
        &snapshot.forced,
    );

    for (_, addr) in private {
        assert!(!patched.contains(addr), "{} was published", addr);
    }
    assert!(patched.contains("alpha\t10M\tAAAA\t2001:db8::42 ; @faddns 2024-05-17 08:30:00\n"));
    assert!(outcome.written.contains("alpha"));
}

#[tokio::test]
async fn empty_report_keeps_placeholder() {
    let store = RecordStore::new();
    store.submit(report("alpha", &[])).await;

    let snapshot = store.snapshot().await;
    let (patched, outcome) = ZonePatcher::new("10M").patch_text(
        ZONE,
        &snapshot.reports,
        &snapshot.changed,
        &snapshot.forced,
    );

    assert_eq!(patched, ZONE);
    assert!(outcome.written.is_empty());
    // Still pending, not reconciled
    assert!(outcome.unpaired.contains("alpha"));
}

#[tokio::test]
async fn missing_placeholder_is_unpaired_unless_forced() {
    let store = RecordStore::new();
    store.submit(report("gamma", &["203.0.113.30"])).await;
    store.submit(report("delta", &["203.0.113.40"])).await;
    store.force_add("delta").await;

    let snapshot = store.snapshot().await;
    let (patched, outcome) = ZonePatcher::new("10M").patch_text(
        ZONE,
        &snapshot.reports,
        &snapshot.changed,
        &snapshot.forced,
    );

    assert_eq!(patched, format!("{}{}", ZONE, a_line("delta", "203.0.113.40")));
    assert_eq!(outcome.unpaired, BTreeSet::from(["gamma".to_string()]));
    assert_eq!(outcome.written, BTreeSet::from(["delta".to_string()]));
    assert_eq!(outcome.appended, vec!["delta".to_string()]);
}

#[tokio::test]
async fn malformed_sentinel_lines_pass_through() {
    let zone = format!("{}; @faddns managed hosts\nalpha ; @faddns\n", ZONE);
    let store = RecordStore::new();
    store.submit(report("alpha", &["203.0.113.5"])).await;

    let snapshot = store.snapshot().await;
    let (patched, outcome) = ZonePatcher::new("10M").patch_text(
        &zone,
        &snapshot.reports,
        &snapshot.changed,
        &snapshot.forced,
    );

    assert!(patched.ends_with("; @faddns managed hosts\nalpha ; @faddns\n"));
    assert!(patched.contains(&a_line("alpha", "203.0.113.5")));
    assert_eq!(outcome.written.len(), 1);
}
