//! Integration tests for diagnostics data parsing.
//!
//! These tests decode recorded neighbor, lease and firewall log responses
//! and run the lookup and summary helpers over them.

use opnsense_core::normalize::{normalize_into, normalize_with_keys};
use opnsense_diagnostics::{
    summarize, DhcpLease, FirewallLogEntry, LeaseQuery, LogFilter, NeighborEntry, NeighborFilter,
    NeighborTables,
};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_fixture(name: &str) -> Value {
    let fixture_path = fixtures_dir().join(name);
    let raw = fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!("Failed to read fixture at {}: {}", fixture_path.display(), e)
    });
    serde_json::from_str(&raw).unwrap()
}

fn arp_table() -> Vec<NeighborEntry> {
    normalize_into(load_fixture("arp_table.json"), &["rows"])
}

fn leases() -> Vec<DhcpLease> {
    normalize_into(load_fixture("dhcpv4_leases.json"), &["leases", "rows"])
}

fn log_records() -> Vec<Value> {
    normalize_with_keys(load_fixture("firewall_logs.json"), &["logs", "data", "rows"])
}

#[test]
fn test_parse_arp_table() {
    let entries = arp_table();
    assert_eq!(entries.len(), 3);

    let gateway = &entries[0];
    assert_eq!(gateway.ip, "192.168.2.1");
    assert_eq!(gateway.hostname, None);
    assert_eq!(gateway.expires, None);
    assert_eq!(gateway.permanent, Some(true));
    assert_eq!(gateway.entry_type.as_deref(), Some("ethernet"));

    let pihole = &entries[2];
    assert_eq!(pihole.expires, Some(903));
    assert_eq!(pihole.permanent, Some(false));
    assert_eq!(pihole.manufacturer.as_deref(), Some("Raspberry Pi Foundation"));
}

#[test]
fn test_neighbor_filter_by_mac_notation() {
    let tables = NeighborTables {
        arp: arp_table(),
        ndp: Vec::new(),
    };
    let filtered = tables.filtered(&NeighborFilter {
        mac: Some("3C-22-FB-10-AA-41".to_string()),
        ..NeighborFilter::default()
    });
    assert_eq!(filtered.arp.len(), 1);
    assert_eq!(filtered.arp[0].hostname.as_deref(), Some("studio-mac.lan"));
}

#[test]
fn test_parse_leases_with_field_aliases() {
    let leases = leases();
    assert_eq!(leases.len(), 4);

    let wired = &leases[1];
    assert_eq!(wired.ip, "192.168.2.42");
    assert_eq!(wired.hostname.as_deref(), Some("studio-mac-wired"));
    assert_eq!(wired.interface.as_deref(), Some("LAN"));
    assert_eq!(wired.starts, None);

    let pihole = &leases[2];
    assert_eq!(pihole.interface.as_deref(), Some("opt1"));
    assert_eq!(pihole.lease_type.as_deref(), Some("static"));
    assert_eq!(pihole.description.as_deref(), Some("DNS sinkhole"));
}

#[test]
fn test_lease_query_matches_any_criterion() {
    let leases = leases();

    let by_mac = LeaseQuery {
        mac: Some("3c:22:fb:10:aa:41".to_string()),
        ..LeaseQuery::default()
    };
    let matched: Vec<_> = leases.iter().filter(|l| by_mac.matches(l)).collect();
    assert_eq!(matched.len(), 2);

    let by_host_or_ip = LeaseQuery {
        hostname: Some("guest-phone".to_string()),
        ip: Some("192.168.81.15".to_string()),
        mac: None,
    };
    let matched: Vec<_> = leases
        .iter()
        .filter(|l| by_host_or_ip.matches(l))
        .map(|l| l.ip.as_str())
        .collect();
    assert_eq!(matched, vec!["192.168.81.15", "192.168.4.77"]);
}

#[test]
fn test_parse_firewall_logs_skips_untimed_records() {
    let records = log_records();
    assert_eq!(records.len(), 5);

    let entries: Vec<FirewallLogEntry> = records
        .iter()
        .filter_map(FirewallLogEntry::from_record)
        .collect();
    assert_eq!(entries.len(), 4);

    let first = &entries[0];
    assert_eq!(first.protocol, "tcp");
    assert_eq!(first.src_port, Some(51514));
    assert_eq!(first.dst_port, Some(22));
    assert_eq!(first.rule_id.as_deref(), Some("7"));
    assert_eq!(first.description.as_deref(), Some("Default deny rule"));
}

#[test]
fn test_log_filter_keyword_searches_raw_fields() {
    let records = log_records();
    let filter = LogFilter {
        keyword: Some("dns".to_string()),
        ..LogFilter::default()
    };
    let matched: Vec<FirewallLogEntry> = records
        .iter()
        .filter_map(|raw| FirewallLogEntry::from_record(raw).map(|entry| (entry, raw)))
        .filter(|(entry, raw)| filter.matches(entry, raw))
        .map(|(entry, _)| entry)
        .collect();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].dst_ip, "192.168.81.15");
}

#[test]
fn test_summarize_recorded_logs() {
    let entries: Vec<FirewallLogEntry> = log_records()
        .iter()
        .filter_map(FirewallLogEntry::from_record)
        .collect();
    let summary = summarize(&entries);

    assert_eq!(summary.total_entries, 4);
    assert_eq!(summary.blocked_count, 3);
    assert_eq!(summary.protocol_counts["tcp"], 2);
    assert_eq!(summary.protocol_counts["udp"], 2);
    assert_eq!(summary.top_sources[0], ("203.0.113.7".to_string(), 2));
    assert_eq!(summary.top_destinations[0], ("198.51.100.10".to_string(), 3));
    assert_eq!(summary.top_blocked_ports, vec![(22, 2), (3389, 1)]);

    let (first, last) = summary.time_range.unwrap();
    assert_eq!(first, entries[1].timestamp);
    assert_eq!(last, entries[3].timestamp);
}
