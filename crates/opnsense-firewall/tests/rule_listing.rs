//! Integration tests for rule parsing and interface-aware filtering.
//!
//! These tests validate rule decoding against a recorded `searchRule`
//! response and filter the result through a resolver fed static metadata.

use opnsense_core::normalize::normalize_into;
use opnsense_firewall::{Action, Direction, FirewallRule, IpProtocol, RuleFilter};
use opnsense_interfaces::{
    InterfaceDescriptor, InterfaceGroup, InterfaceResolver, InterfaceSource, Resolution, Result,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_rules() -> Vec<FirewallRule> {
    let fixture_path = fixtures_dir().join("search_rules.json");
    let raw = fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!("Failed to read fixture at {}: {}", fixture_path.display(), e)
    });
    let body: serde_json::Value = serde_json::from_str(&raw).unwrap();
    normalize_into(body, &["rows"])
}

struct StaticSource;

#[async_trait::async_trait]
impl InterfaceSource for StaticSource {
    async fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>> {
        Ok(vec![
            InterfaceDescriptor::new("lan", "ax0_vlan2").with_description("LAN"),
            InterfaceDescriptor::new("opt1", "ax0_vlan81").with_description("WiFi"),
            InterfaceDescriptor::new("opt2", "ax0_vlan4").with_description("Guest"),
            InterfaceDescriptor::new("opt3", "ax0_vlan3").with_description("Lab"),
            InterfaceDescriptor::new("wan", "ax1").with_description("WAN uplink"),
        ])
    }

    async fn groups(&self) -> Result<Vec<InterfaceGroup>> {
        Ok(vec![InterfaceGroup::new("wireless", ["opt1", "opt2"])])
    }
}

fn resolver() -> InterfaceResolver {
    InterfaceResolver::new(Arc::new(StaticSource))
}

fn filtered(
    rules: &[FirewallRule],
    filter: &RuleFilter,
    resolution: Option<&Resolution>,
) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| filter.matches(rule, resolution))
        .map(|rule| rule.description.clone())
        .collect()
}

#[test]
fn test_parse_rule_fixture() {
    let rules = load_rules();
    assert_eq!(rules.len(), 4, "row without a uuid should be skipped");

    let ssh = &rules[1];
    assert_eq!(ssh.action, Action::Block);
    assert_eq!(ssh.ip_protocol, IpProtocol::Inet46);
    assert_eq!(ssh.destination.port, "22");
    assert_eq!(ssh.source.port, "any");
    assert!(ssh.log);
    assert_eq!(ssh.interfaces().collect::<Vec<_>>(), vec!["opt1", "opt2"]);

    let lab = &rules[2];
    assert!(!lab.enabled);
    assert!(!lab.quick);
    assert_eq!(lab.direction, Direction::Out);
    assert_eq!(lab.gateway, "WAN_DHCP");

    assert_eq!(rules[3].sequence, Some(4));
    assert!(rules[3].quick);
}

#[tokio::test]
async fn test_filter_by_friendly_name_uses_resolution() {
    let rules = load_rules();
    let filter = RuleFilter {
        interface: Some("wifi".to_string()),
        ..RuleFilter::default()
    };

    let resolution = resolver().resolve("wifi").await;
    assert!(resolution.devices.contains("ax0_vlan81"));
    assert_eq!(
        filtered(&rules, &filter, Some(&resolution)),
        vec!["Block wireless SSH to LAN"]
    );

    // Without resolution "wifi" matches no logical name.
    assert!(filtered(&rules, &filter, None).is_empty());
}

#[tokio::test]
async fn test_filter_by_group_and_action() {
    let rules = load_rules();
    let resolution = resolver().resolve("wireless").await;

    let filter = RuleFilter {
        interface: Some("wireless".to_string()),
        action: Some(Action::Block),
        ..RuleFilter::default()
    };
    assert_eq!(
        filtered(&rules, &filter, Some(&resolution)),
        vec!["Block wireless SSH to LAN"]
    );
}

#[test]
fn test_filter_protocol_and_enabled() {
    let rules = load_rules();

    let filter = RuleFilter {
        protocol: Some("icmp".to_string()),
        ..RuleFilter::default()
    };
    assert_eq!(filtered(&rules, &filter, None), vec!["block-test"]);

    let filter = RuleFilter {
        enabled: Some(false),
        ..RuleFilter::default()
    };
    assert_eq!(filtered(&rules, &filter, None), vec!["Lab DNS egress (disabled)"]);
}
