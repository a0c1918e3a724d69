//! Aggregate statistics over firewall log entries.

use crate::models::FirewallLogEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Entries kept in each top-N list.
pub const TOP_N: usize = 10;

/// Summary of a batch of log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    /// Number of entries summarized
    pub total_entries: usize,
    /// Entries per action
    pub action_counts: BTreeMap<String, usize>,
    /// Entries per protocol
    pub protocol_counts: BTreeMap<String, usize>,
    /// Most frequent source addresses
    pub top_sources: Vec<(String, usize)>,
    /// Most frequent destination addresses
    pub top_destinations: Vec<(String, usize)>,
    /// Most frequently blocked destination ports
    pub top_blocked_ports: Vec<(u16, usize)>,
    /// Entries with action `block`
    pub blocked_count: usize,
    /// Earliest and latest timestamps
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Summarize `logs`.
#[must_use]
pub fn summarize(logs: &[FirewallLogEntry]) -> LogSummary {
    let mut summary = LogSummary {
        total_entries: logs.len(),
        ..LogSummary::default()
    };
    let mut sources: HashMap<String, usize> = HashMap::new();
    let mut destinations: HashMap<String, usize> = HashMap::new();
    let mut blocked_ports: HashMap<u16, usize> = HashMap::new();

    for entry in logs {
        *summary.action_counts.entry(entry.action.clone()).or_default() += 1;
        *summary
            .protocol_counts
            .entry(entry.protocol.clone())
            .or_default() += 1;
        *sources.entry(entry.src_ip.clone()).or_default() += 1;
        *destinations.entry(entry.dst_ip.clone()).or_default() += 1;

        if entry.action == "block" {
            summary.blocked_count += 1;
            if let Some(port) = entry.dst_port {
                *blocked_ports.entry(port).or_default() += 1;
            }
        }

        summary.time_range = Some(match summary.time_range {
            Some((first, last)) => (first.min(entry.timestamp), last.max(entry.timestamp)),
            None => (entry.timestamp, entry.timestamp),
        });
    }

    summary.top_sources = top_n(sources);
    summary.top_destinations = top_n(destinations);
    summary.top_blocked_ports = top_n(blocked_ports);
    summary
}

/// Highest counts first; ties broken by key so output is stable.
fn top_n<K: Ord + Hash>(counts: HashMap<K, usize>) -> Vec<(K, usize)> {
    let mut ranked: Vec<(K, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_N);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(minute: u32, action: &str, src: &str, dst_port: Option<u16>) -> FirewallLogEntry {
        FirewallLogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap(),
            interface: "ax1".to_string(),
            action: action.to_string(),
            protocol: "tcp".to_string(),
            src_ip: src.to_string(),
            src_port: None,
            dst_ip: "198.51.100.10".to_string(),
            dst_port,
            rule_id: None,
            description: None,
        }
    }

    #[test]
    fn empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary, LogSummary::default());
        assert!(summary.time_range.is_none());
    }

    #[test]
    fn counts_and_rankings() {
        let logs = vec![
            entry(5, "block", "203.0.113.7", Some(22)),
            entry(1, "block", "203.0.113.7", Some(22)),
            entry(9, "pass", "10.0.0.5", Some(443)),
            entry(3, "block", "203.0.113.9", Some(3389)),
        ];
        let summary = summarize(&logs);

        assert_eq!(summary.total_entries, 4);
        assert_eq!(summary.blocked_count, 3);
        assert_eq!(summary.action_counts["block"], 3);
        assert_eq!(summary.protocol_counts["tcp"], 4);
        assert_eq!(summary.top_sources[0], ("203.0.113.7".to_string(), 2));
        assert_eq!(summary.top_sources[1], ("10.0.0.5".to_string(), 1));
        assert_eq!(summary.top_destinations, vec![("198.51.100.10".to_string(), 4)]);
        assert_eq!(summary.top_blocked_ports, vec![(22, 2), (3389, 1)]);

        let (first, last) = summary.time_range.unwrap();
        assert_eq!(first, logs[1].timestamp);
        assert_eq!(last, logs[2].timestamp);
    }

    #[test]
    fn top_lists_are_capped() {
        let logs: Vec<_> = (0..15)
            .map(|i| entry(i, "pass", &format!("10.0.0.{i}"), None))
            .collect();
        assert_eq!(summarize(&logs).top_sources.len(), TOP_N);
    }
}
