//! Diagnostic data models: neighbors, leases, firewall log entries and
//! system information.

use chrono::{DateTime, NaiveDateTime, Utc};
use opnsense_core::wire;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = wire::lenient_string(deserializer)?;
    Ok((!text.trim().is_empty()).then_some(text))
}

/// ARP or NDP table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// IP address
    #[serde(default, deserialize_with = "wire::lenient_string")]
    pub ip: String,
    /// Hardware address
    #[serde(default, deserialize_with = "wire::lenient_string")]
    pub mac: String,
    /// Device the neighbor was seen on
    #[serde(default, deserialize_with = "wire::lenient_string")]
    pub intf: String,
    /// Reverse-resolved hostname
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Vendor reported by the appliance
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Seconds until expiry
    #[serde(
        default,
        deserialize_with = "wire::lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<u64>,
    /// Static entry
    #[serde(
        default,
        deserialize_with = "wire::opt_bool_flag::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub permanent: Option<bool>,
    /// Link type
    #[serde(
        default,
        rename = "type",
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub entry_type: Option<String>,
    /// Interface description
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NeighborEntry {
    /// Whether `needle` (lowercase) occurs in the IP, MAC or hostname.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.ip.to_lowercase().contains(needle)
            || self.mac.to_lowercase().contains(needle)
            || self
                .hostname
                .as_deref()
                .is_some_and(|h| h.to_lowercase().contains(needle))
    }
}

/// Exact filters over the neighbor tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborFilter {
    /// MAC address in any common notation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// IPv4 address, applied to the ARP table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// IPv6 address, applied to the NDP table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
}

/// ARP and NDP tables side by side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeighborTables {
    /// IPv4 neighbors
    pub arp: Vec<NeighborEntry>,
    /// IPv6 neighbors
    pub ndp: Vec<NeighborEntry>,
}

impl NeighborTables {
    /// Keep only entries passing `filter`.
    #[must_use]
    pub fn filtered(mut self, filter: &NeighborFilter) -> Self {
        if let Some(mac) = filter.mac.as_deref() {
            let mac = normalize_mac(mac);
            let same_mac = |entry: &NeighborEntry| normalize_mac(&entry.mac) == mac;
            self.arp.retain(same_mac);
            self.ndp.retain(same_mac);
        }
        if let Some(ip) = filter.ip.as_deref() {
            self.arp.retain(|entry| entry.ip == ip);
        }
        if let Some(ipv6) = filter.ipv6.as_deref() {
            self.ndp.retain(|entry| entry.ip.eq_ignore_ascii_case(ipv6));
        }
        self
    }
}

/// Canonical MAC notation: lowercase, colon-separated octets.
///
/// Accepts `-`, `:` and `.` separated forms.
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    let hex: Vec<char> = mac
        .chars()
        .filter(|c| !matches!(c, '-' | ':' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    hex.chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

/// Address family of a DHCP lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    /// DHCPv4
    #[serde(rename = "IPv4")]
    V4,
    /// DHCPv6
    #[serde(rename = "IPv6")]
    V6,
}

impl IpFamily {
    /// Path segment of the lease controller for this family.
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::V4 => "dhcpv4",
            Self::V6 => "dhcpv6",
        }
    }
}

/// DHCP lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LeaseRow")]
pub struct DhcpLease {
    /// Leased address
    pub ip: String,
    /// Client hardware address
    pub mac: String,
    /// Client hostname
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Serving interface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Lease start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts: Option<String>,
    /// Lease end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends: Option<String>,
    /// Lease state (`active`, `expired`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Dynamic or static
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_type: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DhcpLease {
    /// Whether `needle` (lowercase) occurs in the hostname, IP or MAC.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.ip.to_lowercase().contains(needle)
            || self.mac.to_lowercase().contains(needle)
            || self
                .hostname
                .as_deref()
                .is_some_and(|h| h.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Deserialize)]
struct LeaseRow {
    #[serde(default, deserialize_with = "optional_text")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    address: Option<String>,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    mac: String,
    #[serde(default, deserialize_with = "optional_text")]
    hostname: Option<String>,
    #[serde(default, rename = "client-hostname", deserialize_with = "optional_text")]
    client_hostname: Option<String>,
    #[serde(default, rename = "if", deserialize_with = "optional_text")]
    interface: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    if_descr: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    starts: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    ends: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    state: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "optional_text")]
    lease_type: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    descr: Option<String>,
}

impl From<LeaseRow> for DhcpLease {
    fn from(row: LeaseRow) -> Self {
        Self {
            ip: row.ip.or(row.address).unwrap_or_default(),
            mac: row.mac,
            hostname: row.hostname.or(row.client_hostname),
            interface: row.interface.or(row.if_descr),
            starts: row.starts,
            ends: row.ends,
            state: row.state,
            lease_type: row.lease_type,
            description: row.descr,
        }
    }
}

/// Criteria selecting leases. A lease matches when any set criterion does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseQuery {
    /// Hostname, compared case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Exact IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// MAC address in any common notation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl LeaseQuery {
    /// True when no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.hostname, &self.ip, &self.mac]
            .iter()
            .all(|c| c.as_deref().map_or(true, |v| v.trim().is_empty()))
    }

    /// Whether `lease` matches any set criterion.
    #[must_use]
    pub fn matches(&self, lease: &DhcpLease) -> bool {
        let ip = self
            .ip
            .as_deref()
            .is_some_and(|ip| !ip.is_empty() && lease.ip == ip);
        let mac = self
            .mac
            .as_deref()
            .is_some_and(|mac| !mac.is_empty() && normalize_mac(&lease.mac) == normalize_mac(mac));
        let hostname = self.hostname.as_deref().is_some_and(|name| {
            !name.is_empty()
                && lease
                    .hostname
                    .as_deref()
                    .is_some_and(|h| h.eq_ignore_ascii_case(name))
        });
        ip || mac || hostname
    }
}

/// Overall result of a lease deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    /// Every matching lease was deleted
    Success,
    /// Some deletions failed
    PartialSuccess,
    /// Every deletion failed
    Error,
    /// Nothing matched
    NoMatches,
}

/// One deleted lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedLease {
    /// Address of the lease
    pub ip: String,
    /// Client hardware address
    pub mac: String,
    /// Client hostname
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Address family
    #[serde(rename = "type")]
    pub family: IpFamily,
}

/// Report of a lease deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseDeletion {
    /// Overall status
    pub status: DeletionStatus,
    /// Leases removed
    pub deleted_leases: Vec<DeletedLease>,
    /// Number of leases removed
    pub total_deleted: usize,
    /// Criteria as given
    pub search_criteria: LeaseQuery,
    /// Per-lease failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl LeaseDeletion {
    /// Assemble a report, deriving the status from what succeeded.
    #[must_use]
    pub fn new(criteria: LeaseQuery, deleted: Vec<DeletedLease>, errors: Vec<String>) -> Self {
        let status = match (deleted.is_empty(), errors.is_empty()) {
            (false, true) => DeletionStatus::Success,
            (false, false) => DeletionStatus::PartialSuccess,
            (true, false) => DeletionStatus::Error,
            (true, true) => DeletionStatus::NoMatches,
        };
        Self {
            status,
            total_deleted: deleted.len(),
            deleted_leases: deleted,
            search_criteria: criteria,
            errors,
        }
    }
}

/// Everything known about a host across neighbor tables and leases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    /// Query as given
    pub input: String,
    /// Best-known hostname
    pub hostname: Option<String>,
    /// Best-known address
    pub ip: Option<String>,
    /// Best-known hardware address
    pub mac: Option<String>,
    /// First matching ARP entry
    pub arp: Option<NeighborEntry>,
    /// First matching NDP entry
    pub ndp: Option<NeighborEntry>,
    /// First matching DHCPv4 lease
    pub dhcpv4: Option<DhcpLease>,
    /// First matching DHCPv6 lease
    pub dhcpv6: Option<DhcpLease>,
}

impl HostInfo {
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            ..Self::default()
        }
    }

    /// Fill identity fields from a neighbor entry when the address is unknown.
    pub(crate) fn absorb_neighbor(&mut self, entry: &NeighborEntry) {
        if self.ip.is_some() {
            return;
        }
        self.ip = Some(entry.ip.clone()).filter(|ip| !ip.is_empty());
        self.mac = Some(entry.mac.clone()).filter(|mac| !mac.is_empty());
        self.hostname.clone_from(&entry.hostname);
    }

    /// Fill whichever identity fields are still missing from a lease.
    pub(crate) fn absorb_lease(&mut self, lease: &DhcpLease) {
        if self.ip.is_none() && !lease.ip.is_empty() {
            self.ip = Some(lease.ip.clone());
        }
        if self.mac.is_none() && !lease.mac.is_empty() {
            self.mac = Some(lease.mac.clone());
        }
        if self.hostname.is_none() {
            self.hostname.clone_from(&lease.hostname);
        }
    }
}

/// Appliance identity and versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    /// Hostname
    pub name: String,
    /// Firmware version line, e.g. `OPNsense 24.7.5-amd64`
    pub opnsense_version: Option<String>,
    /// Kernel version line, e.g. `FreeBSD 14.1-RELEASE-p5`
    pub kernel_version: Option<String>,
    /// Every version line reported
    pub versions: Vec<String>,
}

impl SystemInfo {
    /// Build from a `system_information` response.
    #[must_use]
    pub fn from_response(body: &Value) -> Self {
        let versions: Vec<String> = body
            .get("versions")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(wire::text).collect())
            .unwrap_or_default();
        let starting_with =
            |prefix: &str| versions.iter().find(|v| v.starts_with(prefix)).cloned();

        Self {
            name: body.get("name").map(wire::text).unwrap_or_default(),
            opnsense_version: starting_with("OPNsense"),
            kernel_version: starting_with("FreeBSD"),
            versions,
        }
    }
}

/// One neighbor reported by the LLDP daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LldpNeighbor {
    /// Local interface the neighbor was seen on
    pub intf: String,
    /// Chassis identifier, e.g. `mac 00:11:22:33:44:55`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis_id: Option<String>,
    /// Advertised system name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    /// Advertised system description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_description: Option<String>,
    /// Management address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_address: Option<String>,
    /// Remote port identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
    /// Remote port description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_description: Option<String>,
    /// Capability lines in report order, e.g. `Bridge, on`
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Parse the `lldpctl` text report into neighbors.
///
/// Each `Interface:` line starts a neighbor; lines before the first one are
/// ignored.
#[must_use]
pub fn parse_lldp_neighbors(report: &str) -> Vec<LldpNeighbor> {
    let mut neighbors = Vec::new();
    let mut current: Option<LldpNeighbor> = None;

    for line in report.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();

        if key == "Interface" {
            neighbors.extend(current.take());
            current = Some(LldpNeighbor {
                intf: value.split(',').next().unwrap_or_default().trim().to_string(),
                ..LldpNeighbor::default()
            });
            continue;
        }

        let Some(neighbor) = current.as_mut() else {
            continue;
        };
        let slot = match key {
            "ChassisID" => &mut neighbor.chassis_id,
            "SysName" => &mut neighbor.system_name,
            "SysDescr" => &mut neighbor.system_description,
            "MgmtIP" => &mut neighbor.management_address,
            "PortID" => &mut neighbor.port_id,
            "PortDescr" => &mut neighbor.port_description,
            "Capability" => {
                neighbor.capabilities.push(value.to_string());
                continue;
            }
            _ => continue,
        };
        *slot = Some(value.to_string());
    }

    neighbors.extend(current);
    neighbors
}

/// Parsed firewall log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallLogEntry {
    /// When the packet was logged
    pub timestamp: DateTime<Utc>,
    /// Interface the packet was seen on
    pub interface: String,
    /// Lowercased action (`pass`, `block`, ...)
    pub action: String,
    /// Lowercased protocol name
    pub protocol: String,
    /// Source address
    pub src_ip: String,
    /// Source port
    pub src_port: Option<u16>,
    /// Destination address
    pub dst_ip: String,
    /// Destination port
    pub dst_port: Option<u16>,
    /// Matching rule number
    pub rule_id: Option<String>,
    /// Rule label
    pub description: Option<String>,
}

impl FirewallLogEntry {
    /// Parse one log record.
    ///
    /// Returns `None` when the record has no parsable timestamp.
    #[must_use]
    pub fn from_record(record: &Value) -> Option<Self> {
        let timestamp = field(record, &["__timestamp__", "timestamp"])
            .as_deref()
            .and_then(parse_log_timestamp)?;
        let port = |names: &[&str]| field(record, names).and_then(|p| p.trim().parse().ok());

        Some(Self {
            timestamp,
            interface: field(record, &["interface"]).unwrap_or_else(|| "unknown".to_string()),
            action: field(record, &["action"])
                .unwrap_or_else(|| "unknown".to_string())
                .to_lowercase(),
            protocol: field(record, &["protoname", "protocol"])
                .unwrap_or_else(|| "unknown".to_string())
                .to_lowercase(),
            src_ip: field(record, &["src", "src_ip"]).unwrap_or_default(),
            src_port: port(&["srcport", "src_port"]),
            dst_ip: field(record, &["dst", "dst_ip"]).unwrap_or_default(),
            dst_port: port(&["dstport", "dst_port"]),
            rule_id: field(record, &["rulenr", "rule_id"]),
            description: field(record, &["label", "description"]),
        })
    }
}

/// Parse an ISO-8601 log timestamp. Values without an offset are taken as UTC.
#[must_use]
pub fn parse_log_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|naive| naive.and_utc())
        })
}

fn field(record: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .map(wire::text)
        .find(|text| !text.trim().is_empty())
}

/// Filters over firewall log entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Action, compared case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Exact source address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    /// Exact destination address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<String>,
    /// Protocol, compared case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Case-insensitive keyword searched in every raw field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl LogFilter {
    /// Whether `entry`, parsed from `raw`, passes every set filter.
    #[must_use]
    pub fn matches(&self, entry: &FirewallLogEntry, raw: &Value) -> bool {
        let same = |filter: &Option<String>, value: &str| {
            filter.as_deref().map_or(true, |f| f.eq_ignore_ascii_case(value))
        };
        if !same(&self.action, &entry.action) || !same(&self.protocol, &entry.protocol) {
            return false;
        }
        if self.src_ip.as_deref().is_some_and(|ip| ip != entry.src_ip)
            || self.dst_ip.as_deref().is_some_and(|ip| ip != entry.dst_ip)
        {
            return false;
        }
        match self.keyword.as_deref().map(str::to_lowercase) {
            Some(keyword) => raw.as_object().is_some_and(|map| {
                map.values()
                    .any(|value| wire::text(value).to_lowercase().contains(&keyword))
            }),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn lldp_report_parsing() {
        let report = "\
-------------------------------------------------------------------------------
LLDP neighbors:
-------------------------------------------------------------------------------
Interface:    igb1, via: LLDP, RID: 1, Time: 0 day, 02:14:51
  Chassis:
    ChassisID:    mac 00:11:22:33:44:55
    SysName:      core-sw01
    SysDescr:     Switch OS 4.2
    MgmtIP:       192.168.1.2
    Capability:   Bridge, on
    Capability:   Router, off
  Port:
    PortID:       ifname gi0/24
    PortDescr:    Uplink to fw01
-------------------------------------------------------------------------------
Interface:    ax0, via: LLDP, RID: 2, Time: 0 day, 00:00:09
  Chassis:
    SysName:      ap-lobby
-------------------------------------------------------------------------------
";
        let neighbors = parse_lldp_neighbors(report);
        assert_eq!(neighbors.len(), 2);

        let switch = &neighbors[0];
        assert_eq!(switch.intf, "igb1");
        assert_eq!(switch.chassis_id.as_deref(), Some("mac 00:11:22:33:44:55"));
        assert_eq!(switch.system_name.as_deref(), Some("core-sw01"));
        assert_eq!(switch.management_address.as_deref(), Some("192.168.1.2"));
        assert_eq!(switch.port_id.as_deref(), Some("ifname gi0/24"));
        assert_eq!(switch.port_description.as_deref(), Some("Uplink to fw01"));
        assert_eq!(switch.capabilities, vec!["Bridge, on", "Router, off"]);

        assert_eq!(neighbors[1].intf, "ax0");
        assert_eq!(neighbors[1].system_name.as_deref(), Some("ap-lobby"));
        assert!(neighbors[1].capabilities.is_empty());

        assert!(parse_lldp_neighbors("").is_empty());
        assert!(parse_lldp_neighbors("SysName: orphan").is_empty());
    }

    #[test]
    fn mac_normalization() {
        assert_eq!(normalize_mac("AA-BB-CC-00-11-22"), "aa:bb:cc:00:11:22");
        assert_eq!(normalize_mac("aabb.cc00.1122"), "aa:bb:cc:00:11:22");
        assert_eq!(normalize_mac("aa:bb:cc:00:11:22"), "aa:bb:cc:00:11:22");
    }

    #[test]
    fn lease_aliases_address_and_blank_fields() {
        let lease: DhcpLease = serde_json::from_value(json!({
            "address": "192.168.2.50",
            "mac": "00:11:22:33:44:55",
            "hostname": "",
            "client-hostname": "printer",
            "if": "lan",
            "state": "active"
        }))
        .unwrap();
        assert_eq!(lease.ip, "192.168.2.50");
        assert_eq!(lease.hostname.as_deref(), Some("printer"));
        assert_eq!(lease.interface.as_deref(), Some("lan"));
    }

    #[test]
    fn lease_query_matches_any_criterion() {
        let lease = DhcpLease::from(LeaseRow {
            ip: Some("10.0.0.9".to_string()),
            address: None,
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            hostname: Some("Laptop".to_string()),
            client_hostname: None,
            interface: None,
            if_descr: None,
            starts: None,
            ends: None,
            state: None,
            lease_type: None,
            descr: None,
        });

        let by_mac = LeaseQuery {
            mac: Some("aa-bb-cc-dd-ee-ff".to_string()),
            ..LeaseQuery::default()
        };
        let by_host = LeaseQuery {
            hostname: Some("laptop".to_string()),
            ..LeaseQuery::default()
        };
        let miss = LeaseQuery {
            ip: Some("10.0.0.10".to_string()),
            ..LeaseQuery::default()
        };

        assert!(by_mac.matches(&lease));
        assert!(by_host.matches(&lease));
        assert!(!miss.matches(&lease));
        assert!(LeaseQuery::default().is_empty());
        assert!(!LeaseQuery::default().matches(&lease));
    }

    #[test]
    fn deletion_status_derivation() {
        let deleted = || {
            vec![DeletedLease {
                ip: "10.0.0.9".to_string(),
                mac: String::new(),
                hostname: None,
                family: IpFamily::V4,
            }]
        };
        let err = || vec!["boom".to_string()];
        let q = LeaseQuery::default;

        assert_eq!(LeaseDeletion::new(q(), deleted(), vec![]).status, DeletionStatus::Success);
        assert_eq!(
            LeaseDeletion::new(q(), deleted(), err()).status,
            DeletionStatus::PartialSuccess
        );
        assert_eq!(LeaseDeletion::new(q(), vec![], err()).status, DeletionStatus::Error);
        assert_eq!(LeaseDeletion::new(q(), vec![], vec![]).status, DeletionStatus::NoMatches);
    }

    #[test]
    fn neighbor_filter_by_mac_and_ip() {
        let entry = |ip: &str, mac: &str| NeighborEntry {
            ip: ip.to_string(),
            mac: mac.to_string(),
            intf: "ax0_vlan2".to_string(),
            hostname: None,
            manufacturer: None,
            expires: None,
            permanent: None,
            entry_type: None,
            description: None,
        };
        let tables = NeighborTables {
            arp: vec![
                entry("10.0.0.1", "aa:aa:aa:aa:aa:aa"),
                entry("10.0.0.2", "bb:bb:bb:bb:bb:bb"),
            ],
            ndp: vec![entry("fe80::1", "AA-AA-AA-AA-AA-AA")],
        };

        let by_mac = tables.clone().filtered(&NeighborFilter {
            mac: Some("AA:AA:AA:AA:AA:AA".to_string()),
            ..NeighborFilter::default()
        });
        assert_eq!(by_mac.arp.len(), 1);
        assert_eq!(by_mac.ndp.len(), 1);

        let by_ip = tables.filtered(&NeighborFilter {
            ip: Some("10.0.0.2".to_string()),
            ..NeighborFilter::default()
        });
        assert_eq!(by_ip.arp[0].mac, "bb:bb:bb:bb:bb:bb");
        assert_eq!(by_ip.ndp.len(), 1);
    }

    #[test]
    fn system_info_picks_version_lines() {
        let info = SystemInfo::from_response(&json!({
            "name": "fw01.example.net",
            "versions": ["OPNsense 24.7.5_3-amd64", "FreeBSD 14.1-RELEASE-p5", "OpenSSL 3.0.15"]
        }));
        assert_eq!(info.name, "fw01.example.net");
        assert_eq!(info.opnsense_version.as_deref(), Some("OPNsense 24.7.5_3-amd64"));
        assert_eq!(info.kernel_version.as_deref(), Some("FreeBSD 14.1-RELEASE-p5"));
        assert_eq!(info.versions.len(), 3);
    }

    #[test]
    fn log_entry_from_appliance_fields() {
        let raw = json!({
            "__timestamp__": "2024-06-01T10:15:30",
            "interface": "ax1",
            "action": "BLOCK",
            "protoname": "TCP",
            "src": "203.0.113.7",
            "srcport": "51515",
            "dst": "198.51.100.10",
            "dstport": 22,
            "label": "Default deny",
            "rulenr": "12"
        });
        let entry = FirewallLogEntry::from_record(&raw).unwrap();
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 10, 15, 30).unwrap());
        assert_eq!(entry.action, "block");
        assert_eq!(entry.protocol, "tcp");
        assert_eq!(entry.src_port, Some(51515));
        assert_eq!(entry.dst_port, Some(22));
        assert_eq!(entry.rule_id.as_deref(), Some("12"));

        assert!(FirewallLogEntry::from_record(&json!({"action": "pass"})).is_none());
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(parse_log_timestamp("2024-06-01T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_log_timestamp("2024-06-01 08:00:00"), Some(expected));
        assert!(parse_log_timestamp("yesterday").is_none());
    }

    #[test]
    fn log_filter_keyword_searches_raw_fields() {
        let raw = json!({
            "__timestamp__": "2024-06-01T10:15:30Z",
            "action": "pass",
            "protoname": "udp",
            "src": "10.0.0.5",
            "dst": "1.1.1.1",
            "label": "Allow DNS"
        });
        let entry = FirewallLogEntry::from_record(&raw).unwrap();

        let filter = LogFilter {
            action: Some("PASS".to_string()),
            keyword: Some("dns".to_string()),
            ..LogFilter::default()
        };
        assert!(filter.matches(&entry, &raw));

        let filter = LogFilter {
            src_ip: Some("10.0.0.6".to_string()),
            ..LogFilter::default()
        };
        assert!(!filter.matches(&entry, &raw));
    }
}
