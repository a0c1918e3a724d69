//! Asynchronous client for diagnostic endpoints.

use crate::models::{
    parse_lldp_neighbors, DeletedLease, DhcpLease, FirewallLogEntry, HostInfo, IpFamily,
    LeaseDeletion, LeaseQuery, LldpNeighbor, LogFilter, NeighborEntry, NeighborFilter,
    NeighborTables, SystemInfo,
};
use crate::Result;
use opnsense_core::normalize::{normalize_into, normalize_with_keys};
use opnsense_core::query::QueryParams;
use opnsense_core::wire;
use opnsense_core::{ApplianceClient, ApplianceConfig, Error};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Full ARP table.
pub const ARP_PATH: &str = "/api/diagnostics/interface/get_arp";
/// Full NDP table.
pub const NDP_PATH: &str = "/api/diagnostics/interface/get_ndp";
/// ARP search.
pub const ARP_SEARCH_PATH: &str = "/api/diagnostics/interface/search_arp";
/// NDP search.
pub const NDP_SEARCH_PATH: &str = "/api/diagnostics/interface/search_ndp";
/// System identity and versions.
pub const SYSTEM_INFO_PATH: &str = "/api/diagnostics/system/system_information";

/// Firewall log locations, tried in order after any configured override.
pub const FIREWALL_LOG_CANDIDATES: &[&str] = &[
    "/api/diagnostics/firewall/log",
    "/api/firewall/log",
    "/api/diagnostics/firewall/pf_log",
];

/// Capability name used for firewall log probing.
pub const FIREWALL_LOG_CAPABILITY: &str = "firewall_logs";

/// LLDP neighbor report, served by the `os-lldpd` plugin.
pub const LLDP_NEIGHBOR_CANDIDATES: &[&str] = &["/api/lldpd/service/neighbor"];

/// Capability name used for LLDP probing.
pub const LLDP_CAPABILITY: &str = "lldp";

/// Entries fetched when the caller does not choose a limit.
pub const DEFAULT_LOG_LIMIT: usize = 500;

const NEIGHBOR_KEYS: &[&str] = &["rows", "data"];
const SEARCH_KEYS: &[&str] = &["data", "rows"];
const LEASE_KEYS: &[&str] = &["leases", "rows"];
const LOG_KEYS: &[&str] = &["logs", "data", "rows"];

/// Client for ARP/NDP, DHCP, firewall log and system endpoints.
#[derive(Clone)]
pub struct DiagnosticsClient {
    client: ApplianceClient,
    log_endpoint: Option<String>,
}

impl DiagnosticsClient {
    /// Wrap an appliance transport.
    #[must_use]
    pub const fn new(client: ApplianceClient) -> Self {
        Self {
            client,
            log_endpoint: None,
        }
    }

    /// Build a transport from `config`, honouring its log endpoint override.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from building the transport.
    pub fn from_config(config: &ApplianceConfig) -> Result<Self> {
        let client = ApplianceClient::from_config(config)?;
        Ok(Self::new(client).with_log_endpoint(config.firewall_log_endpoint.clone()))
    }

    /// Try `endpoint` before the built-in firewall log candidates.
    #[must_use]
    pub fn with_log_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.log_endpoint = endpoint.filter(|e| !e.trim().is_empty());
        self
    }

    /// Access the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &ApplianceClient {
        &self.client
    }

    /// Full ARP table.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn arp_table(&self) -> Result<Vec<NeighborEntry>> {
        let body = self.client.get(ARP_PATH).await?;
        Ok(normalize_into(body, NEIGHBOR_KEYS))
    }

    /// Full NDP table.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn ndp_table(&self) -> Result<Vec<NeighborEntry>> {
        let body = self.client.get(NDP_PATH).await?;
        Ok(normalize_into(body, NEIGHBOR_KEYS))
    }

    /// Search the ARP table. `*` or a blank query returns the full table.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn search_arp(&self, query: &str) -> Result<Vec<NeighborEntry>> {
        match search_term(query) {
            Some(term) => self.search(ARP_SEARCH_PATH, term).await,
            None => self.arp_table().await,
        }
    }

    /// Search the NDP table. `*` or a blank query returns the full table.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn search_ndp(&self, query: &str) -> Result<Vec<NeighborEntry>> {
        match search_term(query) {
            Some(term) => self.search(NDP_SEARCH_PATH, term).await,
            None => self.ndp_table().await,
        }
    }

    async fn search(&self, path: &str, term: &str) -> Result<Vec<NeighborEntry>> {
        let mut query = QueryParams::new();
        query.push("search", term);
        let body = self.client.get_with_query(path, &query.into_pairs()).await?;
        Ok(normalize_into(body, SEARCH_KEYS))
    }

    /// Both neighbor tables, narrowed by `filter`.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn neighbors(&self, filter: &NeighborFilter) -> Result<NeighborTables> {
        let tables = NeighborTables {
            arp: self.arp_table().await?,
            ndp: self.ndp_table().await?,
        };
        Ok(tables.filtered(filter))
    }

    /// Lease table for `family`.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn leases(&self, family: IpFamily) -> Result<Vec<DhcpLease>> {
        let path = format!("/api/{}/leases/search_lease", family.service());
        let body = self.client.get(&path).await?;
        let leases: Vec<DhcpLease> = normalize_into(body, LEASE_KEYS);
        debug!(?family, count = leases.len(), "Fetched DHCP leases");
        Ok(leases)
    }

    /// DHCPv4 leases.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn dhcpv4_leases(&self) -> Result<Vec<DhcpLease>> {
        self.leases(IpFamily::V4).await
    }

    /// DHCPv6 leases.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn dhcpv6_leases(&self) -> Result<Vec<DhcpLease>> {
        self.leases(IpFamily::V6).await
    }

    /// Leases of both families matching `query`.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn find_leases(&self, query: &LeaseQuery) -> Result<Vec<(IpFamily, DhcpLease)>> {
        let mut matches = Vec::new();
        for family in [IpFamily::V4, IpFamily::V6] {
            matches.extend(
                self.leases(family)
                    .await?
                    .into_iter()
                    .filter(|lease| query.matches(lease))
                    .map(|lease| (family, lease)),
            );
        }
        Ok(matches)
    }

    /// Delete every lease matching `query`.
    ///
    /// Individual deletion failures are collected in the report rather than
    /// aborting the rest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty query and propagates
    /// failures fetching the lease tables.
    pub async fn delete_leases(&self, query: &LeaseQuery) -> Result<LeaseDeletion> {
        if query.is_empty() {
            return Err(Error::InvalidRequest(
                "Must provide hostname, ip, or mac".to_string(),
            ));
        }

        let mut deleted = Vec::new();
        let mut errors = Vec::new();

        for (family, lease) in self.find_leases(query).await? {
            if lease.ip.is_empty() {
                continue;
            }
            let path = format!("/api/{}/leases/del_lease/{}", family.service(), lease.ip);
            match self.client.post::<()>(&path, None).await {
                Ok(_) => {
                    info!(ip = %lease.ip, ?family, "Deleted DHCP lease");
                    deleted.push(DeletedLease {
                        ip: lease.ip,
                        mac: lease.mac,
                        hostname: lease.hostname,
                        family,
                    });
                }
                Err(err) => {
                    warn!(ip = %lease.ip, ?family, error = %err, "Failed to delete DHCP lease");
                    errors.push(format!("Failed to delete {family:?} lease {}: {err}", lease.ip));
                }
            }
        }

        Ok(LeaseDeletion::new(query.clone(), deleted, errors))
    }

    /// Candidate firewall log paths in probe order.
    #[must_use]
    pub fn firewall_log_candidates(&self) -> Vec<String> {
        self.log_endpoint
            .iter()
            .cloned()
            .chain(FIREWALL_LOG_CANDIDATES.iter().map(|p| (*p).to_string()))
            .collect()
    }

    /// Raw firewall log records, at most `limit` of them (0 for no limit).
    ///
    /// Returns an empty list when no log endpoint is available on this
    /// appliance.
    ///
    /// # Errors
    ///
    /// Propagates failures fetching from the resolved endpoint.
    pub async fn raw_firewall_logs(&self, limit: usize) -> Result<Vec<Value>> {
        let Some(path) = self
            .client
            .resolve_capability(FIREWALL_LOG_CAPABILITY, &self.firewall_log_candidates())
            .await
        else {
            return Ok(Vec::new());
        };

        let mut query = QueryParams::new();
        query.push_opt("limit", (limit > 0).then_some(limit));
        let body = self.client.get_with_query(&path, &query.into_pairs()).await?;
        let mut records = normalize_with_keys(body, LOG_KEYS);
        if limit > 0 {
            records.truncate(limit);
        }
        debug!(path = %path, count = records.len(), "Fetched firewall logs");
        Ok(records)
    }

    /// Parsed firewall log entries, at most `limit` of them.
    ///
    /// Records without a parsable timestamp are skipped.
    ///
    /// # Errors
    ///
    /// See [`DiagnosticsClient::raw_firewall_logs`].
    pub async fn firewall_logs(&self, limit: usize) -> Result<Vec<FirewallLogEntry>> {
        self.logs(&LogFilter::default(), limit).await
    }

    /// Firewall log entries passing `filter`, drawn from the latest `limit`.
    ///
    /// # Errors
    ///
    /// See [`DiagnosticsClient::raw_firewall_logs`].
    pub async fn logs(&self, filter: &LogFilter, limit: usize) -> Result<Vec<FirewallLogEntry>> {
        let records = self.raw_firewall_logs(limit).await?;
        let total = records.len();
        let entries: Vec<FirewallLogEntry> = records
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| match FirewallLogEntry::from_record(raw) {
                Some(entry) => Some((entry, raw)),
                None => {
                    debug!(index, "Skipping unparsable firewall log record");
                    None
                }
            })
            .filter(|(entry, raw)| filter.matches(entry, raw))
            .map(|(entry, _)| entry)
            .collect();
        debug!(total, matched = entries.len(), "Filtered firewall logs");
        Ok(entries)
    }

    /// Log entries whose source or destination contains `ip`, at most
    /// `row_count` of them.
    ///
    /// # Errors
    ///
    /// See [`DiagnosticsClient::raw_firewall_logs`].
    pub async fn search_firewall_logs(
        &self,
        ip: &str,
        row_count: usize,
    ) -> Result<Vec<FirewallLogEntry>> {
        let mut entries: Vec<FirewallLogEntry> = self
            .firewall_logs(DEFAULT_LOG_LIMIT)
            .await?
            .into_iter()
            .filter(|entry| entry.src_ip.contains(ip) || entry.dst_ip.contains(ip))
            .collect();
        entries.truncate(row_count);
        Ok(entries)
    }

    /// Everything known about a hostname, IP or MAC.
    ///
    /// Never fails: each source that cannot be read contributes nothing.
    pub async fn resolve_host_info(&self, query: &str) -> HostInfo {
        let needle = query.trim().to_lowercase();
        let mut info = HostInfo::new(query);
        if needle.is_empty() {
            return info;
        }

        let arp = or_nothing("arp", self.search_arp(&needle).await)
            .into_iter()
            .next();
        if let Some(entry) = &arp {
            info.absorb_neighbor(entry);
        }
        info.arp = arp;

        let ndp = or_nothing("ndp", self.search_ndp(&needle).await)
            .into_iter()
            .next();
        if let Some(entry) = &ndp {
            info.absorb_neighbor(entry);
        }
        info.ndp = ndp;

        for family in [IpFamily::V4, IpFamily::V6] {
            let lease = or_nothing("dhcp", self.leases(family).await)
                .into_iter()
                .find(|lease| lease.mentions(&needle));
            if let Some(lease) = &lease {
                info.absorb_lease(lease);
            }
            match family {
                IpFamily::V4 => info.dhcpv4 = lease,
                IpFamily::V6 => info.dhcpv6 = lease,
            }
        }

        info
    }

    /// Neighbors seen by the LLDP daemon.
    ///
    /// Returns an empty list when the LLDP plugin is not installed.
    ///
    /// # Errors
    ///
    /// Propagates failures fetching the report once the endpoint is resolved.
    pub async fn lldp_neighbors(&self) -> Result<Vec<LldpNeighbor>> {
        let candidates: Vec<String> = LLDP_NEIGHBOR_CANDIDATES
            .iter()
            .map(|p| (*p).to_string())
            .collect();
        let Some(path) = self
            .client
            .resolve_capability(LLDP_CAPABILITY, &candidates)
            .await
        else {
            return Ok(Vec::new());
        };

        let body = self.client.get(&path).await?;
        let report = body.get("response").map(wire::text).unwrap_or_default();
        let neighbors = parse_lldp_neighbors(&report);
        debug!(count = neighbors.len(), "Fetched LLDP neighbors");
        Ok(neighbors)
    }

    /// Hostname and version information.
    ///
    /// # Errors
    ///
    /// Propagates transport failures.
    pub async fn system_info(&self) -> Result<SystemInfo> {
        let body = self.client.get(SYSTEM_INFO_PATH).await?;
        Ok(SystemInfo::from_response(&body))
    }
}

fn search_term(query: &str) -> Option<&str> {
    let query = query.trim();
    (!query.is_empty() && query != "*").then_some(query)
}

fn or_nothing<T>(source: &str, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        warn!(source, error = %err, "Host lookup source unavailable");
        Vec::new()
    })
}
