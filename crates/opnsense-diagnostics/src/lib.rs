//! Read-mostly diagnostics for OPNsense appliances.
//!
//! Covers the ARP and NDP neighbor tables, LLDP neighbors, DHCPv4/DHCPv6
//! leases (including targeted lease deletion), firewall log retrieval with
//! version-dependent endpoint probing, log summaries, host lookup and system
//! information.

#![deny(missing_docs)]

pub mod analysis;
pub mod client;
pub mod models;

pub use analysis::{summarize, LogSummary};
pub use client::DiagnosticsClient;
pub use models::{
    normalize_mac, parse_lldp_neighbors, parse_log_timestamp, DeletedLease, DeletionStatus,
    DhcpLease, FirewallLogEntry, HostInfo, IpFamily, LeaseDeletion, LeaseQuery, LldpNeighbor,
    LogFilter, NeighborEntry, NeighborFilter, NeighborTables, SystemInfo,
};

/// Convenient result alias sharing the `opnsense-core` error type.
pub type Result<T> = opnsense_core::Result<T>;
