//! # opnsense-core
//!
//! Core types and transport for talking to an OPNsense firewall appliance.
//!
//! This crate provides error handling, configuration, and the HTTP transport
//! shared by the interface, firewall and diagnostics clients.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and structured error responses
//! - [`config`] - Appliance connection settings and credentials
//! - [`client`] - Timeouts, pooling and retry policy
//! - [`transport`] - Authenticated, retrying HTTP client
//! - [`probe`] - One-shot endpoint probing for version-dependent paths
//! - [`normalize`] - Folding of inconsistent collection responses
//! - [`wire`] - Serde helpers for `"1"`/`"0"` flags and stringly numbers
//! - [`query`] - Query and search envelope builders
//! - [`uuid`] - Strongly-typed UUID wrappers for appliance objects

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod probe;
pub mod query;
pub mod transport;
pub mod uuid;
pub mod wire;

// Re-export commonly used types
pub use config::{ApplianceConfig, Credentials};
pub use error::{Error, Result};
pub use probe::{EndpointProber, ProbeResult};
pub use transport::{ApplianceClient, ApplianceClientBuilder, RequestSpec};
