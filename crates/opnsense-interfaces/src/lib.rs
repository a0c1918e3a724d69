//! Interface metadata and name resolution for OPNsense appliances.
//!
//! Provides typed interface and group models, a client for the metadata
//! endpoints, and a strategy-based resolver that maps operator-facing names
//! to device names.

#![deny(missing_docs)]

pub mod client;
pub mod models;
pub mod resolver;
pub mod source;

pub use client::InterfacesClient;
pub use models::{FilterInterfaceOption, InterfaceDescriptor, InterfaceGroup};
pub use resolver::{
    InterfaceResolver, MatchTier, MetadataSnapshot, Resolution, ResolutionStrategy,
    ResolvedTarget,
};
pub use source::InterfaceSource;

/// Convenient result alias sharing the `opnsense-core` error type.
pub type Result<T> = opnsense_core::Result<T>;
