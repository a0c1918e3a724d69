//! Firewall filter rules and staged configuration changes for OPNsense.
//!
//! Provides typed rule models, a client for the filter controller, and a
//! pipeline that takes rule mutations through savepoint, apply and rollback.

#![deny(missing_docs)]

pub mod client;
pub mod models;
pub mod pipeline;

pub use client::{ChangeRevision, FilterClient};
pub use models::{
    Action, Direction, Endpoint, FirewallRule, IpProtocol, RuleFilter, RuleListing, RuleSpec,
    RuleUpdate,
};
pub use pipeline::{
    ChangeOutcome, CommitLock, OutcomeStatus, PipelineState, RuleChange, RuleChangePipeline,
    RuleOperation, RuleStatus, StagedChange,
};

/// Convenient result alias sharing the `opnsense-core` error type.
pub type Result<T> = opnsense_core::Result<T>;
