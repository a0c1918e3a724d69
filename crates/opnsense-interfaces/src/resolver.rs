//! Logical-to-device interface name resolution.
//!
//! Operators say "wifi" or "guest"; the appliance needs `ax0_vlan81`. The
//! [`InterfaceResolver`] runs an ordered list of [`ResolutionStrategy`]
//! implementations against a [`MetadataSnapshot`] of interfaces and groups.
//!
//! Strategies are grouped into tiers. Every strategy in a tier contributes to
//! the result (a query that names a group yields all of its members), but a
//! tier only runs when every earlier tier came back empty. This is what makes
//! resolving an exact device name return exactly that device, even when other
//! interfaces mention it in their descriptions.
//!
//! When nothing matches, the query passes through unchanged so callers that
//! already hold a correct device name keep working.

use crate::models::{InterfaceDescriptor, InterfaceGroup};
use crate::source::InterfaceSource;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Built-in logical-to-device table used when live metadata is unavailable.
pub const DEFAULT_FALLBACK_TABLE: &[(&str, &str)] = &[
    ("wan", "ax1"),
    ("lan", "ax0_vlan2"),
    ("wifi", "ax0_vlan81"),
    ("guest", "ax0_vlan4"),
    ("lab", "ax0_vlan3"),
    ("mgmt", "igb3"),
];

/// Interface and group metadata resolution runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSnapshot {
    /// Known interfaces
    pub interfaces: Vec<InterfaceDescriptor>,
    /// Known groups
    pub groups: Vec<InterfaceGroup>,
    /// True when the interface list could not be fetched
    pub degraded: bool,
}

impl MetadataSnapshot {
    /// A complete snapshot.
    #[must_use]
    pub const fn new(interfaces: Vec<InterfaceDescriptor>, groups: Vec<InterfaceGroup>) -> Self {
        Self {
            interfaces,
            groups,
            degraded: false,
        }
    }

    /// A snapshot built without live interface data.
    #[must_use]
    pub const fn degraded() -> Self {
        Self {
            interfaces: Vec::new(),
            groups: Vec::new(),
            degraded: true,
        }
    }

    /// Interface whose logical name or device equals `token`, ignoring case.
    #[must_use]
    pub fn interface(&self, token: &str) -> Option<&InterfaceDescriptor> {
        self.interfaces
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(token) || i.device.eq_ignore_ascii_case(token))
    }

    /// Resolve a group member (logical name or device) to a match.
    #[must_use]
    pub fn member_target(&self, member: &str) -> ResolvedTarget {
        self.interface(member).map_or_else(
            || ResolvedTarget::device(member),
            ResolvedTarget::from_interface,
        )
    }
}

/// One matched target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedTarget {
    /// Device name
    pub device: String,
    /// Logical name, when known
    pub interface: Option<String>,
}

impl ResolvedTarget {
    /// A target known only by device name.
    #[must_use]
    pub fn device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            interface: None,
        }
    }

    /// A target taken from interface metadata.
    #[must_use]
    pub fn from_interface(interface: &InterfaceDescriptor) -> Self {
        Self {
            device: interface.device.clone(),
            interface: Some(interface.name.clone()),
        }
    }
}

/// Priority band of a strategy. Lower tiers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Exact names and exact group names
    Exact,
    /// Case-insensitive substrings
    Fuzzy,
    /// Static table, only without live metadata
    Fallback,
}

/// One step in the resolution chain.
pub trait ResolutionStrategy: Send + Sync {
    /// Short name reported in [`Resolution::matched_by`].
    fn name(&self) -> &'static str;

    /// Tier this strategy belongs to.
    fn tier(&self) -> MatchTier;

    /// Matches for `query`; empty when nothing applies.
    fn resolve(&self, query: &str, snapshot: &MetadataSnapshot) -> Vec<ResolvedTarget>;
}

/// Exact, case-insensitive match on logical name or device name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactName;

impl ResolutionStrategy for ExactName {
    fn name(&self) -> &'static str {
        "exact_name"
    }

    fn tier(&self) -> MatchTier {
        MatchTier::Exact
    }

    fn resolve(&self, query: &str, snapshot: &MetadataSnapshot) -> Vec<ResolvedTarget> {
        snapshot
            .interfaces
            .iter()
            .filter(|i| i.name.eq_ignore_ascii_case(query) || i.device.eq_ignore_ascii_case(query))
            .map(ResolvedTarget::from_interface)
            .collect()
    }
}

/// Members of a group whose name equals the query.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupMembership;

impl ResolutionStrategy for GroupMembership {
    fn name(&self) -> &'static str {
        "group_membership"
    }

    fn tier(&self) -> MatchTier {
        MatchTier::Exact
    }

    fn resolve(&self, query: &str, snapshot: &MetadataSnapshot) -> Vec<ResolvedTarget> {
        group_members(snapshot, |group| group.name.eq_ignore_ascii_case(query))
    }
}

/// Substring match on logical name, device name and description.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatch;

impl ResolutionStrategy for SubstringMatch {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn tier(&self) -> MatchTier {
        MatchTier::Fuzzy
    }

    fn resolve(&self, query: &str, snapshot: &MetadataSnapshot) -> Vec<ResolvedTarget> {
        let needle = query.to_lowercase();
        snapshot
            .interfaces
            .iter()
            .filter(|i| {
                [&i.name, &i.device, &i.description]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .map(ResolvedTarget::from_interface)
            .collect()
    }
}

/// Members of every group whose name contains the query.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupSubstring;

impl ResolutionStrategy for GroupSubstring {
    fn name(&self) -> &'static str {
        "group_substring"
    }

    fn tier(&self) -> MatchTier {
        MatchTier::Fuzzy
    }

    fn resolve(&self, query: &str, snapshot: &MetadataSnapshot) -> Vec<ResolvedTarget> {
        let needle = query.to_lowercase();
        group_members(snapshot, |group| group.name.to_lowercase().contains(&needle))
    }
}

/// Static logical-to-device table, consulted only for degraded snapshots.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    table: BTreeMap<String, String>,
}

impl StaticFallback {
    /// Fallback with a custom table. Keys are matched case-insensitively.
    #[must_use]
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                .collect(),
        }
    }
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_TABLE.iter().copied())
    }
}

impl ResolutionStrategy for StaticFallback {
    fn name(&self) -> &'static str {
        "static_fallback"
    }

    fn tier(&self) -> MatchTier {
        MatchTier::Fallback
    }

    fn resolve(&self, query: &str, snapshot: &MetadataSnapshot) -> Vec<ResolvedTarget> {
        if !snapshot.degraded {
            return Vec::new();
        }
        let key = query.to_lowercase();
        self.table
            .get(&key)
            .map(|device| {
                vec![ResolvedTarget {
                    device: device.clone(),
                    interface: Some(key.clone()),
                }]
            })
            .unwrap_or_default()
    }
}

fn group_members<F>(snapshot: &MetadataSnapshot, mut predicate: F) -> Vec<ResolvedTarget>
where
    F: FnMut(&InterfaceGroup) -> bool,
{
    snapshot
        .groups
        .iter()
        .filter(|group| predicate(group))
        .flat_map(|group| group.members.iter().map(|m| snapshot.member_target(m)))
        .collect()
}

/// The default chain: exact name, exact group, substring, group substring,
/// static fallback.
#[must_use]
pub fn default_strategies() -> Vec<Box<dyn ResolutionStrategy>> {
    vec![
        Box::new(ExactName),
        Box::new(GroupMembership),
        Box::new(SubstringMatch),
        Box::new(GroupSubstring),
        Box::new(StaticFallback::default()),
    ]
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The query as given
    pub query: String,
    /// Resolved device names
    pub devices: BTreeSet<String>,
    /// Logical names of the matched interfaces
    pub interfaces: BTreeSet<String>,
    /// Strategies that contributed
    pub matched_by: Vec<&'static str>,
    /// True when nothing matched and the query was returned as-is
    pub passthrough: bool,
}

impl Resolution {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            devices: BTreeSet::new(),
            interfaces: BTreeSet::new(),
            matched_by: Vec::new(),
            passthrough: false,
        }
    }

    fn passthrough(query: &str) -> Self {
        let mut resolution = Self::empty(query);
        resolution.devices.insert(query.to_string());
        resolution.passthrough = true;
        resolution
    }

    /// Every name this resolution stands for: devices and logical names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices
            .iter()
            .chain(self.interfaces.iter())
            .map(String::as_str)
    }

    /// True when no device was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Resolves interface tokens against cached appliance metadata.
pub struct InterfaceResolver {
    source: Arc<dyn InterfaceSource>,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
    snapshot: RwLock<Option<Arc<MetadataSnapshot>>>,
}

impl InterfaceResolver {
    /// Resolver with the default strategy chain.
    #[must_use]
    pub fn new(source: Arc<dyn InterfaceSource>) -> Self {
        Self::with_strategies(source, default_strategies())
    }

    /// Resolver with a custom chain. Order within a tier is reporting order only.
    #[must_use]
    pub fn with_strategies(
        source: Arc<dyn InterfaceSource>,
        mut strategies: Vec<Box<dyn ResolutionStrategy>>,
    ) -> Self {
        strategies.sort_by_key(|s| s.tier());
        Self {
            source,
            strategies,
            snapshot: RwLock::new(None),
        }
    }

    /// Current metadata, fetching it on first use.
    ///
    /// A snapshot is cached only when both fetches succeeded; otherwise the
    /// next call tries again.
    pub async fn snapshot(&self) -> Arc<MetadataSnapshot> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Arc::clone(snapshot);
        }
        self.refresh().await
    }

    /// Re-fetch metadata, replacing any cached snapshot.
    pub async fn refresh(&self) -> Arc<MetadataSnapshot> {
        let interfaces = self.source.interfaces().await;
        let groups = self.source.groups().await;

        let complete = interfaces.is_ok() && groups.is_ok();
        let snapshot = Arc::new(MetadataSnapshot {
            degraded: interfaces.is_err(),
            interfaces: interfaces.unwrap_or_else(|err| {
                warn!(error = %err, "Interface metadata unavailable");
                Vec::new()
            }),
            groups: groups.unwrap_or_else(|err| {
                warn!(error = %err, "Interface group metadata unavailable");
                Vec::new()
            }),
        });

        let mut cache = self.snapshot.write().await;
        *cache = complete.then(|| Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the cached snapshot without fetching.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    /// Resolve `query` against current metadata.
    ///
    /// Never fails: an empty query yields an empty resolution, and an
    /// unmatched one passes through unchanged.
    pub async fn resolve(&self, query: &str) -> Resolution {
        let query = query.trim();
        if query.is_empty() {
            return Resolution::empty(query);
        }
        let snapshot = self.snapshot().await;
        self.resolve_with(query, &snapshot)
    }

    /// Resolve `query` against an explicit snapshot.
    #[must_use]
    pub fn resolve_with(&self, query: &str, snapshot: &MetadataSnapshot) -> Resolution {
        let query = query.trim();
        if query.is_empty() {
            return Resolution::empty(query);
        }

        let mut resolution = Resolution::empty(query);
        let mut current_tier = None;

        for strategy in &self.strategies {
            let tier = strategy.tier();
            if current_tier != Some(tier) {
                if !resolution.is_empty() {
                    break;
                }
                current_tier = Some(tier);
            }

            let targets = strategy.resolve(query, snapshot);
            if targets.is_empty() {
                continue;
            }
            resolution.matched_by.push(strategy.name());
            for target in targets {
                resolution.devices.insert(target.device);
                if let Some(interface) = target.interface {
                    resolution.interfaces.insert(interface);
                }
            }
        }

        if resolution.is_empty() {
            debug!(query, "No interface match, passing query through");
            return Resolution::passthrough(query);
        }

        debug!(
            query,
            devices = ?resolution.devices,
            matched_by = ?resolution.matched_by,
            "Resolved interface"
        );
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockInterfaceSource;
    use opnsense_core::Error;

    fn interfaces() -> Vec<InterfaceDescriptor> {
        vec![
            InterfaceDescriptor::new("wan", "ax1").with_description("Uplink"),
            InterfaceDescriptor::new("lan", "ax0_vlan2").with_description("LAN"),
            InterfaceDescriptor::new("opt1", "ax0_vlan81").with_description("WiFi Clients"),
            InterfaceDescriptor::new("opt2", "ax0_vlan4").with_description("Guest WiFi"),
            InterfaceDescriptor::new("opt5", "ax0_vlan5").with_description("Cameras behind ax1"),
        ]
    }

    fn groups() -> Vec<InterfaceGroup> {
        vec![
            InterfaceGroup::new("iot", ["ax0_vlan4", "ax0_vlan5"]),
            InterfaceGroup::new("wireless", ["opt1", "opt2"]),
        ]
    }

    fn snapshot() -> MetadataSnapshot {
        MetadataSnapshot::new(interfaces(), groups())
    }

    fn source() -> MockInterfaceSource {
        let mut source = MockInterfaceSource::new();
        source.expect_interfaces().returning(|| Ok(interfaces()));
        source.expect_groups().returning(|| Ok(groups()));
        source
    }

    fn devices(resolution: &Resolution) -> Vec<&str> {
        resolution.devices.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn exact_device_name_is_idempotent() {
        let resolver = InterfaceResolver::new(Arc::new(source()));
        let resolution = resolver.resolve("ax1").await;
        assert_eq!(devices(&resolution), vec!["ax1"]);
        assert_eq!(resolution.matched_by, vec!["exact_name"]);
        assert!(!resolution.passthrough);
    }

    #[tokio::test]
    async fn group_name_yields_all_members() {
        let resolver = InterfaceResolver::new(Arc::new(source()));
        let resolution = resolver.resolve("iot").await;
        assert_eq!(devices(&resolution), vec!["ax0_vlan4", "ax0_vlan5"]);
        assert_eq!(resolution.matched_by, vec!["group_membership"]);
        assert!(resolution.interfaces.contains("opt2"));
    }

    #[tokio::test]
    async fn unknown_token_passes_through() {
        let resolver = InterfaceResolver::new(Arc::new(source()));
        let resolution = resolver.resolve("completely-unknown-token").await;
        assert_eq!(devices(&resolution), vec!["completely-unknown-token"]);
        assert!(resolution.passthrough);
        assert!(resolution.matched_by.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_empty() {
        let resolver = InterfaceResolver::new(Arc::new(MockInterfaceSource::new()));
        let resolution = resolver.resolve("   ").await;
        assert!(resolution.is_empty());
        assert!(!resolution.passthrough);
    }

    #[test]
    fn logical_name_maps_to_device() {
        let resolver = InterfaceResolver::new(Arc::new(MockInterfaceSource::new()));
        let resolution = resolver.resolve_with("LAN", &snapshot());
        assert_eq!(devices(&resolution), vec!["ax0_vlan2"]);
        assert!(resolution.interfaces.contains("lan"));
    }

    #[test]
    fn substring_matches_descriptions_and_groups() {
        let resolver = InterfaceResolver::new(Arc::new(MockInterfaceSource::new()));
        let resolution = resolver.resolve_with("wifi", &snapshot());
        assert_eq!(devices(&resolution), vec!["ax0_vlan4", "ax0_vlan81"]);
        assert_eq!(resolution.matched_by, vec!["substring"]);

        let resolution = resolver.resolve_with("wire", &snapshot());
        assert_eq!(devices(&resolution), vec!["ax0_vlan4", "ax0_vlan81"]);
        assert_eq!(resolution.matched_by, vec!["group_substring"]);
    }

    #[test]
    fn fuzzy_tier_unions_strategies() {
        let resolver = InterfaceResolver::new(Arc::new(MockInterfaceSource::new()));
        let snapshot = MetadataSnapshot::new(
            interfaces(),
            vec![InterfaceGroup::new("guest_nets", ["ax0_vlan5"])],
        );
        let resolution = resolver.resolve_with("guest", &snapshot);
        assert_eq!(devices(&resolution), vec!["ax0_vlan4", "ax0_vlan5"]);
        assert_eq!(resolution.matched_by, vec!["substring", "group_substring"]);
    }

    #[test]
    fn fallback_only_when_degraded() {
        let resolver = InterfaceResolver::new(Arc::new(MockInterfaceSource::new()));

        let resolution = resolver.resolve_with("mgmt", &MetadataSnapshot::degraded());
        assert_eq!(devices(&resolution), vec!["igb3"]);
        assert_eq!(resolution.matched_by, vec!["static_fallback"]);

        let resolution = resolver.resolve_with("mgmt", &snapshot());
        assert!(resolution.passthrough);
    }

    #[tokio::test]
    async fn fetch_failure_degrades_and_is_not_cached() {
        let mut source = MockInterfaceSource::new();
        source
            .expect_interfaces()
            .times(2)
            .returning(|| Err(Error::ConnectionFailure("unreachable".to_string())));
        source.expect_groups().times(2).returning(|| Ok(Vec::new()));

        let resolver = InterfaceResolver::new(Arc::new(source));
        let first = resolver.resolve("wifi").await;
        let second = resolver.resolve("wifi").await;

        assert_eq!(devices(&first), vec!["ax0_vlan81"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_is_cached_until_refresh() {
        let mut source = MockInterfaceSource::new();
        source.expect_interfaces().times(2).returning(|| Ok(interfaces()));
        source.expect_groups().times(2).returning(|| Ok(groups()));

        let resolver = InterfaceResolver::new(Arc::new(source));
        resolver.resolve("lan").await;
        resolver.resolve("wan").await;
        resolver.refresh().await;
        resolver.resolve("iot").await;
    }

    #[test]
    fn custom_fallback_table() {
        let resolver = InterfaceResolver::with_strategies(
            Arc::new(MockInterfaceSource::new()),
            vec![Box::new(StaticFallback::new([("DMZ", "igb5")])), Box::new(ExactName)],
        );
        let resolution = resolver.resolve_with("dmz", &MetadataSnapshot::degraded());
        assert_eq!(devices(&resolution), vec!["igb5"]);
    }
}
