//! Filter rule models shared by the client and the change pipeline.

use opnsense_core::uuid::RuleUuid;
use opnsense_core::wire::{self, bool_flag, opt_bool_flag};
use opnsense_core::Error;
use opnsense_interfaces::Resolution;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Wildcard used for networks, ports and protocols.
pub const ANY: &str = "any";

/// Implements case-insensitive parsing and display for a wire enum.
macro_rules! wire_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Wire representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Error::ValidationError(format!(
                        "{} must be one of [{}], got `{other}`",
                        $label,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Error> {
                value.parse()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// What a rule does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Action {
    /// Allow
    #[default]
    Pass,
    /// Drop silently
    Block,
    /// Drop and signal the sender
    Reject,
}

wire_enum!(Action, "action", { Pass => "pass", Block => "block", Reject => "reject" });

/// Traffic direction relative to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Direction {
    /// Inbound
    #[default]
    In,
    /// Outbound
    Out,
}

wire_enum!(Direction, "direction", { In => "in", Out => "out" });

/// Address family a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum IpProtocol {
    /// IPv4
    #[default]
    Inet,
    /// IPv6
    Inet6,
    /// IPv4 and IPv6
    Inet46,
}

wire_enum!(IpProtocol, "ipprotocol", { Inet => "inet", Inet6 => "inet6", Inet46 => "inet46" });

/// Network and port on one side of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Address, CIDR, alias or `any`
    pub net: String,
    /// Port, range, alias or `any`
    pub port: String,
}

impl Endpoint {
    /// An endpoint with an explicit network and any port.
    #[must_use]
    pub fn net(net: impl Into<String>) -> Self {
        Self {
            net: net.into(),
            port: ANY.to_string(),
        }
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::net(ANY)
    }
}

/// A filter rule as reported by `searchRule`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleRow")]
pub struct FirewallRule {
    /// Appliance-issued identifier
    pub uuid: RuleUuid,
    /// Evaluation order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Description
    pub description: String,
    /// Logical interface names, comma-separated for multi-interface rules
    pub interface: String,
    /// Direction
    pub direction: Direction,
    /// Address family
    pub ip_protocol: IpProtocol,
    /// Layer 4 protocol or `any`
    pub protocol: String,
    /// Source side
    pub source: Endpoint,
    /// Destination side
    pub destination: Endpoint,
    /// Action
    pub action: Action,
    /// Whether the rule is enabled
    pub enabled: bool,
    /// Policy-routing gateway, empty for default routing
    pub gateway: String,
    /// Whether matches are logged
    pub log: bool,
    /// Whether the first match wins
    pub quick: bool,
}

impl FirewallRule {
    /// Logical interface names this rule is bound to.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interface
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Raw `searchRule` row. Every field is optional and loosely typed.
#[derive(Debug, Deserialize)]
struct RuleRow {
    uuid: RuleUuid,
    #[serde(default, deserialize_with = "wire::lenient_u64")]
    sequence: Option<u64>,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    description: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    interface: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    direction: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    ipprotocol: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    protocol: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    source_net: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    source_port: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    destination_net: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    destination_port: String,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    action: String,
    #[serde(default, deserialize_with = "opt_bool_flag::deserialize")]
    enabled: Option<bool>,
    #[serde(default, deserialize_with = "wire::lenient_string")]
    gateway: String,
    #[serde(default, deserialize_with = "opt_bool_flag::deserialize")]
    log: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool_flag::deserialize")]
    quick: Option<bool>,
}

fn or_any(value: String) -> String {
    if value.trim().is_empty() {
        ANY.to_string()
    } else {
        value
    }
}

fn parse_or_default<T>(value: &str) -> Result<T, Error>
where
    T: FromStr<Err = Error> + Default,
{
    if value.trim().is_empty() {
        Ok(T::default())
    } else {
        value.parse()
    }
}

impl TryFrom<RuleRow> for FirewallRule {
    type Error = Error;

    fn try_from(row: RuleRow) -> Result<Self, Error> {
        Ok(Self {
            uuid: row.uuid,
            sequence: row.sequence,
            description: row.description,
            interface: row.interface,
            direction: parse_or_default(&row.direction)?,
            ip_protocol: parse_or_default(&row.ipprotocol)?,
            protocol: or_any(row.protocol),
            source: Endpoint::net(or_any(row.source_net)).with_port(or_any(row.source_port)),
            destination: Endpoint::net(or_any(row.destination_net))
                .with_port(or_any(row.destination_port)),
            action: parse_or_default(&row.action)?,
            enabled: row.enabled.unwrap_or(true),
            gateway: row.gateway,
            log: row.log.unwrap_or(false),
            quick: row.quick.unwrap_or(true),
        })
    }
}

/// Definition of a rule to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RuleSpec {
    /// Description; required
    #[validate(length(min = 1, max = 255))]
    pub description: String,
    /// Logical interface name
    #[validate(length(min = 1))]
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Direction
    #[serde(default)]
    pub direction: Direction,
    /// Address family
    #[serde(default, rename = "ipprotocol")]
    pub ip_protocol: IpProtocol,
    /// Layer 4 protocol
    #[validate(length(min = 1))]
    #[serde(default = "default_any")]
    pub protocol: String,
    /// Source side
    #[serde(default)]
    pub source: Endpoint,
    /// Destination side
    #[serde(default)]
    pub destination: Endpoint,
    /// Action
    #[serde(default)]
    pub action: Action,
    /// Whether the rule starts enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Gateway, empty for default routing
    #[serde(default)]
    pub gateway: String,
    /// Log matches
    #[serde(default)]
    pub log: bool,
}

fn default_interface() -> String {
    "lan".to_string()
}

fn default_any() -> String {
    ANY.to_string()
}

const fn default_true() -> bool {
    true
}

/// Outgoing rule body. Flags are always `"1"`/`"0"`.
#[derive(Serialize)]
struct RulePayload<'a> {
    description: &'a str,
    interface: &'a str,
    direction: Direction,
    ipprotocol: IpProtocol,
    protocol: &'a str,
    source_net: &'a str,
    source_port: &'a str,
    destination_net: &'a str,
    destination_port: &'a str,
    action: Action,
    #[serde(with = "bool_flag")]
    enabled: bool,
    gateway: &'a str,
    #[serde(with = "bool_flag")]
    log: bool,
}

impl RuleSpec {
    /// A pass rule on `lan` from any to any.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            interface: default_interface(),
            direction: Direction::default(),
            ip_protocol: IpProtocol::default(),
            protocol: default_any(),
            source: Endpoint::default(),
            destination: Endpoint::default(),
            action: Action::default(),
            enabled: true,
            gateway: String::new(),
            log: false,
        }
    }

    /// Set the interface.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// Set the direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the address family.
    #[must_use]
    pub const fn with_ip_protocol(mut self, ip_protocol: IpProtocol) -> Self {
        self.ip_protocol = ip_protocol;
        self
    }

    /// Set the protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the source side.
    #[must_use]
    pub fn with_source(mut self, source: Endpoint) -> Self {
        self.source = source;
        self
    }

    /// Set the destination side.
    #[must_use]
    pub fn with_destination(mut self, destination: Endpoint) -> Self {
        self.destination = destination;
        self
    }

    /// Set the action.
    #[must_use]
    pub const fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Set whether the rule starts enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the gateway.
    #[must_use]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Set match logging.
    #[must_use]
    pub const fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    /// Validate and return a configuration error for the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for empty required fields.
    pub fn ensure_valid(&self) -> Result<(), Error> {
        if self.description.trim().is_empty() {
            return Err(Error::ValidationError(
                "description must not be empty".to_string(),
            ));
        }
        self.validate().map_err(Error::from)
    }

    /// Body for `addRule`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let payload = RulePayload {
            description: &self.description,
            interface: &self.interface,
            direction: self.direction,
            ipprotocol: self.ip_protocol,
            protocol: &self.protocol,
            source_net: &self.source.net,
            source_port: &self.source.port,
            destination_net: &self.destination.net,
            destination_port: &self.destination.port,
            action: self.action,
            enabled: self.enabled,
            gateway: &self.gateway,
            log: self.log,
        };
        json!({ "rule": payload })
    }
}

/// Partial update for `setRule`. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleUpdate {
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Direction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Address family
    #[serde(default, rename = "ipprotocol", skip_serializing_if = "Option::is_none")]
    pub ip_protocol: Option<IpProtocol>,
    /// Protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Source network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_net: Option<String>,
    /// Source port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    /// Destination network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_net: Option<String>,
    /// Destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<String>,
    /// Action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Enabled flag
    #[serde(default, with = "opt_bool_flag", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Log flag
    #[serde(default, with = "opt_bool_flag", skip_serializing_if = "Option::is_none")]
    pub log: Option<bool>,
}

impl RuleUpdate {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Body for `setRule`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty update and
    /// [`Error::ValidationError`] for a blank description.
    pub fn to_payload(&self) -> Result<Value, Error> {
        if self.is_empty() {
            return Err(Error::InvalidRequest("update has no fields set".to_string()));
        }
        if self
            .description
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            return Err(Error::ValidationError(
                "description must not be empty".to_string(),
            ));
        }
        Ok(json!({ "rule": self }))
    }
}

/// Client-side filters for rule listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Interface token, resolved before matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Protocol, compared case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Enabled state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Case-insensitive text the description must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleFilter {
    /// True when no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether `rule` passes every set filter.
    ///
    /// A resolved interface filter matches rules bound to any resolved logical
    /// or device name, ignoring case. An unresolved token (no resolution, or a
    /// pass-through one) matches when it and a rule interface contain one
    /// another.
    #[must_use]
    pub fn matches(&self, rule: &FirewallRule, resolution: Option<&Resolution>) -> bool {
        if let Some(interface) = self.interface.as_deref() {
            let matched = match resolution {
                Some(resolution) if !resolution.passthrough => resolution
                    .names()
                    .any(|name| rule.interfaces().any(|i| i.eq_ignore_ascii_case(name))),
                _ => interface_contains(rule, interface),
            };
            if !matched {
                return false;
            }
        }
        if self.action.is_some_and(|action| action != rule.action) {
            return false;
        }
        if self
            .protocol
            .as_deref()
            .is_some_and(|p| !p.eq_ignore_ascii_case(&rule.protocol))
        {
            return false;
        }
        if self.enabled.is_some_and(|enabled| enabled != rule.enabled) {
            return false;
        }
        self.description.as_deref().map_or(true, |text| {
            rule.description
                .to_lowercase()
                .contains(&text.trim().to_lowercase())
        })
    }
}

fn interface_contains(rule: &FirewallRule, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    rule.interfaces().any(|candidate| {
        let candidate = candidate.to_lowercase();
        candidate.contains(&name) || name.contains(&candidate)
    })
}

/// Filtered rule listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleListing {
    /// Rules that passed the filter
    pub rules: Vec<FirewallRule>,
    /// Number of rules that passed
    pub total: usize,
    /// Number of rules before filtering
    pub total_all: usize,
    /// Filter as given
    pub filters_applied: RuleFilter,
    /// Interface resolution used for the filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}
