//! Interface and group metadata models.
//!
//! The appliance exposes interface metadata in more than one layout, so these
//! models are assembled from raw JSON rather than derived field-for-field.

use opnsense_core::normalize::{normalize_with_keys, DEFAULT_COLLECTION_KEYS};
use opnsense_core::uuid::GroupUuid;
use opnsense_core::wire;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that hold a record list in the interface export.
const EXPORT_COLLECTION_KEYS: &[&str] = &["rows", "data", "interfaces"];

/// Normalized view of one configured interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// Logical name (`lan`, `wan`, `opt3`)
    pub name: String,
    /// Device name (`ax0_vlan81`, `igb3`)
    pub device: String,
    /// Operator-facing description
    #[serde(default)]
    pub description: String,
    /// Whether the interface is enabled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Parent device when this is a VLAN sub-interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_parent: Option<String>,
}

const fn enabled_by_default() -> bool {
    true
}

impl InterfaceDescriptor {
    /// Create an enabled interface with no description.
    #[must_use]
    pub fn new(name: impl Into<String>, device: impl Into<String>) -> Self {
        let device = device.into();
        Self {
            name: name.into(),
            vlan_parent: vlan_parent_of(&device),
            device,
            description: String::new(),
            enabled: true,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build a descriptor from one export record.
    ///
    /// `key` is the map key when the export is an object keyed by logical
    /// name; it takes precedence over any name inside the record.
    #[must_use]
    pub fn from_export_record(key: Option<&str>, record: &Value) -> Option<Self> {
        let name = key
            .map(str::to_string)
            .or_else(|| field(record, &["identifier", "name"]))?;
        let device = field(record, &["device", "if"]).unwrap_or_else(|| name.clone());
        let description = field(record, &["description", "descr"]).unwrap_or_default();
        let enabled = ["enabled", "enable"]
            .iter()
            .find_map(|k| record.get(*k))
            .and_then(wire::parse_flag)
            .unwrap_or(true);
        let vlan_parent = field(record, &["vlan_parent", "parent", "if_parent"])
            .or_else(|| vlan_parent_of(&device));

        Some(Self {
            name,
            device,
            description,
            enabled,
            vlan_parent,
        })
    }
}

/// Parse the interface export, accepting an object keyed by logical name or
/// any list layout the normalizer understands.
#[must_use]
pub fn parse_interface_export(body: Value) -> Vec<InterfaceDescriptor> {
    if let Value::Object(map) = &body {
        let has_collection = EXPORT_COLLECTION_KEYS
            .iter()
            .any(|k| map.get(*k).is_some_and(Value::is_array));
        if !has_collection {
            return map
                .iter()
                .filter(|(_, record)| record.is_object())
                .filter_map(|(key, record)| {
                    InterfaceDescriptor::from_export_record(Some(key), record)
                })
                .collect();
        }
    }

    normalize_with_keys(body, EXPORT_COLLECTION_KEYS)
        .iter()
        .filter_map(|record| InterfaceDescriptor::from_export_record(None, record))
        .collect()
}

/// Derive the parent device from VLAN device naming.
///
/// Recognises `<parent>_vlan<tag>` and `<parent>.<tag>`.
#[must_use]
pub fn vlan_parent_of(device: &str) -> Option<String> {
    let numeric = |tag: &str| !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_digit());

    device
        .rsplit_once("_vlan")
        .or_else(|| device.rsplit_once('.'))
        .filter(|(parent, tag)| !parent.is_empty() && numeric(tag))
        .map(|(parent, _)| parent.to_string())
}

/// A named interface group and its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceGroup {
    /// Group UUID, when the appliance reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<GroupUuid>,
    /// Group name
    pub name: String,
    /// Members, as logical names or device names
    pub members: Vec<String>,
    /// Description
    #[serde(default)]
    pub description: String,
}

impl InterfaceGroup {
    /// Create a group.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uuid: None,
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
            description: String::new(),
        }
    }

    /// Build a group from one `searchRule` row.
    ///
    /// Members may arrive as a comma-separated string, a list, or an option
    /// map with `selected` flags.
    #[must_use]
    pub fn from_record(record: &Value) -> Option<Self> {
        let name = field(record, &["ifname", "name"])?;
        let members = record
            .get("members")
            .map(wire::text)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();

        Some(Self {
            uuid: record
                .get("uuid")
                .and_then(Value::as_str)
                .and_then(|s| GroupUuid::parse_str(s).ok()),
            name,
            members,
            description: field(record, &["descr", "description"]).unwrap_or_default(),
        })
    }
}

/// Parse a group listing.
#[must_use]
pub fn parse_groups(body: Value) -> Vec<InterfaceGroup> {
    normalize_with_keys(body, DEFAULT_COLLECTION_KEYS)
        .iter()
        .filter_map(InterfaceGroup::from_record)
        .collect()
}

/// One entry of the interface selector offered by the firewall rule editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInterfaceOption {
    /// Value accepted in a rule's `interface` field
    pub value: String,
    /// Operator-facing label
    pub label: String,
    /// Section the entry is listed under (`interfaces`, `groups`, ...)
    pub section: String,
}

/// Parse `get_interface_list`.
///
/// Current appliances group entries into sections holding an `items` list of
/// `{value, label}` records; older ones return a flat `{value: label}` map.
#[must_use]
pub fn parse_filter_interface_list(body: Value) -> Vec<FilterInterfaceOption> {
    let Value::Object(map) = body else {
        return normalize_with_keys(body, DEFAULT_COLLECTION_KEYS)
            .iter()
            .filter_map(|record| option_from_record("interfaces", record))
            .collect();
    };

    let mut options = Vec::new();
    for (key, entry) in map {
        match entry {
            Value::Object(section) if section.contains_key("items") => {
                options.extend(
                    normalize_with_keys(Value::Object(section), &["items"])
                        .iter()
                        .filter_map(|record| option_from_record(&key, record)),
                );
            }
            Value::Object(_) => options.extend(option_from_record("interfaces", &entry).map(
                |option| FilterInterfaceOption {
                    value: key.clone(),
                    ..option
                },
            )),
            Value::Null | Value::Array(_) => {}
            label => options.push(FilterInterfaceOption {
                label: wire::text(&label),
                value: key,
                section: "interfaces".to_string(),
            }),
        }
    }
    options
}

fn option_from_record(section: &str, record: &Value) -> Option<FilterInterfaceOption> {
    let value = field(record, &["value", "name", "id"])?;
    let label = field(record, &["label", "descr", "description"]).unwrap_or_else(|| value.clone());
    Some(FilterInterfaceOption {
        value,
        label,
        section: section.to_string(),
    })
}

fn field(record: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .map(wire::text)
        .find(|text| !text.trim().is_empty())
}
