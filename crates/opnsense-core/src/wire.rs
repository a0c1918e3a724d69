//! Serde helpers for the appliance wire format.
//!
//! The appliance encodes booleans as `"1"`/`"0"` strings and often sends numbers
//! as strings. Mutation endpoints reject native booleans, so outgoing flags must
//! always be strings; incoming values are accepted in either representation.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};
use serde_json::Value;

/// Encode a boolean as the appliance's `"1"`/`"0"` flag.
#[must_use]
pub const fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Decode an appliance flag from any JSON representation.
///
/// Accepts `"1"`, `"0"`, `""`, `"true"`, `"false"`, native booleans and
/// integers. Anything else yields `None`.
#[must_use]
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "enabled" => Some(true),
            "0" | "false" | "no" | "off" | "disabled" | "" => Some(false),
            _ => None,
        },
        Value::Null => Some(false),
        _ => None,
    }
}

/// Serde adapter for `bool` fields carried as `"1"`/`"0"`.
pub mod bool_flag {
    use super::{de, flag, parse_flag, Deserialize, Deserializer, Serializer, Value};

    /// Serialize as `"1"` or `"0"`.
    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(flag(*value))
    }

    /// Deserialize from any flag representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        parse_flag(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid boolean flag: {value}")))
    }
}

/// Serde adapter for `Option<bool>` fields carried as `"1"`/`"0"`.
pub mod opt_bool_flag {
    use super::{flag, parse_flag, Deserialize, Deserializer, Serializer, Value};

    /// Serialize as `"1"`/`"0"`, or null when absent.
    pub fn serialize<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_str(flag(*v)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize leniently; unrecognised values become `None`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(parse_flag))
    }
}

/// Deserialize an optional integer sent either as a number or a string.
///
/// Empty strings and unparsable values become `None`.
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Deserialize a string that may arrive as a number, null, or an option map.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(text).unwrap_or_default())
}

/// Render an arbitrary JSON scalar as text.
///
/// Option maps of the form `{"a": {"value": "A", "selected": 1}}` render as the
/// comma-joined keys of the selected entries.
#[must_use]
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => flag(*b).to_string(),
        Value::Object(_) => selected_options(value).join(","),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(","),
        Value::Null => String::new(),
    }
}

/// Keys of the selected entries in an appliance option map.
#[must_use]
pub fn selected_options(value: &Value) -> Vec<String> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, option)| {
            option
                .get("selected")
                .and_then(parse_flag)
                .unwrap_or(false)
        })
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Flags {
        #[serde(with = "bool_flag")]
        enabled: bool,
        #[serde(default, with = "opt_bool_flag", skip_serializing_if = "Option::is_none")]
        log: Option<bool>,
        #[serde(default, deserialize_with = "lenient_u64")]
        sequence: Option<u64>,
    }

    #[test]
    fn flags_serialize_as_strings() {
        let flags = Flags {
            enabled: true,
            log: Some(false),
            sequence: None,
        };
        let value = serde_json::to_value(&flags).unwrap();
        assert_eq!(value["enabled"], json!("1"));
        assert_eq!(value["log"], json!("0"));
    }

    #[test]
    fn flags_deserialize_from_any_representation() {
        let flags: Flags =
            serde_json::from_value(json!({"enabled": "1", "log": true, "sequence": "12"}))
                .unwrap();
        assert!(flags.enabled);
        assert_eq!(flags.log, Some(true));
        assert_eq!(flags.sequence, Some(12));

        let flags: Flags = serde_json::from_value(json!({"enabled": 0, "sequence": ""})).unwrap();
        assert!(!flags.enabled);
        assert_eq!(flags.log, None);
        assert_eq!(flags.sequence, None);
    }

    #[test]
    fn invalid_required_flag_is_an_error() {
        let result: Result<Flags, _> = serde_json::from_value(json!({"enabled": "perhaps"}));
        assert!(result.is_err());
    }

    #[test]
    fn text_renders_selected_options() {
        let value = json!({
            "lan": {"value": "LAN", "selected": 1},
            "wan": {"value": "WAN", "selected": 0},
            "opt1": {"value": "WIFI", "selected": "1"}
        });
        let mut selected = selected_options(&value);
        selected.sort();
        assert_eq!(selected, vec!["lan".to_string(), "opt1".to_string()]);
        assert_eq!(text(&json!(42)), "42");
        assert_eq!(text(&Value::Null), "");
    }
}
