//! Strongly-typed UUID wrappers for appliance objects.
//!
//! Configuration objects on the appliance are keyed by UUIDs the appliance
//! issues itself. These wrappers keep rule and group identifiers apart at
//! compile time; there is deliberately no constructor that generates one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Macro to generate strongly-typed UUID wrapper types.
macro_rules! uuid_type {
    ($(#[$meta:meta])* $name:ident, $doc:expr) => {
        $(#[$meta])*
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps a [`Uuid`] received from the appliance.
            #[must_use]
            pub const fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parses a UUID from a string.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not a valid UUID.
            pub fn parse_str(input: &str) -> Result<Self> {
                Uuid::parse_str(input.trim())
                    .map(Self)
                    .map_err(|_| Error::InvalidUuid(input.to_string()))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(wrapper: $name) -> Self {
                wrapper.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse_str(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_type!(RuleUuid, "Firewall filter rule UUID");
uuid_type!(GroupUuid, "Interface group UUID");

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn parse_valid() {
        let rule = RuleUuid::parse_str(VALID_UUID).unwrap();
        assert_eq!(rule.to_string(), VALID_UUID);
    }

    #[test]
    fn parse_trims_whitespace() {
        let rule: RuleUuid = format!(" {VALID_UUID}\n").parse().unwrap();
        assert_eq!(rule.to_string(), VALID_UUID);
    }

    #[test]
    fn parse_invalid() {
        let err = RuleUuid::parse_str("not-a-uuid").unwrap_err();
        assert!(matches!(err, Error::InvalidUuid(ref s) if s == "not-a-uuid"));
    }

    #[test]
    fn serde_is_transparent() {
        let group = GroupUuid::parse_str(VALID_UUID).unwrap();
        let json = serde_json::to_string(&group).unwrap();
        assert_eq!(json, format!("\"{VALID_UUID}\""));
        let back: GroupUuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn conversions_round_trip_inner_uuid() {
        let uuid = Uuid::parse_str(VALID_UUID).unwrap();
        let rule = RuleUuid::from(uuid);
        assert_eq!(rule.as_uuid(), &uuid);
        assert_eq!(Uuid::from(rule), uuid);
    }
}
