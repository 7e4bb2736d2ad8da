//! Strongly-typed identifiers for LeadDesk entities
//!
//! All IDs are UUID-based but wrapped in newtype structs for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an identifier cannot be parsed from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub kind: &'static str,
    pub input: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} id '{}'", self.kind, self.input)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| ParseIdError {
                    kind: $kind,
                    input: s.to_string(),
                })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a lead
    LeadId,
    "lead"
);

uuid_id!(
    /// Unique identifier for a quote version
    QuoteId,
    "quote"
);

uuid_id!(
    /// Unique identifier for an activity entry
    ActivityId,
    "activity"
);

uuid_id!(
    /// Unique identifier for an audit log entry
    AuditEntryId,
    "audit entry"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_id_generation() {
        let id1 = LeadId::generate();
        let id2 = LeadId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_id_round_trips_through_display() {
        let id = QuoteId::generate();
        let parsed: QuoteId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_invalid_id_reports_kind() {
        let err = "not-a-uuid".parse::<LeadId>().unwrap_err();
        assert_eq!(err.kind, "lead");
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_id_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_value(LeadId::from_uuid(uuid)).unwrap();
        assert_eq!(json, serde_json::json!(uuid.to_string()));
    }
}
