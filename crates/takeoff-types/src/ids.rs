use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Create an identifier, rejecting blank input.
            pub fn parse(id: &str) -> Result<Self, TypeError> {
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(TypeError::EmptyIdentifier);
                }
                Ok(Self(trimmed.to_string()))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Scope of one ledger chain. Chains never cross projects.
    ProjectId
);

string_id!(
    /// A building component (wall, slab, opening, ...) within a project.
    ElementId
);

string_id!(
    /// Identifier of a formula definition. A new version of a formula gets
    /// a new identifier; the old one stays valid for the results it produced.
    FormulaId
);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Short representation (first 8 characters of the UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $tag, self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a ledger entry. Corrections reference earlier entries by it.
    EntryId,
    "EntryId"
);

uuid_id!(
    /// Identifier of one calculation result.
    ResultId,
    "ResultId"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_rejects_blank() {
        assert_eq!(ProjectId::parse("  p-1 ").unwrap().as_str(), "p-1");
        assert_eq!(ElementId::parse("   ").unwrap_err(), TypeError::EmptyIdentifier);
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let id = FormulaId::new("wall-net-area-v2");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wall-net-area-v2\"");
        let parsed: FormulaId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn uuid_ids_are_unique() {
        let a = EntryId::new();
        let b = EntryId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn debug_format_is_compact() {
        let id = ResultId::new();
        let debug = format!("{id:?}");
        assert!(debug.starts_with("ResultId("));
        assert_eq!(id.short_id().len(), 8);
    }
}
