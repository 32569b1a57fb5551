//! Strongly-typed identifiers for dropflow entities.
//!
//! All identifiers are opaque strings on the wire. Wrapping them keeps drop
//! object ids, instance ids and session ids from being mixed up in APIs that
//! accept several of them at once.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the identifier, returning the inner string.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Object id of a drop, unique within a physical graph.
    Oid
);

string_id!(
    /// Instance id of a drop.
    ///
    /// Equal to the [`Oid`] unless the drop was replicated, in which case each
    /// replica carries its own uid.
    Uid
);

string_id!(
    /// Session identifier, shared by every manager level a graph touches.
    SessionId
);

impl From<&Oid> for Uid {
    fn from(oid: &Oid) -> Self {
        Self(oid.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn oid_serializes_as_plain_string() {
        let oid = Oid::new("A");
        assert_eq!(serde_json::to_string(&oid).unwrap(), "\"A\"");
        let back: Oid = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(back, oid);
    }

    #[test]
    fn ids_borrow_as_str_for_map_lookups() {
        let mut map: HashMap<Oid, u32> = HashMap::new();
        map.insert(Oid::new("A"), 1);
        assert_eq!(map.get("A"), Some(&1));
    }

    #[test]
    fn uid_defaults_from_oid() {
        let oid = Oid::new("X");
        assert_eq!(Uid::from(&oid).as_str(), "X");
    }
}
