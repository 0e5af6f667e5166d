//! Strongly-typed ID wrappers for host entities and audit records
//!
//! Both kinds of id are sequential numbers assigned by the storage backend.
//! Newtype wrappers keep an entity id from being passed where an audit record
//! id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Macro to generate ID newtype wrappers
macro_rules! define_id {
    ($name:ident, $display_prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend id
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the raw backend id
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let s = s.strip_prefix($display_prefix).unwrap_or(s);
                let s = s.strip_prefix('#').unwrap_or(s);
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_id!(EntityId, "");
define_id!(AuditRecordId, "log-");
