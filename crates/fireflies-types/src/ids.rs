//! Type-safe identifier wrappers.
//!
//! Agents are numbered densely from zero in creation order. The number is
//! also the agent's slot in the oscillator pool, which gives every pass
//! over the population a fixed, reproducible iteration order. Engine runs
//! carry a UUID v7 so that recorder output from separate runs sorts by
//! start time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a dense-index newtype wrapper around `u32` with standard derives.
macro_rules! define_index_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Return the inner index value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }

            /// Return the index as a `usize` slot number.
            pub fn slot(self) -> usize {
                usize::try_from(self.0).unwrap_or(usize::MAX)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_index_id! {
    /// Identifier of an oscillator (firefly) in the population.
    AgentId
}

/// Identifier for one engine run, used to label recorder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new run identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_ids_order_by_index() {
        let a = AgentId(3);
        let b = AgentId(11);
        assert!(a < b);
        assert_eq!(a.slot(), 3);
        assert_eq!(u32::from(b), 11);
    }

    #[test]
    fn agent_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&AgentId(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));
    }

    #[test]
    fn run_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }
}
