//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity in the simulation has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. All IDs use UUID v7
//! (time-ordered) for efficient database indexing.
//!
//! Residents additionally carry a human-visible passport number issued at
//! registration; the passport is presentation data, the [`ResidentId`] is
//! the stable key everywhere inside the engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a resident (living, deceased, or departed).
    ResidentId
}

define_id! {
    /// Unique identifier for a building placed on the tile map.
    BuildingId
}

define_id! {
    /// Unique identifier for a forageable node in the world.
    ForageableId
}

define_id! {
    /// Unique identifier for a civic petition.
    PetitionId
}

define_id! {
    /// Unique identifier for a job posting.
    JobId
}

define_id! {
    /// Unique identifier for a law on the books.
    LawId
}

define_id! {
    /// Unique identifier for an event in the narrative log.
    EventId
}

define_id! {
    /// Unique identifier for one connected client session.
    SessionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let resident = ResidentId::new();
        let building = BuildingId::new();
        // These are different types -- the compiler enforces no mixing.
        assert_ne!(resident.into_inner(), Uuid::nil());
        assert_ne!(building.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = ResidentId::new();
        let json = serde_json::to_string(&original).ok();
        assert!(json.is_some());
        let restored: Result<ResidentId, _> =
            serde_json::from_str(json.as_deref().unwrap_or(""));
        assert!(restored.is_ok());
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = ResidentId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn v7_ids_are_time_ordered() {
        let first = EventId::new();
        let second = EventId::new();
        assert!(first <= second);
    }
}
