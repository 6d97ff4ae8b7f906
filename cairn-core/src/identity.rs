//! Identity types for CAIRN entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh timestamp-sortable id.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// The nil id, useful as a sentinel in tests.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Identifier of a user account.
    UserId
);
define_id!(
    /// Identifier of a challenge definition.
    ChallengeId
);
define_id!(
    /// Identifier of a user x challenge pairing.
    UserChallengeId
);
define_id!(
    /// Identifier of one task within a user challenge.
    TaskId
);
define_id!(
    /// Identifier of a geocache record.
    GeocacheId
);
define_id!(
    /// Identifier of an append-only progress snapshot.
    SnapshotId
);
define_id!(
    /// Referential id of a geocache type.
    TypeId
);
define_id!(
    /// Referential id of a geocache size.
    SizeId
);
define_id!(
    /// Referential id of a country.
    CountryId
);
define_id!(
    /// Referential id of a state/region within a country.
    StateId
);
define_id!(
    /// Referential id of a tagged geocache attribute.
    AttributeId
);

// =============================================================================
// TESTS
// =============================================================================
