//! Entity model shared by every layer: kinds, identifiers, records, and
//! caller-supplied field sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The two independently owned entity categories.
///
/// Each kind has its own store, its own domain service, its own event
/// channel, and its own identifier space. The static metadata exposed here is
/// the single source for every name that differs between kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Formula 1 driver.
    Driver,
    /// MotoGP rider.
    Rider,
}

impl EntityKind {
    /// Both kinds, in a stable order.
    pub const ALL: [EntityKind; 2] = [EntityKind::Driver, EntityKind::Rider];

    /// Lowercase singular noun used in audit texts (`driver`, `rider`).
    #[must_use]
    pub fn noun(self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Rider => "rider",
        }
    }

    /// Capitalized plural noun used in list audit texts (`Drivers`, `Riders`).
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Driver => "Drivers",
            Self::Rider => "Riders",
        }
    }

    /// Capitalized singular noun for user-facing messages.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Driver => "Driver",
            Self::Rider => "Rider",
        }
    }

    /// Path segment of the REST surface (`/f1`, `/motogp`).
    #[must_use]
    pub fn rest_segment(self) -> &'static str {
        match self {
            Self::Driver => "f1",
            Self::Rider => "motogp",
        }
    }

    /// Event channel the kind's domain service publishes to.
    #[must_use]
    pub fn channel(self) -> &'static str {
        match self {
            Self::Driver => "formula1-topic",
            Self::Rider => "motogp-topic",
        }
    }

    /// Name of the record collection in the document store.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Driver => "formula1_drivers",
            Self::Rider => "motogp_riders",
        }
    }

    /// GraphQL object type exposing the kind.
    #[must_use]
    pub fn graphql_type(self) -> &'static str {
        match self {
            Self::Driver => "Formula1",
            Self::Rider => "MotoGP",
        }
    }

    /// Resolves the kind that owns an event channel.
    #[must_use]
    pub fn from_channel(channel: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.channel() == channel)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// Error returned when parsing an unknown entity kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind: {0} (expected driver or rider)")]
pub struct ParseKindError(pub String);

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "driver" | "drivers" | "f1" | "formula1" => Ok(Self::Driver),
            "rider" | "riders" | "motogp" => Ok(Self::Rider),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Opaque, store-assigned entity identifier.
///
/// Callers never construct ids for new entities; the store calls
/// [`EntityId::generate`] on insert. Ids received from callers are carried
/// verbatim and only compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generates a fresh identifier (uuid v4, 32 lowercase hex characters).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Entity / EntityFields
// ---------------------------------------------------------------------------

/// A persisted driver or rider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub team: String,
}

impl Entity {
    /// Builds the stored entity from an assigned id and caller fields.
    #[must_use]
    pub fn new(id: EntityId, fields: EntityFields) -> Self {
        Self {
            id,
            name: fields.name,
            team: fields.team,
        }
    }

    /// Returns the caller-visible fields, dropping the id.
    #[must_use]
    pub fn fields(&self) -> EntityFields {
        EntityFields {
            name: self.name.clone(),
            team: self.team.clone(),
        }
    }
}

/// Caller-supplied fields for create and update.
///
/// Absent fields deserialize to the empty string: the store tolerates them
/// and update overwrites whatever was there before.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub team: String,
}

impl EntityFields {
    #[must_use]
    pub fn new(name: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
        }
    }
}
