//! Identifier types for domains, entities, and events.
//!
//! Domains and entity ids are validated string keys: a domain is a lowercase
//! slug (`light`, `zwave_js`), an entity id is `domain.object_id`
//! (`light.living_room`). Event ids are random UUIDs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidDomain, InvalidEntityId};

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s.starts_with(|c: char| c.is_ascii_lowercase())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Namespace identifying an integration and its entities/services (e.g. `light`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Validate and wrap a domain name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDomain`] unless the name is a non-empty lowercase
    /// slug starting with a letter.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidDomain> {
        let name = name.into();
        if is_slug(&name) {
            Ok(Self(name))
        } else {
            Err(InvalidDomain { value: name })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = InvalidDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = InvalidDomain;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

/// Stable, domain-qualified entity key of the form `domain.object_id`.
///
/// Immutable once assigned; uniquely identifies one row in the state registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an entity id.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEntityId`] unless the value is `domain.object_id`
    /// with a valid domain slug and a non-empty object id.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidEntityId> {
        let value = value.into();
        match value.split_once('.') {
            Some((domain, object)) if is_slug(domain) && is_slug(object) => Ok(Self(value)),
            _ => Err(InvalidEntityId { value }),
        }
    }

    /// The domain half of the id (`light` in `light.living_room`).
    #[must_use]
    pub fn domain(&self) -> &str {
        // Validated at construction; the dot is always present.
        self.0.split_once('.').map_or("", |(domain, _)| domain)
    }

    /// The object half of the id (`living_room` in `light.living_room`).
    #[must_use]
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, object)| object)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = InvalidEntityId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = InvalidEntityId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Unique identifier for an [`Event`](crate::event::Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(uuid::Uuid);

impl Default for EventId {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl EventId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Access the inner UUID.
    #[must_use]
    pub fn as_uuid(self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}
