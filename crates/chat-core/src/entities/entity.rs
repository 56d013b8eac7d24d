//! The contract every cached record satisfies
//!
//! Records are plain structs with `#[serde(default)]` so a partial payload
//! deserializes cleanly. Merging overlays only the fields present in a patch.

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Cache namespace discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Guild,
    Channel,
    Message,
    Member,
}

impl EntityKind {
    /// Lowercase name used in logs and errors
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Message => "message",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A remote entity that can live in the cache.
///
/// Relations to other entities are held as identifiers only and resolved
/// against the cache when read.
pub trait Entity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable identity of the record within its namespace
    type Key: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    const KIND: EntityKind;

    /// Identity of this record
    fn key(&self) -> Self::Key;

    /// Empty record carrying only its identity, the starting point for a first patch
    fn seed(key: Self::Key) -> Self;

    /// Read the identity a raw payload refers to (after [`Entity::normalize`])
    fn key_of(patch: &Map<String, Value>) -> Result<Self::Key, DomainError>;

    /// Rewrite embedded relation objects into identifier fields
    fn normalize(_patch: &mut Map<String, Value>) -> Result<(), DomainError> {
        Ok(())
    }

    /// Overlay the fields present in `patch`. Absent fields keep their value,
    /// an explicit `null` clears an optional field.
    ///
    /// On error `self` is left untouched.
    fn merge(&mut self, patch: &Map<String, Value>) -> Result<(), DomainError> {
        let mut current = match serde_json::to_value(&*self) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(invalid::<Self, _>("record is not an object")),
            Err(e) => return Err(invalid::<Self, _>(e)),
        };
        for (field, value) in patch {
            current.insert(field.clone(), value.clone());
        }
        *self = serde_json::from_value(Value::Object(current)).map_err(invalid::<Self, _>)?;
        Ok(())
    }
}

/// Build an [`DomainError::InvalidPatch`] for entity type `T`
pub(crate) fn invalid<T: Entity, R: fmt::Display>(reason: R) -> DomainError {
    DomainError::InvalidPatch {
        kind: T::KIND,
        reason: reason.to_string(),
    }
}

/// Read a required snowflake field from a raw payload
pub(crate) fn snowflake_field<T: Entity>(
    patch: &Map<String, Value>,
    field: &str,
) -> Result<Snowflake, DomainError> {
    let value = patch
        .get(field)
        .ok_or_else(|| invalid::<T, _>(format!("missing {field}")))?;
    serde_json::from_value(value.clone()).map_err(|e| invalid::<T, _>(format!("{field}: {e}")))
}

/// Replace an embedded `{ "id": ... }` object at `object_field` with its id at `id_field`
pub(crate) fn flatten_relation<T: Entity>(
    patch: &mut Map<String, Value>,
    object_field: &str,
    id_field: &str,
) -> Result<(), DomainError> {
    let Some(embedded) = patch.remove(object_field) else {
        return Ok(());
    };
    let id = embedded
        .get("id")
        .cloned()
        .ok_or_else(|| invalid::<T, _>(format!("{object_field} has no id")))?;
    patch.insert(id_field.to_string(), id);
    Ok(())
}
