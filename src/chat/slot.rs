//! Three-state optional field used by the model-facing projection.
//!
//! A field can be *unset* (never carried by this kind of message), *null*
//! (carried, but empty) or hold a value. Only values are ever serialized, so
//! both absent states vanish from the JSON sent to the model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field presence with an explicit distinction between "unset" and "null".
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// The field was never populated for this message.
    Unset,
    /// The field is known to be empty.
    Null,
    /// The field carries a value.
    Value(T),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Slot<T> {
    /// `true` for both absent states; used as `skip_serializing_if`.
    #[must_use]
    pub const fn is_omitted(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

impl<T> From<Option<T>> for Slot<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

impl<T: Serialize> Serialize for Slot<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unset | Self::Null => serializer.serialize_none(),
        }
    }
}

// A missing key never reaches this impl: `#[serde(default)]` yields `Unset`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Slot<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}
