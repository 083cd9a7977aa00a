//! Attribute values carried inside peer descriptions.
//!
//! A description is an ordered string-keyed map of [`Value`]s. Nested
//! dictionaries sit behind an [`Arc`] and are never mutated through the
//! handle: updating one means building a replacement map, so copies of a
//! record can share them freely.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::date::PeerDate;

/// Ordered string-keyed attribute map.
pub type Dictionary = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Integer(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    Date(PeerDate),
    Array(Vec<Value>),
    Dictionary(Arc<Dictionary>),
}

impl Value {
    #[must_use]
    pub fn dictionary(map: Dictionary) -> Self {
        Self::Dictionary(Arc::new(map))
    }

    /// Builds an array of strings, sorted and de-duplicated, the shape used
    /// for set-valued attributes.
    #[must_use]
    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = items.into_iter().map(Into::into).collect();
        items.sort();
        items.dedup();
        Self::Array(items.into_iter().map(Self::String).collect())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<PeerDate> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dictionary(&self) -> Option<&Arc<Dictionary>> {
        match self {
            Self::Dictionary(value) => Some(value),
            _ => None,
        }
    }

    /// Nesting depth; scalars are depth one.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Array(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            Self::Dictionary(map) => 1 + dictionary_depth(map),
            _ => 1,
        }
    }
}

/// Depth of the deepest value held by `map`.
#[must_use]
pub fn dictionary_depth(map: &Dictionary) -> usize {
    map.values().map(Value::depth).max().unwrap_or(0)
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<PeerDate> for Value {
    fn from(value: PeerDate) -> Self {
        Self::Date(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::dictionary(value)
    }
}

impl From<Arc<Dictionary>> for Value {
    fn from(value: Arc<Dictionary>) -> Self {
        Self::Dictionary(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}
