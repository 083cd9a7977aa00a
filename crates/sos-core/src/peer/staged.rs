use std::sync::Arc;

use crate::error::PeerError;
use crate::value::{Dictionary, Value};

use super::{keys, PeerInfo};

/// Mutable view of a staging copy handed to mutation closures.
///
/// The staging copy is private to one copy-modify call and is signed (or
/// dropped) as soon as the closure returns. The handle exposes the fields a
/// mutation may change; `id` and `signature` are not among them.
#[derive(Debug)]
pub struct StagedPeer<'a> {
    peer: &'a mut PeerInfo,
}

impl<'a> StagedPeer<'a> {
    pub(crate) fn new(peer: &'a mut PeerInfo) -> Self {
        Self { peer }
    }

    /// Read access to the record as staged so far.
    #[must_use]
    pub fn peer(&self) -> &PeerInfo {
        self.peer
    }

    /// Sets a description value. The version, public key, gestalt and packed
    /// V2 slots are managed by the engine and rejected here.
    pub fn set_description_value(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), PeerError> {
        ensure_not_reserved(key)?;
        self.peer
            .description_mut()
            .insert(key.to_owned(), value.into());
        Ok(())
    }

    pub fn remove_description_value(&mut self, key: &str) -> Result<Option<Value>, PeerError> {
        ensure_not_reserved(key)?;
        Ok(self.peer.description_mut().remove(key))
    }

    /// Replaces the gestalt with a new shared map.
    pub fn set_gestalt(&mut self, gestalt: impl Into<Arc<Dictionary>>) {
        self.peer.set_gestalt(gestalt.into());
    }

    /// Upgrades the staged record to V2 (keeping every existing field) and
    /// returns the live extension dictionary.
    pub fn ensure_v2(&mut self) -> &mut Dictionary {
        self.peer.ensure_v2()
    }

    #[must_use]
    pub fn v2_value(&self, key: &str) -> Option<&Value> {
        self.peer.v2_value(key)
    }

    pub fn set_v2_value(&mut self, key: &str, value: impl Into<Value>) {
        self.ensure_v2().insert(key.to_owned(), value.into());
    }

    /// Sets `key` when `value` is present and removes it otherwise; absence
    /// is never stored as a placeholder.
    pub fn set_v2_optional<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        match value {
            Some(value) => self.set_v2_value(key, value),
            None => {
                self.remove_v2_value(key);
            }
        }
    }

    pub fn remove_v2_value(&mut self, key: &str) -> Option<Value> {
        self.peer.v2_mut().and_then(|v2| v2.remove(key))
    }

    /// Whether the string set stored under `key` contains `member`.
    #[must_use]
    pub fn set_contains(&self, key: &str, member: &str) -> bool {
        set_members(self.peer.v2_value(key)).any(|existing| existing == member)
    }

    /// Adds `member` to the string set under `key`. Returns `false` if it was
    /// already present.
    pub fn set_insert(&mut self, key: &str, member: &str) -> bool {
        if self.set_contains(key, member) {
            return false;
        }
        let mut members: Vec<String> = set_members(self.peer.v2_value(key))
            .map(str::to_owned)
            .collect();
        members.push(member.to_owned());
        self.set_v2_value(key, Value::string_set(members));
        true
    }

    /// Removes `member` from the string set under `key`. Returns `false` if it
    /// was not present. An emptied set is dropped from the dictionary.
    pub fn set_remove(&mut self, key: &str, member: &str) -> bool {
        if !self.set_contains(key, member) {
            return false;
        }
        let members: Vec<String> = set_members(self.peer.v2_value(key))
            .filter(|existing| *existing != member)
            .map(str::to_owned)
            .collect();
        if members.is_empty() {
            self.remove_v2_value(key);
        } else {
            self.set_v2_value(key, Value::string_set(members));
        }
        true
    }
}

pub(super) fn set_members(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(Value::as_array)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
}

fn ensure_not_reserved(key: &str) -> Result<(), PeerError> {
    if keys::RESERVED.contains(&key) {
        return Err(PeerError::parameter(format!(
            "description key `{key}` is managed by the engine"
        )));
    }
    Ok(())
}
