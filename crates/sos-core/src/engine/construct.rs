use std::sync::Arc;

use crate::crypto::PrivateKey;
use crate::error::PeerError;
use crate::peer::{gestalt_keys, v2_keys, PeerInfo, StagedPeer, PEER_VERSION_V1};
use crate::value::{Dictionary, Value};

use super::PeerEngine;

/// Optional V2 fields supplied at creation time.
///
/// Supplying any of them creates a V2 record even when the gestalt declares
/// an older version. Unset fields are omitted from the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerOptions {
    pub backup_key: Option<Vec<u8>>,
    pub device_id: Option<String>,
    pub transport_type: Option<String>,
    pub prefer_ids: Option<bool>,
    pub prefer_ids_fragmentation: Option<bool>,
    pub prefer_ids_ack_model: Option<bool>,
    pub serial_number: Option<String>,
    pub enabled_views: Vec<String>,
}

impl PeerOptions {
    #[must_use]
    pub fn has_v2_fields(&self) -> bool {
        self.backup_key.is_some()
            || self.device_id.is_some()
            || self.transport_type.is_some()
            || self.prefer_ids.is_some()
            || self.prefer_ids_fragmentation.is_some()
            || self.prefer_ids_ack_model.is_some()
            || self.serial_number.is_some()
            || !self.enabled_views.is_empty()
    }

    fn apply(&self, staged: &mut StagedPeer<'_>) {
        staged.ensure_v2();
        staged.set_v2_optional(v2_keys::BACKUP_KEY, self.backup_key.clone());
        staged.set_v2_optional(v2_keys::DEVICE_ID, self.device_id.clone());
        staged.set_v2_optional(v2_keys::TRANSPORT_TYPE, self.transport_type.clone());
        staged.set_v2_optional(v2_keys::PREFER_IDS, self.prefer_ids);
        staged.set_v2_optional(
            v2_keys::PREFER_IDS_FRAGMENTATION,
            self.prefer_ids_fragmentation,
        );
        staged.set_v2_optional(v2_keys::PREFER_IDS_ACK_MODEL, self.prefer_ids_ack_model);
        staged.set_v2_optional(v2_keys::SERIAL_NUMBER, self.serial_number.clone());
        for view in &self.enabled_views {
            staged.set_insert(v2_keys::VIEWS, view);
        }
    }
}

impl PeerEngine {
    /// Builds and signs a new peer record for the key holder.
    ///
    /// The version comes from the gestalt's `PeerInfoVersion` when present
    /// and from [`crate::PeerConfig::default_version`] otherwise.
    pub fn create(
        &self,
        gestalt: impl Into<Arc<Dictionary>>,
        options: &PeerOptions,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        let gestalt = gestalt.into();
        let public_key = self
            .crypto
            .derive_public_key(key)
            .map_err(PeerError::BadKey)?;
        let id = self
            .crypto
            .derive_peer_id(&public_key)
            .map_err(PeerError::BadKey)?;
        let version = match gestalt.get(gestalt_keys::PEER_VERSION) {
            Some(declared) => declared.as_integer().ok_or_else(|| {
                PeerError::parameter("gestalt PeerInfoVersion must be an integer")
            })?,
            None => self.config.default_version,
        };
        if version < PEER_VERSION_V1 {
            return Err(PeerError::parameter(format!(
                "peer version must be at least {PEER_VERSION_V1}, got {version}"
            )));
        }

        let mut peer = PeerInfo::unsigned(&public_key, id, version, gestalt);
        if options.has_v2_fields() {
            options.apply(&mut StagedPeer::new(&mut peer));
        }
        self.sign(&mut peer, key)?;
        tracing::debug!(peer_id = %peer.id(), version = peer.version(), "created peer record");
        Ok(peer)
    }

    /// Copies `original`, applies `mutation` to the copy and signs it.
    ///
    /// The copy has its V2 dictionary expanded before the closure runs. If
    /// the closure or the signing step fails, the copy is dropped and the
    /// error returned; `original` is never touched.
    pub fn copy_with_modification<F>(
        &self,
        original: &PeerInfo,
        key: &PrivateKey,
        mutation: F,
    ) -> Result<PeerInfo, PeerError>
    where
        F: FnOnce(&mut StagedPeer<'_>) -> Result<(), PeerError>,
    {
        let mut copy = original.clone();
        copy.unpack_v2(self.encoder.as_ref())?;
        mutation(&mut StagedPeer::new(&mut copy))?;
        self.sign(&mut copy, key)?;
        tracing::debug!(peer_id = %copy.id(), version = copy.version(), "copied peer record");
        Ok(copy)
    }

    /// Re-signs an unchanged copy, for example after a signature scheme or
    /// encoder upgrade.
    pub fn resign(&self, original: &PeerInfo, key: &PrivateKey) -> Result<PeerInfo, PeerError> {
        self.copy_with_modification(original, key, |_| Ok(()))
    }

    /// Replaces the gestalt wholesale.
    pub fn update_gestalt(
        &self,
        original: &PeerInfo,
        gestalt: impl Into<Arc<Dictionary>>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        let gestalt = gestalt.into();
        self.copy_with_modification(original, key, |staged| {
            staged.set_gestalt(gestalt);
            Ok(())
        })
    }

    /// Sets a single gestalt attribute, leaving the others as they were.
    pub fn set_gestalt_value(
        &self,
        original: &PeerInfo,
        name: &str,
        value: impl Into<Value>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        let mut gestalt = Dictionary::clone(original.gestalt());
        gestalt.insert(name.to_owned(), value.into());
        self.update_gestalt(original, gestalt, key)
    }
}
