//! The peer record and its staging handle.
//!
//! A [`PeerInfo`] is an immutable value once it leaves the engine: every
//! change goes through [`crate::PeerEngine::copy_with_modification`], which
//! clones the record, lets a closure edit the clone through a
//! [`StagedPeer`], and re-signs the result.

mod accessors;
mod staged;

use std::borrow::Cow;
use std::sync::Arc;

use crate::crypto::{PeerId, PublicKey};
use crate::date::PeerDate;
use crate::encoding::{CanonicalEncoder, EncodeError};
use crate::error::PeerError;
use crate::value::{Dictionary, Value};

pub use accessors::DEFAULT_TRANSPORT_TYPE;
pub use staged::StagedPeer;

/// First protocol version.
pub const PEER_VERSION_V1: i64 = 1;

/// Protocol version from which records carry a V2 extension dictionary.
pub const V2_BASELINE_VERSION: i64 = 2;

/// Version stamped on new records whose gestalt does not declare one.
pub const CURRENT_PEER_VERSION: i64 = V2_BASELINE_VERSION;

/// Keys of the signed description.
pub mod keys {
    pub const VERSION: &str = "version";
    pub const PUBLIC_KEY: &str = "public_key";
    pub const GESTALT: &str = "gestalt";
    /// Packed V2 dictionary, written just before signing.
    pub const V2_DATA: &str = "v2_data";
    pub const APPLICATION_DATE: &str = "application_date";
    pub const APPLICATION_SIGNATURE: &str = "application_signature";
    pub const RETIREMENT_DATE: &str = "retirement_date";
    pub const PING: &str = "ping";

    /// Keys a mutation closure may not write directly.
    pub const RESERVED: [&str; 4] = [VERSION, PUBLIC_KEY, GESTALT, V2_DATA];
}

/// Keys of the V2 extension dictionary.
pub mod v2_keys {
    pub const BACKUP_KEY: &str = "backup_key";
    pub const ESCROW_RECORDS: &str = "escrow_records";
    pub const DEVICE_ID: &str = "device_id";
    pub const TRANSPORT_TYPE: &str = "transport_type";
    pub const PREFER_IDS: &str = "prefer_ids";
    pub const PREFER_IDS_FRAGMENTATION: &str = "prefer_ids_fragmentation";
    pub const PREFER_IDS_ACK_MODEL: &str = "prefer_ids_ack_model";
    pub const SERIAL_NUMBER: &str = "serial_number";
    pub const VIEWS: &str = "views";
    pub const SECURITY_PROPERTIES: &str = "security_properties";
}

/// Well-known gestalt attributes.
pub mod gestalt_keys {
    pub const COMPUTER_NAME: &str = "ComputerName";
    pub const MODEL_NAME: &str = "ModelName";
    pub const OS_VERSION: &str = "OSVersion";
    /// Protocol version the device declares for its own record.
    pub const PEER_VERSION: &str = "PeerInfoVersion";
}

/// A signed peer identity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    description: Dictionary,
    signature: Vec<u8>,
    id: PeerId,
    version: i64,
    gestalt: Arc<Dictionary>,
    v2: Option<Dictionary>,
}

impl PeerInfo {
    /// Builds an unsigned record around a fresh description.
    pub(crate) fn unsigned(
        public_key: &PublicKey,
        id: PeerId,
        version: i64,
        gestalt: Arc<Dictionary>,
    ) -> Self {
        let mut description = Dictionary::new();
        description.insert(keys::VERSION.into(), Value::Integer(version));
        description.insert(
            keys::PUBLIC_KEY.into(),
            Value::Bytes(public_key.as_bytes().to_vec()),
        );
        description.insert(keys::GESTALT.into(), Value::Dictionary(gestalt.clone()));
        Self {
            description,
            signature: Vec::new(),
            id,
            version,
            gestalt,
            v2: None,
        }
    }

    /// Rebuilds a record from a received description. The caller derives
    /// `id` from the embedded key and unpacks V2 afterwards.
    pub(crate) fn from_parts(
        description: Dictionary,
        signature: Vec<u8>,
        id: PeerId,
    ) -> Result<Self, PeerError> {
        let version = description
            .get(keys::VERSION)
            .and_then(Value::as_integer)
            .ok_or_else(|| PeerError::parameter("description has no integer version"))?;
        let gestalt = description
            .get(keys::GESTALT)
            .and_then(Value::as_dictionary)
            .cloned()
            .ok_or_else(|| PeerError::parameter("description has no gestalt dictionary"))?;
        Ok(Self {
            description,
            signature,
            id,
            version,
            gestalt,
            v2: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Self-signature over the canonical description. Empty when unsigned.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    #[must_use]
    pub fn description(&self) -> &Dictionary {
        &self.description
    }

    #[must_use]
    pub fn description_value(&self, key: &str) -> Option<&Value> {
        self.description.get(key)
    }

    /// Shared handle to the gestalt stored under [`keys::GESTALT`].
    #[must_use]
    pub fn gestalt(&self) -> &Arc<Dictionary> {
        &self.gestalt
    }

    #[must_use]
    pub fn gestalt_value(&self, key: &str) -> Option<&Value> {
        self.gestalt.get(key)
    }

    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        self.gestalt_value(gestalt_keys::COMPUTER_NAME)
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn device_model(&self) -> Option<&str> {
        self.gestalt_value(gestalt_keys::MODEL_NAME)
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn os_version(&self) -> Option<&str> {
        self.gestalt_value(gestalt_keys::OS_VERSION)
            .and_then(Value::as_str)
    }

    /// Live V2 extension dictionary, present once the record is V2.
    #[must_use]
    pub fn v2_dictionary(&self) -> Option<&Dictionary> {
        self.v2.as_ref()
    }

    #[must_use]
    pub fn v2_value(&self, key: &str) -> Option<&Value> {
        self.v2.as_ref().and_then(|v2| v2.get(key))
    }

    #[must_use]
    pub fn is_v2(&self) -> bool {
        self.version >= V2_BASELINE_VERSION
    }

    pub fn public_key(&self) -> Result<PublicKey, PeerError> {
        self.description
            .get(keys::PUBLIC_KEY)
            .and_then(Value::as_bytes)
            .filter(|bytes| !bytes.is_empty())
            .map(PublicKey::from_bytes)
            .ok_or(PeerError::MissingPublicKey)
    }

    #[must_use]
    pub fn application_date(&self) -> Option<PeerDate> {
        self.description
            .get(keys::APPLICATION_DATE)
            .and_then(Value::as_date)
    }

    #[must_use]
    pub fn application_signature(&self) -> Option<&[u8]> {
        self.description
            .get(keys::APPLICATION_SIGNATURE)
            .and_then(Value::as_bytes)
    }

    #[must_use]
    pub fn retirement_date(&self) -> Option<PeerDate> {
        self.description
            .get(keys::RETIREMENT_DATE)
            .and_then(Value::as_date)
    }

    #[must_use]
    pub fn is_applicant(&self) -> bool {
        self.application_signature().is_some()
    }

    #[must_use]
    pub fn is_retirement_ticket(&self) -> bool {
        self.retirement_date().is_some()
    }

    #[must_use]
    pub fn ping_nonce(&self) -> Option<&[u8]> {
        self.description.get(keys::PING).and_then(Value::as_bytes)
    }

    pub(crate) fn packed_v2(&self) -> Option<&[u8]> {
        self.description.get(keys::V2_DATA).and_then(Value::as_bytes)
    }

    /// Expands the packed blob into the live dictionary when it is missing.
    ///
    /// A blob on a record that still declares a pre-V2 version raises the
    /// version; a V2 record without a blob starts from an empty dictionary.
    pub(crate) fn unpack_v2(&mut self, encoder: &dyn CanonicalEncoder) -> Result<(), PeerError> {
        if self.v2.is_some() {
            return Ok(());
        }
        if let Some(blob) = self.packed_v2() {
            let unpacked = encoder.decode_dictionary(blob)?;
            self.v2 = Some(unpacked);
            if !self.is_v2() {
                self.set_version(V2_BASELINE_VERSION);
            }
        } else if self.is_v2() {
            self.v2 = Some(Dictionary::new());
        }
        Ok(())
    }

    /// Writes the packed V2 blob into the description, creating the live
    /// dictionary first if a V2 record lacks one.
    pub(crate) fn pack_v2(&mut self, encoder: &dyn CanonicalEncoder) -> Result<(), EncodeError> {
        if !self.is_v2() {
            return Ok(());
        }
        let blob = encoder.encode_dictionary(self.v2.get_or_insert_with(Dictionary::new))?;
        self.description
            .insert(keys::V2_DATA.into(), Value::Bytes(blob));
        Ok(())
    }

    /// The description exactly as it is signed: with the live V2 dictionary
    /// packed in. Borrowed when there is nothing to pack.
    pub(crate) fn signing_description(
        &self,
        encoder: &dyn CanonicalEncoder,
    ) -> Result<Cow<'_, Dictionary>, EncodeError> {
        match (&self.v2, self.is_v2()) {
            (Some(v2), true) => {
                let mut description = self.description.clone();
                description.insert(
                    keys::V2_DATA.into(),
                    Value::Bytes(encoder.encode_dictionary(v2)?),
                );
                Ok(Cow::Owned(description))
            }
            _ => Ok(Cow::Borrowed(&self.description)),
        }
    }

    pub(crate) fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    pub(crate) fn clear_signature(&mut self) {
        self.signature.clear();
    }

    pub(crate) fn set_id(&mut self, id: PeerId) {
        self.id = id;
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
        self.description
            .insert(keys::VERSION.into(), Value::Integer(version));
    }

    pub(crate) fn set_gestalt(&mut self, gestalt: Arc<Dictionary>) {
        self.description
            .insert(keys::GESTALT.into(), Value::Dictionary(gestalt.clone()));
        self.gestalt = gestalt;
    }

    pub(crate) fn description_mut(&mut self) -> &mut Dictionary {
        &mut self.description
    }

    pub(crate) fn v2_mut(&mut self) -> Option<&mut Dictionary> {
        self.v2.as_mut()
    }

    /// Upgrades to V2 if needed and returns the live dictionary.
    pub(crate) fn ensure_v2(&mut self) -> &mut Dictionary {
        if !self.is_v2() {
            self.set_version(V2_BASELINE_VERSION);
        }
        self.v2.get_or_insert_with(Dictionary::new)
    }
}
