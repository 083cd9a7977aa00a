use crate::crypto::PublicKey;
use crate::encoding::{DecodeError, EncodeError};
use crate::error::PeerError;
use crate::peer::{keys, PeerInfo};
use crate::value::{dictionary_depth, Dictionary, Value};

use super::PeerEngine;

/// Keys of the encoded `{description, signature}` envelope.
pub mod record_keys {
    pub const DESCRIPTION: &str = "description";
    pub const SIGNATURE: &str = "signature";
}

impl PeerEngine {
    /// Rejects descriptions that would nest too deeply once wrapped in the
    /// record envelope, so anything that signs can also be encoded.
    pub(crate) fn check_envelope_depth(&self, description: &Dictionary) -> Result<(), PeerError> {
        // envelope -> description -> deepest description value
        let depth = 2 + dictionary_depth(description);
        let max = self.config.max_value_depth;
        if depth > max {
            return Err(EncodeError::TooDeep { depth, max }.into());
        }
        Ok(())
    }

    /// Canonical bytes of the signed record.
    pub fn encode_record(&self, peer: &PeerInfo) -> Result<Vec<u8>, PeerError> {
        let description = peer.signing_description(self.encoder.as_ref())?;
        let mut envelope = Dictionary::new();
        envelope.insert(
            record_keys::DESCRIPTION.into(),
            Value::dictionary(description.into_owned()),
        );
        envelope.insert(
            record_keys::SIGNATURE.into(),
            Value::Bytes(peer.signature().to_vec()),
        );
        Ok(self.encoder.encode_dictionary(&envelope)?)
    }

    /// Rebuilds a record from [`PeerEngine::encode_record`] output. The
    /// signature is not checked; call [`PeerEngine::verify`] before trusting it.
    pub fn decode_record(&self, bytes: &[u8]) -> Result<PeerInfo, PeerError> {
        let mut envelope = self.encoder.decode_dictionary(bytes)?;
        let description = match envelope.remove(record_keys::DESCRIPTION) {
            Some(Value::Dictionary(description)) => Dictionary::clone(&description),
            _ => {
                return Err(DecodeError::Shape {
                    expected: "a description dictionary",
                }
                .into())
            }
        };
        let signature = match envelope.remove(record_keys::SIGNATURE) {
            Some(Value::Bytes(signature)) => signature,
            _ => {
                return Err(DecodeError::Shape {
                    expected: "signature bytes",
                }
                .into())
            }
        };
        self.assemble(description, signature)
    }

    /// Builds a record from a received description and signature, deriving
    /// the id from the embedded public key.
    ///
    /// A V2 blob is expanded only on records that already declare V2, so the
    /// assembled record hashes exactly as it was received.
    pub fn assemble(
        &self,
        description: Dictionary,
        signature: Vec<u8>,
    ) -> Result<PeerInfo, PeerError> {
        let public_key = description
            .get(keys::PUBLIC_KEY)
            .and_then(Value::as_bytes)
            .filter(|bytes| !bytes.is_empty())
            .map(PublicKey::from_bytes)
            .ok_or(PeerError::MissingPublicKey)?;
        let id = self
            .crypto
            .derive_peer_id(&public_key)
            .map_err(PeerError::BadKey)?;
        let mut peer = PeerInfo::from_parts(description, signature, id)?;
        if peer.is_v2() && peer.packed_v2().is_some() {
            peer.unpack_v2(self.encoder.as_ref())?;
        }
        Ok(peer)
    }
}
