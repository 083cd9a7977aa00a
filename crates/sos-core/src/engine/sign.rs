use crate::crypto::{Digest, PrivateKey};
use crate::error::PeerError;
use crate::peer::PeerInfo;

use super::{signing_error, PeerEngine};

impl PeerEngine {
    /// Digest of the description as it is signed, with the live V2
    /// dictionary packed in.
    pub fn digest(&self, peer: &PeerInfo) -> Result<Digest, PeerError> {
        let description = peer.signing_description(self.encoder.as_ref())?;
        let encoded = self.encoder.encode_dictionary(&description)?;
        Ok(self.crypto.sha256(&encoded))
    }

    /// Packs V2, signs the canonical description and stores the signature.
    ///
    /// The previous signature is dropped first, so a failure leaves the
    /// record unsigned rather than carrying a stale signature.
    pub fn sign(&self, peer: &mut PeerInfo, key: &PrivateKey) -> Result<(), PeerError> {
        peer.clear_signature();
        peer.pack_v2(self.encoder.as_ref())?;
        self.check_envelope_depth(peer.description())?;
        let encoded = self.encoder.encode_dictionary(peer.description())?;
        let digest = self.crypto.sha256(&encoded);
        let signature = self.crypto.sign_digest(key, &digest).map_err(|err| {
            tracing::warn!(peer_id = %peer.id(), error = ?err, "signing peer description failed");
            signing_error(err)
        })?;
        peer.set_signature(signature);
        tracing::debug!(peer_id = %peer.id(), version = peer.version(), "signed peer description");
        Ok(())
    }

    /// Checks the self-signature against the public key the record carries.
    pub fn check_signature(&self, peer: &PeerInfo) -> Result<(), PeerError> {
        let public_key = peer.public_key()?;
        if peer.signature().is_empty() {
            return Err(PeerError::BadSignature);
        }
        let digest = self.digest(peer)?;
        if self
            .crypto
            .verify_digest(&public_key, &digest, peer.signature())
        {
            Ok(())
        } else {
            Err(PeerError::BadSignature)
        }
    }

    /// Whether the self-signature verifies. Every failure reads as `false`.
    #[must_use]
    pub fn verify(&self, peer: &PeerInfo) -> bool {
        match self.check_signature(peer) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(peer_id = %peer.id(), error = %err, "peer signature check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::test_support::{engine, gestalt, sample_key, v1_gestalt};
    use crate::engine::PeerOptions;
    use crate::peer::{keys, v2_keys, StagedPeer};
    use crate::value::{Dictionary, Value};

    #[test]
    fn signed_record_verifies() {
        let engine = engine();
        let peer = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        assert_eq!(peer.signature().len(), 64);
        assert!(engine.verify(&peer));
        engine.check_signature(&peer).expect("signature");
    }

    #[test]
    fn flipping_a_signature_byte_breaks_verification() {
        let engine = engine();
        let peer = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        for index in [0, 31, 63] {
            let mut tampered = peer.clone();
            let mut signature = tampered.signature().to_vec();
            signature[index] ^= 0x01;
            tampered.set_signature(signature);
            assert!(!engine.verify(&tampered), "byte {index}");
        }
    }

    #[test]
    fn changing_any_description_value_breaks_verification() {
        let engine = engine();
        let peer = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");

        let mut renamed = peer.clone();
        StagedPeer::new(&mut renamed).set_gestalt(gestalt("Mac2"));
        assert!(!engine.verify(&renamed));

        let mut downgraded = peer.clone();
        downgraded.set_version(1);
        assert!(!engine.verify(&downgraded));

        let mut rekeyed = peer.clone();
        let mut public_key = peer.public_key().expect("pk").as_bytes().to_vec();
        public_key[0] ^= 0x80;
        rekeyed
            .description_mut()
            .insert(keys::PUBLIC_KEY.into(), Value::Bytes(public_key));
        assert!(matches!(
            engine.check_signature(&rekeyed),
            Err(PeerError::BadSignature)
        ));

        let mut noted = peer.clone();
        StagedPeer::new(&mut noted)
            .set_description_value("note", "x")
            .expect("note");
        assert!(!engine.verify(&noted));
    }

    #[test]
    fn live_v2_changes_are_covered_by_the_signature() {
        let engine = engine();
        let peer = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        let mut tampered = peer.clone();
        StagedPeer::new(&mut tampered).set_v2_value(v2_keys::PREFER_IDS, true);
        assert!(!engine.verify(&tampered));
    }

    #[test]
    fn missing_public_key_and_unsigned_records_fail() {
        let engine = engine();
        let mut peer = engine
            .create(v1_gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        let mut unsigned = peer.clone();
        unsigned.clear_signature();
        assert!(matches!(
            engine.check_signature(&unsigned),
            Err(PeerError::BadSignature)
        ));

        peer.description_mut().remove(keys::PUBLIC_KEY);
        assert!(matches!(
            engine.check_signature(&peer),
            Err(PeerError::MissingPublicKey)
        ));
        assert!(!engine.verify(&peer));
    }

    #[test]
    fn bad_signing_key_leaves_record_unsigned() {
        let engine = engine();
        let mut peer = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        let err = engine
            .sign(&mut peer, &PrivateKey::from_bytes(vec![1u8; 3]))
            .expect_err("short key");
        assert!(matches!(err, PeerError::BadKey(_)));
        assert!(peer.signature().is_empty());
    }

    #[test]
    fn digest_matches_after_signing() {
        let engine = engine();
        let mut peer = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        let before = engine.digest(&peer).expect("digest");
        engine.sign(&mut peer, &sample_key(1)).expect("resign");
        assert_eq!(engine.digest(&peer).expect("digest"), before);

        let mut escrow = Dictionary::new();
        escrow.insert("label".into(), "x".into());
        StagedPeer::new(&mut peer).set_v2_value(v2_keys::ESCROW_RECORDS, Arc::new(escrow));
        assert_ne!(engine.digest(&peer).expect("digest"), before);
    }
}
