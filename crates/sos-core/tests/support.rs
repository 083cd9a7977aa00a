#![allow(dead_code)]

use std::sync::Arc;

use sos_core::peer::gestalt_keys;
use sos_core::{
    CapabilityEngine, CapabilityKind, CapabilityStatus, CanonicalEncoder, CryptoError,
    DecodeError, Dictionary, Digest, Ed25519Crypto, EncodeError, FixedClock, PeerConfig,
    PeerCrypto, PeerDate, PeerEngine, PeerId, PeerInfo, PrivateKey, PublicKey, StagedPeer, Value,
};

pub const NOW_MS: i64 = 1_700_000_000_000;

pub fn sample_key(prefix: u8) -> PrivateKey {
    let mut seed = [0u8; 32];
    seed[0] = prefix;
    seed[31] = prefix.wrapping_add(1);
    PrivateKey::from_bytes(seed.to_vec())
}

pub fn public_key(key: &PrivateKey) -> PublicKey {
    Ed25519Crypto
        .derive_public_key(key)
        .expect("derive public key")
}

pub fn date(millis: i64) -> PeerDate {
    PeerDate::from_unix_millis(millis).expect("date")
}

pub fn engine_at(millis: i64) -> PeerEngine {
    PeerEngine::new(PeerConfig::default())
        .expect("engine")
        .with_clock(Arc::new(FixedClock(date(millis))))
}

pub fn engine() -> PeerEngine {
    engine_at(NOW_MS)
}

pub fn gestalt(name: &str) -> Dictionary {
    let mut gestalt = Dictionary::new();
    gestalt.insert(gestalt_keys::COMPUTER_NAME.into(), name.into());
    gestalt
}

pub fn v1_gestalt(name: &str) -> Dictionary {
    let mut gestalt = gestalt(name);
    gestalt.insert(gestalt_keys::PEER_VERSION.into(), Value::Integer(1));
    gestalt
}

/// Rebuilds `peer` with one description value replaced and its original
/// signature kept.
pub fn with_description_value(
    engine: &PeerEngine,
    peer: &PeerInfo,
    key: &str,
    value: Value,
) -> PeerInfo {
    let mut description = peer.description().clone();
    description.insert(key.to_owned(), value);
    engine
        .assemble(description, peer.signature().to_vec())
        .expect("assemble tampered record")
}

/// Rebuilds `peer` with one signature bit flipped.
pub fn with_flipped_signature(engine: &PeerEngine, peer: &PeerInfo, index: usize) -> PeerInfo {
    let mut signature = peer.signature().to_vec();
    signature[index] ^= 0x01;
    engine
        .assemble(peer.description().clone(), signature)
        .expect("assemble tampered record")
}

/// Ed25519 keys whose signing step always fails.
#[derive(Debug, Default)]
pub struct FailingSigner;

impl PeerCrypto for FailingSigner {
    fn derive_public_key(&self, private_key: &PrivateKey) -> Result<PublicKey, CryptoError> {
        Ed25519Crypto.derive_public_key(private_key)
    }

    fn derive_peer_id(&self, public_key: &PublicKey) -> Result<PeerId, CryptoError> {
        Ed25519Crypto.derive_peer_id(public_key)
    }

    fn sign_digest(&self, _: &PrivateKey, _: &Digest) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::Unavailable("signing service offline".into()))
    }

    fn verify_digest(&self, public_key: &PublicKey, digest: &Digest, signature: &[u8]) -> bool {
        Ed25519Crypto.verify_digest(public_key, digest, signature)
    }
}

/// Crypto whose id derivation refuses every key.
#[derive(Debug, Default)]
pub struct NoPeerIds;

impl PeerCrypto for NoPeerIds {
    fn derive_public_key(&self, private_key: &PrivateKey) -> Result<PublicKey, CryptoError> {
        Ed25519Crypto.derive_public_key(private_key)
    }

    fn derive_peer_id(&self, _: &PublicKey) -> Result<PeerId, CryptoError> {
        Err(CryptoError::Unavailable("id derivation disabled".into()))
    }

    fn sign_digest(&self, key: &PrivateKey, digest: &Digest) -> Result<Vec<u8>, CryptoError> {
        Ed25519Crypto.sign_digest(key, digest)
    }

    fn verify_digest(&self, public_key: &PublicKey, digest: &Digest, signature: &[u8]) -> bool {
        Ed25519Crypto.verify_digest(public_key, digest, signature)
    }
}

/// Encoder that refuses every value.
#[derive(Debug, Default)]
pub struct RefusingEncoder;

impl CanonicalEncoder for RefusingEncoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::TooDeep {
            depth: value.depth(),
            max: 0,
        })
    }

    fn decode(&self, _: &[u8]) -> Result<Value, DecodeError> {
        Err(DecodeError::Unsupported("refusing encoder"))
    }
}

/// Capability engine that answers every request with one status and never
/// edits the staged record.
#[derive(Debug)]
pub struct FixedCapabilities(pub CapabilityStatus);

impl CapabilityEngine for FixedCapabilities {
    fn query(&self, _: &PeerInfo, _: CapabilityKind, _: &str) -> CapabilityStatus {
        self.0
    }

    fn enable(&self, _: &mut StagedPeer<'_>, _: CapabilityKind, _: &str) -> CapabilityStatus {
        self.0
    }

    fn disable(&self, _: &mut StagedPeer<'_>, _: CapabilityKind, _: &str) -> CapabilityStatus {
        self.0
    }
}
