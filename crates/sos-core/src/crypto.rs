//! Key material and the signing collaborator used by the engine.
//!
//! The engine never interprets key bytes itself. Everything that depends on
//! the signature scheme goes through [`PeerCrypto`], so alternative schemes
//! (or test doubles) plug in without touching record handling.

use std::fmt;

use base64::engine::general_purpose::STANDARD_NO_PAD as BASE64_NO_PAD;
use base64::Engine;
use ed25519_dalek::{
    ed25519::signature::Verifier, Signature as DalekSignature,
    SignatureError as DalekSignatureError, Signer, SigningKey, VerifyingKey,
};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::hash::{h, ht, DIGEST_LEN};
use crate::limits::PEER_ID_DIGEST_LEN;

/// SHA-256 digest signed by peers and sponsors.
pub type Digest = [u8; DIGEST_LEN];

const ED25519_SEED_LEN: usize = 32;
const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// Errors reported by a [`PeerCrypto`] implementation.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("private key must be {expected} bytes, found {actual}")]
    PrivateKeyLength { expected: usize, actual: usize },
    #[error("public key must be {expected} bytes, found {actual}")]
    PublicKeyLength { expected: usize, actual: usize },
    #[error("invalid Ed25519 public key: {0}")]
    InvalidPublicKey(#[source] DalekSignatureError),
    #[error("Ed25519 signing failed: {0}")]
    Signing(#[source] DalekSignatureError),
    #[error("{0}")]
    Unavailable(String),
}

/// Private signing key bytes. The layout belongs to the [`PeerCrypto`]
/// implementation that consumes them.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<{} bytes redacted>)", self.0.len())
    }
}

/// Public key bytes as embedded in a peer description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Stable peer identifier derived from a public key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(String);

impl PeerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signature scheme and identity derivation consumed by the engine.
///
/// `sign_digest` signs the 32-byte digest itself; no further hashing or
/// padding is applied on top of it.
pub trait PeerCrypto: Send + Sync {
    fn derive_public_key(&self, private_key: &PrivateKey) -> Result<PublicKey, CryptoError>;

    fn derive_peer_id(&self, public_key: &PublicKey) -> Result<PeerId, CryptoError>;

    fn sign_digest(&self, private_key: &PrivateKey, digest: &Digest)
        -> Result<Vec<u8>, CryptoError>;

    fn verify_digest(&self, public_key: &PublicKey, digest: &Digest, signature: &[u8]) -> bool;

    fn sha256(&self, data: &[u8]) -> Digest {
        h(data)
    }
}

/// Ed25519 implementation of [`PeerCrypto`].
///
/// Private keys are 32-byte seeds. Peer IDs are the unpadded base64 of the
/// first 20 bytes of `Ht("sos/peer-id", pk)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Crypto;

impl Ed25519Crypto {
    /// Generates a fresh private key from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> PrivateKey {
        PrivateKey::from_bytes(SigningKey::generate(rng).to_bytes().to_vec())
    }

    fn signing_key(private_key: &PrivateKey) -> Result<SigningKey, CryptoError> {
        let seed: [u8; ED25519_SEED_LEN] =
            private_key
                .as_bytes()
                .try_into()
                .map_err(|_| CryptoError::PrivateKeyLength {
                    expected: ED25519_SEED_LEN,
                    actual: private_key.as_bytes().len(),
                })?;
        Ok(SigningKey::from_bytes(&seed))
    }

    fn verifying_key(public_key: &PublicKey) -> Result<VerifyingKey, CryptoError> {
        let bytes: [u8; ED25519_PUBLIC_KEY_LEN] =
            public_key
                .as_bytes()
                .try_into()
                .map_err(|_| CryptoError::PublicKeyLength {
                    expected: ED25519_PUBLIC_KEY_LEN,
                    actual: public_key.as_bytes().len(),
                })?;
        VerifyingKey::from_bytes(&bytes).map_err(CryptoError::InvalidPublicKey)
    }
}

impl PeerCrypto for Ed25519Crypto {
    fn derive_public_key(&self, private_key: &PrivateKey) -> Result<PublicKey, CryptoError> {
        let signing_key = Self::signing_key(private_key)?;
        Ok(PublicKey::from_bytes(
            signing_key.verifying_key().to_bytes().to_vec(),
        ))
    }

    fn derive_peer_id(&self, public_key: &PublicKey) -> Result<PeerId, CryptoError> {
        Self::verifying_key(public_key)?;
        let digest = ht("sos/peer-id", public_key.as_bytes());
        Ok(PeerId(BASE64_NO_PAD.encode(&digest[..PEER_ID_DIGEST_LEN])))
    }

    fn sign_digest(
        &self,
        private_key: &PrivateKey,
        digest: &Digest,
    ) -> Result<Vec<u8>, CryptoError> {
        let signing_key = Self::signing_key(private_key)?;
        let signature: DalekSignature = signing_key
            .try_sign(digest.as_slice())
            .map_err(CryptoError::Signing)?;
        Ok(signature.to_bytes().to_vec())
    }

    fn verify_digest(&self, public_key: &PublicKey, digest: &Digest, signature: &[u8]) -> bool {
        let Ok(verifying_key) = Self::verifying_key(public_key) else {
            return false;
        };
        let Ok(signature) = DalekSignature::try_from(signature) else {
            return false;
        };
        verifying_key.verify(digest.as_slice(), &signature).is_ok()
    }
}
