//! The peer engine: construction, signing, copy-modify and the lifecycle
//! protocols built on top of it.
//!
//! [`PeerEngine`] owns no records. It holds the collaborators every
//! operation needs (crypto, canonical encoder, clock and capability policy)
//! and turns one record value into another. Inputs are never modified; a
//! failed operation returns an error and nothing else.

mod accessors;
mod application;
mod capability;
mod construct;
mod sign;
mod wire;

use std::fmt;
use std::sync::Arc;

use crate::capability::{CapabilityEngine, MembershipEngine};
use crate::config::{ConfigError, PeerConfig};
use crate::crypto::{CryptoError, Ed25519Crypto, PeerCrypto};
use crate::date::{Clock, SystemClock};
use crate::encoding::{CanonicalEncoder, CborEncoder};
use crate::error::PeerError;

pub use construct::PeerOptions;
pub use wire::record_keys;

pub struct PeerEngine {
    crypto: Arc<dyn PeerCrypto>,
    encoder: Arc<dyn CanonicalEncoder>,
    clock: Arc<dyn Clock>,
    capabilities: Arc<dyn CapabilityEngine>,
    config: PeerConfig,
}

impl PeerEngine {
    /// Builds an engine with Ed25519 keys, canonical CBOR, the system clock
    /// and a plain [`MembershipEngine`].
    pub fn new(config: PeerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            crypto: Arc::new(Ed25519Crypto),
            encoder: Arc::new(CborEncoder::new(config.max_value_depth)),
            clock: Arc::new(SystemClock),
            capabilities: Arc::new(MembershipEngine::new()),
            config,
        })
    }

    #[must_use]
    pub fn with_crypto(mut self, crypto: Arc<dyn PeerCrypto>) -> Self {
        self.crypto = crypto;
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn CanonicalEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityEngine>) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    #[must_use]
    pub fn crypto(&self) -> &dyn PeerCrypto {
        self.crypto.as_ref()
    }

    #[must_use]
    pub fn encoder(&self) -> &dyn CanonicalEncoder {
        self.encoder.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl Default for PeerEngine {
    fn default() -> Self {
        let config = PeerConfig::default();
        Self {
            crypto: Arc::new(Ed25519Crypto),
            encoder: Arc::new(CborEncoder::new(config.max_value_depth)),
            clock: Arc::new(SystemClock),
            capabilities: Arc::new(MembershipEngine::new()),
            config,
        }
    }
}

impl fmt::Debug for PeerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Malformed key material is a key problem; anything else the crypto layer
/// reports while signing is a signing failure.
fn signing_error(err: CryptoError) -> PeerError {
    match err {
        CryptoError::PrivateKeyLength { .. }
        | CryptoError::PublicKeyLength { .. }
        | CryptoError::InvalidPublicKey(_) => PeerError::BadKey(err),
        other => PeerError::SigningFailed(other),
    }
}
