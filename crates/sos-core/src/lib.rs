//! Signed peer identity records for secure object syncing circles.
//!
//! A peer record is a self-signed description of one device: its protocol
//! version, public key, gestalt (free-form device attributes) and a packed
//! V2 extension block carrying transport preferences, views, security
//! properties, backup keys and escrow records. Records are immutable values;
//! every change goes through [`PeerEngine`], which copies, edits and re-signs.
//!
//! The crate performs no I/O. Signing, canonical encoding, the clock and the
//! capability policy are collaborators behind traits so hosts can swap them.

pub mod capability;
pub mod config;
pub mod crypto;
pub mod date;
pub mod encoding;
pub mod engine;
mod error;
mod hash;
pub mod limits;
pub mod peer;
pub mod value;

pub use crate::capability::{
    CapabilityEngine, CapabilityKind, CapabilityStatus, MembershipEngine,
};
pub use crate::config::{ConfigError, PeerConfig};
pub use crate::crypto::{
    CryptoError, Digest, Ed25519Crypto, PeerCrypto, PeerId, PrivateKey, PublicKey,
};
pub use crate::date::{Clock, DateError, FixedClock, PeerDate, SystemClock};
pub use crate::encoding::{CanonicalEncoder, CborEncoder, DecodeError, EncodeError};
pub use crate::engine::{PeerEngine, PeerOptions};
pub use crate::error::PeerError;
pub use crate::hash::{h, ht};
pub use crate::peer::{PeerInfo, StagedPeer};
pub use crate::value::{Dictionary, Value};
