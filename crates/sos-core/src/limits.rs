//! Default bounds applied to peer records.
//!
//! These are the values [`crate::PeerConfig`] starts from; deployments that
//! need different bounds override them through configuration.

/// Maximum nesting depth of a [`crate::Value`] accepted by the canonical
/// encoder. Encoded records count from their envelope, so a description
/// value may nest two levels less than this.
pub const MAX_VALUE_DEPTH: usize = 16;

/// Length in bytes of the random nonce stamped by a ping.
pub const PING_NONCE_LEN: usize = 16;

/// Length in bytes of the public-key digest prefix used for peer IDs.
pub const PEER_ID_DIGEST_LEN: usize = 20;
