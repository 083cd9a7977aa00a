use thiserror::Error;

use crate::capability::{CapabilityKind, CapabilityStatus};
use crate::crypto::CryptoError;
use crate::date::{DateError, PeerDate};
use crate::encoding::{DecodeError, EncodeError};

/// Errors produced by peer record construction, mutation and checks.
///
/// Nothing here is fatal: a failed operation leaves the input record intact
/// and never yields a partially signed result.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Key missing, malformed, or unusable by the crypto collaborator.
    #[error("bad key: {0}")]
    BadKey(#[source] CryptoError),
    #[error("peer description is missing its public key")]
    MissingPublicKey,
    #[error("peer description could not be encoded: {0}")]
    EncodeFailure(#[from] EncodeError),
    #[error("peer record could not be decoded: {0}")]
    DecodeFailure(#[from] DecodeError),
    #[error("signing the peer description failed: {0}")]
    SigningFailed(#[source] CryptoError),
    /// The self-signature does not match the embedded public key.
    #[error("peer signature does not verify")]
    BadSignature,
    #[error("peer record is not an applicant")]
    NotAnApplicant,
    /// The sponsor signature over the application hash does not verify.
    #[error("application signature does not verify against the sponsor key")]
    BadApplicationSignature,
    #[error("peer record is not a retirement ticket")]
    NotRetired,
    #[error("retirement dated {retired_at} is not yet effective at {now}")]
    RetirementNotYetEffective { retired_at: PeerDate, now: PeerDate },
    #[error("capability engine refused {kind} `{name}` ({status:?})")]
    CapabilityRejected {
        kind: CapabilityKind,
        name: String,
        status: CapabilityStatus,
    },
    #[error("invalid date: {0}")]
    Date(#[from] DateError),
    #[error("invalid parameter: {0}")]
    ParameterError(String),
}

impl PeerError {
    pub(crate) fn parameter(message: impl Into<String>) -> Self {
        Self::ParameterError(message.into())
    }
}
