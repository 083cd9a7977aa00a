//! Named capability toggles (views and security properties).
//!
//! Which names exist and which combinations are allowed is decided by a
//! [`CapabilityEngine`] outside this crate. The engine edits the staged copy
//! and reports the resulting membership; the peer engine only signs when that
//! report matches the requested transition.

use std::collections::BTreeSet;
use std::fmt;

use crate::peer::{v2_keys, PeerInfo, StagedPeer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    View,
    SecurityProperty,
}

impl CapabilityKind {
    /// V2 dictionary key holding the member set for this kind.
    #[must_use]
    pub const fn v2_key(self) -> &'static str {
        match self {
            Self::View => v2_keys::VIEWS,
            Self::SecurityProperty => v2_keys::SECURITY_PROPERTIES,
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::View => "view",
            Self::SecurityProperty => "security property",
        })
    }
}

/// Result code reported by a [`CapabilityEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityStatus {
    Member,
    NotMember,
    /// The peer does not meet the requirements for the capability.
    NotQualified,
    NoSuchCapability,
    /// Membership is waiting on another party.
    Pending,
    ServiceError,
}

/// External policy engine for views and security properties.
pub trait CapabilityEngine: Send + Sync {
    fn query(&self, peer: &PeerInfo, kind: CapabilityKind, name: &str) -> CapabilityStatus;

    fn enable(
        &self,
        staged: &mut StagedPeer<'_>,
        kind: CapabilityKind,
        name: &str,
    ) -> CapabilityStatus;

    fn disable(
        &self,
        staged: &mut StagedPeer<'_>,
        kind: CapabilityKind,
        name: &str,
    ) -> CapabilityStatus;
}

/// Engine that records plain set membership.
///
/// With no known names configured for a kind, every name is accepted;
/// otherwise names outside the list answer [`CapabilityStatus::NoSuchCapability`].
#[derive(Debug, Clone, Default)]
pub struct MembershipEngine {
    known_views: Option<BTreeSet<String>>,
    known_properties: Option<BTreeSet<String>>,
}

impl MembershipEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_known_views<I, S>(mut self, views: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_views = Some(views.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_known_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    fn is_known(&self, kind: CapabilityKind, name: &str) -> bool {
        let known = match kind {
            CapabilityKind::View => &self.known_views,
            CapabilityKind::SecurityProperty => &self.known_properties,
        };
        known.as_ref().map_or(true, |names| names.contains(name))
    }
}

impl CapabilityEngine for MembershipEngine {
    fn query(&self, peer: &PeerInfo, kind: CapabilityKind, name: &str) -> CapabilityStatus {
        if !self.is_known(kind, name) {
            CapabilityStatus::NoSuchCapability
        } else if peer.has_capability(kind, name) {
            CapabilityStatus::Member
        } else {
            CapabilityStatus::NotMember
        }
    }

    fn enable(
        &self,
        staged: &mut StagedPeer<'_>,
        kind: CapabilityKind,
        name: &str,
    ) -> CapabilityStatus {
        if !self.is_known(kind, name) {
            return CapabilityStatus::NoSuchCapability;
        }
        staged.set_insert(kind.v2_key(), name);
        CapabilityStatus::Member
    }

    fn disable(
        &self,
        staged: &mut StagedPeer<'_>,
        kind: CapabilityKind,
        name: &str,
    ) -> CapabilityStatus {
        if !self.is_known(kind, name) {
            return CapabilityStatus::NoSuchCapability;
        }
        staged.set_remove(kind.v2_key(), name);
        CapabilityStatus::NotMember
    }
}
