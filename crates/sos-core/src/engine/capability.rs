use crate::capability::{CapabilityKind, CapabilityStatus};
use crate::crypto::PrivateKey;
use crate::error::PeerError;
use crate::peer::{PeerInfo, StagedPeer};

use super::PeerEngine;

impl PeerEngine {
    pub fn enable_view(
        &self,
        original: &PeerInfo,
        view: &str,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.update_capabilities(original, CapabilityKind::View, &[view], &[], key)
    }

    pub fn disable_view(
        &self,
        original: &PeerInfo,
        view: &str,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.update_capabilities(original, CapabilityKind::View, &[], &[view], key)
    }

    pub fn enable_security_property(
        &self,
        original: &PeerInfo,
        property: &str,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.update_capabilities(
            original,
            CapabilityKind::SecurityProperty,
            &[property],
            &[],
            key,
        )
    }

    pub fn disable_security_property(
        &self,
        original: &PeerInfo,
        property: &str,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.update_capabilities(
            original,
            CapabilityKind::SecurityProperty,
            &[],
            &[property],
            key,
        )
    }

    /// Applies a batch of enable and disable requests to one copy.
    ///
    /// Every request must end in the expected membership (`Member` after
    /// enable, `NotMember` after disable). The first refusal aborts the
    /// whole batch and nothing is signed.
    pub fn update_capabilities(
        &self,
        original: &PeerInfo,
        kind: CapabilityKind,
        enable: &[&str],
        disable: &[&str],
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.copy_with_modification(original, key, |staged| {
            for name in enable {
                let status = self.capabilities.enable(staged, kind, name);
                expect_status(staged, kind, name, status, CapabilityStatus::Member)?;
            }
            for name in disable {
                let status = self.capabilities.disable(staged, kind, name);
                expect_status(staged, kind, name, status, CapabilityStatus::NotMember)?;
            }
            Ok(())
        })
    }

    /// Asks the capability engine where `record` stands for `name`.
    #[must_use]
    pub fn capability_status(
        &self,
        record: &PeerInfo,
        kind: CapabilityKind,
        name: &str,
    ) -> CapabilityStatus {
        self.capabilities.query(record, kind, name)
    }
}

fn expect_status(
    staged: &StagedPeer<'_>,
    kind: CapabilityKind,
    name: &str,
    status: CapabilityStatus,
    expected: CapabilityStatus,
) -> Result<(), PeerError> {
    if status == expected {
        return Ok(());
    }
    tracing::warn!(
        peer_id = %staged.peer().id(),
        %kind,
        name,
        ?status,
        "capability transition rejected"
    );
    Err(PeerError::CapabilityRejected {
        kind,
        name: name.to_owned(),
        status,
    })
}
