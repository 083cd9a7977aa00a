use std::sync::Arc;

use crate::capability::CapabilityKind;
use crate::value::{Dictionary, Value};

use super::staged::set_members;
use super::{v2_keys, PeerInfo};

/// Transport used when a record does not name one.
pub const DEFAULT_TRANSPORT_TYPE: &str = "KVS";

impl PeerInfo {
    #[must_use]
    pub fn backup_key(&self) -> Option<&[u8]> {
        self.v2_value(v2_keys::BACKUP_KEY).and_then(Value::as_bytes)
    }

    #[must_use]
    pub fn has_backup_key(&self) -> bool {
        self.backup_key().is_some_and(|key| !key.is_empty())
    }

    /// Escrow record published for one identity domain.
    #[must_use]
    pub fn escrow_record(&self, domain: &str) -> Option<&Arc<Dictionary>> {
        self.escrow_records()
            .and_then(|records| records.get(domain))
            .and_then(Value::as_dictionary)
    }

    #[must_use]
    pub fn escrow_records(&self) -> Option<&Arc<Dictionary>> {
        self.v2_value(v2_keys::ESCROW_RECORDS)
            .and_then(Value::as_dictionary)
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.v2_value(v2_keys::DEVICE_ID).and_then(Value::as_str)
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.v2_value(v2_keys::SERIAL_NUMBER).and_then(Value::as_str)
    }

    #[must_use]
    pub fn transport_type(&self) -> &str {
        self.v2_value(v2_keys::TRANSPORT_TYPE)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TRANSPORT_TYPE)
    }

    #[must_use]
    pub fn prefers_ids(&self) -> bool {
        self.v2_flag(v2_keys::PREFER_IDS)
    }

    #[must_use]
    pub fn prefers_ids_fragmentation(&self) -> bool {
        self.v2_flag(v2_keys::PREFER_IDS_FRAGMENTATION)
    }

    #[must_use]
    pub fn prefers_ids_ack_model(&self) -> bool {
        self.v2_flag(v2_keys::PREFER_IDS_ACK_MODEL)
    }

    /// Names recorded for `kind`, in sorted order.
    pub fn capabilities(&self, kind: CapabilityKind) -> impl Iterator<Item = &str> {
        set_members(self.v2_value(kind.v2_key()))
    }

    #[must_use]
    pub fn has_capability(&self, kind: CapabilityKind, name: &str) -> bool {
        self.capabilities(kind).any(|member| member == name)
    }

    pub fn views(&self) -> impl Iterator<Item = &str> {
        self.capabilities(CapabilityKind::View)
    }

    #[must_use]
    pub fn is_view_member(&self, view: &str) -> bool {
        self.has_capability(CapabilityKind::View, view)
    }

    pub fn security_properties(&self) -> impl Iterator<Item = &str> {
        self.capabilities(CapabilityKind::SecurityProperty)
    }

    #[must_use]
    pub fn has_security_property(&self, property: &str) -> bool {
        self.has_capability(CapabilityKind::SecurityProperty, property)
    }

    fn v2_flag(&self, key: &str) -> bool {
        self.v2_value(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
