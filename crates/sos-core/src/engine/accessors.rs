use rand::RngCore;

use crate::crypto::PrivateKey;
use crate::error::PeerError;
use crate::peer::{keys, v2_keys, PeerInfo, StagedPeer};
use crate::value::{Dictionary, Value};

use super::PeerEngine;

impl PeerEngine {
    /// Sets or clears the backup public key.
    pub fn set_backup_key(
        &self,
        original: &PeerInfo,
        backup_key: Option<&[u8]>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.copy_with_modification(original, key, |staged| {
            staged.set_v2_optional(v2_keys::BACKUP_KEY, backup_key.map(<[u8]>::to_vec));
            Ok(())
        })
    }

    /// Sets or clears the escrow record of one identity domain.
    pub fn set_escrow_record(
        &self,
        original: &PeerInfo,
        domain: &str,
        record: Option<Dictionary>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.copy_with_modification(original, key, |staged| {
            let mut records = staged
                .peer()
                .escrow_records()
                .map(|records| Dictionary::clone(records))
                .unwrap_or_default();
            match record {
                Some(record) => {
                    records.insert(domain.to_owned(), Value::dictionary(record));
                }
                None => {
                    records.remove(domain);
                }
            }
            store_escrow_records(staged, records);
            Ok(())
        })
    }

    /// Replaces every escrow record at once. An empty map clears them.
    pub fn replace_escrow_records(
        &self,
        original: &PeerInfo,
        records: Dictionary,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        if let Some(domain) = records
            .iter()
            .find_map(|(domain, record)| record.as_dictionary().is_none().then_some(domain))
        {
            return Err(PeerError::parameter(format!(
                "escrow record for `{domain}` must be a dictionary"
            )));
        }
        self.copy_with_modification(original, key, |staged| {
            store_escrow_records(staged, records);
            Ok(())
        })
    }

    pub fn set_prefer_ids(
        &self,
        original: &PeerInfo,
        prefer: bool,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.set_v2_field(original, v2_keys::PREFER_IDS, prefer, key)
    }

    pub fn set_prefer_ids_fragmentation(
        &self,
        original: &PeerInfo,
        prefer: bool,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.set_v2_field(original, v2_keys::PREFER_IDS_FRAGMENTATION, prefer, key)
    }

    pub fn set_prefer_ids_ack_model(
        &self,
        original: &PeerInfo,
        prefer: bool,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.set_v2_field(original, v2_keys::PREFER_IDS_ACK_MODEL, prefer, key)
    }

    /// Sets the transport type; `None` falls back to the default transport.
    pub fn set_transport_type(
        &self,
        original: &PeerInfo,
        transport: Option<&str>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.set_v2_optional_field(original, v2_keys::TRANSPORT_TYPE, transport, key)
    }

    pub fn set_device_id(
        &self,
        original: &PeerInfo,
        device_id: Option<&str>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.set_v2_optional_field(original, v2_keys::DEVICE_ID, device_id, key)
    }

    pub fn set_serial_number(
        &self,
        original: &PeerInfo,
        serial: Option<&str>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.set_v2_optional_field(original, v2_keys::SERIAL_NUMBER, serial, key)
    }

    /// Stamps a fresh random nonce and re-derives the id from the record's
    /// public key. This is the only path that recomputes `id`.
    pub fn ping(&self, original: &PeerInfo, key: &PrivateKey) -> Result<PeerInfo, PeerError> {
        let mut nonce = vec![0u8; self.config.ping_nonce_len];
        rand::thread_rng().fill_bytes(&mut nonce);
        let mut pinged = self.copy_with_modification(original, key, |staged| {
            staged.set_description_value(keys::PING, nonce)
        })?;
        let id = self
            .crypto
            .derive_peer_id(&pinged.public_key()?)
            .map_err(PeerError::BadKey)?;
        pinged.set_id(id);
        Ok(pinged)
    }

    fn set_v2_field(
        &self,
        original: &PeerInfo,
        field: &str,
        value: impl Into<Value>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        let value = value.into();
        self.copy_with_modification(original, key, |staged| {
            staged.set_v2_value(field, value);
            Ok(())
        })
    }

    fn set_v2_optional_field(
        &self,
        original: &PeerInfo,
        field: &str,
        value: Option<&str>,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        self.copy_with_modification(original, key, |staged| {
            staged.set_v2_optional(field, value);
            Ok(())
        })
    }
}

fn store_escrow_records(staged: &mut StagedPeer<'_>, records: Dictionary) {
    if records.is_empty() {
        staged.remove_v2_value(v2_keys::ESCROW_RECORDS);
    } else {
        staged.set_v2_value(v2_keys::ESCROW_RECORDS, records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, gestalt, sample_key, v1_gestalt};
    use crate::engine::PeerOptions;
    use crate::peer::DEFAULT_TRANSPORT_TYPE;

    fn escrow(label: &str) -> Dictionary {
        let mut record = Dictionary::new();
        record.insert("label".into(), label.into());
        record.insert("serial".into(), 7i64.into());
        record
    }

    #[test]
    fn backup_key_set_and_cleared() {
        let engine = engine();
        let key = sample_key(1);
        let r0 = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let r1 = engine
            .set_backup_key(&r0, Some(&[0u8; 5][..]), &key)
            .expect("set");
        assert_eq!(r1.backup_key(), Some(&[0u8; 5][..]));
        assert_eq!(r0.backup_key(), None);
        assert!(engine.verify(&r1));

        let r2 = engine.set_backup_key(&r1, None, &key).expect("clear");
        assert_eq!(r2.backup_key(), None);
        assert!(!r2
            .v2_dictionary()
            .expect("v2")
            .contains_key(v2_keys::BACKUP_KEY));
    }

    #[test]
    fn first_v2_setter_upgrades_a_v1_record() {
        let engine = engine();
        let key = sample_key(1);
        let v1 = engine
            .create(v1_gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let upgraded = engine.set_prefer_ids(&v1, true, &key).expect("upgrade");
        assert!(!v1.is_v2());
        assert!(upgraded.is_v2());
        assert!(upgraded.prefers_ids());
        assert_eq!(upgraded.gestalt(), v1.gestalt());
        assert_eq!(upgraded.public_key().expect("pk"), v1.public_key().expect("pk"));
        assert!(engine.verify(&upgraded));
    }

    #[test]
    fn escrow_records_are_per_domain() {
        let engine = engine();
        let key = sample_key(1);
        let r0 = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let r1 = engine
            .set_escrow_record(&r0, "dsid-1", Some(escrow("one")), &key)
            .expect("first");
        let r2 = engine
            .set_escrow_record(&r1, "dsid-2", Some(escrow("two")), &key)
            .expect("second");
        assert_eq!(r2.escrow_records().expect("records").len(), 2);
        assert_eq!(
            r2.escrow_record("dsid-1").map(|record| record.as_ref()),
            Some(&escrow("one"))
        );

        let r3 = engine
            .set_escrow_record(&r2, "dsid-1", None, &key)
            .expect("remove");
        assert!(r3.escrow_record("dsid-1").is_none());
        assert!(r3.escrow_record("dsid-2").is_some());

        let r4 = engine
            .replace_escrow_records(&r3, Dictionary::new(), &key)
            .expect("clear");
        assert!(r4.escrow_records().is_none());
        assert!(engine.verify(&r4));
    }

    #[test]
    fn replace_escrow_rejects_non_dictionary_records() {
        let engine = engine();
        let key = sample_key(1);
        let r0 = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let mut records = Dictionary::new();
        records.insert("dsid-1".into(), "not a record".into());
        assert!(matches!(
            engine.replace_escrow_records(&r0, records, &key),
            Err(PeerError::ParameterError(_))
        ));
    }

    #[test]
    fn transport_and_identity_fields() {
        let engine = engine();
        let key = sample_key(1);
        let r0 = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let r1 = engine
            .set_transport_type(&r0, Some("IDS"), &key)
            .and_then(|peer| engine.set_device_id(&peer, Some("device-1"), &key))
            .and_then(|peer| engine.set_serial_number(&peer, Some("C02XYZ"), &key))
            .and_then(|peer| engine.set_prefer_ids_fragmentation(&peer, true, &key))
            .and_then(|peer| engine.set_prefer_ids_ack_model(&peer, true, &key))
            .expect("setters");
        assert_eq!(r1.transport_type(), "IDS");
        assert_eq!(r1.device_id(), Some("device-1"));
        assert_eq!(r1.serial_number(), Some("C02XYZ"));
        assert!(r1.prefers_ids_fragmentation());
        assert!(r1.prefers_ids_ack_model());

        let r2 = engine.set_transport_type(&r1, None, &key).expect("reset");
        assert_eq!(r2.transport_type(), DEFAULT_TRANSPORT_TYPE);
        assert!(engine.verify(&r2));
    }

    #[test]
    fn ping_changes_nonce_but_not_identity() {
        let engine = engine();
        let key = sample_key(1);
        let r0 = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let first = engine.ping(&r0, &key).expect("ping");
        let second = engine.ping(&first, &key).expect("ping");
        let nonce = first.ping_nonce().expect("nonce");
        assert_eq!(nonce.len(), engine.config().ping_nonce_len);
        assert_ne!(Some(nonce), second.ping_nonce());
        assert_eq!(first.id(), r0.id());
        assert_eq!(second.id(), r0.id());
        assert!(engine.verify(&second));
    }
}
