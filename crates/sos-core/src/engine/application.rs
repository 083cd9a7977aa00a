use std::time::Duration;

use crate::crypto::{Digest, PeerId, PrivateKey, PublicKey};
use crate::date::PeerDate;
use crate::error::PeerError;
use crate::peer::{keys, PeerInfo};

use super::{signing_error, PeerEngine};

impl PeerEngine {
    /// `H = SHA256(date text || public key bytes)`, the payload a sponsor
    /// signs to vouch for an applicant.
    pub fn application_hash(
        &self,
        date: PeerDate,
        public_key: &PublicKey,
    ) -> Result<Digest, PeerError> {
        let stamped = date.encode()?;
        let mut payload = Vec::with_capacity(stamped.len() + public_key.as_bytes().len());
        payload.extend_from_slice(stamped.as_bytes());
        payload.extend_from_slice(public_key.as_bytes());
        Ok(self.crypto.sha256(&payload))
    }

    /// Turns `original` into an applicant vouched for by the sponsor key.
    ///
    /// The application date comes from the engine clock. The sponsor signs
    /// `H` and the peer then self-signs the whole record.
    pub fn copy_as_application(
        &self,
        original: &PeerInfo,
        sponsor_key: &PrivateKey,
        peer_key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        let applied_at = self.clock.now();
        self.copy_with_modification(original, peer_key, |staged| {
            let public_key = staged.peer().public_key()?;
            let digest = self.application_hash(applied_at, &public_key)?;
            let sponsor_signature = self
                .crypto
                .sign_digest(sponsor_key, &digest)
                .map_err(signing_error)?;
            staged.set_description_value(keys::APPLICATION_DATE, applied_at)?;
            staged.set_description_value(keys::APPLICATION_SIGNATURE, sponsor_signature)?;
            Ok(())
        })
    }

    /// Checks only the sponsor's signature over `H`.
    pub fn verify_application_signature(
        &self,
        record: &PeerInfo,
        sponsor: &PublicKey,
    ) -> Result<(), PeerError> {
        let signature = record
            .application_signature()
            .ok_or(PeerError::NotAnApplicant)?;
        let Some(applied_at) = record.application_date() else {
            tracing::warn!(peer_id = %record.id(), "application signature without a date");
            return Err(PeerError::BadApplicationSignature);
        };
        let digest = self.application_hash(applied_at, &record.public_key()?)?;
        if self.crypto.verify_digest(sponsor, &digest, signature) {
            Ok(())
        } else {
            tracing::warn!(peer_id = %record.id(), "application signature does not verify");
            Err(PeerError::BadApplicationSignature)
        }
    }

    /// Full applicant check: the sponsor vouched for this key and date, and
    /// the record itself is intact. The two failures stay distinguishable
    /// as [`PeerError::BadApplicationSignature`] and
    /// [`PeerError::BadSignature`].
    pub fn application_verify(
        &self,
        record: &PeerInfo,
        sponsor: &PublicKey,
    ) -> Result<(), PeerError> {
        self.verify_application_signature(record, sponsor)?;
        self.check_signature(record)
    }

    /// Stamps a retirement date from the engine clock and re-signs.
    pub fn create_retirement_ticket(
        &self,
        original: &PeerInfo,
        key: &PrivateKey,
    ) -> Result<PeerInfo, PeerError> {
        let retired_at = self.clock.now();
        self.copy_with_modification(original, key, |staged| {
            staged.set_description_value(keys::RETIREMENT_DATE, retired_at)
        })
    }

    /// Returns the retiring peer's id once the ticket is effective.
    ///
    /// `now` is trusted as given. The only protection against a replayed or
    /// back-dated ticket is the self-signature.
    pub fn inspect_retirement_ticket(
        &self,
        record: &PeerInfo,
        now: PeerDate,
    ) -> Result<PeerId, PeerError> {
        self.check_signature(record)?;
        let retired_at = record.retirement_date().ok_or(PeerError::NotRetired)?;
        if retired_at < now {
            Ok(record.id().clone())
        } else {
            Err(PeerError::RetirementNotYetEffective { retired_at, now })
        }
    }

    /// Whether a valid retirement ticket is older than `max_age` at `now`
    /// and can be dropped from storage.
    pub fn retirement_ticket_expired(
        &self,
        record: &PeerInfo,
        max_age: Duration,
        now: PeerDate,
    ) -> Result<bool, PeerError> {
        self.check_signature(record)?;
        let retired_at = record.retirement_date().ok_or(PeerError::NotRetired)?;
        let age = i128::from(now.unix_millis()) - i128::from(retired_at.unix_millis());
        Ok(age > i128::try_from(max_age.as_millis()).unwrap_or(i128::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PeerCrypto;
    use crate::engine::test_support::{engine, engine_at, gestalt, sample_key, NOW_MS};
    use crate::engine::PeerOptions;
    use crate::value::Value;

    fn sponsor_pub(engine: &PeerEngine, key: &PrivateKey) -> PublicKey {
        engine.crypto().derive_public_key(key).expect("sponsor pk")
    }

    fn applicant(engine: &PeerEngine) -> PeerInfo {
        let original = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        engine
            .copy_as_application(&original, &sample_key(2), &sample_key(1))
            .expect("apply")
    }

    #[test]
    fn application_hash_covers_date_text_and_key() {
        let engine = engine();
        let date = PeerDate::from_unix_millis(NOW_MS).expect("date");
        let key = PublicKey::from_bytes(vec![5u8; 32]);
        let mut payload = b"2023-11-14T22:13:20.000Z".to_vec();
        payload.extend_from_slice(&[5u8; 32]);
        assert_eq!(
            engine.application_hash(date, &key).expect("hash"),
            crate::hash::h(&payload)
        );
    }

    #[test]
    fn applicant_verifies_against_its_sponsor() {
        let engine = engine();
        let record = applicant(&engine);
        assert!(record.is_applicant());
        assert_eq!(
            record.application_date(),
            Some(PeerDate::from_unix_millis(NOW_MS).expect("date"))
        );
        engine
            .application_verify(&record, &sponsor_pub(&engine, &sample_key(2)))
            .expect("valid applicant");
        assert!(matches!(
            engine.application_verify(&record, &sponsor_pub(&engine, &sample_key(3))),
            Err(PeerError::BadApplicationSignature)
        ));
    }

    #[test]
    fn non_applicant_is_reported() {
        let engine = engine();
        let record = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &sample_key(1))
            .expect("create");
        assert!(matches!(
            engine.application_verify(&record, &sponsor_pub(&engine, &sample_key(2))),
            Err(PeerError::NotAnApplicant)
        ));
    }

    #[test]
    fn tampered_date_fails_both_checks() {
        let engine = engine();
        let mut record = applicant(&engine);
        let later = PeerDate::from_unix_millis(NOW_MS + 1).expect("date");
        record
            .description_mut()
            .insert(keys::APPLICATION_DATE.into(), Value::Date(later));
        let sponsor = sponsor_pub(&engine, &sample_key(2));
        assert!(matches!(
            engine.verify_application_signature(&record, &sponsor),
            Err(PeerError::BadApplicationSignature)
        ));
        assert!(!engine.verify(&record));
    }

    #[test]
    fn tampered_self_signature_fails_only_the_self_check() {
        let engine = engine();
        let mut record = applicant(&engine);
        let mut signature = record.signature().to_vec();
        signature[10] ^= 0xff;
        record.set_signature(signature);
        let sponsor = sponsor_pub(&engine, &sample_key(2));
        engine
            .verify_application_signature(&record, &sponsor)
            .expect("sponsor signature intact");
        assert!(matches!(
            engine.application_verify(&record, &sponsor),
            Err(PeerError::BadSignature)
        ));
    }

    #[test]
    fn retirement_is_effective_strictly_after_its_date() {
        let key = sample_key(1);
        let engine = engine();
        let original = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let ticket = engine
            .create_retirement_ticket(&original, &key)
            .expect("retire");
        assert!(ticket.is_retirement_ticket());

        let at = |millis| PeerDate::from_unix_millis(millis).expect("date");
        assert!(matches!(
            engine.inspect_retirement_ticket(&ticket, at(NOW_MS)),
            Err(PeerError::RetirementNotYetEffective { .. })
        ));
        assert!(matches!(
            engine.inspect_retirement_ticket(&ticket, at(NOW_MS - 1)),
            Err(PeerError::RetirementNotYetEffective { .. })
        ));
        assert_eq!(
            engine
                .inspect_retirement_ticket(&ticket, at(NOW_MS + 1))
                .expect("effective"),
            *original.id()
        );
        assert!(matches!(
            engine.inspect_retirement_ticket(&original, at(NOW_MS + 1)),
            Err(PeerError::NotRetired)
        ));
    }

    #[test]
    fn forged_retirement_fails_the_signature_check() {
        let key = sample_key(1);
        let engine = engine_at(NOW_MS);
        let original = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let mut forged = original.clone();
        forged.description_mut().insert(
            keys::RETIREMENT_DATE.into(),
            Value::Date(PeerDate::from_unix_millis(0).expect("date")),
        );
        assert!(matches!(
            engine.inspect_retirement_ticket(
                &forged,
                PeerDate::from_unix_millis(NOW_MS).expect("date")
            ),
            Err(PeerError::BadSignature)
        ));
    }

    #[test]
    fn retirement_expiry_compares_age() {
        let key = sample_key(1);
        let engine = engine();
        let original = engine
            .create(gestalt("Mac"), &PeerOptions::default(), &key)
            .expect("create");
        let ticket = engine
            .create_retirement_ticket(&original, &key)
            .expect("retire");
        let day = Duration::from_secs(24 * 60 * 60);
        let day_ms = i64::try_from(day.as_millis()).expect("fits");
        let at = |millis| PeerDate::from_unix_millis(millis).expect("date");

        assert!(!engine
            .retirement_ticket_expired(&ticket, day, at(NOW_MS + day_ms))
            .expect("check"));
        assert!(engine
            .retirement_ticket_expired(&ticket, day, at(NOW_MS + day_ms + 1))
            .expect("check"));
    }
}
