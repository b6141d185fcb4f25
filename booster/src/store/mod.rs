//! Validator configuration and boost records.
//!
//! Two engines share one document model:
//!
//! * [Memory]: for tests and dry runs.
//! * [File]: a JSON document replaced atomically on every write.
//!
//! Both reject a second unactivated [QueueBoost] for the same validator at insert time, so a
//! racing writer cannot queue the same validator twice.

use crate::types::{ActivateBoost, QueueBoost, Validator};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

mod file;
pub use file::File;
mod memory;
pub use memory::Memory;

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("validator {0} already exists")]
    ValidatorExists(String),
    #[error("validator {0} not found")]
    ValidatorMissing(String),
    #[error("validator {0} already has a pending queue boost")]
    PendingBoost(String),
    #[error("record {0} not found")]
    RecordMissing(String),
    #[error("record {0} already exists")]
    DuplicateRecord(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistence consumed by the orchestrator and the admin API.
///
/// Validators are keyed by pubkey and records by transaction hash. Keys compare
/// case-insensitively.
pub trait Store: Clone + Send + Sync + 'static {
    /// Lists validators in insertion order.
    fn validators(&self) -> impl Future<Output = Result<Vec<Validator>, Error>> + Send;

    fn validator(
        &self,
        pubkey: &str,
    ) -> impl Future<Output = Result<Option<Validator>, Error>> + Send;

    fn add_validator(&self, validator: Validator)
        -> impl Future<Output = Result<(), Error>> + Send;

    /// Replaces the validator with the same pubkey.
    fn update_validator(
        &self,
        validator: Validator,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes a validator. Its boost records are kept.
    fn delete_validator(&self, pubkey: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the validator's unactivated queue boost, if any.
    fn pending_queue_boost(
        &self,
        pubkey: &str,
    ) -> impl Future<Output = Result<Option<QueueBoost>, Error>> + Send;

    /// Lists every unactivated queue boost.
    fn pending_queue_boosts(&self) -> impl Future<Output = Result<Vec<QueueBoost>, Error>> + Send;

    /// Whether the validator has an unactivated queue boost.
    fn queue_boost_exists(&self, pubkey: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        let pending = self.pending_queue_boost(pubkey);
        async move { Ok(pending.await?.is_some()) }
    }

    /// Inserts a queue boost, failing with [Error::PendingBoost] if the validator already has an
    /// unactivated one.
    fn add_queue_boost(&self, record: QueueBoost)
        -> impl Future<Output = Result<(), Error>> + Send;

    fn add_activate_boost(
        &self,
        record: ActivateBoost,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Flags the queue boost with `transaction_hash` as activated.
    fn mark_activated(
        &self,
        transaction_hash: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn activate_boosts(&self) -> impl Future<Output = Result<Vec<ActivateBoost>, Error>> + Send;
}

/// Everything a store holds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Document {
    validators: Vec<Validator>,
    queue_boosts: Vec<QueueBoost>,
    activate_boosts: Vec<ActivateBoost>,
}

fn same(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Document {
    fn validator(&self, pubkey: &str) -> Option<&Validator> {
        self.validators.iter().find(|v| same(&v.pubkey, pubkey))
    }

    fn add_validator(&mut self, validator: Validator) -> Result<(), Error> {
        if self.validator(&validator.pubkey).is_some() {
            return Err(Error::ValidatorExists(validator.pubkey));
        }
        self.validators.push(validator);
        Ok(())
    }

    fn update_validator(&mut self, validator: Validator) -> Result<(), Error> {
        let Some(existing) = self
            .validators
            .iter_mut()
            .find(|v| same(&v.pubkey, &validator.pubkey))
        else {
            return Err(Error::ValidatorMissing(validator.pubkey));
        };
        existing.operator_address = validator.operator_address;
        existing.boost_threshold = validator.boost_threshold;
        Ok(())
    }

    fn delete_validator(&mut self, pubkey: &str) -> Result<(), Error> {
        let before = self.validators.len();
        self.validators.retain(|v| !same(&v.pubkey, pubkey));
        if self.validators.len() == before {
            return Err(Error::ValidatorMissing(pubkey.to_string()));
        }
        Ok(())
    }

    fn pending_queue_boost(&self, pubkey: &str) -> Option<&QueueBoost> {
        self.queue_boosts
            .iter()
            .find(|r| !r.activated && same(&r.validator_pubkey, pubkey))
    }

    fn pending_queue_boosts(&self) -> Vec<QueueBoost> {
        self.queue_boosts
            .iter()
            .filter(|r| !r.activated)
            .cloned()
            .collect()
    }

    fn add_queue_boost(&mut self, record: QueueBoost) -> Result<(), Error> {
        if self
            .queue_boosts
            .iter()
            .any(|r| same(&r.transaction_hash, &record.transaction_hash))
        {
            return Err(Error::DuplicateRecord(record.transaction_hash));
        }
        if !record.activated && self.pending_queue_boost(&record.validator_pubkey).is_some() {
            return Err(Error::PendingBoost(record.validator_pubkey));
        }
        self.queue_boosts.push(record);
        Ok(())
    }

    fn add_activate_boost(&mut self, record: ActivateBoost) -> Result<(), Error> {
        if self
            .activate_boosts
            .iter()
            .any(|r| same(&r.transaction_hash, &record.transaction_hash))
        {
            return Err(Error::DuplicateRecord(record.transaction_hash));
        }
        self.activate_boosts.push(record);
        Ok(())
    }

    fn mark_activated(&mut self, transaction_hash: &str) -> Result<(), Error> {
        let record = self
            .queue_boosts
            .iter_mut()
            .find(|r| same(&r.transaction_hash, transaction_hash))
            .ok_or_else(|| Error::RecordMissing(transaction_hash.to_string()))?;
        record.activated = true;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::DateTime;

    pub(crate) fn validator(pubkey: &str) -> Validator {
        Validator {
            pubkey: pubkey.into(),
            operator_address: "0x00000000000000000000000000000000000000aa".into(),
            boost_threshold: "1000000000000000000".into(),
        }
    }

    pub(crate) fn queue_boost(pubkey: &str, hash: &str) -> QueueBoost {
        QueueBoost {
            validator_pubkey: pubkey.into(),
            operator_address: "0x00000000000000000000000000000000000000aa".into(),
            amount: "2000000000000000000".into(),
            transaction_hash: hash.into(),
            block_number: 1,
            block_timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            fee: 0.1,
            transaction_from: "0x00000000000000000000000000000000000000aa".into(),
            to_contract: "0x656b95E550C07a9ffe548bd4085c72418Ceb1dba".into(),
            activated: false,
        }
    }

    pub(crate) fn activate_boost(pubkey: &str, hash: &str) -> ActivateBoost {
        let record = queue_boost(pubkey, hash);
        ActivateBoost {
            validator_pubkey: record.validator_pubkey,
            operator_address: record.operator_address,
            amount: record.amount,
            transaction_hash: record.transaction_hash,
            block_number: record.block_number,
            block_timestamp: record.block_timestamp,
            fee: record.fee,
            transaction_from: record.transaction_from,
            to_contract: record.to_contract,
        }
    }

    /// Behaviour every engine must share.
    pub(crate) async fn exercise<S: Store>(store: S) {
        // Validators
        store.add_validator(validator("0xaa")).await.unwrap();
        store.add_validator(validator("0xbb")).await.unwrap();
        assert!(matches!(
            store.add_validator(validator("0xAA")).await,
            Err(Error::ValidatorExists(_))
        ));
        let mut updated = validator("0xAA");
        updated.boost_threshold = "5000000000000000000".into();
        store.update_validator(updated).await.unwrap();
        let stored = store.validator("0xaa").await.unwrap().unwrap();
        assert_eq!(stored.pubkey, "0xaa");
        assert_eq!(stored.boost_threshold, "5000000000000000000");
        assert!(matches!(
            store.update_validator(validator("0xcc")).await,
            Err(Error::ValidatorMissing(_))
        ));
        store.delete_validator("0xbb").await.unwrap();
        assert!(matches!(
            store.delete_validator("0xbb").await,
            Err(Error::ValidatorMissing(_))
        ));
        let pubkeys: Vec<_> = store
            .validators()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.pubkey)
            .collect();
        assert_eq!(pubkeys, vec!["0xaa".to_string()]);

        // At most one pending queue boost per validator
        assert!(!store.queue_boost_exists("0xaa").await.unwrap());
        store.add_queue_boost(queue_boost("0xaa", "0x01")).await.unwrap();
        assert!(store.queue_boost_exists("0xaa").await.unwrap());
        assert!(matches!(
            store.add_queue_boost(queue_boost("0xaa", "0x02")).await,
            Err(Error::PendingBoost(_))
        ));
        assert!(matches!(
            store.add_queue_boost(queue_boost("0xbb", "0x01")).await,
            Err(Error::DuplicateRecord(_))
        ));
        store.add_queue_boost(queue_boost("0xbb", "0x03")).await.unwrap();
        assert_eq!(store.pending_queue_boosts().await.unwrap().len(), 2);

        // Activation frees the slot
        store
            .add_activate_boost(activate_boost("0xaa", "0x10"))
            .await
            .unwrap();
        assert!(matches!(
            store.add_activate_boost(activate_boost("0xaa", "0x10")).await,
            Err(Error::DuplicateRecord(_))
        ));
        store.mark_activated("0x01").await.unwrap();
        assert!(matches!(
            store.mark_activated("0x99").await,
            Err(Error::RecordMissing(_))
        ));
        assert!(!store.queue_boost_exists("0xaa").await.unwrap());
        assert_eq!(
            store.pending_queue_boost("0xbb").await.unwrap().unwrap().transaction_hash,
            "0x03"
        );
        store.add_queue_boost(queue_boost("0xaa", "0x02")).await.unwrap();
        assert_eq!(store.activate_boosts().await.unwrap().len(), 1);
    }

    #[test]
    fn test_document_wire_names() {
        let mut document = Document::default();
        document.add_validator(validator("0xaa")).unwrap();
        let json = serde_json::to_value(&document).unwrap();
        assert!(json["validators"].is_array());
        assert!(json["queueBoosts"].is_array());
        assert!(json["activateBoosts"].is_array());

        let parsed: Document = serde_json::from_str(r#"{"validators": []}"#).unwrap();
        assert_eq!(parsed, Document::default());
    }
}
