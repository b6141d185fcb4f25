use super::{Document, Error, Store};
use crate::types::{ActivateBoost, QueueBoost, Validator};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;

/// A [Store] that keeps everything in memory.
#[derive(Clone, Default)]
pub struct Memory {
    document: Arc<Mutex<Document>>,
    fail_writes: Arc<AtomicBool>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [Error::Io] (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn write<T>(&self, f: impl FnOnce(&mut Document) -> Result<T, Error>) -> Result<T, Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(io::Error::other("writes disabled")));
        }
        let mut document = self.document.lock().await;
        f(&mut document)
    }
}

impl Store for Memory {
    async fn validators(&self) -> Result<Vec<Validator>, Error> {
        Ok(self.document.lock().await.validators.clone())
    }

    async fn validator(&self, pubkey: &str) -> Result<Option<Validator>, Error> {
        Ok(self.document.lock().await.validator(pubkey).cloned())
    }

    async fn add_validator(&self, validator: Validator) -> Result<(), Error> {
        self.write(|d| d.add_validator(validator)).await
    }

    async fn update_validator(&self, validator: Validator) -> Result<(), Error> {
        self.write(|d| d.update_validator(validator)).await
    }

    async fn delete_validator(&self, pubkey: &str) -> Result<(), Error> {
        self.write(|d| d.delete_validator(pubkey)).await
    }

    async fn pending_queue_boost(&self, pubkey: &str) -> Result<Option<QueueBoost>, Error> {
        Ok(self.document.lock().await.pending_queue_boost(pubkey).cloned())
    }

    async fn pending_queue_boosts(&self) -> Result<Vec<QueueBoost>, Error> {
        Ok(self.document.lock().await.pending_queue_boosts())
    }

    async fn add_queue_boost(&self, record: QueueBoost) -> Result<(), Error> {
        self.write(|d| d.add_queue_boost(record)).await
    }

    async fn add_activate_boost(&self, record: ActivateBoost) -> Result<(), Error> {
        self.write(|d| d.add_activate_boost(record)).await
    }

    async fn mark_activated(&self, transaction_hash: &str) -> Result<(), Error> {
        self.write(|d| d.mark_activated(transaction_hash)).await
    }

    async fn activate_boosts(&self) -> Result<Vec<ActivateBoost>, Error> {
        Ok(self.document.lock().await.activate_boosts.clone())
    }
}
