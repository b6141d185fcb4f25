use super::{Document, Error, Store};
use crate::types::{ActivateBoost, QueueBoost, Validator};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A [Store] persisted as a single JSON document.
///
/// Each write serializes the whole document to a sibling temporary file and renames it over the
/// existing file, so a crash leaves either the old or the new document on disk.
#[derive(Clone)]
pub struct File {
    path: Arc<PathBuf>,
    document: Arc<Mutex<Document>>,
}

impl File {
    /// Opens the document at `path`, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Document::default(),
            Err(err) => return Err(err.into()),
        };
        info!(
            path = %path.display(),
            validators = document.validators.len(),
            "opened store"
        );
        Ok(Self {
            path: Arc::new(path),
            document: Arc::new(Mutex::new(document)),
        })
    }

    /// Applies `f` to a copy of the document, persists the copy, then makes it current.
    async fn write<T>(&self, f: impl FnOnce(&mut Document) -> Result<T, Error>) -> Result<T, Error> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let result = f(&mut next)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&next)?).await?;
        tokio::fs::rename(&tmp, &*self.path).await?;
        debug!(path = %self.path.display(), "persisted store");

        *document = next;
        Ok(result)
    }
}

impl Store for File {
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
