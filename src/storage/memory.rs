use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::{
    error::Error,
    storage::{BlobStore, PutBlob},
};

#[derive(Clone, Debug, PartialEq)]
pub struct StoredBlob {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

/// In-process store used to exercise the dispatcher.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<(String, String), StoredBlob>>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn failing_on<I: IntoIterator<Item = &'static str>>(mut self, keys: I) -> Self {
        self.failing.extend(keys.into_iter().map(str::to_owned));
        self
    }

    pub fn stalling_on<I: IntoIterator<Item = &'static str>>(mut self, keys: I) -> Self {
        self.stalled.extend(keys.into_iter().map(str::to_owned));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn get(&self, container: &str, key: &str) -> Option<StoredBlob> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(container.to_owned(), key.to_owned()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .map(|(_, k)| k.clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn upload(&self, mut blob: PutBlob<'_>) -> Result<(), Error> {
        if self.stalled.contains(blob.key) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(blob.key) {
            return Err(Error::UploadFailed {
                key: blob.key.to_owned(),
                reason: "simulated failure".to_owned(),
            });
        }

        let mut content = Vec::with_capacity(blob.size as usize);
        blob.body
            .read_to_end(&mut content)
            .await
            .map_err(|err| Error::UploadFailed {
                key: blob.key.to_owned(),
                reason: err.to_string(),
            })?;

        let id = (blob.container.to_owned(), blob.key.to_owned());
        let mut blobs = self.blobs.lock().unwrap();
        if !blob.overwrite && blobs.contains_key(&id) {
            return Err(Error::AlreadyExists {
                key: blob.key.to_owned(),
            });
        }
        blobs.insert(
            id,
            StoredBlob {
                content,
                content_type: blob.content_type.map(str::to_owned),
            },
        );
        Ok(())
    }
}
