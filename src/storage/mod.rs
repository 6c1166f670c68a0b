pub mod azure;
#[cfg(test)]
pub mod memory;
mod signature;

use async_trait::async_trait;
use tokio::fs::File;

use crate::error::Error;

pub use azure::AzureStore;

pub struct PutBlob<'a> {
    pub container: &'a str,
    pub key: &'a str,
    pub content_type: Option<&'a str>,
    pub overwrite: bool,
    pub size: u64,
    pub body: File,
}

#[async_trait]
pub trait BlobStore {
    /// Create or replace one blob. With `overwrite` unset, an existing blob at the
    /// same key fails with `Error::AlreadyExists`.
    async fn upload(&self, blob: PutBlob<'_>) -> Result<(), Error>;
}
