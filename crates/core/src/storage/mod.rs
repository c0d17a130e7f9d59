//! Object storage adapters.
//!
//! The service only ever talks to a [`StorageAdapter`] and branches on its
//! [`StorageDescriptor`]. Three adapters ship with the crate:
//!
//! - [`LocalStorage`]: `data_root/bucket/object_key` on the local filesystem
//! - [`ObjectStoreStorage`]: S3-compatible buckets through Apache OpenDAL
//!   (AWS S3, Cloudflare R2, MinIO)
//! - [`MemoryStorage`]: in-process map with a call journal, for tests

mod adapter;
mod error;
mod local;
mod memory;
mod object_store;

use std::sync::Arc;

use fm_shared::StorageProvider;

pub use adapter::{
    ObjectHead, PresignedUrl, StorageAdapter, StorageCapabilities, StorageDescriptor,
    StorageHandle,
};
pub use error::StorageError;
pub use local::{LOCAL_PROVIDER, LocalStorage};
pub use memory::{MEMORY_PROVIDER, MemoryStorage, StorageCall};
pub use object_store::{ObjectStoreStorage, S3_PROVIDER, S3Settings};

/// Builds the adapter described by configuration.
///
/// # Errors
///
/// Returns [`StorageError::Configuration`] if the provider cannot be
/// initialized.
pub fn from_provider(provider: &StorageProvider) -> Result<StorageHandle, StorageError> {
    match provider {
        StorageProvider::LocalFs {
            root,
            public_base_url,
        } => {
            let mut storage = LocalStorage::new(root.clone());
            if let Some(url) = public_base_url {
                storage = storage.with_public_base_url(url.clone());
            }
            Ok(Arc::new(storage))
        }
        StorageProvider::S3 {
            endpoint,
            region,
            access_key_id,
            secret_access_key,
            buckets,
            public_base_url,
        } => {
            let settings = S3Settings {
                endpoint: endpoint.clone(),
                region: region.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            };
            let mut storage = ObjectStoreStorage::s3(&settings, buckets)?;
            if let Some(url) = public_base_url {
                storage = storage.with_public_base_url(url.clone());
            }
            Ok(Arc::new(storage))
        }
    }
}
