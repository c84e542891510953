//! Content-addressed photo objects on local disk, behind the engine's
//! `PhotoStore` interface. The returned reference is what gets recorded on
//! the check-in document; identical bytes always yield the same reference.

use std::fs;
use std::path::PathBuf;

use engine::store::{PhotoStore, StoreError};
use xxhash_rust::xxh32::xxh32;

pub struct FilePhotoStore {
    dir: PathBuf,
}

impl FilePhotoStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl PhotoStore for FilePhotoStore {
    fn put(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let key = format!("{:08x}.jpg", xxh32(bytes, 0));
        let path = self.dir.join(&key);
        if !path.exists() {
            fs::create_dir_all(&self.dir)
                .and_then(|_| fs::write(&path, bytes))
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        Ok(format!("photos/{key}"))
    }
}
