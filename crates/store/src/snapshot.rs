//! Serializing the document store to disk and back.
//!
//! The snapshot is the full `StoreDump` as JSON, lz4-compressed, wrapped
//! with the checksummed header, and written atomically. A missing file is a
//! fresh store; a corrupt file is reported so the caller can decide to start
//! fresh rather than crash the session.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use engine::store::{MemoryStore, StoreDump};

use crate::atomic_write::atomic_write;
use crate::file_header::{parse_and_verify, wrap_with_header};
use crate::SnapshotError;

/// Serialize the store's documents and write them to `path`.
pub fn save_snapshot(store: &MemoryStore, path: &Path) -> Result<(), SnapshotError> {
    let dump = store.export();
    let json = serde_json::to_vec(&dump).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(&json);
    let bytes = wrap_with_header(&compressed);
    atomic_write(path, &bytes)?;
    Ok(())
}

/// Read a snapshot from `path`. `Ok(None)` means no snapshot exists yet.
pub fn load_snapshot(path: &Path) -> Result<Option<StoreDump>, SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let (_header, payload) = parse_and_verify(&bytes)?;
    let json = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| SnapshotError::Corrupt(format!("decompression failed: {e}")))?;
    let dump = serde_json::from_slice(&json)
        .map_err(|e| SnapshotError::Corrupt(format!("document decode failed: {e}")))?;
    Ok(Some(dump))
}
