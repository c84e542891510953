//! Snapshot file header with magic bytes, version, and checksum.
//!
//! Header format (24 bytes, fixed-size, little-endian):
//!   [0..4]   Magic bytes: "LGRB"
//!   [4..8]   Format version (u32)
//!   [8..12]  Flags (u32: bit 0 = lz4-compressed payload)
//!   [12..20] Timestamp (Unix epoch seconds, u64)
//!   [20..24] xxHash32 checksum of the payload (everything after the header)
//!
//! On save: encode and compress the dump, then prepend a header whose
//! checksum covers the compressed payload. On load: check magic, validate
//! the checksum, strip the header, decompress, decode.

use xxhash_rust::xxh32::xxh32;

use crate::SnapshotError;

/// Magic bytes identifying a Landgrab store snapshot.
pub const MAGIC: [u8; 4] = [0x4C, 0x47, 0x52, 0x42]; // "LGRB"

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Current header format version.
pub const HEADER_FORMAT_VERSION: u32 = 1;

/// Flag bit: payload is lz4-compressed.
pub const FLAG_COMPRESSED: u32 = 1;

/// Seed for the xxHash32 checksum.
const XXHASH_SEED: u32 = 0;

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub flags: u32,
    pub timestamp: u64,
    pub checksum: u32,
}

/// Wrap a payload with a snapshot header.
pub fn wrap_with_header(payload: &[u8]) -> Vec<u8> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&HEADER_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&FLAG_COMPRESSED.to_le_bytes());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&xxh32(payload, XXHASH_SEED).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate a snapshot file's header and return it with the payload.
pub fn parse_and_verify(bytes: &[u8]) -> Result<(FileHeader, &[u8]), SnapshotError> {
    if bytes.len() < HEADER_SIZE {
        return Err(SnapshotError::Corrupt("file shorter than header".into()));
    }
    if bytes[0..4] != MAGIC {
        return Err(SnapshotError::Corrupt("bad magic bytes".into()));
    }

    let format_version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    if format_version > HEADER_FORMAT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            expected_max: HEADER_FORMAT_VERSION,
            found: format_version,
        });
    }

    let header = FileHeader {
        format_version,
        flags: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        timestamp: u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
        checksum: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
    };

    let payload = &bytes[HEADER_SIZE..];
    let actual = xxh32(payload, XXHASH_SEED);
    if actual != header.checksum {
        return Err(SnapshotError::Corrupt(format!(
            "checksum mismatch: header {:08x}, payload {:08x}",
            header.checksum, actual
        )));
    }

    Ok((header, payload))
}
