//! File fingerprints with Blake3

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::SystemTime;

use crate::error::CacheResult;

/// Files below this size are hashed in full.
pub const FULL_HASH_LIMIT: u64 = 10 * 1024;

/// Bytes sampled from each end of a larger file.
const SAMPLE_BYTES: u64 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct FileFingerprint {
    /// Hex-encoded Blake3 digest
    pub hash: String,
    /// Modification time, seconds since the epoch
    pub mtime: f64,
    pub size: u64,
}

/// Seconds since the epoch of the file's last modification.
pub fn modified_secs(path: &Path) -> CacheResult<f64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(to_secs(modified))
}

fn to_secs(time: SystemTime) -> f64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}

/// Fingerprint a file. Small files hash their whole content; larger ones hash
/// the first and last kilobyte together with size, mtime and path.
pub fn fingerprint_file(path: &Path) -> CacheResult<FileFingerprint> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let mtime = to_secs(metadata.modified()?);
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();

    if size < FULL_HASH_LIMIT {
        let mut content = Vec::with_capacity(size as usize);
        file.read_to_end(&mut content)?;
        hasher.update(&content);
    } else {
        let mut head = vec![0u8; SAMPLE_BYTES as usize];
        file.read_exact(&mut head)?;
        let mut tail = vec![0u8; SAMPLE_BYTES as usize];
        file.seek(SeekFrom::End(-(SAMPLE_BYTES as i64)))?;
        file.read_exact(&mut tail)?;

        hasher.update(&head);
        hasher.update(&tail);
        hasher.update(&size.to_le_bytes());
        hasher.update(&mtime.to_bits().to_le_bytes());
        hasher.update(path.to_string_lossy().as_bytes());
    }

    Ok(FileFingerprint {
        hash: hasher.finalize().to_hex().to_string(),
        mtime,
        size,
    })
}
