//! CRC32 checksums for partition headers and column chunks
//!
//! - Every header and every chunk carries a checksum
//! - Every read validates the checksum of what it read
//! - A mismatch is corruption of that partition, never a retry

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
