//! 64-bit FNV-1a hashing
//!
//! Used for plugin identity (the hash of a plugin's path) and as the fast-path
//! filter of the per-library symbol cache.

use std::path::Path;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash a byte slice with 64-bit FNV-1a.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Hash a string with 64-bit FNV-1a.
pub fn fnv1a64_str(value: &str) -> u64 {
    fnv1a64(value.as_bytes())
}

/// Identity hash of a plugin file path.
///
/// The path is hashed exactly as spelled, so callers must use a consistent
/// spelling for register/unregister/query of the same file.
pub fn path_hash(path: &Path) -> u64 {
    fnv1a64(path.as_os_str().as_encoded_bytes())
}
