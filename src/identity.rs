//! Content-addressed chunk identity
//!
//! A chunk id is a pure function of `(path, symbol, content)`. Re-ingesting an
//! unchanged file therefore produces the same id and every store write becomes an
//! idempotent upsert.

use sha2::{Digest, Sha256};

/// Length of the short hex ids used as chunk identifiers (64 bits)
pub const SHORT_ID_LEN: usize = 16;

/// Separator fed to the hasher after every part.
///
/// Without it `("ab", "c")` and `("a", "bc")` would produce the same digest.
const PART_DELIMITER: u8 = 0x1f;

/// SHA-256 hex digest over delimiter-terminated parts
///
/// When `short` is set the digest is truncated to [`SHORT_ID_LEN`] characters.
pub fn stable_hash_hex<P: AsRef<[u8]>>(parts: &[P], short: bool) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([PART_DELIMITER]);
    }
    let digest = format!("{:x}", hasher.finalize());
    if short {
        digest[..SHORT_ID_LEN].to_string()
    } else {
        digest
    }
}

/// Full-length hash of file content
pub fn stable_file_hash(content: impl AsRef<[u8]>) -> String {
    stable_hash_hex(&[content.as_ref()], false)
}

/// Hash of a logical symbol, optionally versioned by its content hash
///
/// Including the content hash makes the id change whenever the content changes;
/// leaving it out yields an id that only tracks the symbol's location.
pub fn stable_path_symbol_hash(
    path: &str,
    symbol: &str,
    content_hash: Option<&str>,
    short: bool,
) -> String {
    match content_hash {
        Some(hash) => stable_hash_hex(&[path, symbol, hash], short),
        None => stable_hash_hex(&[path, symbol], short),
    }
}

/// Derive the content-addressed id for a chunk
pub fn derive_chunk_id(path: &str, symbol: &str, content: &str) -> String {
    let content_hash = stable_file_hash(content);
    stable_path_symbol_hash(path, symbol, Some(&content_hash), true)
}

/// Check that a string has the shape of a chunk id
pub fn is_chunk_id(id: &str) -> bool {
    id.len() == SHORT_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}
