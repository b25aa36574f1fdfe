//! SHA-256 helpers.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the concatenation of `parts`.
pub fn sha256_hex<I, B>(parts: I) -> String
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hex::encode(hasher.finalize())
}
