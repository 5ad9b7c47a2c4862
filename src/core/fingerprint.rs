//! Failure fingerprints.
//!
//! A fingerprint identifies the exact set of blockers that failed on a turn,
//! independent of the order the checkers finished in.

use sha2::{Digest, Sha256};

/// Separator placed between IDs before hashing.
///
/// The ASCII unit separator is rejected inside consideration IDs at load
/// time, so no two distinct ID sets can produce the same joined string.
pub const ID_SEPARATOR: char = '\u{1f}';

/// Number of hex characters kept from the digest (64 bits).
pub const FINGERPRINT_LEN: usize = 16;

/// Generate the fingerprint for a set of failing consideration IDs.
///
/// IDs are sorted and deduplicated, joined with [`ID_SEPARATOR`], hashed
/// with SHA-256 and truncated to [`FINGERPRINT_LEN`] hex characters.
pub fn generate<S: AsRef<str>>(failed_ids: &[S]) -> String {
    let mut ids: Vec<&str> = failed_ids.iter().map(AsRef::as_ref).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            let mut buf = [0u8; 4];
            hasher.update(ID_SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(id.as_bytes());
    }

    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}
