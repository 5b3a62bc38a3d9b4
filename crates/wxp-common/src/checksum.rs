//! Content digests for naming write-once objects

use crate::error::Result;
use crate::types::StructuredRecord;
use sha2::{Digest, Sha256};

/// Length of the digest fragment embedded in partition file names
pub const SHORT_DIGEST_LEN: usize = 12;

/// Digest over the canonical JSON form of a record batch.
///
/// The digest depends on the records and their order only, never on the
/// columnar encoding, so identical batches always produce identical names.
pub fn batch_digest(records: &[StructuredRecord]) -> Result<String> {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(serde_json::to_vec(record)?);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// First [`SHORT_DIGEST_LEN`] characters of [`batch_digest`]
pub fn short_batch_digest(records: &[StructuredRecord]) -> Result<String> {
    let mut digest = batch_digest(records)?;
    digest.truncate(SHORT_DIGEST_LEN);
    Ok(digest)
}
