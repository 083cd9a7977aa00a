use sha2::{Digest, Sha256};

/// Length in bytes of the SHA-256 digests signed by peers.
pub const DIGEST_LEN: usize = 32;

/// Plain SHA-256 over `data`.
#[must_use]
pub fn h(data: &[u8]) -> [u8; DIGEST_LEN] {
    h_parts([data])
}

/// SHA-256 over the concatenation of `parts`, without materialising the
/// joined buffer.
#[must_use]
pub fn h_parts<'a, I>(parts: I) -> [u8; DIGEST_LEN]
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(hasher.finalize().as_slice());
    out
}

/// Domain separated hash: SHA-256 over the ASCII tag, a zero byte, then the
/// payload.
#[must_use]
pub fn ht(tag: &str, data: &[u8]) -> [u8; DIGEST_LEN] {
    h_parts([tag.as_bytes(), &[0u8][..], data])
}
