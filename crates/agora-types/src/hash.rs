use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A 32-byte digest (commitments, salts, entropy, content hashes).
pub type Hash32 = [u8; 32];

pub const ZERO_HASH: Hash32 = [0u8; 32];

/// Incremental SHA-256 over length-unambiguous fields.
///
/// Every field has a fixed width except `bytes`, which is length-prefixed, so two different
/// field sequences never produce the same preimage.
#[derive(Clone)]
pub struct HashBuilder {
    inner: Sha256,
}

impl HashBuilder {
    pub fn new(domain: &str) -> Self {
        let mut inner = Sha256::new();
        inner.update((domain.len() as u64).to_be_bytes());
        inner.update(domain.as_bytes());
        Self { inner }
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.inner.update(value.to_be_bytes());
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.inner.update([value as u8]);
        self
    }

    pub fn hash(mut self, value: &Hash32) -> Self {
        self.inner.update(value);
        self
    }

    pub fn uuid(mut self, value: &Uuid) -> Self {
        self.inner.update(value.as_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.inner.update((value.len() as u64).to_be_bytes());
        self.inner.update(value);
        self
    }

    pub fn finish(self) -> Hash32 {
        self.inner.finalize().into()
    }
}

/// Content hash of an arbitrary document (job spec, result payload).
pub fn content_hash(data: &[u8]) -> Hash32 {
    Sha256::digest(data).into()
}

pub fn xor_into(acc: &mut Hash32, value: &Hash32) {
    for (a, b) in acc.iter_mut().zip(value.iter()) {
        *a ^= b;
    }
}

/// Interpret the first 16 bytes of a digest as a big-endian integer.
pub fn hash_to_u128(value: &Hash32) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&value[..16]);
    u128::from_be_bytes(buf)
}

pub fn to_hex(value: &Hash32) -> String {
    hex::encode(value)
}
