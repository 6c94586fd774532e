use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_types::{Hash32, HashBuilder, JobId};

/// How vote commitments are digested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitScheme {
    /// Hash of the round and ballot fields only.
    #[default]
    Plain,
    /// Additionally binds the committer, a chain id and a domain name, so a commitment
    /// cannot be replayed by another validator or on another deployment.
    Typed { chain_id: u64, domain: String },
}

/// What a validator discloses at reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub approve: bool,
    pub burn_tx: Hash32,
    pub salt: Hash32,
}

pub fn vote_commitment(
    scheme: &CommitScheme,
    job_id: JobId,
    nonce: u64,
    validator: &Uuid,
    ballot: &Ballot,
    spec_hash: &Hash32,
) -> Hash32 {
    let builder = match scheme {
        CommitScheme::Plain => HashBuilder::new("agora.validation.commit"),
        CommitScheme::Typed { chain_id, domain } => HashBuilder::new("agora.validation.typed")
            .bytes(domain.as_bytes())
            .u64(*chain_id)
            .uuid(validator),
    };
    builder
        .u64(job_id)
        .u64(nonce)
        .bool(ballot.approve)
        .hash(&ballot.burn_tx)
        .hash(&ballot.salt)
        .hash(spec_hash)
        .finish()
}
