//! Deterministic hashing with versioned domain separation.
//!
//! Recipient IDs are content-addressed: the same `(address, metadata, type)`
//! tuple always maps to the same ID, which makes duplicate submission
//! detection idempotent across the registry and the curation layer.

use crate::registry::{RecipientMetadata, RecipientType};
use crate::{Address, Hash32, RecipientId};
use sha2::{Digest, Sha256};

/// Compute a deterministic SHA-256 hash of a byte slice.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

// =============================================================================
// Domain separation (v1)
// =============================================================================

/// Domain tag for recipient identity hashes (also the TCR item hash).
pub const RECIPIENT_ID_DOMAIN_V1: &[u8] = b"FLOWSPLIT_RECIPIENT_ID_V1";

/// Domain tag for commit-reveal vote commitments.
pub const VOTE_COMMIT_DOMAIN_V1: &[u8] = b"FLOWSPLIT_VOTE_COMMIT_V1";

/// Domain tag for deriving deterministic child-flow addresses.
pub const CHILD_ADDRESS_DOMAIN_V1: &[u8] = b"FLOWSPLIT_CHILD_ADDRESS_V1";

/// Append a length-prefixed (u32 LE) byte string to a preimage buffer.
fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Build the canonical preimage for a recipient identity.
///
/// Layout (little-endian): `address(20) || title || description || image ||
/// type(1)` with each string length-prefixed.
pub fn recipient_id_preimage(
    address: Address,
    metadata: &RecipientMetadata,
    recipient_type: RecipientType,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&address.0);
    push_bytes(&mut buf, metadata.title.as_bytes());
    push_bytes(&mut buf, metadata.description.as_bytes());
    push_bytes(&mut buf, metadata.image.as_bytes());
    buf.push(recipient_type as u8);
    buf
}

/// Compute the content-addressed recipient ID.
pub fn recipient_id(
    address: Address,
    metadata: &RecipientMetadata,
    recipient_type: RecipientType,
) -> RecipientId {
    sha256_domain(
        RECIPIENT_ID_DOMAIN_V1,
        &recipient_id_preimage(address, metadata, recipient_type),
    )
}

/// Compute a commit-reveal vote commitment: `H(choice || reason || salt)`.
///
/// The reveal phase recomputes this from the claimed `(choice, reason, salt)`
/// and rejects on mismatch, so the stored commitment never discloses the
/// choice during the voting window.
pub fn vote_commitment(choice: u64, reason: &str, salt: &[u8; 32]) -> Hash32 {
    let mut buf = Vec::with_capacity(8 + 4 + reason.len() + 32);
    buf.extend_from_slice(&choice.to_le_bytes());
    push_bytes(&mut buf, reason.as_bytes());
    buf.extend_from_slice(salt);
    sha256_domain(VOTE_COMMIT_DOMAIN_V1, &buf)
}

/// Derive a deterministic address for a newly instantiated child flow.
///
/// Bound to the parent address and a parent-local sequence number, so a parent
/// can never mint two children at the same address.
pub fn child_flow_address(parent: Address, sequence: u64) -> Address {
    let mut buf = Vec::with_capacity(20 + 8);
    buf.extend_from_slice(&parent.0);
    buf.extend_from_slice(&sequence.to_le_bytes());
    let h = sha256_domain(CHILD_ADDRESS_DOMAIN_V1, &buf);
    let mut out = [0u8; 20];
    out.copy_from_slice(&h.0[..20]);
    Address(out)
}
