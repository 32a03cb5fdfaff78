/// BLAKE3 digest (32 bytes).
pub type Digest = [u8; 32];

/// Hash arbitrary data with BLAKE3.
pub fn hash(data: &[u8]) -> Digest {
    *blake3::hash(data).as_bytes()
}

/// Compute a commitment to a value: H(value || nonce).
///
/// The nonce is generated once at credential issuance and opened only when
/// the holder chooses to reveal the attribute.
pub fn commit(value: &[u8], nonce: &[u8; 32]) -> Digest {
    let mut input = Vec::with_capacity(value.len() + 32);
    input.extend_from_slice(value);
    input.extend_from_slice(nonce);
    hash(&input)
}

/// Verify a commitment by recomputing H(value || nonce).
pub fn verify_commitment(value: &[u8], nonce: &[u8; 32], commitment: &Digest) -> bool {
    commit(value, nonce) == *commitment
}

/// Derive a Fiat-Shamir challenge from an ordered list of public inputs.
///
/// Each part is length-prefixed so that concatenation ambiguity cannot
/// produce colliding transcripts.
pub fn challenge(parts: &[&[u8]]) -> Digest {
    let mut transcript = Vec::new();
    for part in parts {
        transcript.extend_from_slice(&(part.len() as u64).to_be_bytes());
        transcript.extend_from_slice(part);
    }
    hash(&transcript)
}
