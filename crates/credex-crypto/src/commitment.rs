use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::hashing::{self, Digest};

/// A BLAKE3 commitment to an attribute value: H(value || nonce).
///
/// Commitments are fixed at credential issuance and signed by the issuer;
/// proofs later open them (revealed attributes) or prove facts about the
/// committed value (range predicates) without regenerating them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// The commitment digest.
    pub digest: Digest,
}

impl Commitment {
    /// Commit to a value with the given nonce.
    pub fn new(value: &[u8], nonce: &[u8; 32]) -> Self {
        Self {
            digest: hashing::commit(value, nonce),
        }
    }

    /// Check that a value and nonce open this commitment.
    pub fn opens_with(&self, value: &[u8], nonce: &[u8; 32]) -> bool {
        hashing::verify_commitment(value, nonce, &self.digest)
    }
}

/// A Fiat-Shamir transcript claiming the value behind an issuance-time
/// commitment lies within `[min, max]`, without revealing it.
///
/// Verification is a structural integrity check: the proof must be bound
/// to the commitment recorded at issuance and its challenge must be
/// consistent with the claimed bounds. The boundary arithmetic itself is
/// not re-proven, so a prover holding the public commitment can assemble
/// a transcript-consistent claim for any range. Deployments that need
/// soundness against a dishonest prover must layer a full zero-knowledge
/// range argument on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProof {
    /// The attribute commitment this proof opens against.
    pub commitment: Commitment,
    /// Inclusive lower bound (public).
    pub min: i64,
    /// Inclusive upper bound (public).
    pub max: i64,
    /// Commitments to the boundary differences: H(value - min) and H(max - value).
    pub boundary_commitments: [Digest; 2],
    /// Fiat-Shamir challenge over all public inputs.
    pub challenge: Digest,
    /// Response: H(value || nonce || challenge).
    pub response: Digest,
}

impl RangeProof {
    /// Prove that `value`, committed with `nonce` at issuance, lies in `[min, max]`.
    pub fn prove(value: i64, nonce: &[u8; 32], min: i64, max: i64) -> Result<Self, CryptoError> {
        if min > max {
            return Err(CryptoError::ProofError(format!(
                "invalid range: min {} > max {}",
                min, max
            )));
        }
        if value < min || value > max {
            return Err(CryptoError::ProofError(format!(
                "value is not in range [{}, {}]",
                min, max
            )));
        }

        let value_bytes = value.to_be_bytes();
        let commitment = Commitment::new(&value_bytes, nonce);

        // Boundary commitments reuse the attribute nonce so the proof stays
        // deterministic for a given credential and range.
        let lower = hashing::commit(&(value - min).to_be_bytes(), nonce);
        let upper = hashing::commit(&(max - value).to_be_bytes(), nonce);

        let challenge = hashing::challenge(&[
            &commitment.digest,
            &lower,
            &upper,
            &min.to_be_bytes(),
            &max.to_be_bytes(),
        ]);

        let mut response_input = Vec::with_capacity(8 + 32 + 32);
        response_input.extend_from_slice(&value_bytes);
        response_input.extend_from_slice(nonce);
        response_input.extend_from_slice(&challenge);
        let response = hashing::hash(&response_input);

        Ok(Self {
            commitment,
            min,
            max,
            boundary_commitments: [lower, upper],
            challenge,
            response,
        })
    }

    /// Check the proof's structural integrity against the issuance-time
    /// commitment: commitment binding plus challenge consistency with the
    /// claimed bounds. The boundary arithmetic is not re-derived.
    ///
    /// Returns `Ok(false)` on a well-formed but unbound or inconsistent
    /// transcript; errors only on structurally invalid input.
    pub fn verify(&self, expected_commitment: &Commitment) -> Result<bool, CryptoError> {
        if self.min > self.max {
            return Err(CryptoError::ProofError("invalid range: min > max".into()));
        }

        // The proof must open against the commitment recorded at issuance.
        if self.commitment != *expected_commitment {
            return Ok(false);
        }

        let expected_challenge = hashing::challenge(&[
            &self.commitment.digest,
            &self.boundary_commitments[0],
            &self.boundary_commitments[1],
            &self.min.to_be_bytes(),
            &self.max.to_be_bytes(),
        ]);

        Ok(self.challenge == expected_challenge)
    }
}
