use tracing::{debug, warn};

use credex_core::{CredentialDefinition, Disclosure, Proof, ProofRequest, Requirement};
use credex_crypto::{verify, PublicKey, Signature};

use crate::error::ProofError;

/// Verify a presentation against the request it answers and the ledger's
/// credential definition.
///
/// Returns `Ok(false)` when the proof is well-formed but does not hold
/// (stale nonce, bad issuer signature, unopened commitment, unsatisfied
/// predicate); errors only when the proof is structurally unusable.
///
/// Range disclosures are checked for commitment binding and transcript
/// consistency only; see `RangeProof::verify` for the limits of that check.
pub fn verify_proof(
    proof: &Proof,
    request: &ProofRequest,
    definition: &CredentialDefinition,
) -> Result<bool, ProofError> {
    // Replay protection: the proof must answer this request's nonce.
    if proof.nonce != request.nonce {
        warn!(credential_id = %proof.credential.id, "proof nonce does not match request");
        return Ok(false);
    }

    // The credential must be bound to the definition the verifier resolved.
    if proof.credential.credential_definition_id != request.credential_definition_id
        || proof.credential.credential_definition_id != definition.id
    {
        return Ok(false);
    }
    if proof.credential.issuer != definition.issuer {
        return Ok(false);
    }

    // Issuer signature over header + full commitment set.
    let issuer_key = PublicKey::from_bytes(&definition.public_key)?;
    let signature = Signature::from_bytes(&proof.issuer_signature)
        .map_err(|e| ProofError::MalformedProof(e.to_string()))?;
    let payload = proof.credential.signing_payload(&proof.commitments);
    if verify(&payload, &signature, &issuer_key).is_err() {
        warn!(credential_id = %proof.credential.id, "issuer signature check failed");
        return Ok(false);
    }

    // One disclosure per requested predicate, each checked against the
    // issuance-time commitment.
    for predicate in &request.predicates {
        let item = proof.item(&predicate.attribute).ok_or_else(|| {
            ProofError::MalformedProof(format!(
                "no disclosure for requested attribute '{}'",
                predicate.attribute
            ))
        })?;
        let commitment = proof.commitments.get(&predicate.attribute).ok_or_else(|| {
            ProofError::MalformedProof(format!(
                "no commitment for attribute '{}'",
                predicate.attribute
            ))
        })?;

        let holds = match (&predicate.requirement, &item.disclosure) {
            (
                Requirement::Equals(_) | Requirement::OneOf(_),
                Disclosure::Revealed { value, nonce },
            ) => {
                commitment.opens_with(&value.canonical_bytes(), nonce)
                    && predicate.requirement.satisfied_by(value)
            }
            (Requirement::AtLeast(min), Disclosure::Range(range)) => {
                range.min == *min && range.max == i64::MAX && range.verify(commitment)?
            }
            (Requirement::InRange { min, max }, Disclosure::Range(range)) => {
                range.min == *min && range.max == *max && range.verify(commitment)?
            }
            // A disclosure of the wrong shape for the predicate.
            _ => {
                return Err(ProofError::MalformedProof(format!(
                    "disclosure for '{}' does not match requirement {}",
                    predicate.attribute, predicate.requirement
                )))
            }
        };

        if !holds {
            debug!(
                credential_id = %proof.credential.id,
                attribute = %predicate.attribute,
                "predicate check failed"
            );
            return Ok(false);
        }
    }

    debug!(
        credential_id = %proof.credential.id,
        predicates = request.predicates.len(),
        "proof verified"
    );
    Ok(true)
}
