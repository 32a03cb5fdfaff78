use chrono::Utc;
use tracing::debug;

use credex_core::{
    Credential, CredentialBlinding, Disclosure, Proof, ProofItem, ProofRequest, Requirement,
};
use credex_crypto::RangeProof;

use crate::error::ProofError;

/// Build a presentation answering `request` from a stored credential.
///
/// Equality and set-membership predicates are answered by revealing the
/// attribute value and its commitment nonce; numeric predicates are answered
/// by a range proof that keeps the value hidden. Attributes the request does
/// not name are never included.
///
/// The caller resolves revocation status against the ledger beforehand and
/// passes it in; a revoked credential never yields a proof.
pub fn build_proof(
    credential: &Credential,
    blinding: &CredentialBlinding,
    request: &ProofRequest,
    revoked: bool,
) -> Result<Proof, ProofError> {
    if revoked {
        return Err(ProofError::RevokedCredential);
    }
    if credential.header.credential_definition_id != request.credential_definition_id {
        return Err(ProofError::GenerationFailed(format!(
            "credential is bound to {}, request asks for {}",
            credential.header.credential_definition_id, request.credential_definition_id
        )));
    }

    let mut items = Vec::with_capacity(request.predicates.len());
    for predicate in &request.predicates {
        let value = credential
            .attributes
            .get(&predicate.attribute)
            .ok_or_else(|| ProofError::AttributeMissing(predicate.attribute.clone()))?;
        let nonce = blinding
            .nonces
            .get(&predicate.attribute)
            .ok_or_else(|| ProofError::AttributeMissing(predicate.attribute.clone()))?;

        if !predicate.requirement.satisfied_by(value) {
            return Err(ProofError::GenerationFailed(format!(
                "attribute '{}' does not satisfy {}",
                predicate.attribute, predicate.requirement
            )));
        }

        let disclosure = match &predicate.requirement {
            Requirement::Equals(_) | Requirement::OneOf(_) => Disclosure::Revealed {
                value: value.clone(),
                nonce: *nonce,
            },
            Requirement::AtLeast(min) => {
                let v = value.as_integer().ok_or_else(|| {
                    ProofError::GenerationFailed(format!(
                        "attribute '{}' is not an integer",
                        predicate.attribute
                    ))
                })?;
                Disclosure::Range(RangeProof::prove(v, nonce, *min, i64::MAX)?)
            }
            Requirement::InRange { min, max } => {
                let v = value.as_integer().ok_or_else(|| {
                    ProofError::GenerationFailed(format!(
                        "attribute '{}' is not an integer",
                        predicate.attribute
                    ))
                })?;
                Disclosure::Range(RangeProof::prove(v, nonce, *min, *max)?)
            }
        };

        items.push(ProofItem {
            attribute: predicate.attribute.clone(),
            disclosure,
        });
    }

    debug!(
        credential_id = %credential.header.id,
        predicates = items.len(),
        "proof generated"
    );

    Ok(Proof {
        credential: credential.header.clone(),
        commitments: credential.commitments.clone(),
        issuer_signature: credential.signature.clone(),
        items,
        nonce: request.nonce,
        generated_at: Utc::now(),
    })
}
