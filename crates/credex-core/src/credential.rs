use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use credex_crypto::Commitment;

use crate::types::{Attributes, CredentialDefinitionId, Did, RevocationRegistryId, SchemaId};

/// Identifying metadata of a credential, shared between the credential
/// itself and proofs derived from it. The issuer signature binds this header
/// together with the attribute commitments, so a verifier can check it
/// without ever seeing the attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHeader {
    /// Unique credential id.
    pub id: uuid::Uuid,
    /// Schema the attributes conform to.
    pub schema_id: SchemaId,
    /// Ledger-resident credential definition this credential is bound to.
    pub credential_definition_id: CredentialDefinitionId,
    /// DID of the issuer.
    pub issuer: Did,
    /// DID of the subject (holder).
    pub subject: Did,
    /// Issuance timestamp.
    pub issued_at: DateTime<Utc>,
}

impl CredentialHeader {
    /// Canonical byte payload the issuer signs: the header fields plus the
    /// sorted attribute commitments, every part length-prefixed.
    pub fn signing_payload(&self, commitments: &BTreeMap<String, Commitment>) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut push = |bytes: &[u8]| {
            payload.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            payload.extend_from_slice(bytes);
        };
        push(self.id.as_bytes());
        push(self.schema_id.as_str().as_bytes());
        push(self.credential_definition_id.as_str().as_bytes());
        push(self.issuer.uri().as_bytes());
        push(self.subject.uri().as_bytes());
        push(&self.issued_at.timestamp_millis().to_be_bytes());
        for (name, commitment) in commitments {
            push(name.as_bytes());
            push(&commitment.digest);
        }
        payload
    }
}

/// An issued credential: attribute values, their issuance-time commitments,
/// and the issuer's signature over header + commitments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Header metadata (id, schema, definition, parties, timestamp).
    #[serde(flatten)]
    pub header: CredentialHeader,
    /// Attribute values.
    pub attributes: Attributes,
    /// Per-attribute commitments: H(value || nonce).
    pub commitments: BTreeMap<String, Commitment>,
    /// Issuer Ed25519 signature over `header.signing_payload(commitments)`.
    pub signature: Vec<u8>,
}

impl Credential {
    /// Check that every attribute's commitment opens with the blinding
    /// nonces, and that no attribute lacks a commitment.
    pub fn verify_commitments(&self, blinding: &CredentialBlinding) -> bool {
        self.attributes.len() == self.commitments.len()
            && self.attributes.iter().all(|(name, value)| {
                match (self.commitments.get(name), blinding.nonces.get(name)) {
                    (Some(commitment), Some(nonce)) => {
                        commitment.opens_with(&value.canonical_bytes(), nonce)
                    }
                    _ => false,
                }
            })
    }
}

/// The holder-secret commitment nonces for a credential. Required to open
/// commitments (revealed attributes) or run range proofs; never shared with
/// a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBlinding {
    /// Attribute name → commitment nonce.
    pub nonces: BTreeMap<String, [u8; 32]>,
}

/// A ledger-resident credential definition. Read-only to the engine:
/// fetched through the ledger adapter, never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDefinition {
    /// Definition id.
    pub id: CredentialDefinitionId,
    /// Schema this definition publishes.
    pub schema_id: SchemaId,
    /// DID of the issuer that registered the definition.
    pub issuer: Did,
    /// Issuer Ed25519 public key bytes (32 bytes).
    pub public_key: Vec<u8>,
    /// Revocation registry, if the definition supports revocation.
    pub revocation_registry: Option<RevocationRegistryId>,
}
