use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use credex_crypto::{Commitment, RangeProof};

use crate::credential::CredentialHeader;
use crate::types::{AttributeValue, CredentialDefinitionId};

/// A verifier's request: predicates over credential attributes, bound to a
/// nonce so a presentation cannot be replayed across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    /// Anti-replay nonce, echoed back in the proof.
    pub nonce: [u8; 32],
    /// Credential definition the proof must be built from.
    pub credential_definition_id: CredentialDefinitionId,
    /// Timestamp at which revocation status is evaluated.
    pub requested_at: DateTime<Utc>,
    /// Predicates the credential must satisfy.
    pub predicates: Vec<Predicate>,
}

/// A single predicate over one credential attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Attribute name the predicate applies to.
    pub attribute: String,
    /// The requirement the attribute value must meet.
    pub requirement: Requirement,
}

/// Requirement forms a verifier can ask for.
///
/// `Equals` and `OneOf` are satisfied by revealing the attribute;
/// `AtLeast` and `InRange` are satisfied by a range proof that keeps the
/// value hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// The attribute equals the given value (revealed).
    Equals(AttributeValue),
    /// The attribute is an integer >= the threshold (hidden).
    AtLeast(i64),
    /// The attribute is an integer within [min, max] (hidden).
    InRange { min: i64, max: i64 },
    /// The attribute is one of the listed strings (revealed).
    OneOf(Vec<String>),
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "= {}", v),
            Self::AtLeast(n) => write!(f, ">= {}", n),
            Self::InRange { min, max } => write!(f, "in [{}, {}]", min, max),
            Self::OneOf(set) => write!(f, "one of {:?}", set),
        }
    }
}

impl Requirement {
    /// Whether a concrete attribute value satisfies this requirement.
    pub fn satisfied_by(&self, value: &AttributeValue) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::AtLeast(min) => value.as_integer().is_some_and(|v| v >= *min),
            Self::InRange { min, max } => {
                value.as_integer().is_some_and(|v| v >= *min && v <= *max)
            }
            Self::OneOf(set) => match value {
                AttributeValue::String(s) => set.iter().any(|allowed| allowed == s),
                _ => false,
            },
        }
    }
}

/// How a proof answers one predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disclosure {
    /// The value and its commitment nonce are revealed.
    Revealed {
        value: AttributeValue,
        nonce: [u8; 32],
    },
    /// The value stays hidden behind a range proof.
    Range(RangeProof),
}

/// One proven predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofItem {
    /// Attribute the predicate named.
    pub attribute: String,
    /// The disclosure answering it.
    pub disclosure: Disclosure,
}

/// A holder's presentation: the credential header and commitments (enough to
/// recheck the issuer signature), plus one disclosure per requested
/// predicate. Attribute values not named by the request are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Header of the credential the proof was built from.
    pub credential: CredentialHeader,
    /// All attribute commitments of that credential (the signature binds
    /// the full set, so none can be omitted).
    pub commitments: BTreeMap<String, Commitment>,
    /// Issuer signature copied from the credential.
    pub issuer_signature: Vec<u8>,
    /// One item per requested predicate.
    pub items: Vec<ProofItem>,
    /// Request nonce this proof answers.
    pub nonce: [u8; 32],
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
}

impl Proof {
    /// Find the item answering the given attribute, if present.
    pub fn item(&self, attribute: &str) -> Option<&ProofItem> {
        self.items.iter().find(|item| item.attribute == attribute)
    }
}
