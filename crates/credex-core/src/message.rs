use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::credential::{Credential, CredentialBlinding};
use crate::error::CoreError;
use crate::presentation::{Proof, ProofRequest};
use crate::types::{Attributes, CredentialDefinitionId, Did, ExchangeId};

/// Opens an exchange: the initiator's DID and envelope verification key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// DID of the initiator.
    pub did: Did,
    /// Ed25519 public key the initiator signs envelopes with (32 bytes).
    pub verkey: Vec<u8>,
    /// Human-readable label.
    pub label: String,
}

/// Answers a connection request with the responder's DID and key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    /// DID of the responder.
    pub did: Did,
    /// Ed25519 public key the responder signs envelopes with (32 bytes).
    pub verkey: Vec<u8>,
}

/// Issuer's offer: the definition it will issue under and the attribute
/// values it proposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    /// Credential definition the offer is bound to.
    pub credential_definition_id: CredentialDefinitionId,
    /// Offered attribute values.
    pub attributes: Attributes,
}

/// Holder's request for the offered credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    /// Must match the preceding offer.
    pub credential_definition_id: CredentialDefinitionId,
    /// DID the credential is issued to.
    pub subject_did: Did,
}

/// The issued credential plus its blinding nonces. The blinding travels only
/// on this hop and becomes holder-secret once stored in the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub credential: Credential,
    pub blinding: CredentialBlinding,
}

/// Acknowledgement of a received credential or verified proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Status string, "OK" on success.
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: "OK".into() }
    }
}

/// Rejection of the exchange with a machine-readable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemReport {
    /// Machine-readable problem code.
    pub code: String,
    /// Human-readable comment.
    pub comment: String,
}

/// Typed payload of a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    ConnectionRequest(ConnectionRequest),
    ConnectionResponse(ConnectionResponse),
    CredentialOffer(CredentialOffer),
    CredentialRequest(CredentialRequest),
    Credential(CredentialPayload),
    ProofRequest(ProofRequest),
    ProofPresentation(Proof),
    Ack(Ack),
    ProblemReport(ProblemReport),
}

impl Payload {
    /// The kind tag of this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::ConnectionRequest(_) => PayloadKind::ConnectionRequest,
            Self::ConnectionResponse(_) => PayloadKind::ConnectionResponse,
            Self::CredentialOffer(_) => PayloadKind::CredentialOffer,
            Self::CredentialRequest(_) => PayloadKind::CredentialRequest,
            Self::Credential(_) => PayloadKind::Credential,
            Self::ProofRequest(_) => PayloadKind::ProofRequest,
            Self::ProofPresentation(_) => PayloadKind::ProofPresentation,
            Self::Ack(_) => PayloadKind::Ack,
            Self::ProblemReport(_) => PayloadKind::ProblemReport,
        }
    }
}

/// Payload kind tags, used by the state machine's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    ConnectionRequest,
    ConnectionResponse,
    CredentialOffer,
    CredentialRequest,
    Credential,
    ProofRequest,
    ProofPresentation,
    Ack,
    ProblemReport,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionRequest => "ConnectionRequest",
            Self::ConnectionResponse => "ConnectionResponse",
            Self::CredentialOffer => "CredentialOffer",
            Self::CredentialRequest => "CredentialRequest",
            Self::Credential => "Credential",
            Self::ProofRequest => "ProofRequest",
            Self::ProofPresentation => "ProofPresentation",
            Self::Ack => "Ack",
            Self::ProblemReport => "ProblemReport",
        };
        write!(f, "{}", name)
    }
}

/// A protocol message envelope: typed payload bound to one exchange, with a
/// per-exchange sequence number and an optional Ed25519 envelope signature.
///
/// Unknown top-level fields survive decode → encode untouched (`extra`),
/// so peers running newer protocol revisions stay interoperable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id (UUID v7).
    pub id: uuid::Uuid,
    /// The exchange this message belongs to.
    pub exchange_id: ExchangeId,
    /// Per-exchange sequence number, starting at 1.
    pub seq: u64,
    /// Typed payload.
    pub payload: Payload,
    /// Ed25519 signature over `signing_payload()` (64 bytes), if signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
    /// Unknown optional fields, preserved opaquely for forward compatibility.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Message {
    /// Construct an unsigned message.
    pub fn new(exchange_id: ExchangeId, seq: u64, payload: Payload) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            exchange_id,
            seq,
            payload,
            signature: None,
            extra: BTreeMap::new(),
        }
    }

    /// Attach an envelope signature.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Validate envelope-level required fields.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.is_nil() {
            return Err(CoreError::MissingField("id".into()));
        }
        if self.exchange_id.0.is_nil() {
            return Err(CoreError::MissingField("exchange_id".into()));
        }
        if self.seq == 0 {
            return Err(CoreError::ValidationError(
                "sequence numbers start at 1".into(),
            ));
        }
        Ok(())
    }

    /// Canonical bytes the envelope signature covers: id, exchange id,
    /// sequence number, and a hash of the serialized payload. The signature
    /// itself and the opaque `extra` fields are excluded.
    pub fn signing_payload(&self) -> Result<Vec<u8>, CoreError> {
        let payload_bytes = serde_json::to_vec(&self.payload)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        let mut out = Vec::with_capacity(16 + 16 + 8 + 32);
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(self.exchange_id.0.as_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&credex_crypto::hash(&payload_bytes));
        Ok(out)
    }

    /// Encode to wire bytes (canonical JSON).
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Decode from wire bytes. Unrecognized payload type tags and missing
    /// required fields surface as `MalformedMessage`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let message: Message = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::MalformedMessage(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }
}
