//! Credex Core — Fundamental types, the exchange state machine, the wire
//! message codec, and configuration for the Credex credential exchange
//! protocol.

pub mod config;
pub mod credential;
pub mod error;
pub mod exchange_state;
pub mod message;
pub mod presentation;
pub mod types;

pub use config::{BusyPolicy, EngineConfig};
pub use credential::{Credential, CredentialBlinding, CredentialDefinition, CredentialHeader};
pub use error::CoreError;
pub use exchange_state::{transition, ExchangeState, Transition};
pub use message::{
    Ack, ConnectionRequest, ConnectionResponse, CredentialOffer, CredentialPayload,
    CredentialRequest, Message, Payload, PayloadKind, ProblemReport,
};
pub use presentation::{Disclosure, Predicate, Proof, ProofItem, ProofRequest, Requirement};
pub use types::{
    AttributeValue, Attributes, CredentialDefinitionId, Did, ExchangeId, RevocationRegistryId,
    Role, SchemaId,
};
