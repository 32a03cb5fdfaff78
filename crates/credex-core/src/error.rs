use crate::exchange_state::ExchangeState;
use crate::message::PayloadKind;
use crate::types::Role;

/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("message {kind} is not legal for a {role} exchange in state {state}")]
    InvalidTransition {
        role: Role,
        state: ExchangeState,
        kind: PayloadKind,
    },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid DID format: {0}")]
    InvalidDid(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
