use credex_core::{CoreError, ExchangeId, ExchangeState, PayloadKind};
use credex_proof::ProofError;

/// Protocol engine errors.
///
/// `is_retryable` marks transient failures; the engine never retries
/// internally, the caller decides.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("message {kind} is not legal in state {state}")]
    InvalidTransition {
        state: ExchangeState,
        kind: PayloadKind,
    },

    #[error("unknown exchange {0}")]
    UnknownExchange(ExchangeId),

    #[error("exchange {0} is processing another message")]
    ExchangeBusy(ExchangeId),

    #[error("live exchange limit reached ({limit})")]
    ResourceExhausted { limit: usize },

    #[error("crypto verification failed: {reason}")]
    CryptoVerificationFailed { reason: String },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("credential has no attribute '{0}'")]
    AttributeMissing(String),

    #[error("credential is revoked")]
    RevokedCredential,

    #[error("wallet error: {0}")]
    WalletError(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("not found on ledger: {0}")]
    LedgerNotFound(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    AdapterTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("engine is shut down")]
    EngineClosed,

    /// A failure inside an exchange, tagged with the exchange identifier
    /// and the state recorded before the failing call. The recorded state
    /// is unchanged when this surfaces.
    #[error("exchange {exchange} (state {state}): {source}")]
    Exchange {
        exchange: ExchangeId,
        state: ExchangeState,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::ExchangeBusy(_) | Self::LedgerUnavailable(_) | Self::AdapterTimeout { .. }
        )
    }

    /// The underlying error, stripped of exchange context.
    pub fn root(&self) -> &EngineError {
        match self {
            Self::Exchange { source, .. } => source.root(),
            other => other,
        }
    }

    /// Tag an error with the exchange it occurred in and the state the
    /// exchange held when the call started. Errors that already identify
    /// the exchange, or that are engine-global, pass through untouched.
    pub(crate) fn with_exchange(self, exchange: ExchangeId, state: ExchangeState) -> Self {
        match self {
            Self::UnknownExchange(_)
            | Self::ExchangeBusy(_)
            | Self::EngineClosed
            | Self::Exchange { .. } => self,
            source => Self::Exchange {
                exchange,
                state,
                source: Box::new(source),
            },
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidTransition { state, kind, .. } => {
                Self::InvalidTransition { state, kind }
            }
            other => Self::MalformedMessage(other.to_string()),
        }
    }
}

impl From<ProofError> for EngineError {
    fn from(e: ProofError) -> Self {
        match e {
            ProofError::AttributeMissing(attribute) => Self::AttributeMissing(attribute),
            ProofError::RevokedCredential => Self::RevokedCredential,
            ProofError::MalformedProof(reason) => Self::MalformedProof(reason),
            ProofError::GenerationFailed(reason) => Self::CryptoVerificationFailed { reason },
            ProofError::Crypto(e) => Self::CryptoVerificationFailed {
                reason: e.to_string(),
            },
        }
    }
}
