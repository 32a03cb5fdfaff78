use std::fmt;

use crate::error::CoreError;
use crate::message::PayloadKind;
use crate::types::Role;

/// The states of a credential exchange lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ExchangeState {
    /// Exchange allocated, no message applied yet.
    Initiated,
    /// Initiator has sent its connection request.
    RequestSent,
    /// Connection established (response processed on either side).
    ResponseReceived,
    /// Issuer has sent a credential offer.
    OfferSent,
    /// Holder has received an offer and requested the credential.
    OfferReceived,
    /// Credential signed and delivered (issuer) or stored (holder).
    CredentialIssued,
    /// Verifier has sent a proof request.
    ProofRequested,
    /// Prover has sent a proof presentation.
    ProofSent,
    /// Verifier has checked the presentation successfully.
    ProofVerified,
    /// Exchange finished successfully. Final state.
    Completed,
    /// A party rejected the exchange via problem report. Final state.
    Rejected,
    /// The exchange was aborted by the local caller. Final state.
    Errored,
}

impl ExchangeState {
    /// Whether this is a final (terminal) state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Errored)
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initiated => "Initiated",
            Self::RequestSent => "RequestSent",
            Self::ResponseReceived => "ResponseReceived",
            Self::OfferSent => "OfferSent",
            Self::OfferReceived => "OfferReceived",
            Self::CredentialIssued => "CredentialIssued",
            Self::ProofRequested => "ProofRequested",
            Self::ProofSent => "ProofSent",
            Self::ProofVerified => "ProofVerified",
            Self::Completed => "Completed",
            Self::Rejected => "Rejected",
            Self::Errored => "Errored",
        };
        write!(f, "{}", name)
    }
}

/// The outcome of a legal transition: the state to commit and the kind of
/// message the engine emits while entering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the message is applied.
    pub next: ExchangeState,
    /// Kind of the outgoing message, if the transition produces one.
    pub emits: Option<PayloadKind>,
}

impl Transition {
    fn to(next: ExchangeState) -> Self {
        Self { next, emits: None }
    }

    fn emitting(next: ExchangeState, kind: PayloadKind) -> Self {
        Self {
            next,
            emits: Some(kind),
        }
    }
}

/// Resolve the transition for an incoming message kind against the current
/// state, or fail with `InvalidTransition`.
///
/// `ConnectionRequest`, `CredentialOffer`, and `ProofRequest` presented by
/// the local caller at the appropriate state double as self-initiation
/// events: the engine emits them outward.
///
/// Valid transitions (I = Initiator, R = Responder):
/// - I: Initiated        + ConnectionRequest  → RequestSent      (emits ConnectionRequest)
/// - R: Initiated        + ConnectionRequest  → ResponseReceived (emits ConnectionResponse)
/// - I: RequestSent      + ConnectionResponse → ResponseReceived
/// - R: ResponseReceived + CredentialOffer    → OfferSent        (emits CredentialOffer)
/// - I: ResponseReceived + CredentialOffer    → OfferReceived    (emits CredentialRequest)
/// - R: OfferSent        + CredentialRequest  → CredentialIssued (emits Credential)
/// - I: OfferReceived    + Credential         → CredentialIssued (emits Ack)
/// - R: ResponseReceived + ProofRequest       → ProofRequested   (emits ProofRequest)
/// - R: CredentialIssued + ProofRequest       → ProofRequested   (emits ProofRequest)
/// - I: ResponseReceived + ProofRequest       → ProofSent        (emits ProofPresentation)
/// - I: CredentialIssued + ProofRequest       → ProofSent        (emits ProofPresentation)
/// - R: ProofRequested   + ProofPresentation  → ProofVerified    (emits Ack)
/// - *: CredentialIssued + Ack                → Completed
/// - I: ProofSent        + Ack                → Completed
/// - R: ProofVerified    + Ack                → Completed
/// - *: any non-terminal + ProblemReport      → Rejected
pub fn transition(
    role: Role,
    current: ExchangeState,
    incoming: PayloadKind,
) -> Result<Transition, CoreError> {
    use ExchangeState as S;
    use PayloadKind as K;
    use Role::{Initiator, Responder};

    if incoming == K::ProblemReport && !current.is_terminal() {
        return Ok(Transition::to(S::Rejected));
    }

    let resolved = match (role, current, incoming) {
        // Connection establishment
        (Initiator, S::Initiated, K::ConnectionRequest) => {
            Transition::emitting(S::RequestSent, K::ConnectionRequest)
        }
        (Responder, S::Initiated, K::ConnectionRequest) => {
            Transition::emitting(S::ResponseReceived, K::ConnectionResponse)
        }
        (Initiator, S::RequestSent, K::ConnectionResponse) => Transition::to(S::ResponseReceived),

        // Credential issuance
        (Responder, S::ResponseReceived, K::CredentialOffer) => {
            Transition::emitting(S::OfferSent, K::CredentialOffer)
        }
        (Initiator, S::ResponseReceived, K::CredentialOffer) => {
            Transition::emitting(S::OfferReceived, K::CredentialRequest)
        }
        (Responder, S::OfferSent, K::CredentialRequest) => {
            Transition::emitting(S::CredentialIssued, K::Credential)
        }
        (Initiator, S::OfferReceived, K::Credential) => {
            Transition::emitting(S::CredentialIssued, K::Ack)
        }

        // Proof presentation
        (Responder, S::ResponseReceived | S::CredentialIssued, K::ProofRequest) => {
            Transition::emitting(S::ProofRequested, K::ProofRequest)
        }
        (Initiator, S::ResponseReceived | S::CredentialIssued, K::ProofRequest) => {
            Transition::emitting(S::ProofSent, K::ProofPresentation)
        }
        (Responder, S::ProofRequested, K::ProofPresentation) => {
            Transition::emitting(S::ProofVerified, K::Ack)
        }

        // Completion
        (_, S::CredentialIssued, K::Ack) => Transition::to(S::Completed),
        (Initiator, S::ProofSent, K::Ack) => Transition::to(S::Completed),
        (Responder, S::ProofVerified, K::Ack) => Transition::to(S::Completed),

        _ => {
            return Err(CoreError::InvalidTransition {
                role,
                state: current,
                kind: incoming,
            })
        }
    };

    tracing::debug!(
        %role,
        from = %current,
        to = %resolved.next,
        incoming = %incoming,
        "exchange state transition"
    );

    Ok(resolved)
}
