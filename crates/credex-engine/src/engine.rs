use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use credex_core::{
    transition, Ack, BusyPolicy, ConnectionResponse, Credential, CredentialBlinding,
    CredentialDefinition, CredentialHeader, CredentialOffer, CredentialPayload, CredentialRequest,
    Did, EngineConfig, ExchangeId, ExchangeState, Message, Payload, PayloadKind, ProblemReport,
    Role,
};
use credex_crypto::{verify, Commitment, PublicKey, Signature};
use credex_proof::{build_proof, verify_proof};

use crate::adapters::{LedgerAdapter, WalletAdapter};
use crate::error::EngineError;
use crate::registry::{AdvanceOutcome, ExchangeRecord, ExchangeSnapshot, SessionRegistry};

#[derive(Debug, Clone)]
enum ReadyState {
    Pending,
    Ready,
    Failed(String),
}

/// Record fields a transition wants to update. Collected while side effects
/// run and applied only at commit, so a failed `advance` leaves the record
/// untouched.
#[derive(Default)]
struct StagedUpdates {
    remote_verkey: Option<Vec<u8>>,
    pending_offer: Option<CredentialOffer>,
    pending_proof_request: Option<credex_core::ProofRequest>,
}

/// The protocol engine: owns the session registry and drives exchanges
/// through the state machine, performing wallet/ledger side effects along
/// the way.
pub struct CredexEngine {
    config: EngineConfig,
    local_did: Did,
    wallet: Arc<dyn WalletAdapter>,
    ledger: Arc<dyn LedgerAdapter>,
    registry: SessionRegistry,
    ready_rx: watch::Receiver<ReadyState>,
    closed: AtomicBool,
}

impl CredexEngine {
    /// Start the engine. Initialization (resolving the local signing key)
    /// runs in the background; await `ready()` before first use.
    pub fn start(
        config: EngineConfig,
        local_did: Did,
        wallet: Arc<dyn WalletAdapter>,
        ledger: Arc<dyn LedgerAdapter>,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Pending);
        let registry = SessionRegistry::new(config.max_live_exchanges);
        let engine = Arc::new(Self {
            config,
            local_did,
            wallet,
            ledger,
            registry,
            ready_rx,
            closed: AtomicBool::new(false),
        });

        let init_wallet = Arc::clone(&engine.wallet);
        let key_ref = engine.config.local_key_ref.clone();
        tokio::spawn(async move {
            let state = match init_wallet.get_key(&key_ref).await {
                Ok(_) => {
                    info!("engine ready");
                    ReadyState::Ready
                }
                Err(e) => {
                    warn!(error = %e, "engine initialization failed");
                    ReadyState::Failed(e.to_string())
                }
            };
            let _ = ready_tx.send(state);
        });

        engine
    }

    /// Wait for initialization to finish. Errors if the local signing key
    /// could not be resolved.
    pub async fn ready(&self) -> Result<(), EngineError> {
        let mut rx = self.ready_rx.clone();
        loop {
            // Clone out of the watch guard before awaiting on the channel.
            let state = rx.borrow_and_update().clone();
            match state {
                ReadyState::Ready => return Ok(()),
                ReadyState::Failed(reason) => return Err(EngineError::WalletError(reason)),
                ReadyState::Pending => {
                    if rx.changed().await.is_err() {
                        return Err(EngineError::EngineClosed);
                    }
                }
            }
        }
    }

    /// Open a new exchange with a remote party.
    pub fn create_exchange(&self, role: Role, remote_did: Did) -> Result<ExchangeId, EngineError> {
        self.ensure_open()?;
        self.registry
            .create(role, self.local_did.clone(), remote_did)
    }

    /// Apply one message to an exchange.
    ///
    /// Side effects run first; the exchange record commits only when every
    /// one of them succeeded. An exact duplicate (same `seq`, same payload
    /// kind as the last applied message) replays the recorded outcome
    /// without re-running side effects.
    pub async fn advance(
        &self,
        exchange_id: ExchangeId,
        message: Message,
    ) -> Result<AdvanceOutcome, EngineError> {
        self.ensure_open()?;
        message.validate()?;
        if message.exchange_id != exchange_id {
            return Err(EngineError::MalformedMessage(format!(
                "message addresses exchange {}, not {}",
                message.exchange_id, exchange_id
            )));
        }

        // Clone the slot out of the map; the map guard must not be held
        // across await points.
        let slot = self.registry.slot(exchange_id)?;
        let mut record = match self.config.busy_policy {
            BusyPolicy::Wait => slot.record.lock().await,
            BusyPolicy::FailFast => slot
                .record
                .try_lock()
                .map_err(|_| EngineError::ExchangeBusy(exchange_id))?,
        };
        let state = record.state;
        self.apply(&mut record, message)
            .await
            .map_err(|e| e.with_exchange(exchange_id, state))
    }

    async fn apply(
        &self,
        record: &mut ExchangeRecord,
        message: Message,
    ) -> Result<AdvanceOutcome, EngineError> {
        let kind = message.payload.kind();

        if record.last_seq > 0 {
            if message.seq == record.last_seq {
                if record.last_kind == Some(kind) {
                    if let Some(outcome) = &record.last_outcome {
                        debug!(
                            exchange = %record.id,
                            seq = message.seq,
                            "duplicate message, replaying recorded outcome"
                        );
                        return Ok(outcome.clone());
                    }
                }
                return Err(EngineError::InvalidTransition {
                    state: record.state,
                    kind,
                });
            }
            if message.seq < record.last_seq {
                warn!(
                    exchange = %record.id,
                    seq = message.seq,
                    last = record.last_seq,
                    "stale message"
                );
                return Err(EngineError::InvalidTransition {
                    state: record.state,
                    kind,
                });
            }
        }
        if message.seq != record.last_seq + 1 {
            return Err(EngineError::MalformedMessage(format!(
                "expected seq {}, got {}",
                record.last_seq + 1,
                message.seq
            )));
        }

        let transition = transition(record.role, record.state, kind)?;
        self.check_envelope_signature(record, &message)?;

        let mut staged = StagedUpdates::default();
        let outgoing_payload = self
            .run_side_effects(record, &message, &mut staged)
            .await?;

        let outgoing = match outgoing_payload {
            Some(payload) => Some(self.sign_outgoing(record.id, message.seq, payload).await?),
            None => None,
        };

        // Commit.
        record.state = transition.next;
        record.last_seq = message.seq;
        record.last_kind = Some(kind);
        if let Some(verkey) = staged.remote_verkey {
            record.remote_verkey = Some(verkey);
        }
        if let Some(offer) = staged.pending_offer {
            record.pending_offer = Some(offer);
        }
        if let Some(request) = staged.pending_proof_request {
            record.pending_proof_request = Some(request);
        }
        record.updated_at = Utc::now();

        let outcome = AdvanceOutcome {
            outgoing,
            state: record.state,
        };
        record.last_outcome = Some(outcome.clone());
        debug!(
            exchange = %record.id,
            state = %record.state,
            seq = record.last_seq,
            "message applied"
        );
        Ok(outcome)
    }

    /// Verify the envelope signature of remote-origin messages once the
    /// peer's verification key is known.
    fn check_envelope_signature(
        &self,
        record: &ExchangeRecord,
        message: &Message,
    ) -> Result<(), EngineError> {
        let (Some(verkey), Some(signature)) =
            (record.remote_verkey.as_ref(), message.signature.as_ref())
        else {
            return Ok(());
        };
        let key = PublicKey::from_bytes(verkey).map_err(|e| {
            EngineError::CryptoVerificationFailed {
                reason: e.to_string(),
            }
        })?;
        let signature = Signature::from_bytes(signature).map_err(|e| {
            EngineError::CryptoVerificationFailed {
                reason: e.to_string(),
            }
        })?;
        let payload = message.signing_payload()?;
        if verify(&payload, &signature, &key).is_err() {
            warn!(exchange = %record.id, "envelope signature does not verify");
            return Err(EngineError::CryptoVerificationFailed {
                reason: "envelope signature does not verify".into(),
            });
        }
        Ok(())
    }

    /// Execute the adapter side effects for a legal transition and build the
    /// outgoing payload. Nothing in the record is mutated here.
    async fn run_side_effects(
        &self,
        record: &ExchangeRecord,
        message: &Message,
        staged: &mut StagedUpdates,
    ) -> Result<Option<Payload>, EngineError> {
        let outgoing = match &message.payload {
            Payload::ConnectionRequest(request) => match record.role {
                // Local self-initiation: relay the request outward.
                Role::Initiator => Some(Payload::ConnectionRequest(request.clone())),
                Role::Responder => {
                    staged.remote_verkey = Some(request.verkey.clone());
                    let verkey = self
                        .timed(
                            "wallet.get_key",
                            self.wallet.get_key(&self.config.local_key_ref),
                        )
                        .await?;
                    Some(Payload::ConnectionResponse(ConnectionResponse {
                        did: record.local_did.clone(),
                        verkey,
                    }))
                }
            },
            Payload::ConnectionResponse(response) => {
                staged.remote_verkey = Some(response.verkey.clone());
                None
            }
            Payload::CredentialOffer(offer) => {
                staged.pending_offer = Some(offer.clone());
                match record.role {
                    // Issuer announcing its own offer.
                    Role::Responder => Some(Payload::CredentialOffer(offer.clone())),
                    // Holder accepting an incoming offer.
                    Role::Initiator => Some(Payload::CredentialRequest(CredentialRequest {
                        credential_definition_id: offer.credential_definition_id.clone(),
                        subject_did: record.local_did.clone(),
                    })),
                }
            }
            Payload::CredentialRequest(request) => {
                let offer = record.pending_offer.clone().ok_or_else(|| {
                    EngineError::MalformedMessage("credential request without an offer".into())
                })?;
                if request.credential_definition_id != offer.credential_definition_id {
                    return Err(EngineError::MalformedMessage(format!(
                        "request names {}, offer was for {}",
                        request.credential_definition_id, offer.credential_definition_id
                    )));
                }
                let definition = self
                    .timed(
                        "ledger.credential_definition",
                        self.ledger
                            .credential_definition(&offer.credential_definition_id),
                    )
                    .await?;
                let (credential, blinding) = self
                    .issue_credential(record, &offer, &definition, &request.subject_did)
                    .await?;
                Some(Payload::Credential(CredentialPayload {
                    credential,
                    blinding,
                }))
            }
            Payload::Credential(payload) => {
                let definition = self
                    .timed(
                        "ledger.credential_definition",
                        self.ledger.credential_definition(
                            &payload.credential.header.credential_definition_id,
                        ),
                    )
                    .await?;
                self.check_issued_credential(payload, &definition)?;
                self.timed(
                    "wallet.store_credential",
                    self.wallet
                        .store_credential(payload.credential.clone(), payload.blinding.clone()),
                )
                .await?;
                info!(
                    exchange = %record.id,
                    credential_id = %payload.credential.header.id,
                    "credential received and stored"
                );
                Some(Payload::Ack(Ack::ok()))
            }
            Payload::ProofRequest(request) => match record.role {
                // Verifier announcing its own request.
                Role::Responder => {
                    staged.pending_proof_request = Some(request.clone());
                    Some(Payload::ProofRequest(request.clone()))
                }
                // Prover answering an incoming request.
                Role::Initiator => {
                    let (credential, blinding) = self
                        .timed(
                            "wallet.find_credential",
                            self.wallet
                                .find_credential(&request.credential_definition_id),
                        )
                        .await?;
                    let definition = self
                        .timed(
                            "ledger.credential_definition",
                            self.ledger
                                .credential_definition(&request.credential_definition_id),
                        )
                        .await?;
                    let revoked = self
                        .revocation_status(&definition, request.requested_at)
                        .await?;
                    let proof = build_proof(&credential, &blinding, request, revoked)?;
                    info!(exchange = %record.id, "proof generated");
                    Some(Payload::ProofPresentation(proof))
                }
            },
            Payload::ProofPresentation(proof) => {
                let request = record.pending_proof_request.clone().ok_or_else(|| {
                    EngineError::MalformedProof("no proof request outstanding".into())
                })?;
                let definition = self
                    .timed(
                        "ledger.credential_definition",
                        self.ledger
                            .credential_definition(&request.credential_definition_id),
                    )
                    .await?;
                if self
                    .revocation_status(&definition, request.requested_at)
                    .await?
                {
                    return Err(EngineError::RevokedCredential);
                }
                if !verify_proof(proof, &request, &definition)? {
                    return Err(EngineError::CryptoVerificationFailed {
                        reason: "proof does not verify".into(),
                    });
                }
                info!(exchange = %record.id, "proof verified");
                Some(Payload::Ack(Ack::ok()))
            }
            Payload::Ack(_) | Payload::ProblemReport(_) => None,
        };
        Ok(outgoing)
    }

    async fn issue_credential(
        &self,
        record: &ExchangeRecord,
        offer: &CredentialOffer,
        definition: &CredentialDefinition,
        subject: &Did,
    ) -> Result<(Credential, CredentialBlinding), EngineError> {
        let mut nonces = BTreeMap::new();
        let mut commitments = BTreeMap::new();
        for (name, value) in &offer.attributes {
            let mut nonce = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut nonce);
            commitments.insert(
                name.clone(),
                Commitment::new(&value.canonical_bytes(), &nonce),
            );
            nonces.insert(name.clone(), nonce);
        }

        let header = CredentialHeader {
            id: uuid::Uuid::now_v7(),
            schema_id: definition.schema_id.clone(),
            credential_definition_id: definition.id.clone(),
            issuer: record.local_did.clone(),
            subject: subject.clone(),
            issued_at: Utc::now(),
        };
        let payload = header.signing_payload(&commitments);
        let signature = self
            .timed(
                "wallet.sign",
                self.wallet.sign(&self.config.local_key_ref, &payload),
            )
            .await?;

        info!(
            exchange = %record.id,
            credential_id = %header.id,
            subject = %subject,
            "credential issued"
        );
        Ok((
            Credential {
                header,
                attributes: offer.attributes.clone(),
                commitments,
                signature,
            },
            CredentialBlinding { nonces },
        ))
    }

    fn check_issued_credential(
        &self,
        payload: &CredentialPayload,
        definition: &CredentialDefinition,
    ) -> Result<(), EngineError> {
        let key = PublicKey::from_bytes(&definition.public_key).map_err(|e| {
            EngineError::CryptoVerificationFailed {
                reason: e.to_string(),
            }
        })?;
        let signature = Signature::from_bytes(&payload.credential.signature).map_err(|e| {
            EngineError::CryptoVerificationFailed {
                reason: e.to_string(),
            }
        })?;
        let signing = payload
            .credential
            .header
            .signing_payload(&payload.credential.commitments);
        if verify(&signing, &signature, &key).is_err() {
            return Err(EngineError::CryptoVerificationFailed {
                reason: "issuer signature does not verify".into(),
            });
        }
        if !payload.credential.verify_commitments(&payload.blinding) {
            return Err(EngineError::CryptoVerificationFailed {
                reason: "commitments do not open with the supplied blinding".into(),
            });
        }
        Ok(())
    }

    async fn revocation_status(
        &self,
        definition: &CredentialDefinition,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        match &definition.revocation_registry {
            Some(registry) => {
                self.timed(
                    "ledger.revocation_status",
                    self.ledger.revocation_status(registry, at),
                )
                .await
            }
            None => Ok(false),
        }
    }

    async fn sign_outgoing(
        &self,
        exchange_id: ExchangeId,
        seq: u64,
        payload: Payload,
    ) -> Result<Message, EngineError> {
        let message = Message::new(exchange_id, seq, payload);
        let signing = message.signing_payload()?;
        let signature = self
            .timed(
                "wallet.sign",
                self.wallet.sign(&self.config.local_key_ref, &signing),
            )
            .await?;
        Ok(message.with_signature(signature))
    }

    /// Abort a non-terminal exchange, emitting a `ProblemReport` for the
    /// peer and recording the `Errored` state.
    pub async fn fail(
        &self,
        exchange_id: ExchangeId,
        code: &str,
        comment: &str,
    ) -> Result<AdvanceOutcome, EngineError> {
        self.ensure_open()?;
        let slot = self.registry.slot(exchange_id)?;
        let mut record = match self.config.busy_policy {
            BusyPolicy::Wait => slot.record.lock().await,
            BusyPolicy::FailFast => slot
                .record
                .try_lock()
                .map_err(|_| EngineError::ExchangeBusy(exchange_id))?,
        };
        if record.state.is_terminal() {
            return Err(EngineError::InvalidTransition {
                state: record.state,
                kind: PayloadKind::ProblemReport,
            }
            .with_exchange(exchange_id, record.state));
        }

        let seq = record.last_seq + 1;
        let outgoing = self
            .sign_outgoing(
                record.id,
                seq,
                Payload::ProblemReport(ProblemReport {
                    code: code.into(),
                    comment: comment.into(),
                }),
            )
            .await
            .map_err(|e| e.with_exchange(exchange_id, record.state))?;

        record.state = ExchangeState::Errored;
        record.last_seq = seq;
        record.last_kind = Some(PayloadKind::ProblemReport);
        record.updated_at = Utc::now();
        let outcome = AdvanceOutcome {
            outgoing: Some(outgoing),
            state: record.state,
        };
        record.last_outcome = Some(outcome.clone());
        warn!(exchange = %exchange_id, code, "exchange aborted");
        Ok(outcome)
    }

    /// Read a consistent snapshot of an exchange.
    pub async fn snapshot(&self, exchange_id: ExchangeId) -> Result<ExchangeSnapshot, EngineError> {
        self.ensure_open()?;
        self.registry.snapshot(exchange_id).await
    }

    /// Drop an exchange, freeing its registry slot.
    pub fn release(&self, exchange_id: ExchangeId) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.registry.release(exchange_id)
    }

    /// Number of live exchanges.
    pub fn live_exchanges(&self) -> usize {
        self.registry.len()
    }

    /// Shut the engine down: release all exchanges and, when `erase_state`,
    /// erase wallet-stored credentials. Idempotent; every later operation
    /// fails with `EngineClosed`.
    pub async fn shutdown(&self, erase_state: bool) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let released = self.registry.len();
        self.registry.clear();
        if erase_state {
            self.timed("wallet.erase", self.wallet.erase()).await?;
        }
        info!(released, erase_state, "engine shut down");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(EngineError::EngineClosed)
        } else {
            Ok(())
        }
    }

    /// Wrap an adapter call in the configured timeout.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        match tokio::time::timeout(self.config.adapter_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::AdapterTimeout {
                operation,
                timeout_ms: self.config.adapter_timeout_ms,
            }),
        }
    }
}
