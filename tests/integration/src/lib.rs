//! Shared harness for the integration tests: two-party engine setup, a
//! message relay, and instrumented adapter decorators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use credex_core::{
    AttributeValue, Attributes, ConnectionRequest, Credential, CredentialBlinding,
    CredentialDefinition, CredentialDefinitionId, CredentialOffer, Did, EngineConfig, ExchangeId,
    Message, Payload, Predicate, ProofRequest, Requirement, RevocationRegistryId, Role, SchemaId,
};
use credex_crypto::KeyPair;
use credex_engine::{
    CredexEngine, EngineError, LedgerAdapter, MemoryLedger, MemoryWallet, WalletAdapter,
};

/// One side of an exchange: an engine plus direct handles on its wallet.
pub struct Party {
    pub engine: Arc<CredexEngine>,
    pub wallet: Arc<MemoryWallet>,
    pub did: Did,
    pub verkey: Vec<u8>,
}

/// Install a subscriber once per test process so `RUST_LOG` works.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Spin up a party with a deterministic key, sharing `ledger` with its peers.
pub fn party(name: &str, key_seed: u8, config: EngineConfig, ledger: Arc<dyn LedgerAdapter>) -> Party {
    init_tracing();
    let key_pair = KeyPair::from_seed(&[key_seed; 32]);
    let verkey = key_pair.public_key().as_bytes().to_vec();
    let wallet = Arc::new(MemoryWallet::new());
    wallet.install_key(&config.local_key_ref, key_pair);
    let did = Did::from_parts("key", name);
    let engine = CredexEngine::start(
        config,
        did.clone(),
        Arc::clone(&wallet) as Arc<dyn WalletAdapter>,
        ledger,
    );
    Party {
        engine,
        wallet,
        did,
        verkey,
    }
}

/// Re-address an outgoing message to the receiving party's exchange.
/// The transport owns envelope routing, so the relayed copy is re-sequenced
/// for the receiver and carries no signature.
pub fn relay(outgoing: &Message, to_exchange: ExchangeId, seq: u64) -> Message {
    Message::new(to_exchange, seq, outgoing.payload.clone())
}

/// Attribute set used across the flows: a basic KYC credential.
pub fn kyc_attributes() -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("age".into(), AttributeValue::Integer(29));
    attributes.insert("country".into(), AttributeValue::String("BR".into()));
    attributes
}

pub fn kyc_definition_id() -> CredentialDefinitionId {
    CredentialDefinitionId::new("cred-def:acme:kyc-basic-v1")
}

pub fn kyc_registry_id() -> RevocationRegistryId {
    RevocationRegistryId::new("rev-reg:acme:kyc-basic-v1")
}

/// The ledger-resident definition matching an issuer keyed from `key_seed`.
pub fn kyc_definition(issuer_did: &Did, key_seed: u8, revocable: bool) -> CredentialDefinition {
    CredentialDefinition {
        id: kyc_definition_id(),
        schema_id: SchemaId::new("kyc-basic-v1"),
        issuer: issuer_did.clone(),
        public_key: KeyPair::from_seed(&[key_seed; 32])
            .public_key()
            .as_bytes()
            .to_vec(),
        revocation_registry: revocable.then(kyc_registry_id),
    }
}

/// A proof request the KYC credential satisfies: adult, South American.
pub fn kyc_proof_request() -> Payload {
    Payload::ProofRequest(ProofRequest {
        nonce: [0x9Du8; 32],
        credential_definition_id: kyc_definition_id(),
        requested_at: Utc::now(),
        predicates: vec![
            Predicate {
                attribute: "age".into(),
                requirement: Requirement::AtLeast(18),
            },
            Predicate {
                attribute: "country".into(),
                requirement: Requirement::OneOf(vec!["BR".into(), "AR".into()]),
            },
        ],
    })
}

/// Establish a connection between two parties. On return the initiator has
/// applied seq 1..=2 and the responder seq 1; both sit in
/// `ResponseReceived`.
pub async fn connect(
    initiator: &Party,
    responder: &Party,
) -> Result<(ExchangeId, ExchangeId), EngineError> {
    initiator.engine.ready().await?;
    responder.engine.ready().await?;
    let ix = initiator
        .engine
        .create_exchange(Role::Initiator, responder.did.clone())?;
    let rx = responder
        .engine
        .create_exchange(Role::Responder, initiator.did.clone())?;

    let request = Message::new(
        ix,
        1,
        Payload::ConnectionRequest(ConnectionRequest {
            did: initiator.did.clone(),
            verkey: initiator.verkey.clone(),
            label: "integration".into(),
        }),
    );
    let sent = initiator.engine.advance(ix, request).await?;
    let out = sent.outgoing.expect("connection request should be emitted");

    let answered = responder.engine.advance(rx, relay(&out, rx, 1)).await?;
    let response = answered
        .outgoing
        .expect("connection response should be emitted");

    initiator.engine.advance(ix, relay(&response, ix, 2)).await?;
    Ok((ix, rx))
}

/// Run the full issuance leg right after `connect`: offer, request, issue,
/// ack. Leaves the issuer `Completed` and the holder `CredentialIssued`
/// with the credential in its wallet.
pub async fn run_issuance(
    holder: &Party,
    issuer: &Party,
    hx: ExchangeId,
    rx: ExchangeId,
) -> Result<(), EngineError> {
    let offered = issuer.engine.advance(rx, Message::new(rx, 2, kyc_offer())).await?;
    let offer = offered.outgoing.expect("offer should be emitted");

    let requested = holder.engine.advance(hx, relay(&offer, hx, 3)).await?;
    let request = requested
        .outgoing
        .expect("credential request should be emitted");

    let issued = issuer.engine.advance(rx, relay(&request, rx, 3)).await?;
    let credential = issued.outgoing.expect("credential should be emitted");

    let stored = holder.engine.advance(hx, relay(&credential, hx, 4)).await?;
    let ack = stored.outgoing.expect("ack should be emitted");

    issuer.engine.advance(rx, relay(&ack, rx, 4)).await?;
    Ok(())
}

pub fn kyc_offer() -> Payload {
    Payload::CredentialOffer(CredentialOffer {
        credential_definition_id: kyc_definition_id(),
        attributes: kyc_attributes(),
    })
}

/// Ledger decorator that delays every call, for timeout tests.
pub struct SlowLedger {
    inner: Arc<MemoryLedger>,
    delay: std::time::Duration,
}

impl SlowLedger {
    pub fn new(inner: Arc<MemoryLedger>, delay: std::time::Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl LedgerAdapter for SlowLedger {
    async fn credential_definition(
        &self,
        id: &CredentialDefinitionId,
    ) -> Result<CredentialDefinition, EngineError> {
        tokio::time::sleep(self.delay).await;
        self.inner.credential_definition(id).await
    }

    async fn revocation_status(
        &self,
        registry: &RevocationRegistryId,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        tokio::time::sleep(self.delay).await;
        self.inner.revocation_status(registry, at).await
    }
}

/// Wallet decorator whose `sign` blocks on a gate, so a test can hold an
/// exchange mid-`advance` at a known point without sleeping.
pub struct GateWallet {
    inner: Arc<MemoryWallet>,
    /// Gains a permit each time `sign` is entered.
    pub entered: Arc<Semaphore>,
    /// `sign` proceeds once a permit is available here.
    pub release: Arc<Semaphore>,
}

impl GateWallet {
    pub fn new(inner: Arc<MemoryWallet>) -> Self {
        Self {
            inner,
            entered: Arc::new(Semaphore::new(0)),
            release: Arc::new(Semaphore::new(0)),
        }
    }
}

#[async_trait]
impl WalletAdapter for GateWallet {
    async fn sign(&self, key_ref: &str, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.entered.add_permits(1);
        let permit = self
            .release
            .acquire()
            .await
            .map_err(|_| EngineError::WalletError("gate closed".into()))?;
        permit.forget();
        self.inner.sign(key_ref, data).await
    }

    async fn get_key(&self, key_ref: &str) -> Result<Vec<u8>, EngineError> {
        self.inner.get_key(key_ref).await
    }

    async fn store_credential(
        &self,
        credential: Credential,
        blinding: CredentialBlinding,
    ) -> Result<(), EngineError> {
        self.inner.store_credential(credential, blinding).await
    }

    async fn get_credential(
        &self,
        id: uuid::Uuid,
    ) -> Result<(Credential, CredentialBlinding), EngineError> {
        self.inner.get_credential(id).await
    }

    async fn find_credential(
        &self,
        definition: &CredentialDefinitionId,
    ) -> Result<(Credential, CredentialBlinding), EngineError> {
        self.inner.find_credential(definition).await
    }

    async fn erase(&self) -> Result<(), EngineError> {
        self.inner.erase().await
    }
}
