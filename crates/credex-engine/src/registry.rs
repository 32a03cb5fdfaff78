use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use credex_core::{
    CredentialOffer, Did, ExchangeId, ExchangeState, Message, PayloadKind, ProofRequest, Role,
};

use crate::error::EngineError;

/// Result of applying one message to an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceOutcome {
    /// Signed outgoing message, when the transition emits one.
    pub outgoing: Option<Message>,
    /// Exchange state after the message was applied.
    pub state: ExchangeState,
}

/// Mutable per-exchange record. Only ever touched under its slot's lock.
#[derive(Debug)]
pub struct ExchangeRecord {
    pub id: ExchangeId,
    pub role: Role,
    pub state: ExchangeState,
    pub local_did: Did,
    pub remote_did: Did,
    /// Peer's envelope verification key, learned during connection setup.
    pub remote_verkey: Option<Vec<u8>>,
    /// Sequence number of the last applied message; 0 before the first.
    pub last_seq: u64,
    /// Payload kind of the last applied message.
    pub last_kind: Option<PayloadKind>,
    /// Outcome of the last applied message, replayed for exact duplicates.
    pub last_outcome: Option<AdvanceOutcome>,
    /// Offer in flight between `CredentialOffer` and issuance.
    pub pending_offer: Option<CredentialOffer>,
    /// Proof request in flight between `ProofRequest` and verification.
    pub pending_proof_request: Option<ProofRequest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One registry slot: the record behind an async mutex so concurrent
/// `advance` calls on the same exchange serialize.
#[derive(Debug)]
pub struct ExchangeSlot {
    pub record: Mutex<ExchangeRecord>,
}

/// Point-in-time view of an exchange, safe to hand out without the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSnapshot {
    pub id: ExchangeId,
    pub role: Role,
    pub state: ExchangeState,
    pub local_did: Did,
    pub remote_did: Did,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks live exchanges. Lookups go through the concurrent map; mutation
/// goes through each slot's own lock, so distinct exchanges never contend.
pub struct SessionRegistry {
    slots: DashMap<ExchangeId, Arc<ExchangeSlot>>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            capacity,
        }
    }

    /// Allocate a new exchange. `ResourceExhausted` at the live-exchange cap.
    pub fn create(
        &self,
        role: Role,
        local_did: Did,
        remote_did: Did,
    ) -> Result<ExchangeId, EngineError> {
        if self.slots.len() >= self.capacity {
            return Err(EngineError::ResourceExhausted {
                limit: self.capacity,
            });
        }
        let id = ExchangeId::generate();
        let now = Utc::now();
        let record = ExchangeRecord {
            id,
            role,
            state: ExchangeState::Initiated,
            local_did,
            remote_did,
            remote_verkey: None,
            last_seq: 0,
            last_kind: None,
            last_outcome: None,
            pending_offer: None,
            pending_proof_request: None,
            created_at: now,
            updated_at: now,
        };
        self.slots.insert(
            id,
            Arc::new(ExchangeSlot {
                record: Mutex::new(record),
            }),
        );
        debug!(exchange = %id, %role, "exchange created");
        Ok(id)
    }

    /// Clone out the slot for an exchange. The map guard is dropped before
    /// the caller awaits the slot lock.
    pub fn slot(&self, id: ExchangeId) -> Result<Arc<ExchangeSlot>, EngineError> {
        self.slots
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::UnknownExchange(id))
    }

    /// Read a consistent snapshot of an exchange.
    pub async fn snapshot(&self, id: ExchangeId) -> Result<ExchangeSnapshot, EngineError> {
        let slot = self.slot(id)?;
        let record = slot.record.lock().await;
        Ok(ExchangeSnapshot {
            id: record.id,
            role: record.role,
            state: record.state,
            local_did: record.local_did.clone(),
            remote_did: record.remote_did.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Drop an exchange from the registry, freeing its slot.
    pub fn release(&self, id: ExchangeId) -> Result<(), EngineError> {
        self.slots
            .remove(&id)
            .map(|_| debug!(exchange = %id, "exchange released"))
            .ok_or(EngineError::UnknownExchange(id))
    }

    /// Number of live exchanges.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every exchange.
    pub fn clear(&self) {
        self.slots.clear();
    }
}
