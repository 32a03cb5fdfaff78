//! In-memory adapters. The default backing for tests and single-process
//! deployments without external custody or a ledger pool.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use credex_core::{
    Credential, CredentialBlinding, CredentialDefinition, CredentialDefinitionId,
    RevocationRegistryId,
};
use credex_crypto::KeyPair;

use crate::adapters::{LedgerAdapter, WalletAdapter};
use crate::error::EngineError;

/// In-memory wallet. Keys stay inside (zeroized on drop by the key type);
/// call counters expose side-effect counts to tests.
#[derive(Default)]
pub struct MemoryWallet {
    keys: DashMap<String, KeyPair>,
    credentials: DashMap<uuid::Uuid, (Credential, CredentialBlinding)>,
    sign_calls: AtomicU64,
    store_calls: AtomicU64,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a key pair under a reference name.
    pub fn install_key(&self, key_ref: impl Into<String>, key_pair: KeyPair) {
        self.keys.insert(key_ref.into(), key_pair);
    }

    /// Number of `sign` calls served so far.
    pub fn sign_calls(&self) -> u64 {
        self.sign_calls.load(Ordering::Relaxed)
    }

    /// Number of `store_credential` calls served so far.
    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::Relaxed)
    }

    /// Number of credentials currently stored.
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}

#[async_trait]
impl WalletAdapter for MemoryWallet {
    async fn sign(&self, key_ref: &str, data: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.sign_calls.fetch_add(1, Ordering::Relaxed);
        let key = self
            .keys
            .get(key_ref)
            .ok_or_else(|| EngineError::WalletError(format!("unknown key ref '{}'", key_ref)))?;
        Ok(credex_crypto::sign(data, key.value()).to_bytes().to_vec())
    }

    async fn get_key(&self, key_ref: &str) -> Result<Vec<u8>, EngineError> {
        let key = self
            .keys
            .get(key_ref)
            .ok_or_else(|| EngineError::WalletError(format!("unknown key ref '{}'", key_ref)))?;
        Ok(key.public_key().as_bytes().to_vec())
    }

    async fn store_credential(
        &self,
        credential: Credential,
        blinding: CredentialBlinding,
    ) -> Result<(), EngineError> {
        self.store_calls.fetch_add(1, Ordering::Relaxed);
        debug!(credential_id = %credential.header.id, "credential stored");
        self.credentials
            .insert(credential.header.id, (credential, blinding));
        Ok(())
    }

    async fn get_credential(
        &self,
        id: uuid::Uuid,
    ) -> Result<(Credential, CredentialBlinding), EngineError> {
        self.credentials
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::WalletError(format!("no credential {}", id)))
    }

    async fn find_credential(
        &self,
        definition: &CredentialDefinitionId,
    ) -> Result<(Credential, CredentialBlinding), EngineError> {
        self.credentials
            .iter()
            .find(|entry| entry.value().0.header.credential_definition_id == *definition)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                EngineError::WalletError(format!("no credential for definition {}", definition))
            })
    }

    async fn erase(&self) -> Result<(), EngineError> {
        let erased = self.credentials.len();
        self.credentials.clear();
        debug!(erased, "wallet contents erased");
        Ok(())
    }
}

/// In-memory ledger: registered credential definitions plus revocation
/// timestamps per registry.
#[derive(Default)]
pub struct MemoryLedger {
    definitions: DashMap<CredentialDefinitionId, CredentialDefinition>,
    revocations: DashMap<RevocationRegistryId, DateTime<Utc>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a credential definition.
    pub fn register_definition(&self, definition: CredentialDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    /// Mark every credential under the registry revoked as of `at`.
    pub fn revoke(&self, registry: RevocationRegistryId, at: DateTime<Utc>) {
        self.revocations.insert(registry, at);
    }
}

#[async_trait]
impl LedgerAdapter for MemoryLedger {
    async fn credential_definition(
        &self,
        id: &CredentialDefinitionId,
    ) -> Result<CredentialDefinition, EngineError> {
        self.definitions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::LedgerNotFound(id.to_string()))
    }

    async fn revocation_status(
        &self,
        registry: &RevocationRegistryId,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        Ok(self
            .revocations
            .get(registry)
            .is_some_and(|revoked_at| *revoked_at.value() <= at))
    }
}
