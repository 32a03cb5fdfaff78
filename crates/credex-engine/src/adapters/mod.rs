//! External collaborator interfaces: the wallet (key custody, credential
//! storage) and the ledger (credential definitions, revocation registries).
//! The engine only ever talks to these traits; deployments plug in real
//! backends, tests plug in the in-memory ones.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use credex_core::{
    Credential, CredentialBlinding, CredentialDefinition, CredentialDefinitionId,
    RevocationRegistryId,
};

use crate::error::EngineError;

/// Key custody and credential storage.
///
/// Key material never crosses this boundary: the engine refers to keys by
/// reference and asks the wallet to sign.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Sign `data` with the key behind `key_ref`. Returns the 64-byte
    /// Ed25519 signature.
    async fn sign(&self, key_ref: &str, data: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Resolve the public key bytes behind `key_ref`.
    async fn get_key(&self, key_ref: &str) -> Result<Vec<u8>, EngineError>;

    /// Store an issued credential together with its blinding nonces.
    async fn store_credential(
        &self,
        credential: Credential,
        blinding: CredentialBlinding,
    ) -> Result<(), EngineError>;

    /// Load a stored credential by id.
    async fn get_credential(
        &self,
        id: uuid::Uuid,
    ) -> Result<(Credential, CredentialBlinding), EngineError>;

    /// Find a stored credential issued under the given definition.
    async fn find_credential(
        &self,
        definition: &CredentialDefinitionId,
    ) -> Result<(Credential, CredentialBlinding), EngineError>;

    /// Erase all stored credentials. Keys are kept.
    async fn erase(&self) -> Result<(), EngineError>;
}

/// Read-only view of the verifiable data registry.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Fetch a credential definition.
    ///
    /// `LedgerNotFound` if the id is not on the ledger, `LedgerUnavailable`
    /// on transient backend failure.
    async fn credential_definition(
        &self,
        id: &CredentialDefinitionId,
    ) -> Result<CredentialDefinition, EngineError>;

    /// Whether the registry reports the credential revoked as of `at`.
    async fn revocation_status(
        &self,
        registry: &RevocationRegistryId,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError>;
}
