//! Credex Engine — Drives credential exchanges through the protocol state
//! machine: session registry, wallet/ledger adapters, and the `advance`
//! entry point.

pub mod adapters;
pub mod engine;
pub mod error;
pub mod registry;

pub use adapters::memory::{MemoryLedger, MemoryWallet};
pub use adapters::{LedgerAdapter, WalletAdapter};
pub use engine::CredexEngine;
pub use error::EngineError;
pub use registry::{AdvanceOutcome, ExchangeSnapshot, SessionRegistry};
