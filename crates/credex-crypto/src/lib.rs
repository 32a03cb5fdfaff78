//! Credex Crypto — Hashing, Ed25519 signing, and the commitment scheme
//! backing attribute disclosure and range proofs.

pub mod commitment;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod signing;

pub use commitment::{Commitment, RangeProof};
pub use error::CryptoError;
pub use hashing::{challenge, commit, hash, verify_commitment};
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign, verify, Signature};
