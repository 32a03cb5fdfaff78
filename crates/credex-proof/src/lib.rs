//! Credex Proof — Presentation generation and verification over the
//! commitment scheme fixed at credential issuance.

pub mod error;
pub mod prover;
pub mod verifier;

pub use error::ProofError;
pub use prover::build_proof;
pub use verifier::verify_proof;
