use credex_crypto::CryptoError;

/// Proof engine errors.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("credential has no attribute '{0}'")]
    AttributeMissing(String),

    #[error("credential is revoked")]
    RevokedCredential,

    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("proof generation failed: {0}")]
    GenerationFailed(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
