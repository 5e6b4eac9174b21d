use thiserror::Error;

/// A badge pair or one of its references is structurally malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid definition reference format: {0}")]
    DefinitionPrefix(String),

    #[error("Invalid definition reference structure: {0}")]
    DefinitionShape(String),

    #[error("Invalid issuer key in definition reference: {0}")]
    IssuerKey(String),

    #[error("Empty identifier in definition reference: {0}")]
    EmptyIdentifier(String),

    #[error("Invalid award reference: {0:?}")]
    AwardReference(String),

    #[error("Invalid recipient key: {0}")]
    RecipientKey(String),
}

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Identifier mismatch: expected {expected}, computed {computed}")]
    IdMismatch { expected: String, computed: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure to decode an inbound relay frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is not a non-empty JSON array")]
    NotArray,

    #[error("Unknown frame type: {0}")]
    UnknownType(String),

    #[error("Malformed {0} frame")]
    Malformed(&'static str),
}
