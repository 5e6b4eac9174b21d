use thiserror::Error;

use ribbon_shared::error::{SigningError, ValidationError};
use ribbon_store::StoreError;

/// A merge aborted; the pre-merge pairs are left untouched.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Invalid new badge pair: {0}")]
    InvalidNewPair(ValidationError),

    #[error("Merge validation failed: {0}")]
    PostMergeValidation(String),

    #[error("Merge resulted in badge loss: {before} -> {after}")]
    BadgeLoss { before: usize, after: usize },

    #[error("Backup store error during merge: {0}")]
    Store(#[from] StoreError),
}

/// Failure of an acceptance run outside the merge rules themselves.
#[derive(Error, Debug)]
pub enum AcceptError {
    #[error("Backup store error: {0}")]
    Store(#[from] StoreError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("No backup available to recover from ({0})")]
    RecoveryExhausted(Box<AcceptError>),
}

/// Failure of an issuer-side operation.
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),
}
