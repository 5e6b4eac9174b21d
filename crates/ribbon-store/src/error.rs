use thiserror::Error;

/// Errors produced by the backup store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (creating the directory, writing or linking a snapshot).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot body could not be encoded or decoded.
    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every candidate snapshot name was already taken.
    #[error("Could not allocate a snapshot name after {0} attempts")]
    NameExhausted(usize),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
