use thiserror::Error;

use ribbon_shared::error::FrameError;

/// Failure talking to one relay endpoint. Never fatal to a multi-relay operation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection closed")]
    Closed,

    #[error("Frame encoding error: {0}")]
    Codec(#[from] FrameError),
}

/// A relay made an explicit negative decision about a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Relay rejected: {0}")]
    Rejected(String),

    #[error("Relay closed: {0}")]
    Closed(String),
}
