use shared::domain::{RequestId, RequestStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request store unreachable: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("dropped malformed {kind} event: {reason}")]
    MalformedEvent { kind: String, reason: String },
    #[error("request {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("a command for request {0} is already in flight")]
    CommandAlreadyInFlight(RequestId),
    #[error("store rejected moving request {id} to {target}: {source}")]
    Command {
        id: RequestId,
        target: RequestStatus,
        source: anyhow::Error,
    },
    #[error("request {0} is not on the board")]
    UnknownRequest(RequestId),
    #[error("view session is not active")]
    SessionInactive,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
