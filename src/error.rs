//! Error types for lifecycle dispatch and the storage layer beneath it
use crate::engine::Event;
use crate::loan::Status;

/// Every failure a lifecycle dispatch can surface to its caller.
///
/// All variants are terminal for the dispatch that produced them; nothing is retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },
    #[error("cannot {event} loan in current state")]
    NoTransition { event: Event },
    #[error("unknown lifecycle event: {0}")]
    UnknownEvent(String),
    #[error("unknown loan status: {0}")]
    UnknownStatus(String),
    #[error("{0}")]
    MissingField(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("loan {0} not found")]
    LoanNotFound(String),
    #[error("investment exceeds remaining principal amount")]
    ExceedsPrincipal,
    #[error("{0}")]
    Precondition(String),
    #[error("invalid loan terms: {0}")]
    InvalidTerms(String),
    #[error("{0}")]
    PersistenceFailed(String),
    #[error("{0}")]
    DocumentCreationFailed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("invalid identifier prefix: {0}")]
    Prefix(#[from] bech32::primitives::hrp::Error),
    #[error("failed to encode identifier: {0}")]
    Identifier(#[from] bech32::EncodeError),
}

// Outside the hooks, storage failures carry no more specific meaning than this.
impl From<StoreError> for LoanError {
    fn from(err: StoreError) -> Self {
        LoanError::PersistenceFailed(err.to_string())
    }
}
