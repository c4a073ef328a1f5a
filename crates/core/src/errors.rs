use thiserror::Error;

use crate::ports::{ExtractError, NotifyError, StoreError};

/// Internal-invariant violations. These are fatal for the request in hand:
/// logged with detail, answered with the generic apology, never ignored.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures of the engine's collaborators. Validation outcomes are ordinary
/// replies and never appear here; anything here is a system error that the
/// transport edge turns into the apology reply while logging the detail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extractor(#[from] ExtractError),
    #[error(transparent)]
    Notifier(#[from] NotifyError),
}

impl EngineError {
    /// The only text an end user may see for a system error. Raw error
    /// detail goes to the log, never to the chat.
    pub fn user_message(&self) -> &'static str {
        crate::reply::apology()
    }
}
