use thiserror::Error;

/// Errors from the bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("unknown lock token: {0}")]
    UnknownLockToken(String),

    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;
