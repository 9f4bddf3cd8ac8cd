use thiserror::Error;

/// Failures reported by a broker client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Flush failed: {0}")]
    Flush(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlagError {
    #[error("Flag value not cached for key: {0}")]
    NotFound(String),

    #[error("Flag client error: {0}")]
    Client(String),
}

/// Error a message handler returns to the consume loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel misconfigured: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Flag error: {0}")]
    Flag(#[from] FlagError),

    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl From<ChannelError> for HandlerError {
    fn from(err: ChannelError) -> Self {
        HandlerError(err.to_string())
    }
}
