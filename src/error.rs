use thiserror::Error;

pub type NotificationResult<T> = Result<T, NotificationError>;

/// Failure taxonomy for the dispatch pipeline.
///
/// `Validation` and `Provider` reject the delivery without requeue (the
/// broker dead-letters it); `Connection` goes through the bounded
/// reconnect path; `Configuration` is fatal at startup.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Payload is malformed. Permanent: retrying cannot make it valid.
    #[error("Invalid message: {0}")]
    Validation(String),

    /// The delivery backend refused or failed the send.
    #[error("Provider error: {0}")]
    Provider(#[from] SendError),

    /// The broker is unreachable or the channel is gone.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// Unknown backend name, inconsistent topology, bad environment.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NotificationError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, NotificationError::Validation(_))
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Validation(err.to_string())
    }
}

impl From<lapin::Error> for NotificationError {
    fn from(err: lapin::Error) -> Self {
        NotificationError::Connection(err.to_string())
    }
}

/// Errors produced by a delivery backend.
#[derive(Debug, Error)]
pub enum SendError {
    /// The remote endpoint answered outside 2xx.
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The request never completed.
    #[error("network failure: {0}")]
    Network(String),

    /// Injected failure from the local simulator.
    #[error("simulated delivery failure: {0}")]
    Simulated(String),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        SendError::Network(err.to_string())
    }
}
