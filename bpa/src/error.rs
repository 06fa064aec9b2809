use thiserror::Error;

/// Fatal configuration problems, raised synchronously at setup.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("unknown storage backend {0:?}")]
    UnknownStorage(String),

    #[error("unknown routing policy {0:?}")]
    UnknownRouter(String),

    #[error("the flash storage backend needs a key-value store in the config")]
    MissingKvStore,

    #[error("CRC type must be 0, 1 or 2, got {0}")]
    InvalidCrcType(u64),

    #[error(transparent)]
    InvalidUri(#[from] tundra_bpv7::Error),
}

/// Why an [`Endpoint::send`](crate::endpoint::Endpoint::send) call failed.
#[derive(Error, Debug)]
pub enum SendError {
    /// The endpoint is not attached to a Bundle Protocol Agent.
    #[error("endpoint is not registered with a BPA")]
    NotRegistered,

    /// The node is shutting down and the receive queue is gone.
    #[error("the node is shutting down")]
    Closed,

    #[error("invalid destination: {0}")]
    InvalidDestination(#[from] tundra_bpv7::Error),
}
