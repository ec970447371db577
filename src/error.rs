use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport: {0}")]
    Transport(#[from] crate::transport::TransportError),
    #[error("Malformed response: {0}")]
    Malformed(#[from] crate::u2f::MalformedResponse),
    #[error("Cancelled while waiting for user presence")]
    Cancelled,
    #[error("User presence not confirmed within {0:?}")]
    PresenceTimeout(Duration),
    #[error("Store: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
