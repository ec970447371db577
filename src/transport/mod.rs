use std::path::PathBuf;

use crate::u2f::types::DIGEST_LEN;
use crate::u2f::{ApplicationParameter, KeyHandle};

pub mod soft;
pub(crate) mod state;

pub use soft::{SoftToken, SoftTokenOpener};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No token available: {0}")]
    NoDevice(String),
    #[error("User presence required")]
    PresenceRequired,
    #[error("Token error: {0}")]
    Other(String),
}

/// Which of the available tokens to open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    #[default]
    First,
    Index(usize),
    Path(PathBuf),
}

/// One open session with a token. Requests are strictly sequential.
pub trait TokenTransport {
    fn register(
        &mut self,
        challenge: &[u8; DIGEST_LEN],
        application: &ApplicationParameter,
    ) -> Result<Vec<u8>, TransportError>;

    fn authenticate(
        &mut self,
        challenge: &[u8; DIGEST_LEN],
        application: &ApplicationParameter,
        key_handle: &KeyHandle,
    ) -> Result<Vec<u8>, TransportError>;
}

pub trait TokenOpener {
    type Token: TokenTransport;

    fn open(&self, device: &DeviceSelector) -> Result<Self::Token, TransportError>;
}
