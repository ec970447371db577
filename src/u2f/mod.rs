pub mod parse;
pub mod transcript;
pub mod types;

pub use parse::{Authentication, Registration, parse_authentication, parse_registration};
pub use transcript::{TranscriptVerifier, presence_prefix, signed_transcript, verify};
pub use types::{ApplicationParameter, KeyHandle, PublicKey};

/// A response that arrived intact from the token but does not have the
/// U2F layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedResponse {
    #[error("response truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("unsupported EC point format {0:#04x} (expected uncompressed)")]
    PointFormat(u8),
    #[error("public key is not a valid P-256 point")]
    InvalidPoint,
    #[error("key handle length {0} outside 1..=255")]
    KeyHandleLength(usize),
    #[error("signature is not a DER (r, s) sequence: {0}")]
    Signature(String),
}
