use p256::ecdsa::signature::hazmat::PrehashVerifier;
use sha2::{Digest, Sha256};

use super::parse::parse_authentication;
use super::types::{
    APP_PARAM_LEN, ApplicationParameter, DIGEST_LEN, PRESENCE_PREFIX_LEN, PublicKey,
};
use crate::capability::Verifier;

pub const TRANSCRIPT_LEN: usize = APP_PARAM_LEN + PRESENCE_PREFIX_LEN + DIGEST_LEN;

/// Presence flags followed by the big-endian signature counter.
pub fn presence_prefix(flags: u8, counter: u32) -> [u8; PRESENCE_PREFIX_LEN] {
    let mut prefix = [0u8; PRESENCE_PREFIX_LEN];
    prefix[0] = flags;
    prefix[1..].copy_from_slice(&counter.to_be_bytes());
    prefix
}

/// The bytes a token signs when authenticating:
/// application parameter (32) || flags + counter (5) || challenge (32).
pub fn signed_transcript(
    application: &ApplicationParameter,
    prefix: &[u8; PRESENCE_PREFIX_LEN],
    challenge: &[u8; DIGEST_LEN],
) -> [u8; TRANSCRIPT_LEN] {
    let mut transcript = [0u8; TRANSCRIPT_LEN];
    transcript[..APP_PARAM_LEN].copy_from_slice(application.as_bytes());
    transcript[APP_PARAM_LEN..APP_PARAM_LEN + PRESENCE_PREFIX_LEN].copy_from_slice(prefix);
    transcript[APP_PARAM_LEN + PRESENCE_PREFIX_LEN..].copy_from_slice(challenge);
    transcript
}

/// Check a raw authentication response against `digest`.
///
/// Malformed input and a bad signature are indistinguishable to the caller:
/// both return `false`.
pub fn verify(public_key: &PublicKey, digest: &[u8; DIGEST_LEN], raw_response: &[u8]) -> bool {
    let auth = match parse_authentication(raw_response) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting malformed authentication response");
            return false;
        }
    };

    let transcript = signed_transcript(public_key.application(), &auth.prefix, digest);
    let hash = Sha256::digest(transcript);

    let ok = public_key
        .verifying_key()
        .verify_prehash(&hash, &auth.signature)
        .is_ok();
    tracing::trace!(counter = auth.counter(), ok, "Transcript verified");
    ok
}

/// Stateless verifier; needs no transport and is safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptVerifier;

impl Verifier for TranscriptVerifier {
    fn verify(&self, public_key: &PublicKey, digest: &[u8; DIGEST_LEN], raw_response: &[u8]) -> bool {
        verify(public_key, digest, raw_response)
    }
}
