//! The two capabilities handed to higher-level authentication stacks.
//!
//! A [`Signer`] owns token state and performs I/O; a [`Verifier`] is pure and
//! can run server-side with no hardware attached.

use crate::error::Result;
use crate::u2f::PublicKey;
use crate::u2f::types::DIGEST_LEN;

pub trait Signer {
    /// Public key material to embed in a certificate or hand to a verifier.
    fn public_key(&self) -> &PublicKey;

    /// Sign a 32-byte digest. The returned bytes are the token's raw
    /// authentication response, to be checked with a [`Verifier`].
    fn sign(&self, digest: &[u8; DIGEST_LEN]) -> Result<Vec<u8>>;
}

pub trait Verifier {
    fn verify(&self, public_key: &PublicKey, digest: &[u8; DIGEST_LEN], raw_response: &[u8]) -> bool;
}
