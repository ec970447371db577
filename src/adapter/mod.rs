//! Binds one open token session to one registered key and exposes it as a
//! [`Signer`].

use std::sync::Mutex;

use rand::Rng;

use crate::capability::Signer;
use crate::error::Result;
use crate::transport::{DeviceSelector, TokenOpener, TokenTransport, TransportError};
use crate::u2f::types::DIGEST_LEN;
use crate::u2f::{ApplicationParameter, KeyHandle, PublicKey, parse_registration};

pub(crate) mod retry;

pub use retry::{AdapterOptions, CancelFlag, RetryPolicy};
use retry::retry_presence;

/// A token-resident P-256 key usable as a generic signer.
///
/// The transport sits behind a mutex: concurrent `sign` calls on one adapter
/// are serialized, never interleaved on the wire. Dropping the adapter (or
/// calling [`KeyAdapter::close`]) releases the transport; the caller must not
/// drop it while another thread is inside `sign`.
pub struct KeyAdapter<T> {
    origin: String,
    public_key: PublicKey,
    key_handle: KeyHandle,
    transport: Mutex<T>,
    options: AdapterOptions,
}

impl<T: TokenTransport> KeyAdapter<T> {
    /// Open the selected token and register a new key for `origin`.
    pub fn generate<O>(
        opener: &O,
        device: &DeviceSelector,
        origin: &str,
        options: AdapterOptions,
    ) -> Result<Self>
    where
        O: TokenOpener<Token = T>,
    {
        let transport = opener.open(device)?;
        Self::register(transport, origin, options)
    }

    /// Register a new key for `origin` on an already open transport.
    pub fn register(mut transport: T, origin: &str, options: AdapterOptions) -> Result<Self> {
        let application = ApplicationParameter::from_origin(origin);
        // Not bound into anything checked later; the token only uses it in
        // its attestation signature.
        let challenge: [u8; DIGEST_LEN] = rand::thread_rng().r#gen();

        tracing::info!(origin, "Registering new key");
        let raw = retry_presence("register", &options, || {
            transport.register(&challenge, &application)
        })?;
        let registration = parse_registration(&raw)?;
        tracing::info!(
            origin,
            key_handle_len = registration.key_handle.len(),
            "Key registered"
        );

        Ok(Self {
            origin: origin.to_owned(),
            public_key: PublicKey::new(registration.point, application),
            key_handle: registration.key_handle,
            transport: Mutex::new(transport),
            options,
        })
    }

    /// Open the selected token and re-attach previously registered key
    /// material. No request is sent; a handle the token does not own only
    /// shows up as a failing `sign`.
    pub fn load<O>(
        opener: &O,
        device: &DeviceSelector,
        origin: &str,
        key_handle: KeyHandle,
        point: p256::PublicKey,
        options: AdapterOptions,
    ) -> Result<Self>
    where
        O: TokenOpener<Token = T>,
    {
        let transport = opener.open(device)?;
        Ok(Self::attach(transport, origin, key_handle, point, options))
    }

    /// Same as [`KeyAdapter::load`], on a transport that is already open.
    pub fn attach(
        transport: T,
        origin: &str,
        key_handle: KeyHandle,
        point: p256::PublicKey,
        options: AdapterOptions,
    ) -> Self {
        tracing::debug!(origin, "Attached stored key");
        Self {
            origin: origin.to_owned(),
            public_key: PublicKey::for_origin(point, origin),
            key_handle,
            transport: Mutex::new(transport),
            options,
        }
    }

    /// Ask the token to sign `digest`. Returns the raw authentication
    /// response (presence flags, counter, DER signature) unmodified.
    pub fn sign(&self, digest: &[u8; DIGEST_LEN]) -> Result<Vec<u8>> {
        let mut transport = self
            .transport
            .lock()
            .map_err(|_| TransportError::Other("transport mutex poisoned".into()))?;
        let application = self.public_key.application();
        let raw = retry_presence("authenticate", &self.options, || {
            transport.authenticate(digest, application, &self.key_handle)
        })?;
        tracing::debug!(origin = %self.origin, len = raw.len(), "Digest signed");
        Ok(raw)
    }
}

impl<T> KeyAdapter<T> {
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_handle(&self) -> &KeyHandle {
        &self.key_handle
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// A handle that aborts an in-progress presence wait from another thread.
    /// Each cancellation ends one wait; later calls start with a clear flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.options.cancel.clone()
    }

    pub fn close(self) {}
}

impl<T> Drop for KeyAdapter<T> {
    fn drop(&mut self) {
        tracing::debug!(origin = %self.origin, "Released token transport");
    }
}

impl<T: TokenTransport> Signer for KeyAdapter<T> {
    fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn sign(&self, digest: &[u8; DIGEST_LEN]) -> Result<Vec<u8>> {
        KeyAdapter::sign(self, digest)
    }
}
