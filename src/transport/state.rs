use std::io::Write;
use std::path::Path;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::TransportError;
use crate::config::TOKEN_STATE_VERSION;

/// Persistent secrets and counter of a software token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SoftTokenState {
    pub version:         u8,
    pub master_key:      Vec<u8>, // AES-256 key wrapping credential secrets
    pub attestation_key: Vec<u8>, // P-256 scalar, 32 bytes
    pub counter:         u32,
}

impl SoftTokenState {
    pub fn generate() -> Self {
        let mut master_key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut master_key);
        let attestation = p256::SecretKey::random(&mut rand::thread_rng());
        Self {
            version: TOKEN_STATE_VERSION,
            master_key,
            attestation_key: attestation.to_bytes().to_vec(),
            counter: 0,
        }
    }

    pub fn master_key(&self) -> Result<[u8; 32], TransportError> {
        self.master_key
            .as_slice()
            .try_into()
            .map_err(|_| TransportError::Other("token master key is not 32 bytes".into()))
    }

    pub fn attestation_key(&self) -> Result<p256::SecretKey, TransportError> {
        p256::SecretKey::from_slice(&self.attestation_key)
            .map_err(|_| TransportError::Other("token attestation key is invalid".into()))
    }

    /// Bump the signature counter, refusing to wrap around.
    pub fn next_counter(&mut self) -> Result<u32, TransportError> {
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| TransportError::Other("signature counter exhausted".into()))?;
        Ok(self.counter)
    }
}

/// Read and validate token state from `path`.
pub(crate) fn read_state(path: &Path) -> Result<SoftTokenState, TransportError> {
    let bytes = std::fs::read(path)
        .map_err(|e| TransportError::Other(format!("read {}: {e}", path.display())))?;
    let state: SoftTokenState = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| TransportError::Other(format!("decode {}: {e}", path.display())))?;
    if state.version != TOKEN_STATE_VERSION {
        return Err(TransportError::Other(format!(
            "unsupported token state version {}",
            state.version
        )));
    }
    state.master_key()?;
    state.attestation_key()?;
    Ok(state)
}

/// Write token state to `path` via a temporary file, owner-only on Unix.
pub(crate) fn write_state(path: &Path, state: &SoftTokenState) -> Result<(), TransportError> {
    let mut buf = Vec::new();
    ciborium::into_writer(state, &mut buf)
        .map_err(|e| TransportError::Other(format!("encode token state: {e}")))?;

    let tmp = path.with_extension("tmp");
    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let io_err = |e: std::io::Error| TransportError::Other(format!("write {}: {e}", path.display()));
    let mut file = options.open(&tmp).map_err(io_err)?;
    file.write_all(&buf).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

pub(crate) fn load_or_create(path: &Path) -> Result<SoftTokenState, TransportError> {
    if path.exists() {
        return read_state(path);
    }
    let state = SoftTokenState::generate();
    write_state(path, &state)?;
    tracing::info!(path = %path.display(), "Created software token state");
    Ok(state)
}
