use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::adapter::KeyAdapter;
use crate::config::KEY_RECORD_VERSION;
use crate::u2f::{KeyHandle, PublicKey};

/// Everything needed to re-attach a registered key after a restart.
/// Contains no secrets: the private key never leaves the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub version:    u8,
    pub origin:     String,
    pub key_handle: Vec<u8>, // opaque, 1..=255 bytes
    pub public_key: Vec<u8>, // SEC1 uncompressed P-256 point, 65 bytes
    pub created_at: u64,     // Unix timestamp
}

impl KeyRecord {
    pub fn new(origin: &str, key_handle: &KeyHandle, public_key: &PublicKey) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            version: KEY_RECORD_VERSION,
            origin: origin.to_owned(),
            key_handle: key_handle.as_bytes().to_vec(),
            public_key: public_key.to_sec1_bytes(),
            created_at,
        }
    }

    pub fn from_adapter<T>(adapter: &KeyAdapter<T>) -> Self {
        Self::new(adapter.origin(), adapter.key_handle(), adapter.public_key())
    }

    /// Validated key handle and point, ready for `KeyAdapter::load`.
    pub fn key_material(&self) -> Result<(KeyHandle, p256::PublicKey), StoreError> {
        if self.version != KEY_RECORD_VERSION {
            return Err(StoreError::UnsupportedVersion(self.version));
        }
        let key_handle = KeyHandle::new(self.key_handle.clone())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let point = p256::PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|_| StoreError::Corrupt("public_key is not a P-256 point".into()))?;
        Ok((key_handle, point))
    }

    /// Public key bound to this record's origin, for verification.
    pub fn public_key(&self) -> Result<PublicKey, StoreError> {
        let (_, point) = self.key_material()?;
        Ok(PublicKey::for_origin(point, &self.origin))
    }
}
