//! A software U2F token.
//!
//! Behaves like a hardware authenticator at the transport boundary: the
//! registration response carries the standard layout, key handles are
//! self-contained (the credential secret is wrapped under the token's master
//! key), and every authentication bumps a persisted counter.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use p256::ecdsa::{Signature, SigningKey, signature::Signer as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;

use super::state::{self, SoftTokenState};
use super::{DeviceSelector, TokenOpener, TokenTransport, TransportError};
use crate::u2f::types::{DIGEST_LEN, FLAG_USER_PRESENT, REGISTER_RESERVED_BYTE};
use crate::u2f::{ApplicationParameter, KeyHandle, presence_prefix, signed_transcript};
use crate::up::{self, PresenceCheck};

const NONCE_LEN: usize = 12;

/// Opens sessions on a single software token.
#[derive(Clone)]
pub struct SoftTokenOpener {
    state: Arc<Mutex<SoftTokenState>>,
    path: Option<PathBuf>,
    presence: Arc<dyn PresenceCheck>,
}

impl SoftTokenOpener {
    /// Token backed by the state file at `path`, created on first use.
    pub fn open_state(path: &Path, presence: Arc<dyn PresenceCheck>) -> Result<Self, TransportError> {
        let state = state::load_or_create(path)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            path: Some(path.to_path_buf()),
            presence,
        })
    }

    /// Token whose secrets live only as long as this opener and its clones.
    pub fn ephemeral(presence: Arc<dyn PresenceCheck>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SoftTokenState::generate())),
            path: None,
            presence,
        }
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl TokenOpener for SoftTokenOpener {
    type Token = SoftToken;

    fn open(&self, device: &DeviceSelector) -> Result<SoftToken, TransportError> {
        let matches = match device {
            DeviceSelector::First | DeviceSelector::Index(0) => true,
            DeviceSelector::Index(_) => false,
            DeviceSelector::Path(p) => self.path.as_deref() == Some(p.as_path()),
        };
        if !matches {
            return Err(TransportError::NoDevice(format!("{device:?}")));
        }
        tracing::debug!(path = ?self.path, "Opened software token");
        Ok(SoftToken {
            state: Arc::clone(&self.state),
            path: self.path.clone(),
            presence: Arc::clone(&self.presence),
        })
    }
}

pub struct SoftToken {
    state: Arc<Mutex<SoftTokenState>>,
    path: Option<PathBuf>,
    presence: Arc<dyn PresenceCheck>,
}

impl SoftToken {
    fn lock(&self) -> Result<MutexGuard<'_, SoftTokenState>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::Other("token state mutex poisoned".into()))
    }

    fn persist(path: Option<&Path>, state: &SoftTokenState) -> Result<(), TransportError> {
        match path {
            Some(path) => state::write_state(path, state),
            None => Ok(()),
        }
    }
}

impl TokenTransport for SoftToken {
    fn register(
        &mut self,
        challenge: &[u8; DIGEST_LEN],
        application: &ApplicationParameter,
    ) -> Result<Vec<u8>, TransportError> {
        let state = self.lock()?;
        if !self.presence.confirm(&up::register_prompt(application)) {
            return Err(TransportError::PresenceRequired);
        }

        let secret = p256::SecretKey::random(&mut rand::thread_rng());
        let key_handle = wrap_secret(&state.master_key()?, application, &secret)?;
        let point = secret.public_key().to_encoded_point(false);

        // Self attestation: 0x00 || app || challenge || key handle || point
        let mut to_sign = vec![0x00u8];
        to_sign.extend_from_slice(application.as_bytes());
        to_sign.extend_from_slice(challenge);
        to_sign.extend_from_slice(key_handle.as_bytes());
        to_sign.extend_from_slice(point.as_bytes());
        let attestation = SigningKey::from(&state.attestation_key()?);
        let sig: Signature = attestation.sign(&to_sign);

        tracing::debug!(key_handle_len = key_handle.len(), "Software token registered key");
        Ok(registration_response(&point, &key_handle, sig.to_der().as_bytes()))
    }

    fn authenticate(
        &mut self,
        challenge: &[u8; DIGEST_LEN],
        application: &ApplicationParameter,
        key_handle: &KeyHandle,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock()?;
        // Unknown handles are rejected before asking for a touch.
        let secret = unwrap_secret(&state.master_key()?, application, key_handle).ok_or_else(|| {
            TransportError::Other("key handle not recognised for this application".into())
        })?;

        if !self.presence.confirm(&up::authenticate_prompt(application)) {
            return Err(TransportError::PresenceRequired);
        }

        let counter = state.next_counter()?;
        Self::persist(self.path.as_deref(), &state)?;

        let prefix = presence_prefix(FLAG_USER_PRESENT, counter);
        let transcript = signed_transcript(application, &prefix, challenge);
        let sig: Signature = SigningKey::from(&secret).sign(&transcript);
        tracing::debug!(counter, "Software token signed challenge");

        let der = sig.to_der();
        let mut response = Vec::with_capacity(prefix.len() + der.as_bytes().len());
        response.extend_from_slice(&prefix);
        response.extend_from_slice(der.as_bytes());
        Ok(response)
    }
}

/// reserved || 0x04 X Y || L || key handle || attestation cert (none) || signature
fn registration_response(
    point: &p256::EncodedPoint,
    key_handle: &KeyHandle,
    attestation_sig: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + 65 + 1 + key_handle.len() + attestation_sig.len());
    data.push(REGISTER_RESERVED_BYTE);
    data.extend_from_slice(point.as_bytes());
    data.push(key_handle.len() as u8);
    data.extend_from_slice(key_handle.as_bytes());
    data.extend_from_slice(attestation_sig);
    data
}

/// nonce (12) || AES-256-GCM(secret scalar), application parameter as AAD.
fn wrap_secret(
    master_key: &[u8; 32],
    application: &ApplicationParameter,
    secret: &p256::SecretKey,
) -> Result<KeyHandle, TransportError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(master_key)
        .map_err(|e| TransportError::Other(e.to_string()))?;
    let scalar = secret.to_bytes();
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: scalar.as_slice(),
                aad: application.as_bytes(),
            },
        )
        .map_err(|e| TransportError::Other(e.to_string()))?;

    let mut handle = Vec::with_capacity(NONCE_LEN + sealed.len());
    handle.extend_from_slice(&nonce_bytes);
    handle.extend_from_slice(&sealed);
    KeyHandle::new(handle).map_err(|e| TransportError::Other(e.to_string()))
}

fn unwrap_secret(
    master_key: &[u8; 32],
    application: &ApplicationParameter,
    key_handle: &KeyHandle,
) -> Option<p256::SecretKey> {
    let bytes = key_handle.as_bytes();
    if bytes.len() <= NONCE_LEN {
        return None;
    }
    let (nonce_bytes, sealed) = bytes.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(master_key).ok()?;
    let scalar = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: sealed,
                aad: application.as_bytes(),
            },
        )
        .ok()?;
    p256::SecretKey::from_slice(&scalar).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u2f::{parse_authentication, parse_registration};
    use crate::up::{AbsentFor, AlwaysPresent};

    fn token(presence: Arc<dyn PresenceCheck>) -> SoftToken {
        SoftTokenOpener::ephemeral(presence)
            .open(&DeviceSelector::First)
            .unwrap()
    }

    #[test]
    fn test_registration_response_parses() {
        let mut token = token(Arc::new(AlwaysPresent));
        let app = ApplicationParameter::from_origin("example.com");
        let raw = token.register(&[0u8; 32], &app).unwrap();

        assert_eq!(raw[0], REGISTER_RESERVED_BYTE);
        let reg = parse_registration(&raw).unwrap();
        assert_eq!(reg.key_handle.len(), NONCE_LEN + 32 + 16);
    }

    #[test]
    fn test_counter_increments_per_authentication() {
        let mut token = token(Arc::new(AlwaysPresent));
        let app = ApplicationParameter::from_origin("example.com");
        let reg = parse_registration(&token.register(&[0u8; 32], &app).unwrap()).unwrap();

        let first = token.authenticate(&[1u8; 32], &app, &reg.key_handle).unwrap();
        let second = token.authenticate(&[1u8; 32], &app, &reg.key_handle).unwrap();
        let first = parse_authentication(&first).unwrap();
        let second = parse_authentication(&second).unwrap();
        assert!(first.user_present());
        assert_eq!(second.counter(), first.counter() + 1);
    }

    #[test]
    fn test_key_handle_bound_to_application() {
        let mut token = token(Arc::new(AlwaysPresent));
        let app = ApplicationParameter::from_origin("example.com");
        let other = ApplicationParameter::from_origin("evil.example");
        let reg = parse_registration(&token.register(&[0u8; 32], &app).unwrap()).unwrap();

        let err = token.authenticate(&[1u8; 32], &other, &reg.key_handle).unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[test]
    fn test_foreign_key_handle_rejected_without_touch() {
        let presence = Arc::new(AbsentFor::new(5));
        let mut token = token(presence.clone());
        let app = ApplicationParameter::from_origin("example.com");
        let foreign = KeyHandle::new(vec![0x42; 60]).unwrap();

        let err = token.authenticate(&[1u8; 32], &app, &foreign).unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
        assert_eq!(presence.remaining(), 5, "presence must not be consulted");
    }

    #[test]
    fn test_presence_required_until_touched() {
        let mut token = token(Arc::new(AbsentFor::new(1)));
        let app = ApplicationParameter::from_origin("example.com");
        assert!(matches!(
            token.register(&[0u8; 32], &app),
            Err(TransportError::PresenceRequired)
        ));
        assert!(token.register(&[0u8; 32], &app).is_ok());
    }

    #[test]
    fn test_opener_device_selection() {
        let opener = SoftTokenOpener::ephemeral(Arc::new(AlwaysPresent));
        assert!(opener.open(&DeviceSelector::First).is_ok());
        assert!(opener.open(&DeviceSelector::Index(0)).is_ok());
        assert!(matches!(
            opener.open(&DeviceSelector::Index(1)),
            Err(TransportError::NoDevice(_))
        ));
        assert!(matches!(
            opener.open(&DeviceSelector::Path(PathBuf::from("/dev/hidraw0"))),
            Err(TransportError::NoDevice(_))
        ));
    }
}
