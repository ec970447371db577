use std::fmt;

use p256::ecdsa::VerifyingKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

use super::MalformedResponse;

pub const APP_PARAM_LEN: usize = 32;
pub const DIGEST_LEN: usize = 32;
pub const MAX_KEY_HANDLE_LEN: usize = 255;
pub const PRESENCE_PREFIX_LEN: usize = 5;

pub const REGISTER_RESERVED_BYTE: u8 = 0x05;
pub const EC_POINT_UNCOMPRESSED: u8 = 0x04;
pub const FLAG_USER_PRESENT: u8 = 0x01;

/// SHA-256 of the relying-party origin. Scopes a key to exactly one origin.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApplicationParameter([u8; APP_PARAM_LEN]);

impl ApplicationParameter {
    pub fn from_origin(origin: &str) -> Self {
        Self(Sha256::digest(origin.as_bytes()).into())
    }

    pub fn from_bytes(bytes: [u8; APP_PARAM_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; APP_PARAM_LEN] {
        &self.0
    }
}

impl fmt::Debug for ApplicationParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApplicationParameter({})", hex::encode(self.0))
    }
}

/// Opaque per-registration capability issued by the token.
///
/// Never interpreted here: it is stored after registration and handed back
/// to the token on every authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyHandle(Vec<u8>);

impl KeyHandle {
    pub fn new(bytes: Vec<u8>) -> Result<Self, MalformedResponse> {
        if bytes.is_empty() || bytes.len() > MAX_KEY_HANDLE_LEN {
            return Err(MalformedResponse::KeyHandleLength(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl TryFrom<&[u8]> for KeyHandle {
    type Error = MalformedResponse;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::new(bytes.to_vec())
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHandle({} bytes)", self.0.len())
    }
}

/// A P-256 point together with the application parameter it was registered
/// under. Signatures cannot be checked without both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    point: p256::PublicKey,
    application: ApplicationParameter,
}

impl PublicKey {
    pub fn new(point: p256::PublicKey, application: ApplicationParameter) -> Self {
        Self { point, application }
    }

    pub fn for_origin(point: p256::PublicKey, origin: &str) -> Self {
        Self::new(point, ApplicationParameter::from_origin(origin))
    }

    pub fn point(&self) -> &p256::PublicKey {
        &self.point
    }

    pub fn application(&self) -> &ApplicationParameter {
        &self.application
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.point)
    }

    /// Uncompressed SEC1 encoding (`0x04 || X || Y`, 65 bytes).
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.point.to_encoded_point(false).as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_parameter_is_sha256_of_origin() {
        let app = ApplicationParameter::from_origin("example.com");
        let expected: [u8; 32] = Sha256::digest(b"example.com").into();
        assert_eq!(app.as_bytes(), &expected);
        assert_ne!(app, ApplicationParameter::from_origin("example.org"));
    }

    #[test]
    fn test_key_handle_length_bounds() {
        assert_eq!(
            KeyHandle::new(Vec::new()),
            Err(MalformedResponse::KeyHandleLength(0))
        );
        assert!(KeyHandle::new(vec![0xAA; 1]).is_ok());
        assert!(KeyHandle::new(vec![0xAA; MAX_KEY_HANDLE_LEN]).is_ok());
        assert_eq!(
            KeyHandle::new(vec![0xAA; MAX_KEY_HANDLE_LEN + 1]),
            Err(MalformedResponse::KeyHandleLength(256))
        );
    }

    #[test]
    fn test_key_handle_debug_hides_bytes() {
        let handle = KeyHandle::new(vec![0x42; 16]).unwrap();
        assert_eq!(format!("{handle:?}"), "KeyHandle(16 bytes)");
    }

    #[test]
    fn test_public_key_sec1_is_uncompressed() {
        let secret = p256::SecretKey::random(&mut rand::thread_rng());
        let key = PublicKey::for_origin(secret.public_key(), "example.com");
        let sec1 = key.to_sec1_bytes();
        assert_eq!(sec1.len(), 65);
        assert_eq!(sec1[0], EC_POINT_UNCOMPRESSED);
    }
}
