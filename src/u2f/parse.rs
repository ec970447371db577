use p256::ecdsa::Signature;

use super::MalformedResponse;
use super::types::{EC_POINT_UNCOMPRESSED, FLAG_USER_PRESENT, KeyHandle, PRESENCE_PREFIX_LEN};

// Registration response layout:
// [0] reserved | [1] 0x04 | [2..34] X | [34..66] Y | [66] L | [67..67+L] key handle | attestation...
const POINT_OFFSET: usize = 1;
const KEY_HANDLE_LEN_OFFSET: usize = 66;
const KEY_HANDLE_OFFSET: usize = 67;

const DER_SEQUENCE_TAG: u8 = 0x30;

/// Key material returned by a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub point: p256::PublicKey,
    pub key_handle: KeyHandle,
}

/// A decoded authentication response: the 5-byte presence/counter prefix the
/// token signed over, and its signature.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub prefix: [u8; PRESENCE_PREFIX_LEN],
    pub signature: Signature,
}

impl Authentication {
    pub fn user_present(&self) -> bool {
        self.prefix[0] & FLAG_USER_PRESENT != 0
    }

    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([self.prefix[1], self.prefix[2], self.prefix[3], self.prefix[4]])
    }
}

/// Extract the public point and key handle from a raw registration response.
/// Trailing attestation data is not inspected.
pub fn parse_registration(raw: &[u8]) -> Result<Registration, MalformedResponse> {
    if raw.len() < KEY_HANDLE_OFFSET {
        return Err(MalformedResponse::Truncated {
            needed: KEY_HANDLE_OFFSET,
            actual: raw.len(),
        });
    }

    let marker = raw[POINT_OFFSET];
    if marker != EC_POINT_UNCOMPRESSED {
        return Err(MalformedResponse::PointFormat(marker));
    }

    let key_handle_len = raw[KEY_HANDLE_LEN_OFFSET] as usize;
    let end = KEY_HANDLE_OFFSET + key_handle_len;
    if raw.len() < end {
        return Err(MalformedResponse::Truncated {
            needed: end,
            actual: raw.len(),
        });
    }

    // 0x04 || X || Y; on-curve check happens here.
    let point = p256::PublicKey::from_sec1_bytes(&raw[POINT_OFFSET..KEY_HANDLE_LEN_OFFSET])
        .map_err(|_| MalformedResponse::InvalidPoint)?;
    let key_handle = KeyHandle::try_from(&raw[KEY_HANDLE_OFFSET..end])?;

    Ok(Registration { point, key_handle })
}

/// Split a raw authentication response into its presence/counter prefix and
/// DER signature. Bytes following the DER SEQUENCE are ignored.
pub fn parse_authentication(raw: &[u8]) -> Result<Authentication, MalformedResponse> {
    if raw.len() < PRESENCE_PREFIX_LEN {
        return Err(MalformedResponse::Truncated {
            needed: PRESENCE_PREFIX_LEN,
            actual: raw.len(),
        });
    }
    let (head, rest) = raw.split_at(PRESENCE_PREFIX_LEN);
    let mut prefix = [0u8; PRESENCE_PREFIX_LEN];
    prefix.copy_from_slice(head);

    let der = der_sequence(rest)?;
    let signature =
        Signature::from_der(der).map_err(|e| MalformedResponse::Signature(e.to_string()))?;

    Ok(Authentication { prefix, signature })
}

/// Slice out the leading DER SEQUENCE (header included). An ECDSA P-256
/// signature is at most 72 bytes, so only the short length form is accepted.
fn der_sequence(bytes: &[u8]) -> Result<&[u8], MalformedResponse> {
    let (tag, len) = match bytes {
        [tag, len, ..] => (*tag, *len as usize),
        _ => return Err(MalformedResponse::Signature("missing SEQUENCE header".into())),
    };
    if tag != DER_SEQUENCE_TAG {
        return Err(MalformedResponse::Signature(format!(
            "expected SEQUENCE tag 0x30, got {tag:#04x}"
        )));
    }
    if len & 0x80 != 0 {
        return Err(MalformedResponse::Signature(format!(
            "unsupported SEQUENCE length form {len:#04x}"
        )));
    }
    bytes
        .get(..2 + len)
        .ok_or_else(|| MalformedResponse::Signature("SEQUENCE body truncated".into()))
}
