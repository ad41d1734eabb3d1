//! Decoding of the OpenSSH one-line public-key representation.
//!
//! An authorized-key line has the form `<algorithm-tag> <base64-blob>
//! [comment]`.  The base64 blob carries the RFC 4253 wire encoding of the
//! key, which starts with a length-prefixed copy of the algorithm name; a
//! blob whose embedded name disagrees with the outer tag is rejected.  All
//! failure modes are values; the codec never panics on peer-controlled
//! input.

use base64::Engine as _;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Key algorithms accepted by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Ed25519,
    EcdsaNistp256,
    EcdsaNistp384,
    EcdsaNistp521,
}

impl KeyAlgorithm {
    /// Map an algorithm tag (the first token of a key line) to a variant.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ssh-rsa" => Some(Self::Rsa),
            "ssh-ed25519" => Some(Self::Ed25519),
            "ecdsa-sha2-nistp256" => Some(Self::EcdsaNistp256),
            "ecdsa-sha2-nistp384" => Some(Self::EcdsaNistp384),
            "ecdsa-sha2-nistp521" => Some(Self::EcdsaNistp521),
            _ => None,
        }
    }

    /// The tag as it appears both in the key line and inside the key blob.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Rsa => "ssh-rsa",
            Self::Ed25519 => "ssh-ed25519",
            Self::EcdsaNistp256 => "ecdsa-sha2-nistp256",
            Self::EcdsaNistp384 => "ecdsa-sha2-nistp384",
            Self::EcdsaNistp521 => "ecdsa-sha2-nistp521",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// Decoded key
// ---------------------------------------------------------------------------

/// A structurally validated public key: algorithm plus the canonical decoded
/// key bytes.  Comments and whitespace from the original text do not survive
/// decoding, so comparison downstream operates purely on key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPublicKey {
    algorithm: KeyAlgorithm,
    material: Vec<u8>,
}

impl DecodedPublicKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }

    #[cfg(test)]
    pub(crate) fn from_parts(algorithm: KeyAlgorithm, material: Vec<u8>) -> Self {
        Self {
            algorithm,
            material,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a non-blank key line fails to decode.  Both are recoverable: the
/// authenticator maps them to a reject, never a crash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The line does not parse into a structurally valid key.
    #[error("malformed public key: {0}")]
    MalformedKey(&'static str),
    /// Recognised line syntax, but the algorithm tag is not one we accept.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decode a single-line public-key representation.
///
/// Blank input (empty or whitespace-only, including a trailing newline read
/// from a key file) decodes to `Ok(None)`: a missing key is an expected
/// state that can never match, not an error.  Everything after the base64
/// blob is treated as a comment and ignored.
pub fn decode(text: &str) -> Result<Option<DecodedPublicKey>, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let mut fields = text.split_whitespace();
    let tag = match fields.next() {
        Some(tag) => tag,
        None => return Ok(None),
    };
    let algorithm = KeyAlgorithm::from_tag(tag)
        .ok_or_else(|| DecodeError::UnsupportedAlgorithm(tag.to_string()))?;

    let blob_b64 = fields
        .next()
        .ok_or(DecodeError::MalformedKey("missing base64 key material"))?;
    let blob = base64::engine::general_purpose::STANDARD
        .decode(blob_b64)
        .map_err(|_| DecodeError::MalformedKey("key material is not valid base64"))?;

    let material = validate_blob(algorithm, blob)?;
    Ok(Some(DecodedPublicKey {
        algorithm,
        material,
    }))
}

/// Check the RFC 4253 structure of a decoded key blob: a 4-byte big-endian
/// length, the algorithm name matching the outer tag, then non-empty key
/// material.  Returns the whole blob as the canonical material on success.
fn validate_blob(algorithm: KeyAlgorithm, blob: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    if blob.len() < 4 {
        return Err(DecodeError::MalformedKey("key blob too short for header"));
    }
    let name_len = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    let rest = &blob[4..];
    if name_len > rest.len() {
        return Err(DecodeError::MalformedKey(
            "key blob header length exceeds blob size",
        ));
    }
    let (name, body) = rest.split_at(name_len);
    if name != algorithm.tag().as_bytes() {
        return Err(DecodeError::MalformedKey(
            "embedded algorithm name does not match tag",
        ));
    }
    if body.is_empty() {
        return Err(DecodeError::MalformedKey("key blob carries no key material"));
    }
    Ok(blob)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testutil::key_line;

    #[test]
    fn decode_ed25519_line() {
        let line = key_line("ssh-ed25519", "ssh-ed25519", &[0x42; 32], None);
        let key = decode(&line).unwrap().unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Ed25519);
        // Canonical material is the whole blob, header included.
        assert_eq!(&key.material()[..4], &[0, 0, 0, 11]);
        assert_eq!(&key.material()[4..15], b"ssh-ed25519");
        assert_eq!(&key.material()[15..], &[0x42; 32]);
    }

    #[test]
    fn decode_ecdsa_line() {
        let line = key_line("ecdsa-sha2-nistp256", "ecdsa-sha2-nistp256", &[7u8; 65], None);
        let key = decode(&line).unwrap().unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::EcdsaNistp256);
    }

    #[test]
    fn comment_and_whitespace_do_not_change_material() {
        let bare = key_line("ssh-ed25519", "ssh-ed25519", &[1u8; 32], None);
        let commented = key_line("ssh-ed25519", "ssh-ed25519", &[1u8; 32], Some("alice@laptop"));
        let padded = format!("  {bare}\n");
        let a = decode(&bare).unwrap().unwrap();
        let b = decode(&commented).unwrap().unwrap();
        let c = decode(&padded).unwrap().unwrap();
        assert_eq!(a.material(), b.material());
        assert_eq!(a.material(), c.material());
    }

    #[test]
    fn blank_input_is_absent() {
        assert_eq!(decode("").unwrap(), None);
        assert_eq!(decode("   \n").unwrap(), None);
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let err = decode("ssh-rsa not-base64!!").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedKey(_)));
    }

    #[test]
    fn missing_blob_is_malformed() {
        let err = decode("ssh-rsa").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedKey(_)));
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = decode("ssh-unknown AAAA").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedAlgorithm("ssh-unknown".to_string())
        );
    }

    #[test]
    fn embedded_name_mismatch_is_malformed() {
        // Outer tag says RSA, blob says Ed25519.
        let line = key_line("ssh-rsa", "ssh-ed25519", &[2u8; 32], None);
        let err = decode(&line).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedKey(_)));
    }

    #[test]
    fn truncated_header_is_malformed() {
        // Header claims 200 bytes of name, blob has none.
        let blob = base64::engine::general_purpose::STANDARD.encode([0u8, 0, 0, 200]);
        let err = decode(&format!("ssh-rsa {blob}")).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedKey(_)));
    }

    #[test]
    fn header_only_blob_is_malformed() {
        // Well-formed header but no key material after it.
        let line = key_line("ssh-ed25519", "ssh-ed25519", &[], None);
        let err = decode(&line).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedKey(_)));
    }
}
