//! Semantic equality of decoded public keys.

use subtle::ConstantTimeEq;

use super::codec::DecodedPublicKey;

/// Two keys are equal iff both are present, their algorithms match, and
/// their canonical key material is byte-for-byte identical.  An absent key
/// never authenticates, so `None` compares unequal to everything, including
/// another `None`.
///
/// Key material is compared in constant time; the match-prefix length must
/// not be observable.
pub fn equal(a: Option<&DecodedPublicKey>, b: Option<&DecodedPublicKey>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.algorithm() == b.algorithm() && bool::from(a.material().ct_eq(b.material()))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::{decode, DecodedPublicKey, KeyAlgorithm};
    use crate::auth::testutil::ed25519_line;

    #[test]
    fn identical_keys_are_equal() {
        let a = decode(&ed25519_line(&[9u8; 32], None)).unwrap();
        let b = decode(&ed25519_line(&[9u8; 32], Some("alice@laptop"))).unwrap();
        assert!(equal(a.as_ref(), b.as_ref()));
    }

    #[test]
    fn different_material_is_unequal() {
        let a = decode(&ed25519_line(&[9u8; 32], None)).unwrap();
        let mut tampered = [9u8; 32];
        tampered[17] ^= 0x01;
        let b = decode(&ed25519_line(&tampered, None)).unwrap();
        assert!(!equal(a.as_ref(), b.as_ref()));
    }

    #[test]
    fn same_material_different_algorithm_is_unequal() {
        let a = DecodedPublicKey::from_parts(KeyAlgorithm::Rsa, vec![1, 2, 3]);
        let b = DecodedPublicKey::from_parts(KeyAlgorithm::Ed25519, vec![1, 2, 3]);
        assert!(!equal(Some(&a), Some(&b)));
    }

    #[test]
    fn absent_never_matches() {
        let key = decode(&ed25519_line(&[9u8; 32], None)).unwrap();
        assert!(!equal(None, None));
        assert!(!equal(None, key.as_ref()));
        assert!(!equal(key.as_ref(), None));
    }
}
