//! secp256k1 ECDSA over prehashed field digests.
//!
//! Withdrawal requests are authorised by signing the 32-byte big-endian
//! encoding of a Poseidon digest. Signing is RFC 6979 deterministic, so the
//! same key and digest always yield the same `(r, s)`.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::deterministic::expand_to_length;
use crate::error::CryptoError;
use crate::field::{FieldElement, FIELD_BYTES};
use crate::hashes::keccak256;
use crate::limbs::{bytes_to_limbs, Limbs};
use crate::traits::{Signature as SigTrait, SigningKey as SigningKeyTrait, VerifyKey};

pub const ECDSA_SECRET_KEY_LEN: usize = 32;
/// Uncompressed SEC1 encoding: `0x04 || x || y`.
pub const ECDSA_PUBLIC_KEY_LEN: usize = 65;
pub const ECDSA_SIGNATURE_LEN: usize = 64;
pub const ECDSA_DIGEST_LEN: usize = FIELD_BYTES;

const ADDRESS_BYTES: usize = 20;

/// Compact `r || s` signature, both halves big-endian.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcdsaSignature {
    bytes: [u8; ECDSA_SIGNATURE_LEN],
}

impl EcdsaSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ECDSA_SIGNATURE_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ECDSA_SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        K256Signature::from_slice(bytes).map_err(|_| CryptoError::InvalidSignature)?;
        let mut arr = [0u8; ECDSA_SIGNATURE_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    pub fn from_scalars(r: [u8; 32], s: [u8; 32]) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; ECDSA_SIGNATURE_LEN];
        bytes[..32].copy_from_slice(&r);
        bytes[32..].copy_from_slice(&s);
        Self::from_bytes(&bytes)
    }

    pub fn r(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.bytes[..32]);
        out
    }

    pub fn s(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.bytes[32..]);
        out
    }

    pub fn r_limbs(&self) -> Limbs {
        bytes_to_limbs(&self.r())
    }

    pub fn s_limbs(&self) -> Limbs {
        bytes_to_limbs(&self.s())
    }

    fn to_inner(&self) -> Result<K256Signature, CryptoError> {
        K256Signature::from_slice(&self.bytes).map_err(|_| CryptoError::InvalidSignature)
    }
}

impl SigTrait for EcdsaSignature {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcdsaPublicKey {
    point: [u8; ECDSA_PUBLIC_KEY_LEN],
}

impl EcdsaPublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let encoded = key.to_encoded_point(false);
        let mut point = [0u8; ECDSA_PUBLIC_KEY_LEN];
        point.copy_from_slice(encoded.as_bytes());
        Self { point }
    }

    fn to_inner(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_sec1_bytes(&self.point).map_err(|_| CryptoError::InvalidKey)
    }

    /// Rebuild a key from its limb-encoded affine coordinates.
    pub fn from_coordinates(x: &[u8; 32], y: &[u8; 32]) -> Result<Self, CryptoError> {
        let mut point = [0u8; ECDSA_PUBLIC_KEY_LEN];
        point[0] = 0x04;
        point[1..33].copy_from_slice(x);
        point[33..].copy_from_slice(y);
        <Self as VerifyKey>::from_bytes(&point)
    }

    pub fn x(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.point[1..33]);
        out
    }

    pub fn y(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.point[33..]);
        out
    }

    pub fn x_limbs(&self) -> Limbs {
        bytes_to_limbs(&self.x())
    }

    pub fn y_limbs(&self) -> Limbs {
        bytes_to_limbs(&self.y())
    }

    /// Ethereum-style account address: the low 20 bytes of
    /// `keccak256(x || y)`, read as a field element.
    pub fn address(&self) -> FieldElement {
        let digest = keccak256(&self.point[1..]);
        FieldElement::from_be_bytes(&digest[32 - ADDRESS_BYTES..])
    }

    pub fn verify_digest(
        &self,
        digest: &FieldElement,
        signature: &EcdsaSignature,
    ) -> Result<(), CryptoError> {
        self.verify(&digest.to_be_bytes(), signature)
    }
}

impl VerifyKey for EcdsaPublicKey {
    type Signature = EcdsaSignature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError> {
        if message.len() != ECDSA_DIGEST_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ECDSA_DIGEST_LEN,
                actual: message.len(),
            });
        }
        let key = self.to_inner()?;
        let sig = signature.to_inner()?;
        key.verify_prehash(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.point.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ECDSA_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ECDSA_PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self::from_verifying_key(&key))
    }
}

macro_rules! hex_serde {
    ($ty:ident, $decode:expr) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.as_ref()))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                let bytes = hex::decode(text.trim_start_matches("0x"))
                    .map_err(serde::de::Error::custom)?;
                $decode(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl AsRef<[u8]> for EcdsaSignature {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for EcdsaPublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.point
    }
}

hex_serde!(EcdsaSignature, EcdsaSignature::from_bytes);
hex_serde!(EcdsaPublicKey, <EcdsaPublicKey as VerifyKey>::from_bytes);

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EcdsaSecretKey {
    bytes: [u8; ECDSA_SECRET_KEY_LEN],
}

impl EcdsaSecretKey {
    fn to_inner(&self) -> K256SigningKey {
        K256SigningKey::from_slice(&self.bytes).expect("secret key validated on construction")
    }

    pub fn sign_digest(&self, digest: &FieldElement) -> Result<EcdsaSignature, CryptoError> {
        self.sign(&digest.to_be_bytes())
    }
}

impl core::fmt::Debug for EcdsaSecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EcdsaSecretKey").finish_non_exhaustive()
    }
}

impl PartialEq for EcdsaSecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for EcdsaSecretKey {}

impl SigningKeyTrait for EcdsaSecretKey {
    type VerifyKey = EcdsaPublicKey;
    type Signature = EcdsaSignature;

    fn generate_deterministic(seed: &[u8]) -> Self {
        // A candidate is rejected only when it is zero or not below the group
        // order, so this settles on the first counter in practice.
        let mut counter = 0u32;
        loop {
            let mut material = seed.to_vec();
            material.extend_from_slice(&counter.to_be_bytes());
            let candidate = expand_to_length(b"ecdsa-keygen", &material, ECDSA_SECRET_KEY_LEN);
            if let Ok(key) = Self::from_bytes(&candidate) {
                return key;
            }
            counter = counter.checked_add(1).expect("counter overflow");
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        if message.len() != ECDSA_DIGEST_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ECDSA_DIGEST_LEN,
                actual: message.len(),
            });
        }
        let signature: K256Signature = self
            .to_inner()
            .sign_prehash(message)
            .map_err(|_| CryptoError::InvalidSignature)?;
        EcdsaSignature::from_bytes(&signature.to_bytes())
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ECDSA_SECRET_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ECDSA_SECRET_KEY_LEN,
                actual: bytes.len(),
            });
        }
        K256SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKey)?;
        let mut arr = [0u8; ECDSA_SECRET_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    fn verify_key(&self) -> Self::VerifyKey {
        EcdsaPublicKey::from_verifying_key(self.to_inner().verifying_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::poseidon_hash;

    fn digest() -> FieldElement {
        poseidon_hash(&[FieldElement::from_u64(0), FieldElement::from_u64(10), FieldElement::zero()])
    }

    #[test]
    fn sign_and_verify_digest() {
        let sk = EcdsaSecretKey::generate_deterministic(b"alice");
        let pk = sk.verify_key();
        let sig = sk.sign_digest(&digest()).expect("sign");
        pk.verify_digest(&digest(), &sig).expect("verify");
    }

    #[test]
    fn signing_is_deterministic() {
        let sk = EcdsaSecretKey::generate_deterministic(b"alice");
        let again = EcdsaSecretKey::generate_deterministic(b"alice");
        assert_eq!(sk, again);
        assert_eq!(
            sk.sign_digest(&digest()).expect("sign"),
            again.sign_digest(&digest()).expect("sign")
        );
    }

    #[test]
    fn wrong_digest_or_key_fails() {
        let sk = EcdsaSecretKey::generate_deterministic(b"alice");
        let other = EcdsaSecretKey::generate_deterministic(b"bob").verify_key();
        let sig = sk.sign_digest(&digest()).expect("sign");
        assert_eq!(
            other.verify_digest(&digest(), &sig),
            Err(CryptoError::VerificationFailed)
        );
        assert_eq!(
            sk.verify_key().verify_digest(&FieldElement::from_u64(1), &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn non_digest_messages_are_rejected() {
        let sk = EcdsaSecretKey::generate_deterministic(b"alice");
        assert_eq!(
            sk.sign(b"short").unwrap_err(),
            CryptoError::InvalidLength { expected: 32, actual: 5 }
        );
    }

    #[test]
    fn public_key_bytes_round_trip() {
        let pk = EcdsaSecretKey::generate_deterministic(b"carol").verify_key();
        let bytes = pk.to_bytes();
        assert_eq!(bytes.len(), ECDSA_PUBLIC_KEY_LEN);
        assert_eq!(bytes[0], 0x04);
        assert_eq!(EcdsaPublicKey::from_bytes(&bytes).expect("decode"), pk);
        assert_eq!(&bytes[1..33], &pk.x());
        assert!(EcdsaPublicKey::from_bytes(&[0u8; ECDSA_PUBLIC_KEY_LEN]).is_err());
    }

    #[test]
    fn signature_limbs_match_scalars() {
        let sk = EcdsaSecretKey::generate_deterministic(b"dave");
        let sig = sk.sign_digest(&digest()).expect("sign");
        let limbs = sig.r_limbs();
        let r = sig.r();
        assert_eq!(limbs[0].to_be_bytes(), r[..8]);
        assert_eq!(limbs[3].to_be_bytes(), r[24..]);
    }

    #[test]
    fn address_fits_in_160_bits() {
        let pk = EcdsaSecretKey::generate_deterministic(b"erin").verify_key();
        assert!(pk.address().as_biguint().bits() <= 160);
        assert_ne!(pk.address(), FieldElement::zero());
    }

    #[test]
    fn hex_serde_round_trips() {
        let sk = EcdsaSecretKey::generate_deterministic(b"frank");
        let pk = sk.verify_key();
        let sig = sk.sign_digest(&digest()).expect("sign");
        let encoded = serde_json::to_string(&(pk.clone(), sig.clone())).expect("encode");
        let decoded: (EcdsaPublicKey, EcdsaSignature) =
            serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, (pk.clone(), sig));
        assert!(serde_json::from_str::<EcdsaPublicKey>("\"04abcd\"").is_err());
        assert_eq!(
            EcdsaPublicKey::from_coordinates(&pk.x(), &pk.y()).expect("point"),
            pk
        );
    }

    #[test]
    fn invalid_secret_key_is_rejected() {
        assert_eq!(
            EcdsaSecretKey::from_bytes(&[0u8; 32]),
            Err(CryptoError::InvalidKey)
        );
        assert!(EcdsaSecretKey::from_bytes(&[1u8; 31]).is_err());
    }
}
